//! Retrieval-augmented project knowledge base: a background indexer
//! walks text sources into content-addressed chunks, embeds them, and a
//! query path retrieves the most similar chunks and synthesizes an
//! answer grounded in them.

mod chunker;
mod circuit_breaker;
mod provider;

pub use provider::{ChatProvider, EmbeddingProvider, LocalDaemonProvider, RemoteApiProvider};

use crate::config::RagConfig;
use crate::constants::{RAG_CHUNK_OVERLAP_TOKENS, RAG_CHUNK_SOFT_CAP_TOKENS, RAG_EMBED_BATCH_SIZE, RAG_LOW_CONFIDENCE_THRESHOLD, RAG_MAX_TOP_K};
use crate::models::{ChangeEvent, RagAnswer, RagChunk, RagSource, SourceType, Task};
use crate::persistence::PgStore;
use crate::realtime::ChannelRegistry;
use crate::{Result, SpiralError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub struct RagEngine {
    store: Arc<PgStore>,
    channels: Arc<ChannelRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    config: RagConfig,
    reindex_notify: Arc<Notify>,
}

impl RagEngine {
    /// Builds the engine from configuration. Returns `None` (with a
    /// warning logged) when RAG is disabled or the configured provider is
    /// missing credentials -- the rest of the server keeps serving.
    pub fn new(config: RagConfig, store: Arc<PgStore>, channels: Arc<ChannelRegistry>) -> Option<Self> {
        if !config.enabled {
            tracing::info!("RAG engine disabled via configuration");
            return None;
        }
        let (embedder, chat): (Arc<dyn EmbeddingProvider>, Arc<dyn ChatProvider>) = match config.embedding_provider {
            crate::config::EmbeddingProviderKind::Remote => {
                let Some(key) = config.embedding_api_key.clone() else {
                    tracing::warn!("RAG_ENABLED is true but EMBEDDING_API_KEY is unset; disabling RAG");
                    return None;
                };
                let provider = Arc::new(RemoteApiProvider::new(
                    config.embedding_base_url.clone(),
                    key,
                    config.chat_model.clone(),
                ));
                (provider.clone(), provider)
            }
            crate::config::EmbeddingProviderKind::Local => {
                let provider = Arc::new(LocalDaemonProvider::new(config.embedding_base_url.clone(), config.chat_model.clone()));
                (provider.clone(), provider)
            }
        };

        Some(Self {
            store,
            channels,
            embedder,
            chat,
            config,
            reindex_notify: Arc::new(Notify::new()),
        })
    }

    /// Coalesces overlapping manual triggers into the next cycle.
    pub fn trigger_reindex(&self) {
        self.reindex_notify.notify_one();
    }

    /// Spawns the background indexer loop, woken on the configured
    /// interval or an explicit [`Self::trigger_reindex`]. Exits cleanly
    /// when `cancellation` fires.
    pub fn spawn_indexer_loop(self: Arc<Self>, cancellation: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.config.interval_seconds));
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => {
                        tracing::info!("RAG indexer loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {}
                    _ = self.reindex_notify.notified() => {}
                }
                if let Err(e) = self.run_cycle(&cancellation).await {
                    tracing::warn!("RAG indexing cycle failed, will retry next tick: {e}");
                }
            }
        })
    }

    async fn run_cycle(&self, cancellation: &CancellationToken) -> Result<()> {
        let mut meta = self.store.get_meta().await?;
        let sources = self.collect_sources().await?;

        self.gc_removed_sources(&sources).await?;

        for (source_type, source_ref, text) in sources {
            if cancellation.is_cancelled() {
                break;
            }
            let content_hash = sha256_hex(&text);
            if self.store.chunk_exists(&source_ref, &content_hash).await? {
                continue;
            }
            let chunks = chunker::chunk_source(source_type, &text, RAG_CHUNK_SOFT_CAP_TOKENS, RAG_CHUNK_OVERLAP_TOKENS);
            for batch in chunks.chunks(RAG_EMBED_BATCH_SIZE) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let embeddings = match self.embedder.embed(&texts).await {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(source_ref, "embedding request failed, cycle left partial: {e}");
                        continue;
                    }
                };
                for (chunk, embedding) in batch.iter().zip(embeddings) {
                    let rag_chunk = RagChunk {
                        chunk_id: crate::models::new_id(),
                        source_type,
                        source_ref: source_ref.clone(),
                        text: chunk.text.clone(),
                        content_hash: chunk.content_hash.clone(),
                        created_at: chrono::Utc::now(),
                    };
                    self.store.insert_chunk_with_embedding(rag_chunk, embedding).await?;
                }
            }
            meta.cursors.insert(source_ref, chrono::Utc::now());
        }

        meta.last_walk_at = Some(chrono::Utc::now());
        self.store.set_meta(meta).await?;
        self.channels
            .publish("rag", ChangeEvent::new("rag.indexed", "cycle", serde_json::json!({})))
            .await;
        Ok(())
    }

    /// Drops chunks whose `source_ref` no longer appears among this
    /// cycle's live sources -- a deleted markdown file, renamed code
    /// file, or removed task/context entry (spec: rows are garbage-
    /// collected when their source no longer exists).
    async fn gc_removed_sources(&self, live_sources: &[(SourceType, String, String)]) -> Result<()> {
        let live: std::collections::HashSet<&str> = live_sources.iter().map(|(_, r, _)| r.as_str()).collect();
        for source_ref in self.store.distinct_chunk_source_refs().await? {
            if !live.contains(source_ref.as_str()) {
                tracing::debug!(source_ref, "source gone, removing its RAG chunks");
                self.store.delete_chunks_for_source(&source_ref).await?;
            }
        }
        Ok(())
    }

    /// Walks filesystem roots for markdown/code, plus DB-derived sources
    /// (tasks, context entries, agent messages).
    async fn collect_sources(&self) -> Result<Vec<(SourceType, String, String)>> {
        let mut sources = Vec::new();

        for root in &self.config.index_roots {
            walk_filesystem(Path::new(root), &mut sources).await;
        }

        for task in self.store.list_tasks().await? {
            sources.push((SourceType::Task, format!("task:{}", task.task_id), task_text(&task)));
        }
        for entry in self.store.list_context().await? {
            sources.push((
                SourceType::Context,
                format!("context:{}", entry.context_key),
                entry.value.to_string(),
            ));
        }
        for message in self.store.list_messages().await? {
            sources.push((SourceType::Message, format!("message:{}", message.message_id), message.payload.to_string()));
        }

        Ok(sources)
    }

    /// Retrieves the most similar chunks and, if confident enough,
    /// synthesizes an answer. Never fabricates: a low-confidence result
    /// still carries the retrieved sources.
    pub async fn ask_project_rag(&self, query: &str, top_k: usize) -> Result<RagAnswer> {
        let top_k = top_k.clamp(1, RAG_MAX_TOP_K);
        let query_embedding = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SpiralError::Unavailable("embedding provider returned no vector for query".to_string()))?;

        let hits = self.store.similarity_search(query_embedding, top_k).await?;
        let confidence = confidence_score(&hits, top_k);
        let sources: Vec<RagSource> = hits
            .iter()
            .map(|(chunk, similarity)| RagSource {
                source_ref: chunk.source_ref.clone(),
                source_type: chunk.source_type,
                similarity: *similarity,
                created_at: chunk.created_at,
            })
            .collect();

        if confidence < RAG_LOW_CONFIDENCE_THRESHOLD || hits.is_empty() {
            return Ok(RagAnswer {
                answer: String::new(),
                sources,
                confidence,
                context_keys_used: Vec::new(),
                suggested_queries: Vec::new(),
                low_confidence: true,
            });
        }

        let context_window = hits
            .iter()
            .map(|(chunk, _)| format!("[{}]\n{}", chunk.source_ref, chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        let context_keys_used: Vec<String> = hits
            .iter()
            .filter(|(c, _)| c.source_type == SourceType::Context)
            .map(|(c, _)| c.source_ref.clone())
            .collect();

        let system_prompt = "Answer the question using only the provided context. \
             If the context does not contain the answer, say so plainly.";
        let user_prompt = format!("Context:\n{context_window}\n\nQuestion: {query}");
        let answer = self.chat.complete(system_prompt, &user_prompt).await?;

        let suggested_queries = self.suggest_followups(query, &answer).await.unwrap_or_default();

        Ok(RagAnswer {
            answer,
            sources,
            confidence,
            context_keys_used,
            suggested_queries,
            low_confidence: false,
        })
    }

    async fn suggest_followups(&self, query: &str, answer: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Given the question \"{query}\" and answer \"{answer}\", suggest up to 3 short follow-up \
             questions, one per line, no numbering."
        );
        let response = self.chat.complete("You suggest concise follow-up questions.", &prompt).await?;
        Ok(response.lines().map(str::trim).filter(|l| !l.is_empty()).take(3).map(str::to_string).collect())
    }
}

fn task_text(task: &Task) -> String {
    match &task.description {
        Some(desc) => format!("{}\n{}", task.title, desc),
        None => task.title.clone(),
    }
}

fn sha256_hex(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `confidence = clamp(0.5*top1 + 0.3*mean(top_2..k) + 0.2*min(1, k/top_k), 0, 1)`,
/// monotone in both retrieval similarity and retrieved-count.
fn confidence_score(hits: &[(RagChunk, f32)], top_k: usize) -> f32 {
    if hits.is_empty() {
        return 0.0;
    }
    let top1 = hits[0].1;
    let rest = &hits[1..];
    let mean_rest = if rest.is_empty() {
        0.0
    } else {
        rest.iter().map(|(_, s)| *s).sum::<f32>() / rest.len() as f32
    };
    let count_term = (hits.len() as f32 / top_k as f32).min(1.0);
    (0.5 * top1 + 0.3 * mean_rest + 0.2 * count_term).clamp(0.0, 1.0)
}

fn classify_extension(path: &Path) -> Option<SourceType> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => Some(SourceType::Markdown),
        Some("rs") | Some("py") | Some("js") | Some("ts") | Some("go") | Some("java") | Some("c") | Some("cpp") => {
            Some(SourceType::Code)
        }
        _ => None,
    }
}

fn walk_filesystem<'a>(
    root: &'a Path,
    out: &'a mut Vec<(SourceType, String, String)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let Ok(mut entries) = tokio::fs::read_dir(root).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                walk_filesystem(&path, out).await;
                continue;
            }
            let Some(source_type) = classify_extension(&path) else {
                continue;
            };
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                out.push((source_type, path.to_string_lossy().to_string(), text));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(similarity: f32) -> (RagChunk, f32) {
        (
            RagChunk {
                chunk_id: "c".to_string(),
                source_type: SourceType::Markdown,
                source_ref: "doc.md".to_string(),
                text: "text".to_string(),
                content_hash: "hash".to_string(),
                created_at: chrono::Utc::now(),
            },
            similarity,
        )
    }

    #[test]
    fn empty_hits_have_zero_confidence() {
        assert_eq!(confidence_score(&[], 10), 0.0);
    }

    #[test]
    fn single_strong_hit_with_full_k_is_confident() {
        let hits = vec![chunk(0.95)];
        let score = confidence_score(&hits, 1);
        assert!(score > RAG_LOW_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn sparse_results_relative_to_top_k_lower_confidence() {
        let full = vec![chunk(0.8), chunk(0.8), chunk(0.8)];
        let sparse = vec![chunk(0.8)];
        assert!(confidence_score(&full, 3) >= confidence_score(&sparse, 3));
    }

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(classify_extension(Path::new("README.md")), Some(SourceType::Markdown));
        assert_eq!(classify_extension(Path::new("main.rs")), Some(SourceType::Code));
        assert_eq!(classify_extension(Path::new("data.bin")), None);
    }
}
