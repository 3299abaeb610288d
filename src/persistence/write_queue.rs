//! Single-writer serialization for the Postgres store.
//!
//! Every mutation is wrapped in a [`WriteOp`] closure and sent down one
//! mpsc channel; one background task owns the pool's write path and
//! drains it in order, handing each op's result back through a oneshot.
//! This keeps commit order deterministic (display_order reshuffles,
//! bulk status updates) without taking an in-process lock that would
//! serialize against concurrent readers too.

use crate::{Result, SpiralError};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};

pub type WriteOp = Box<dyn FnOnce(PgPool) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send>;

struct Job {
    op: WriteOp,
    reply: oneshot::Sender<Result<()>>,
}

#[derive(Clone)]
pub struct WriteQueue {
    sender: mpsc::Sender<Job>,
}

impl WriteQueue {
    /// Spawns the drain loop and returns a handle plus its `JoinHandle`
    /// so the caller can await a clean shutdown.
    pub fn spawn(pool: PgPool) -> (Self, tokio::task::JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Job>(crate::constants::WRITE_QUEUE_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let result = (job.op)(pool.clone()).await;
                let _ = job.reply.send(result);
            }
            tracing::info!("write queue drained, shutting down");
        });
        (Self { sender }, handle)
    }

    /// Approximate number of writes currently queued ahead of a new
    /// submission, derived from the channel's remaining permit count.
    pub fn depth(&self) -> usize {
        crate::constants::WRITE_QUEUE_CAPACITY.saturating_sub(self.sender.capacity())
    }

    /// Enqueues a write and awaits its completion. Retries transient
    /// transaction conflicts up to `MAX_WRITE_CONFLICT_RETRIES` times
    /// before surfacing `Conflict` to the caller.
    pub async fn submit<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn(PgPool) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut attempts = 0;
        loop {
            let (reply_tx, reply_rx) = oneshot::channel();
            let boxed: WriteOp = {
                let op = op.clone();
                Box::new(move |pool| Box::pin(op(pool)))
            };
            self.sender
                .send(Job { op: boxed, reply: reply_tx })
                .await
                .map_err(|_| SpiralError::Unavailable("write queue is closed".to_string()))?;

            match reply_rx
                .await
                .map_err(|_| SpiralError::Unavailable("write queue dropped the reply channel".to_string()))?
            {
                Ok(()) => return Ok(()),
                Err(SpiralError::Conflict(msg)) if attempts < crate::constants::MAX_WRITE_CONFLICT_RETRIES => {
                    attempts += 1;
                    tracing::debug!(attempts, "retrying write after conflict: {msg}");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
