//! Engine thread: owns the verification engine and serves identify requests
//! one at a time.
//!
//! Embedding extraction and index I/O are blocking, so the engine lives on a
//! dedicated OS thread fed by a bounded channel. Callers await a oneshot
//! reply, which keeps at most one identify in flight per request sender.

use facegate_core::{
    EmbeddingProvider, IdentifyResponse, MatchError, VectorIndex, VerificationEngine,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error(transparent)]
    Close(#[from] MatchError),
}

enum WorkerRequest {
    Identify {
        image: PathBuf,
        collection: String,
        threshold: Option<f32>,
        reply: oneshot::Sender<IdentifyResponse>,
    },
    Close {
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
}

impl WorkerHandle {
    pub async fn identify(
        &self,
        image: PathBuf,
        collection: &str,
        threshold: Option<f32>,
    ) -> Result<IdentifyResponse, WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Identify {
                image,
                collection: collection.to_string(),
                threshold,
                reply: reply_tx,
            })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)
    }

    /// Release the index handle and stop the thread.
    pub async fn close(self) -> Result<(), WorkerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WorkerRequest::Close { reply: reply_tx })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| WorkerError::ChannelClosed)??;
        Ok(())
    }
}

/// Move `engine` onto its own thread and return a handle to it.
///
/// The thread exits after a close request or once every handle is dropped;
/// either way the engine, and with it the index lock, is released.
pub fn spawn_worker<P, I>(engine: VerificationEngine<P, I>) -> Result<WorkerHandle, WorkerError>
where
    P: EmbeddingProvider + Send + 'static,
    I: VectorIndex + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<WorkerRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut engine = engine;
            while let Some(req) = rx.blocking_recv() {
                match req {
                    WorkerRequest::Identify {
                        image,
                        collection,
                        threshold,
                        reply,
                    } => {
                        let response = engine.identify(&image, &collection, threshold);
                        let _ = reply.send(response);
                    }
                    WorkerRequest::Close { reply } => {
                        let result = engine.close().map(|_| ());
                        let _ = reply.send(result);
                        tracing::info!("engine thread closed");
                        return;
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(WorkerHandle { tx })
}
