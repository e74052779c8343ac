// Buffered sink: moves an inner sink onto its own task.
//
// Writes are queued and acknowledged immediately; the caller only sees
// backpressure once the queued bytes reach the high-water mark. This is what
// lets several slow destinations do their I/O at the same time while the
// fan-out loop itself stays sequential.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Sink;
use crate::error::{PipeError, Result};

/// Default high-water mark, in queued bytes.
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

enum Command {
    Write(Bytes),
    Finalize(oneshot::Sender<Result<()>>),
}

#[derive(Debug, Default)]
struct Progress {
    queued: usize,
    failure: Option<PipeError>,
}

/// Sink wrapper running the inner sink on a dedicated tokio task.
pub struct BufferedSink<S> {
    name: String,
    high_water_mark: usize,
    commands: mpsc::UnboundedSender<Command>,
    abort: Option<oneshot::Sender<PipeError>>,
    progress: Arc<watch::Sender<Progress>>,
    task: Option<JoinHandle<S>>,
    inner: Option<S>,
    finalized: bool,
    destroyed: Option<PipeError>,
}

impl<S> BufferedSink<S>
where
    S: Sink + 'static,
{
    /// Spawn the worker task. Must be called inside a tokio runtime.
    pub fn spawn(inner: S, high_water_mark: usize) -> Self {
        let name = inner.name().to_string();
        let (commands, rx) = mpsc::unbounded_channel();
        let (abort, abort_rx) = oneshot::channel();
        let (progress, _) = watch::channel(Progress::default());
        let progress = Arc::new(progress);

        let task = tokio::spawn(run_worker(
            inner,
            rx,
            abort_rx,
            Arc::clone(&progress),
        ));

        Self {
            name,
            high_water_mark: high_water_mark.max(1),
            commands,
            abort: Some(abort),
            progress,
            task: Some(task),
            inner: None,
            finalized: false,
            destroyed: None,
        }
    }

    /// Bytes accepted but not yet written by the inner sink.
    pub fn queued_bytes(&self) -> usize {
        self.progress.borrow().queued
    }

    /// Wait for the worker to stop and hand back the inner sink.
    ///
    /// Call after [`Sink::finalize`] or [`Sink::destroy`]; otherwise the
    /// queued data is discarded and the inner sink is destroyed first.
    pub async fn into_inner(mut self) -> Result<S> {
        if !self.finalized && self.destroyed.is_none() {
            // Closing the abort channel stops the worker.
            self.abort.take();
        }
        self.join().await?;
        self.inner
            .take()
            .ok_or_else(|| PipeError::terminated(&self.name, "worker did not return the sink"))
    }

    fn recorded_failure(&self) -> Option<PipeError> {
        self.progress.borrow().failure.clone()
    }

    fn stopped(&self, reason: &str) -> PipeError {
        PipeError::terminated(&self.name, reason)
    }

    async fn join(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            let inner = task
                .await
                .map_err(|e| PipeError::terminated(&self.name, format!("worker panicked: {}", e)))?;
            self.inner = Some(inner);
        }
        Ok(())
    }
}

#[async_trait]
impl<S> Sink for BufferedSink<S>
where
    S: Sink + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> Result<bool> {
        if self.finalized || self.destroyed.is_some() {
            return Err(self.stopped("write after close"));
        }
        if let Some(err) = self.recorded_failure() {
            return Err(err);
        }

        let len = chunk.len();
        let mut queued = 0;
        // Count before sending so the worker never decrements below zero.
        self.progress.send_modify(|p| {
            p.queued += len;
            queued = p.queued;
        });
        self.commands
            .send(Command::Write(chunk))
            .map_err(|_| self.stopped("worker stopped"))?;

        Ok(queued < self.high_water_mark)
    }

    async fn drained(&mut self) -> Result<()> {
        let high_water_mark = self.high_water_mark;
        let mut rx = self.progress.subscribe();
        let failure = {
            let progress = rx
                .wait_for(|p| p.failure.is_some() || p.queued < high_water_mark)
                .await
                .map_err(|_| self.stopped("worker stopped"))?;
            progress.failure.clone()
        };
        failure.map_or(Ok(()), Err)
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        if self.destroyed.is_some() {
            return Err(self.stopped("finalize after destroy"));
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Finalize(reply))
            .map_err(|_| self.stopped("worker stopped"))?;
        let result = response
            .await
            .unwrap_or_else(|_| Err(self.stopped("worker stopped before finalize")));

        self.join().await?;
        self.finalized = result.is_ok();
        result
    }

    async fn destroy(&mut self, error: &PipeError) {
        if self.finalized || self.destroyed.is_some() {
            return;
        }
        self.destroyed = Some(error.clone());
        if let Some(abort) = self.abort.take() {
            let _ = abort.send(error.clone());
        }
        if let Err(err) = self.join().await {
            warn!(sink = %self.name, error = %err, "Buffered sink worker did not stop cleanly");
            return;
        }
        // The worker may have stopped on its own after a failed finalize.
        if let Some(inner) = self.inner.as_mut() {
            inner.destroy(error).await;
        }
    }

    // A recorded worker failure does not count: the next write or drain
    // must still report it to the caller.
    fn is_terminated(&self) -> bool {
        self.finalized || self.destroyed.is_some()
    }

    fn failure(&self) -> Option<PipeError> {
        self.destroyed.clone()
    }
}

enum Step {
    Abort(Option<PipeError>),
    Command(Option<Command>),
}

async fn run_worker<S: Sink>(
    mut inner: S,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut abort: oneshot::Receiver<PipeError>,
    progress: Arc<watch::Sender<Progress>>,
) -> S {
    let mut failed = false;

    loop {
        let step = tokio::select! {
            biased;
            reason = &mut abort => Step::Abort(reason.ok()),
            command = commands.recv() => Step::Command(command),
        };

        let command = match step {
            Step::Abort(reason) => {
                abort_inner(&mut inner, reason).await;
                return inner;
            }
            Step::Command(None) => return inner,
            Step::Command(Some(command)) => command,
        };

        match command {
            Command::Write(chunk) => {
                let len = chunk.len();
                if !failed {
                    // Abort preempts a write that is still in flight.
                    let outcome = tokio::select! {
                        biased;
                        reason = &mut abort => Err(reason.ok()),
                        result = deliver(&mut inner, chunk) => Ok(result),
                    };
                    match outcome {
                        Err(reason) => {
                            abort_inner(&mut inner, reason).await;
                            return inner;
                        }
                        Ok(Err(err)) => {
                            failed = true;
                            progress.send_modify(|p| {
                                p.failure.get_or_insert(err);
                            });
                        }
                        Ok(Ok(())) => {}
                    }
                }
                progress.send_modify(|p| p.queued = p.queued.saturating_sub(len));
            }
            Command::Finalize(reply) => {
                let recorded = progress.borrow().failure.clone();
                let result = match recorded {
                    Some(err) => Err(err),
                    None => inner.finalize().await,
                };
                if let Err(err) = &result {
                    let err = err.clone();
                    progress.send_modify(|p| {
                        p.failure.get_or_insert(err);
                    });
                }
                let _ = reply.send(result);
                return inner;
            }
        }
    }
}

/// A closed abort channel means the handle was dropped without finalize.
async fn abort_inner<S: Sink>(inner: &mut S, reason: Option<PipeError>) {
    let reason =
        reason.unwrap_or_else(|| PipeError::terminated(inner.name(), "buffered sink dropped"));
    debug!(sink = inner.name(), error = %reason, "Buffered sink aborted");
    inner.destroy(&reason).await;
}

async fn deliver<S: Sink>(inner: &mut S, chunk: Bytes) -> Result<()> {
    if !inner.write(chunk).await? {
        inner.drained().await?;
    }
    Ok(())
}
