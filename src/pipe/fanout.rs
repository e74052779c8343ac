// Fan-out driver: one source, many sinks, one terminal outcome.
//
// The session is an explicit state machine driven by a single task:
//
//   Streaming -> (Draining -> Streaming)* -> Ending -> [Finalizing] -> Done
//                         any error, any state -> Failed
//
// Suspension points are source reads, sink writes, drain waits and
// finalize. No step of two states ever runs concurrently.

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use super::{Sink, Source};
use crate::error::{PipeError, Result};

/// Options for a single [`FanOutPipe::drive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Finalize every sink when the source ends. When false the sinks stay
    /// open and can be driven again by a later pipe.
    pub close_on_end: bool,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { close_on_end: true }
    }
}

/// States of a fan-out session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Streaming,
    Draining,
    Ending,
    Finalizing,
    Done,
    Failed,
}

impl PipeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipeState::Done | PipeState::Failed)
    }
}

/// Successful outcome of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipeSummary {
    /// Chunks read from the source
    pub chunks: u64,
    /// Bytes read from the source
    pub bytes: u64,
    /// Times the session paused for saturated sinks
    pub drain_waits: u64,
    /// Whether the sinks were finalized at source end
    pub finalized: bool,
}

/// Drives one source into a set of sinks.
#[derive(Debug, Clone, Default)]
pub struct FanOutPipe {
    options: PipeOptions,
}

impl FanOutPipe {
    pub fn new(options: PipeOptions) -> Self {
        Self { options }
    }

    /// Stream `source` into every sink until the source ends or anything fails.
    ///
    /// Every sink receives the same chunks in source order. On the first
    /// error all sinks and the source are destroyed and that error is
    /// returned; nothing is drained or finalized on that path. A sink that
    /// was already destroyed counts as that first error. Finalized sinks are
    /// skipped.
    pub async fn drive<S>(&self, source: &mut S, sinks: &mut [&mut dyn Sink]) -> Result<PipeSummary>
    where
        S: Source + ?Sized,
    {
        let mut session = FanOutSession::new(sinks.len(), self.options.close_on_end);

        // A sink destroyed before the session starts fails it up front.
        let failure = sinks.iter().find_map(|sink| sink.failure());
        if let Some(err) = failure {
            session.fail(source, sinks, &err).await;
            return Err(err);
        }

        while !session.state.is_terminal() {
            let step = match session.state {
                PipeState::Streaming => session.stream(source, sinks).await,
                PipeState::Draining => session.drain(sinks).await,
                PipeState::Ending => {
                    session.end();
                    Ok(())
                }
                PipeState::Finalizing => session.finalize(sinks).await,
                PipeState::Done | PipeState::Failed => Ok(()),
            };

            if let Err(err) = step {
                session.fail(source, sinks, &err).await;
                return Err(err);
            }
        }

        info!(
            sinks = sinks.len(),
            chunks = session.summary.chunks,
            bytes = session.summary.bytes,
            finalized = session.summary.finalized,
            "Fan-out complete"
        );
        Ok(session.summary)
    }
}

/// Per-invocation state. Owns flags only; the source and sinks are borrowed
/// by each step.
struct FanOutSession {
    state: PipeState,
    saturated: Vec<bool>,
    close_on_end: bool,
    summary: PipeSummary,
}

impl FanOutSession {
    fn new(sink_count: usize, close_on_end: bool) -> Self {
        Self {
            state: PipeState::Streaming,
            saturated: vec![false; sink_count],
            close_on_end,
            summary: PipeSummary::default(),
        }
    }

    fn transition(&mut self, next: PipeState) {
        debug!(from = ?self.state, to = ?next, "Fan-out state change");
        self.state = next;
    }

    async fn stream<S>(&mut self, source: &mut S, sinks: &mut [&mut dyn Sink]) -> Result<()>
    where
        S: Source + ?Sized,
    {
        let Some(chunk) = source.next_chunk().await? else {
            self.transition(PipeState::Ending);
            return Ok(());
        };

        self.summary.chunks += 1;
        self.summary.bytes += chunk.len() as u64;

        for (index, sink) in sinks.iter_mut().enumerate() {
            if sink.is_terminated() {
                continue;
            }
            if !sink.write(chunk.clone()).await? {
                debug!(sink = sink.name(), "Sink saturated");
                self.saturated[index] = true;
            }
        }

        if self.saturated.contains(&true) {
            self.summary.drain_waits += 1;
            self.transition(PipeState::Draining);
        }
        Ok(())
    }

    async fn drain(&mut self, sinks: &mut [&mut dyn Sink]) -> Result<()> {
        let waits = sinks
            .iter_mut()
            .zip(self.saturated.iter())
            .filter(|(sink, saturated)| **saturated && !sink.is_terminated())
            .map(|(sink, _)| sink.drained());
        try_join_all(waits).await?;

        self.saturated.fill(false);
        self.transition(PipeState::Streaming);
        Ok(())
    }

    fn end(&mut self) {
        if self.close_on_end {
            self.transition(PipeState::Finalizing);
        } else {
            self.transition(PipeState::Done);
        }
    }

    async fn finalize(&mut self, sinks: &mut [&mut dyn Sink]) -> Result<()> {
        let closes = sinks
            .iter_mut()
            .filter(|sink| !sink.is_terminated())
            .map(|sink| sink.finalize());
        try_join_all(closes).await?;

        self.summary.finalized = true;
        self.transition(PipeState::Done);
        Ok(())
    }

    async fn fail<S>(&mut self, source: &mut S, sinks: &mut [&mut dyn Sink], err: &PipeError)
    where
        S: Source + ?Sized,
    {
        warn!(error = %err, state = ?self.state, "Fan-out failed, destroying source and sinks");
        self.transition(PipeState::Failed);

        source.destroy(err).await;
        for sink in sinks.iter_mut() {
            sink.destroy(err).await;
        }
    }
}

/// Close every live sink: finalize when `error` is `None`, destroy otherwise.
///
/// Finalize errors do not stop the remaining sinks from closing; the first
/// one is returned.
pub async fn close_all(sinks: &mut [&mut dyn Sink], error: Option<&PipeError>) -> Result<()> {
    let mut first_error = None;
    for sink in sinks.iter_mut() {
        if sink.is_terminated() {
            continue;
        }
        match error {
            Some(err) => sink.destroy(err).await,
            None => {
                if let Err(err) = sink.finalize().await {
                    warn!(sink = sink.name(), error = %err, "Failed to finalize sink");
                    first_error.get_or_insert(err);
                }
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
