//! Shared test doubles for pipe and writer integration tests
//!
//! Every double records into a shared, cloneable tap so tests can inspect
//! state after the double has been moved into a pipe, a spawned task or a
//! `BufferedSink`. A `Journal` shared between sinks records the global order
//! of deliveries across all of them.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chunkpipe::pipe::{Sink, Source};
use chunkpipe::writer::{OperatorStore, PartHandle, PartStore};
use chunkpipe::{PipeError, Result};
use opendal::Operator;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Global order of deliveries: `(sink name, chunk)`.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(String, Bytes)>>>);

impl Journal {
    pub fn record(&self, sink: &str, chunk: &Bytes) {
        self.0.lock().unwrap().push((sink.to_string(), chunk.clone()));
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn entries(&self) -> Vec<(String, Bytes)> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Default)]
pub struct SinkState {
    pub received: Vec<Bytes>,
    pub finalized: bool,
    pub destroyed: Option<PipeError>,
}

/// Shared view of a test sink.
#[derive(Clone, Default)]
pub struct Tap(Arc<Mutex<SinkState>>);

impl Tap {
    pub fn received(&self) -> Vec<Bytes> {
        self.0.lock().unwrap().received.clone()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.received().iter().flat_map(|c| c.iter().copied()).collect()
    }

    pub fn finalized(&self) -> bool {
        self.0.lock().unwrap().finalized
    }

    pub fn destroyed(&self) -> Option<PipeError> {
        self.0.lock().unwrap().destroyed.clone()
    }
}

/// Sink behaviour knobs.
#[derive(Default)]
pub struct Behaviour {
    /// 1-based write numbers that report saturation
    pub saturate_on: Vec<usize>,
    /// 1-based write number that fails
    pub fail_on: Option<usize>,
    /// Delay before finalize completes
    pub finalize_delay: Option<Duration>,
}

/// Configurable in-memory sink.
pub struct TestSink {
    name: String,
    tap: Tap,
    journal: Option<Journal>,
    behaviour: Behaviour,
    writes: usize,
    /// Drain waits on this gate when set
    gate: Option<Arc<Semaphore>>,
    /// Notified whenever a drain wait starts
    draining: Arc<Notify>,
}

impl TestSink {
    pub fn new(name: &str) -> (Self, Tap) {
        let tap = Tap::default();
        let sink = Self {
            name: name.to_string(),
            tap: tap.clone(),
            journal: None,
            behaviour: Behaviour::default(),
            writes: 0,
            gate: None,
            draining: Arc::new(Notify::new()),
        };
        (sink, tap)
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    /// Make drains wait for a permit on `gate`.
    pub fn with_drain_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn draining(&self) -> Arc<Notify> {
        Arc::clone(&self.draining)
    }
}

#[async_trait]
impl Sink for TestSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, chunk: Bytes) -> Result<bool> {
        self.writes += 1;
        if self.behaviour.fail_on == Some(self.writes) {
            return Err(PipeError::sink_write(&self.name, "injected write failure"));
        }
        if let Some(journal) = &self.journal {
            journal.record(&self.name, &chunk);
        }
        self.tap.0.lock().unwrap().received.push(chunk);
        Ok(!self.behaviour.saturate_on.contains(&self.writes))
    }

    async fn drained(&mut self) -> Result<()> {
        self.draining.notify_one();
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| PipeError::terminated(&self.name, "gate closed"))?;
            permit.forget();
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(delay) = self.behaviour.finalize_delay {
            tokio::time::sleep(delay).await;
        }
        self.tap.0.lock().unwrap().finalized = true;
        Ok(())
    }

    async fn destroy(&mut self, error: &PipeError) {
        let mut state = self.tap.0.lock().unwrap();
        if !state.finalized && state.destroyed.is_none() {
            state.destroyed = Some(error.clone());
        }
    }

    fn is_terminated(&self) -> bool {
        let state = self.tap.0.lock().unwrap();
        state.finalized || state.destroyed.is_some()
    }

    fn failure(&self) -> Option<PipeError> {
        self.tap.destroyed()
    }
}

/// Sink whose every write blocks until a permit is released on its gate.
pub struct GatedSink {
    inner: TestSink,
    gate: Arc<Semaphore>,
}

impl GatedSink {
    pub fn new(name: &str) -> (Self, Tap, Arc<Semaphore>) {
        let (inner, tap) = TestSink::new(name);
        let gate = Arc::new(Semaphore::new(0));
        let sink = Self {
            inner,
            gate: Arc::clone(&gate),
        };
        (sink, tap, gate)
    }
}

#[async_trait]
impl Sink for GatedSink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn write(&mut self, chunk: Bytes) -> Result<bool> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| PipeError::terminated(self.inner.name(), "gate closed"))?;
        permit.forget();
        self.inner.write(chunk).await
    }

    async fn drained(&mut self) -> Result<()> {
        self.inner.drained().await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.inner.finalize().await
    }

    async fn destroy(&mut self, error: &PipeError) {
        self.inner.destroy(error).await
    }

    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    fn failure(&self) -> Option<PipeError> {
        self.inner.failure()
    }
}

#[derive(Clone, Default)]
pub struct SourceTap(Arc<Mutex<Option<PipeError>>>);

impl SourceTap {
    pub fn destroyed(&self) -> Option<PipeError> {
        self.0.lock().unwrap().clone()
    }
}

/// Source replaying a fixed script of chunks and errors.
pub struct ScriptedSource {
    items: VecDeque<Result<Bytes>>,
    tap: SourceTap,
    ended: bool,
}

impl ScriptedSource {
    pub fn new(items: Vec<Result<Bytes>>) -> (Self, SourceTap) {
        let tap = SourceTap::default();
        let source = Self {
            items: items.into(),
            tap: tap.clone(),
            ended: false,
        };
        (source, tap)
    }

    pub fn from_chunks<I, T>(chunks: I) -> (Self, SourceTap)
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Self::new(chunks.into_iter().map(|c| Ok(c.into())).collect())
    }
}

#[async_trait]
impl Source for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(err) = self.tap.destroyed() {
            return Err(PipeError::source(format!("destroyed: {}", err)));
        }
        if self.ended {
            return Ok(None);
        }
        match self.items.pop_front() {
            Some(item) => item.map(Some),
            None => {
                self.ended = true;
                Ok(None)
            }
        }
    }

    async fn destroy(&mut self, error: &PipeError) {
        self.tap.0.lock().unwrap().get_or_insert_with(|| error.clone());
    }
}

pub fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .unwrap()
        .finish()
}

pub async fn read_string(op: &Operator, key: &str) -> String {
    String::from_utf8(op.read(key).await.unwrap().to_vec()).unwrap()
}

/// Part store that refuses to open part number `fail_at` (1-based, counted
/// across every open call).
pub struct FlakyStore {
    inner: OperatorStore,
    fail_at: u32,
    opened: AtomicU32,
}

impl FlakyStore {
    pub fn new(op: Operator, fail_at: u32) -> Self {
        Self {
            inner: OperatorStore::new(op),
            fail_at,
            opened: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PartStore for FlakyStore {
    async fn open(&self, key: &str) -> Result<Box<dyn PartHandle>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at {
            return Err(PipeError::sink_init(key, "injected open failure"));
        }
        self.inner.open(key).await
    }
}

/// Deterministic chunk sizes in `1..=max` for splitting test input.
pub fn split_irregular(data: &[u8], max: usize, seed: u64) -> Vec<Bytes> {
    let mut state = seed.max(1);
    let mut chunks = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let len = ((state >> 33) as usize % max + 1).min(rest.len());
        chunks.push(Bytes::copy_from_slice(&rest[..len]));
        rest = &rest[len..];
    }
    chunks
}
