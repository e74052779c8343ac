// BufferedSink behaviour: high-water mark, drain, ordering, failure and abort

mod harness;

use bytes::Bytes;
use chunkpipe::pipe::{BufferedSink, Sink};
use chunkpipe::PipeError;
use harness::{Behaviour, GatedSink, TestSink};
use std::time::Duration;
use tokio::time::timeout;

const SHORT: Duration = Duration::from_millis(50);

#[tokio::test]
async fn reports_saturation_at_high_water_mark() {
    let (gated, tap, gate) = GatedSink::new("gated");
    let mut sink = BufferedSink::spawn(gated, 4);

    assert!(sink.write(Bytes::from_static(b"abc")).await.unwrap());
    assert!(!sink.write(Bytes::from_static(b"def")).await.unwrap());
    assert_eq!(sink.queued_bytes(), 6);

    // Nothing written yet, so the drain cannot complete.
    assert!(timeout(SHORT, sink.drained()).await.is_err());

    gate.add_permits(1);
    timeout(Duration::from_secs(5), sink.drained())
        .await
        .unwrap()
        .unwrap();
    assert!(sink.queued_bytes() < 4);

    gate.add_permits(1);
    sink.finalize().await.unwrap();
    assert_eq!(
        tap.received(),
        vec![Bytes::from_static(b"abc"), Bytes::from_static(b"def")]
    );
    assert!(tap.finalized());
}

#[tokio::test]
async fn finalize_flushes_queue_in_order() {
    let (inner, tap) = TestSink::new("ordered");
    let mut sink = BufferedSink::spawn(inner, 1024);

    let chunks: Vec<Bytes> = (0..100).map(|i| Bytes::from(format!("{}\n", i))).collect();
    for chunk in &chunks {
        sink.write(chunk.clone()).await.unwrap();
    }
    sink.finalize().await.unwrap();

    assert!(sink.is_terminated());
    assert_eq!(tap.received(), chunks);
    assert!(tap.finalized());

    let inner = sink.into_inner().await.unwrap();
    assert!(inner.is_terminated());
}

#[tokio::test]
async fn inner_failure_surfaces_on_later_calls() {
    let (inner, tap) = TestSink::new("flaky");
    let inner = inner.with_behaviour(Behaviour {
        fail_on: Some(1),
        ..Behaviour::default()
    });
    let mut sink = BufferedSink::spawn(inner, 1);

    // Accepted into the queue; the failure happens on the worker.
    assert!(!sink.write(Bytes::from_static(b"x")).await.unwrap());
    let err = sink.drained().await.unwrap_err();
    assert_eq!(err, PipeError::sink_write("flaky", "injected write failure"));

    assert_eq!(sink.write(Bytes::from_static(b"y")).await.unwrap_err(), err);
    assert!(!sink.is_terminated());

    assert_eq!(sink.finalize().await.unwrap_err(), err);
    assert!(!tap.finalized());
    assert!(tap.received().is_empty());
}

#[tokio::test]
async fn destroy_preempts_queued_writes() {
    let (gated, tap, gate) = GatedSink::new("gated");
    let mut sink = BufferedSink::spawn(gated, 1024);

    for i in 0..10 {
        sink.write(Bytes::from(format!("{}\n", i))).await.unwrap();
    }
    gate.add_permits(2);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let reason = PipeError::source("cancelled");
    sink.destroy(&reason).await;
    assert!(sink.is_terminated());

    assert!(tap.received().len() < 10);
    assert_eq!(tap.destroyed(), Some(reason));

    let err = sink.write(Bytes::from_static(b"late")).await.unwrap_err();
    assert_eq!(err.code(), "E105");

    // Destroy is idempotent.
    sink.destroy(&PipeError::source("again")).await;
    assert_eq!(tap.destroyed(), Some(PipeError::source("cancelled")));
    assert_eq!(sink.failure(), Some(PipeError::source("cancelled")));
}

#[tokio::test]
async fn destroy_after_finalize_is_a_no_op() {
    let (inner, tap) = TestSink::new("done");
    let mut sink = BufferedSink::spawn(inner, 16);
    sink.write(Bytes::from_static(b"a\n")).await.unwrap();
    sink.finalize().await.unwrap();

    sink.destroy(&PipeError::source("late abort")).await;
    assert!(tap.finalized());
    assert!(tap.destroyed().is_none());
    assert!(sink.failure().is_none());
}

#[tokio::test]
async fn into_inner_without_finalize_destroys_the_inner_sink() {
    let (inner, tap) = TestSink::new("abandoned");
    let mut sink = BufferedSink::spawn(inner, 16);
    sink.write(Bytes::from_static(b"a\n")).await.unwrap();

    let inner = sink.into_inner().await.unwrap();
    assert!(inner.is_terminated());
    assert_eq!(tap.destroyed().unwrap().code(), "E105");
    assert!(!tap.finalized());
}
