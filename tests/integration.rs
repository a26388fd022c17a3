//! Integration tests for sessions, composition, the hub and the adapters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use streamfeed::prelude::*;
use streamfeed::{adapters, stream};
use tokio::io::AsyncReadExt;

/// A finite source that counts how many elements it has produced
struct CountingSource {
    remaining: u32,
    produced: Arc<AtomicUsize>,
}

#[async_trait]
impl Source for CountingSource {
    type Item = u32;

    fn has_next(&self) -> bool {
        self.remaining > 0
    }

    async fn next(&mut self) -> Result<Option<u32>> {
        self.remaining -= 1;
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.remaining + 1))
    }
}

/// A deliberately slow sink that checks the source never runs ahead of it
struct SlowSink {
    produced: Arc<AtomicUsize>,
    seen: usize,
}

#[async_trait]
impl Sink for SlowSink {
    type Item = u32;
    type Output = usize;

    async fn on_elem(&mut self, _item: u32) -> Step<usize> {
        self.seen += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        // the next element may only be produced after this sink replies
        assert_eq!(self.produced.load(Ordering::SeqCst), self.seen);
        Step::Cont
    }

    async fn on_eof(&mut self) -> usize {
        self.seen
    }
}

#[tokio::test]
async fn at_most_one_element_in_flight() {
    let runtime = Runtime::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        remaining: 10,
        produced: produced.clone(),
    };
    let sink = SlowSink {
        produced: produced.clone(),
        seen: 0,
    };

    let seen = source.run_into(sink, &runtime).wait().await;
    assert_eq!(seen, 10);
    assert_eq!(produced.load(Ordering::SeqCst), 10);
    runtime.shutdown().await;
}

#[tokio::test]
async fn finite_source_terminates_after_all_elements() {
    let runtime = Runtime::new();
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink_items = delivered.clone();

    let done = IterSource::new(vec![1, 2, 3, 4, 5]).run_into(
        ForEach::new(move |n: i32| sink_items.lock().unwrap().push(n)),
        &runtime,
    );

    done.wait().await;
    assert_eq!(*delivered.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    runtime.shutdown().await;
}

#[test]
fn exhaustion_is_stable() {
    let source = IterSource::new(Vec::<i32>::new());
    assert!(!source.has_next());
    assert!(!source.has_next());

    let push: PushSource<i32> = PushSource::new();
    push.stop();
    push.stop();
    assert!(!push.has_next());
}

#[tokio::test]
async fn head_takes_exactly_one_element() {
    let runtime = Runtime::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        remaining: 3,
        produced: produced.clone(),
    };

    // the counting source yields 3, 2, 1
    let first = source.run_into(Head::new(), &runtime).wait().await;
    assert_eq!(first, Some(3));
    // give any stray production a chance to show up before asserting
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(produced.load(Ordering::SeqCst), 1);
    runtime.shutdown().await;
}

#[tokio::test]
async fn head_of_empty_source_is_none() {
    let runtime = Runtime::new();
    let first: Option<i32> = IterSource::new(Vec::new())
        .run_into(Head::new(), &runtime)
        .wait()
        .await;
    assert_eq!(first, None);
    runtime.shutdown().await;
}

#[tokio::test]
async fn interleave_completes_after_all_inner_sources() {
    let runtime = Runtime::new();
    let sources: Vec<Box<dyn Source<Item = i32>>> = vec![
        Box::new(IterSource::new(vec![1, 2])),
        Box::new(IterSource::new(vec![10, 20, 30])),
    ];

    let mut collected = interleave(sources)
        .run_into(Collect::new(), &runtime)
        .wait()
        .await;
    collected.sort();
    assert_eq!(collected, vec![1, 2, 10, 20, 30]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn hub_delivers_to_every_subscriber() {
    let runtime = Runtime::new();
    let feed: PushSource<i32> = PushSource::new();
    let hub = Hub::started(feed.clone(), &runtime);

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let first_items = first.clone();
    let second_items = second.clone();

    let first_done = hub
        .add(ForEach::new(move |n: i32| {
            first_items.lock().unwrap().push(n)
        }))
        .await;
    let second_done = hub
        .add(ForEach::new(move |n: i32| {
            second_items.lock().unwrap().push(n)
        }))
        .await;

    feed.push(1);
    feed.push(2);
    feed.push(3);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*first.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(*second.lock().unwrap(), vec![1, 2, 3]);

    feed.stop();
    first_done.wait().await;
    second_done.wait().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn hub_subscriber_leaving_does_not_stop_the_rest() {
    let runtime = Runtime::new();
    let feed: PushSource<i32> = PushSource::new();
    let hub = Hub::started(feed.clone(), &runtime);

    let stayed = Arc::new(Mutex::new(Vec::new()));
    let stayed_items = stayed.clone();
    let stayed_done = hub
        .add(ForEach::new(move |n: i32| {
            stayed_items.lock().unwrap().push(n)
        }))
        .await;
    // head finishes after one element, detaching itself
    let left_done = hub.add(Head::new()).await;

    feed.push(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(left_done.try_get(), Some(Some(1)));

    feed.push(2);
    feed.push(3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*stayed.lock().unwrap(), vec![1, 2, 3]);

    feed.stop();
    stayed_done.wait().await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn push_then_stop_delivers_queued_elements_before_eof() {
    let runtime = Runtime::new();
    let feed: PushSource<i32> = PushSource::new();

    let done = feed.clone().run_into(Collect::new(), &runtime);
    feed.push(1);
    feed.push(2);
    feed.stop();
    // a second stop is a no-op
    feed.stop();

    assert_eq!(done.wait().await, vec![1, 2]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn push_before_drive_is_delivered() {
    let runtime = Runtime::new();
    let feed: PushSource<&'static str> = PushSource::new();
    feed.push("a");
    feed.push("b");
    feed.stop();

    let collected = feed.clone().run_into(Collect::new(), &runtime).wait().await;
    assert_eq!(collected, vec!["a", "b"]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn push_after_stop_is_dropped() {
    let runtime = Runtime::new();
    let feed: PushSource<i32> = PushSource::new();
    let done = feed.clone().run_into(Collect::new(), &runtime);

    feed.push(1);
    feed.stop();
    feed.push(2);

    assert_eq!(done.wait().await, vec![1]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn filtered_elements_do_not_stall_the_session() {
    let runtime = Runtime::new();
    let evens = IterSource::new(1..=10).through(Pipe::filter(|n: &i32| n % 2 == 0));
    let collected = evens.run_into(Collect::new(), &runtime).wait().await;
    assert_eq!(collected, vec![2, 4, 6, 8, 10]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn chained_transforms_short_circuit_on_filtered_elements() {
    let runtime = Runtime::new();
    let later_stage_saw = Arc::new(AtomicUsize::new(0));
    let counter = later_stage_saw.clone();

    let pipeline = IterSource::new(1..=6)
        .through(Pipe::collect(|n: i32| {
            if n % 2 == 0 {
                Some(n)
            } else {
                None
            }
        }))
        .through(Pipe::map(move |n: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(n % 2, 0, "a filtered element reached a later stage");
            n * 10
        }));

    let collected = pipeline.run_into(Collect::new(), &runtime).wait().await;
    assert_eq!(collected, vec![20, 40, 60]);
    assert_eq!(later_stage_saw.load(Ordering::SeqCst), 3);
    runtime.shutdown().await;
}

#[tokio::test]
async fn chained_sources_preserve_order() {
    let runtime = Runtime::new();
    let chained = IterSource::new(vec![1, 2]).and_then(IterSource::new(vec![3, 4]));
    let collected = chained.run_into(Collect::new(), &runtime).wait().await;
    assert_eq!(collected, vec![1, 2, 3, 4]);
    runtime.shutdown().await;
}

/// A source that fails partway through
struct FailingSource {
    yielded: u32,
}

#[async_trait]
impl Source for FailingSource {
    type Item = u32;

    fn has_next(&self) -> bool {
        true
    }

    async fn next(&mut self) -> Result<Option<u32>> {
        self.yielded += 1;
        if self.yielded > 2 {
            Err(Error::custom("backing store went away"))
        } else {
            Ok(Some(self.yielded))
        }
    }
}

#[tokio::test]
async fn source_failure_tears_down_the_session() {
    let runtime = Runtime::new();
    let done = FailingSource { yielded: 0 }.run_into(Collect::new(), &runtime);

    // the error path resolves no partial result
    let waited = done.wait_timeout(Duration::from_millis(100)).await;
    assert!(matches!(waited, Err(Error::Timeout { .. })));
    assert!(!done.is_resolved());
    runtime.shutdown().await;
}

#[tokio::test]
async fn source_failure_propagates_through_a_transform_hop() {
    let runtime = Runtime::new();
    let done = FailingSource { yielded: 0 }
        .through(Pipe::map(|n| n * 2))
        .run_into(Collect::new(), &runtime);

    let waited = done.wait_timeout(Duration::from_millis(100)).await;
    assert!(matches!(waited, Err(Error::Timeout { .. })));
    runtime.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn timed_source_pushes_on_schedule() {
    let runtime = Runtime::new();
    let ticks = TimedSource::new(Duration::from_secs(1), || Some("tick"));

    let first = ticks.clone().run_into(Head::new(), &runtime).wait().await;
    assert_eq!(first, Some("tick"));

    ticks.stop();
    // cancelling twice is a no-op
    ticks.stop();
    runtime.shutdown().await;
}

#[tokio::test]
async fn hub_adopts_a_timed_source() {
    let runtime = Runtime::new();
    let ticks = TimedSource::new(Duration::from_millis(10), || Some(1u64));
    let hub = Hub::new(ticks.clone(), &runtime);
    hub.broadcast();
    // starting twice is a no-op
    hub.broadcast();

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_counter = seen.clone();
    let _done = hub
        .add(ForEach::new(move |_n: u64| {
            seen_counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen.load(Ordering::SeqCst) >= 2);

    ticks.stop();
    hub.stop();
    hub.stop();
    runtime.shutdown().await;
}

#[tokio::test]
async fn chunked_file_source_reads_fixed_size_chunks() {
    let runtime = Runtime::new();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, &vec![7u8; 5000]).unwrap();
    std::io::Write::flush(&mut file).unwrap();

    let source = ChunkedReadSource::from_file(file.path()).await.unwrap();
    let chunks = source.run_into(Collect::new(), &runtime).wait().await;

    let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![2048, 2048, 904]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn line_source_yields_lines() {
    let runtime = Runtime::new();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"alpha\nbeta\ngamma\n").unwrap();
    std::io::Write::flush(&mut file).unwrap();

    let source = LineSource::from_file(file.path()).await.unwrap();
    let lines = source.run_into(Collect::new(), &runtime).wait().await;
    assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn stream_source_round_trips() {
    let runtime = Runtime::new();
    let source = StreamSource::new(tokio_stream::iter(vec![1, 2, 3]));
    let collected = source.run_into(Collect::new(), &runtime).wait().await;
    assert_eq!(collected, vec![1, 2, 3]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn into_stream_drains_a_source() {
    use tokio_stream::StreamExt;

    let runtime = Runtime::new();
    let mut stream = stream::into_stream(IterSource::new(1..=3), 4, &runtime);
    let mut collected = Vec::new();
    while let Some(n) = stream.next().await {
        collected.push(n);
    }
    assert_eq!(collected, vec![1, 2, 3]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn event_source_frames_elements() {
    let runtime = Runtime::new();
    let (writer, mut reader) = tokio::io::duplex(1024);

    let done = adapters::event_source_display(IterSource::new(vec!["x", "y"]), writer, &runtime);
    done.wait().await;

    let mut out = String::new();
    reader.read_to_string(&mut out).await.unwrap();
    assert_eq!(out, "data: x\n\ndata: y\n\n");
    runtime.shutdown().await;
}

#[test]
fn event_text_special_cases_structured_payloads() {
    let structured = serde_json::json!({"kind": "status", "level": 3});
    assert_eq!(
        adapters::event_text(&structured),
        r#"{"kind":"status","level":3}"#
    );
    let plain = serde_json::json!("all good");
    assert_eq!(adapters::event_text(&plain), "all good");
}

#[tokio::test]
async fn comet_forwards_built_messages() {
    let runtime = Runtime::new();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sent_log = sent.clone();

    let done = adapters::comet(
        IterSource::new(vec![1, 2]),
        |n: i32| format!("msg {}", n),
        move |line| sent_log.lock().unwrap().push(line),
        &runtime,
    );
    done.wait().await;

    assert_eq!(*sent.lock().unwrap(), vec!["msg 1", "msg 2"]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn duplex_wires_both_directions() {
    let runtime = Runtime::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_log = received.clone();
    let written = Arc::new(Mutex::new(Vec::new()));
    let written_log = written.clone();

    let connection = adapters::duplex(
        Pipe::map(|raw: String| raw.to_uppercase()),
        ForEach::new(move |decoded: String| received_log.lock().unwrap().push(decoded)),
        IterSource::new(vec!["out1", "out2"]),
        move |out| written_log.lock().unwrap().push(out),
        &runtime,
    );

    connection.message("ping".to_string());
    connection.message("pong".to_string());
    connection.close();
    connection.close();

    connection.inbound_done().wait().await;
    connection.outbound_done().wait().await;

    assert_eq!(*received.lock().unwrap(), vec!["PING", "PONG"]);
    assert_eq!(*written.lock().unwrap(), vec!["out1", "out2"]);
    runtime.shutdown().await;
}

#[tokio::test]
async fn runtime_shutdown_reaps_live_sessions() {
    let runtime = Runtime::new();
    let _endless = CounterSource::new().run_into(Ignore::new(), &runtime);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(runtime.live_tasks() > 0);
    runtime.shutdown().await;
    assert_eq!(runtime.live_tasks(), 0);
}
