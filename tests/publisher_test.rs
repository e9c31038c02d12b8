//! Publisher-core semantics against an in-process mock transport:
//! batching triggers, ordering under failure, retry, filtering and
//! close behavior.

use async_trait::async_trait;
use chrono::Utc;
use md_bus::encode::{RecordType, SilverEncoder, SilverEvent, SinkEvent};
use md_bus::model::{
    BookChange, BookLevel, NormalizedMessage, Origin, PublishMeta, Trade, TradeSide,
};
use md_bus::publish::{BatchTransport, EncodeFn, FilterFn, Publisher};
use md_bus::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    /// Number of upcoming send_batch calls that should fail.
    fail_next: AtomicU32,
    /// Every send_batch call, successful or not, as event labels.
    attempts: Mutex<Vec<Vec<String>>>,
    /// Flattened labels of successfully sent events, in send order.
    delivered: Mutex<Vec<String>>,
}

impl MockState {
    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    fn attempts(&self) -> Vec<Vec<String>> {
        self.attempts.lock().unwrap().clone()
    }
}

struct MockTransport<E> {
    state: Arc<MockState>,
    label: fn(&E) -> String,
}

#[async_trait]
impl<E: Send + Sync + 'static> BatchTransport<E> for MockTransport<E> {
    async fn send_batch(&self, batch: &[E]) -> Result<()> {
        let labels: Vec<String> = batch.iter().map(self.label).collect();
        self.state.attempts.lock().unwrap().push(labels.clone());

        let remaining = self.state.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Transport("mock send failure".to_string()));
        }
        self.state.delivered.lock().unwrap().extend(labels);
        Ok(())
    }
}

fn trade(price: &str) -> NormalizedMessage {
    NormalizedMessage::Trade(Trade {
        exchange: "binance".to_string(),
        symbol: "btcusdt".to_string(),
        id: None,
        price: price.to_string(),
        amount: "1".to_string(),
        side: TradeSide::Buy,
        timestamp: Utc::now(),
        local_timestamp: Utc::now(),
    })
}

fn meta() -> PublishMeta {
    PublishMeta::new("md-bus/test", Origin::Replay)
}

/// Encodes each message to a single label: the trade price, or the
/// message kind for everything else.
fn label_encode() -> EncodeFn<String> {
    Box::new(|message, _meta| match message {
        NormalizedMessage::Trade(t) => Ok(vec![t.price.clone()]),
        other => Ok(vec![other.kind().to_string()]),
    })
}

fn spawn_string_publisher(
    state: Arc<MockState>,
    max_batch_size: usize,
    max_batch_delay: Duration,
) -> Publisher {
    Publisher::spawn(
        MockTransport::<String> {
            state,
            label: |s| s.clone(),
        },
        label_encode(),
        None,
        max_batch_size,
        max_batch_delay,
    )
}

/// Polls until the condition holds. Each poll sleeps 1ms of paused
/// time so the worker's own timers and backoffs can elapse.
async fn settle(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition did not settle");
}

// Multi-thread flavor: the worker task must be spawnable across
// threads, which holds only while every strategy the worker owns is
// `Send + Sync`. No paused clock here; flush drives delivery.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_runs_on_multi_thread_runtime() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 100, Duration::from_secs(3600));

    publisher.publish(trade("1"), meta());
    publisher.publish(trade("2"), meta());
    publisher.flush().await.unwrap();

    assert_eq!(state.delivered(), vec!["1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn batch_size_triggers_immediate_flush() {
    let state = Arc::new(MockState::default());
    // Delay is far away; only the size threshold can trigger delivery.
    let publisher = spawn_string_publisher(state.clone(), 3, Duration::from_secs(3600));

    for n in 1..=3 {
        publisher.publish(trade(&n.to_string()), meta());
    }

    settle(|| state.delivered().len() == 3).await;
    assert_eq!(state.delivered(), vec!["1", "2", "3"]);
    assert_eq!(state.attempts().len(), 1, "one batch, sent once");
}

#[tokio::test(start_paused = true)]
async fn delay_timer_flushes_partial_batch() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 100, Duration::from_millis(25));

    publisher.publish(trade("1"), meta());
    tokio::time::sleep(Duration::from_millis(50)).await;

    settle(|| !state.delivered().is_empty()).await;
    assert_eq!(state.delivered(), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_retries_same_batch() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 10, Duration::from_secs(3600));
    state.fail_next.store(1, Ordering::SeqCst);

    publisher.publish(trade("1"), meta());
    publisher.publish(trade("2"), meta());
    publisher.flush().await.unwrap();

    // Two attempts, one delivery, no duplicates.
    assert_eq!(state.attempts().len(), 2);
    assert_eq!(state.delivered(), vec!["1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn flush_surfaces_exhausted_retries() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 10, Duration::from_secs(3600));
    state.fail_next.store(3, Ordering::SeqCst);

    publisher.publish(trade("1"), meta());
    let result = publisher.flush().await;

    // The flush itself reports the failure after the retry budget is
    // spent; the event stays buffered and a retry flush is scheduled.
    assert!(result.is_err());
    assert!(state.attempts().len() >= 3, "retry budget is three attempts");

    // The scheduled retry then delivers: three failures plus one success.
    settle(|| state.delivered() == vec!["1".to_string()]).await;
    assert_eq!(state.attempts().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_is_never_overtaken() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 2, Duration::from_secs(3600));

    // Every pipeline run fails until the transport recovers.
    state.fail_next.store(u32::MAX, Ordering::SeqCst);
    for n in 1..=6 {
        publisher.publish(trade(&n.to_string()), meta());
    }
    settle(|| state.attempts().len() >= 3).await;

    // The head batch is [1, 2]; no attempt may contain later events
    // while it keeps failing.
    for attempt in state.attempts() {
        assert_eq!(attempt, vec!["1", "2"], "later batches must not overtake");
    }
    assert!(state.delivered().is_empty());

    // Recovery: everything drains in original order, re-batched from
    // the restored buffer front.
    state.fail_next.store(0, Ordering::SeqCst);
    publisher.flush().await.unwrap();
    assert_eq!(state.delivered(), vec!["1", "2", "3", "4", "5", "6"]);
}

#[tokio::test(start_paused = true)]
async fn close_drains_then_is_idempotent() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 100, Duration::from_secs(3600));

    publisher.publish(trade("1"), meta());
    publisher.publish(trade("2"), meta());

    publisher.close().await.unwrap();
    assert_eq!(state.delivered(), vec!["1", "2"]);

    // Second close: same observable effect, no error, no duplicates.
    publisher.close().await.unwrap();
    assert_eq!(state.delivered(), vec!["1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn close_reports_undeliverable_buffer() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 100, Duration::from_secs(3600));
    state.fail_next.store(u32::MAX, Ordering::SeqCst);

    publisher.publish(trade("1"), meta());

    // The sinks run transport teardown off this error; it must surface
    // rather than hang or panic.
    assert!(publisher.close().await.is_err());
    assert_eq!(state.attempts().len(), 3);
    assert!(state.delivered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn publish_after_close_is_a_no_op() {
    let state = Arc::new(MockState::default());
    let publisher = spawn_string_publisher(state.clone(), 100, Duration::from_secs(3600));

    publisher.close().await.unwrap();
    publisher.publish(trade("1"), meta());
    publisher.flush().await.unwrap();

    assert!(state.delivered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn record_type_allow_list_filters_events() {
    let state = Arc::new(MockState::default());
    let encoder = SilverEncoder::new(None, BTreeMap::new());
    let encode: EncodeFn<SilverEvent> = Box::new(move |m, pm| encoder.encode(m, pm));
    let filter: FilterFn<SilverEvent> =
        Box::new(|event| event.record_type == RecordType::Trade);

    let publisher = Publisher::spawn(
        MockTransport::<SilverEvent> {
            state: state.clone(),
            label: |e| e.kind().to_string(),
        },
        encode,
        Some(filter),
        100,
        Duration::from_secs(3600),
    );

    publisher.publish(trade("50000"), meta());
    publisher.publish(
        NormalizedMessage::BookChange(BookChange {
            exchange: "binance".to_string(),
            symbol: "btcusdt".to_string(),
            bids: vec![BookLevel {
                price: "1".to_string(),
                amount: "1".to_string(),
            }],
            asks: vec![],
            sequence: None,
            timestamp: Utc::now(),
            local_timestamp: Utc::now(),
        }),
        meta(),
    );
    publisher.flush().await.unwrap();

    assert_eq!(state.delivered(), vec!["trade"]);
}

#[tokio::test(start_paused = true)]
async fn undecodable_message_is_dropped_not_fatal() {
    let state = Arc::new(MockState::default());
    let encode: EncodeFn<String> = Box::new(|message, _| match message {
        NormalizedMessage::Trade(t) if t.price == "bad" => {
            Err(Error::Encoding("bad decimal".to_string()))
        }
        NormalizedMessage::Trade(t) => Ok(vec![t.price.clone()]),
        other => Ok(vec![other.kind().to_string()]),
    });

    let publisher = Publisher::spawn(
        MockTransport::<String> {
            state: state.clone(),
            label: |s| s.clone(),
        },
        encode,
        None,
        100,
        Duration::from_secs(3600),
    );

    publisher.publish(trade("bad"), meta());
    publisher.publish(trade("1"), meta());
    publisher.flush().await.unwrap();

    assert_eq!(state.delivered(), vec!["1"]);
}
