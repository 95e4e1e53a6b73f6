use agent_relay_channels::{
    status_reporter, Channel, DurableChannel, InProcessChannel, MessageHandler, Router,
    CHANNEL_NOT_FOUND,
};
use agent_relay_core::bus::{DeliveryResult, Message, MessageType, Priority};
use agent_relay_core::cache::CacheManager;
use agent_relay_core::config::MaintenanceConfig;
use agent_relay_core::maintenance::MaintenanceService;
use agent_relay_core::resilience::{
    execute_with_retry, CircuitBreaker, CircuitBreakerSettings, CircuitState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Channel whose first `failures` sends report an error
struct FlakyChannel {
    id: String,
    failures: usize,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<Message>>,
}

impl FlakyChannel {
    fn new(id: &str, failures: usize) -> Self {
        Self {
            id: id.to_string(),
            failures,
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Channel for FlakyChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, message: &Message) -> DeliveryResult {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return DeliveryResult::failed(&message.id, "transport unavailable", Duration::ZERO);
        }
        self.delivered.lock().push(message.clone());
        DeliveryResult::delivered(&message.id, Duration::ZERO)
    }

    async fn receive_messages(&self, _recipient: &str) -> Vec<Message> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

/// Handler recording every task update it sees
struct TaskRecorder {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for TaskRecorder {
    fn can_handle(&self, message: &Message) -> bool {
        message.message_type == MessageType::TaskUpdate
    }

    async fn handle(&self, message: &Message) -> anyhow::Result<DeliveryResult> {
        self.seen.lock().push(message.id.clone());
        Ok(DeliveryResult::delivered(&message.id, Duration::ZERO))
    }
}

fn task(recipient: &str, priority: Priority, content: &str) -> Message {
    Message::new("planner", recipient, MessageType::TaskUpdate, json!(content))
        .with_priority(priority)
}

#[tokio::test]
async fn test_broadcast_reports_missing_channel() {
    let router = Router::new();
    router
        .register_channel(Arc::new(InProcessChannel::new("chanA", 10)))
        .await;

    let message = task("worker-1", Priority::Normal, "sync");
    let results = router
        .broadcast(&message, Some(&["chanA", "chanB"][..]))
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].error.as_deref(), Some(CHANNEL_NOT_FOUND));

    let expected_id = format!("{}_broadcast", message.id);
    assert!(results.iter().all(|r| r.message_id == expected_id));

    let status = router.status().await;
    assert_eq!(status.statistics.totals.sent, 1);
    assert_eq!(status.statistics.totals.errors, 1);
}

#[tokio::test]
async fn test_full_queue_keeps_highest_priority() {
    let router = Router::new();
    router
        .register_channel(Arc::new(InProcessChannel::new("local", 2)))
        .await;

    for (priority, content) in [
        (Priority::Low, "low-1"),
        (Priority::Low, "low-2"),
        (Priority::High, "high"),
    ] {
        let result = router.send(&task("worker-1", priority, content), "local").await;
        assert!(result.success);
    }

    let received = router.receive("worker-1", None).await;
    let contents: Vec<_> = received.iter().map(|m| m.payload.clone()).collect();
    assert_eq!(contents, vec![json!("high"), json!("low-2")]);
}

#[tokio::test]
async fn test_durable_mailbox_round_trip() {
    let temp = TempDir::new().unwrap();
    let durable = Arc::new(DurableChannel::new("disk", temp.path()));
    let recorder = Arc::new(TaskRecorder {
        seen: Mutex::new(Vec::new()),
    });

    let router = Router::new();
    router.register_channel(durable.clone()).await;
    router.register_handler("recorder", recorder.clone()).await;

    let message = task("worker-1", Priority::Critical, "build")
        .with_metadata("attempt", json!(1))
        .with_channel_tag("durable");
    assert!(router.send(&message, "disk").await.success);

    // Unacknowledged messages are delivered again
    let first = router.receive("worker-1", Some(&["disk"][..])).await;
    let second = router.receive("worker-1", Some(&["disk"][..])).await;
    assert_eq!(first, vec![message.clone()]);
    assert_eq!(second, first);
    assert_eq!(recorder.seen.lock().len(), 2);

    assert!(durable.acknowledge(&first[0]).await.unwrap());
    assert!(router.receive("worker-1", None).await.is_empty());
}

#[tokio::test]
async fn test_retry_recovers_flaky_delivery() {
    let flaky = Arc::new(FlakyChannel::new("flaky", 2));
    let router = Router::new();
    router.register_channel(flaky.clone()).await;

    let message = task("worker-1", Priority::Normal, "retry me");
    let result = execute_with_retry(
        || async {
            let result = router.send(&message, "flaky").await;
            if result.success {
                Ok(result)
            } else {
                Err(result.error.unwrap_or_default())
            }
        },
        3,
        Duration::from_millis(10),
    )
    .await
    .unwrap();

    assert!(result.success);
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(router.statistics().totals.errors, 2);
    assert_eq!(router.receive("worker-1", None).await.len(), 1);
}

#[tokio::test]
async fn test_breaker_opens_on_failing_channel() {
    let router = Router::new();
    router
        .register_channel(Arc::new(FlakyChannel::new("down", usize::MAX)))
        .await;

    let breaker = CircuitBreaker::new(
        "down",
        CircuitBreakerSettings {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        },
    );
    let message = task("worker-1", Priority::Normal, "x");

    for _ in 0..2 {
        let outcome = breaker
            .call(|| async {
                let result = router.send(&message, "down").await;
                if result.success {
                    Ok(result)
                } else {
                    Err(result.error.unwrap_or_default())
                }
            })
            .await;
        assert!(!outcome.unwrap_err().is_open());
    }

    assert_eq!(breaker.state(), CircuitState::Open);
    let outcome = breaker
        .call(|| async { Ok::<_, String>(router.send(&message, "down").await) })
        .await;
    assert!(outcome.unwrap_err().is_open());
    assert_eq!(router.statistics().totals.errors, 2);
}

#[tokio::test]
async fn test_maintenance_reports_router_and_sweeps_cache() {
    let router = Arc::new(Router::new());
    router
        .register_channel(Arc::new(InProcessChannel::new("local", 10)))
        .await;

    let cache: Arc<CacheManager<String>> = Arc::new(CacheManager::with_capacity(10));
    cache.set("stale", "v".to_string(), Some(Duration::from_millis(10)));
    cache.set("fresh", "v".to_string(), None);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let service = MaintenanceService::new(MaintenanceConfig {
        enabled: true,
        interval_s: 3600,
    })
    .with_target(cache.clone())
    .with_on_tick(status_reporter(Arc::clone(&router)));

    assert_eq!(service.run_once().await, 1);
    assert!(cache.contains_key("fresh"));
    assert!(!cache.contains_key("stale"));
}

#[test]
fn test_in_process_round_trip_blocking() {
    let channel = InProcessChannel::new("local", 4);
    let message = task("worker-1", Priority::Low, "sync");

    let received = tokio_test::block_on(async {
        assert!(channel.send_message(&message).await.success);
        channel.receive_messages("worker-1").await
    });
    assert_eq!(received, vec![message]);
}
