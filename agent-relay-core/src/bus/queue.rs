//! Bounded priority queue used by in-process channels

use super::message::{Message, Priority};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const TIER_COUNT: usize = Priority::ALL.len();

/// A queued message plus its insertion order
#[derive(Debug, Clone)]
struct QueueSlot {
    seq: u64,
    message: Message,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// One FIFO per priority, indexed by `Priority::index`
    tiers: [VecDeque<QueueSlot>; TIER_COUNT],
    len: usize,
    next_seq: u64,
    evicted: u64,
}

impl QueueInner {
    fn highest_tier(&self) -> Option<usize> {
        (0..TIER_COUNT).rev().find(|&i| !self.tiers[i].is_empty())
    }

    fn lowest_tier(&self) -> Option<usize> {
        (0..TIER_COUNT).find(|&i| !self.tiers[i].is_empty())
    }
}

/// Bounded buffer ordering messages by priority, then insertion order
///
/// When full, the oldest message of the lowest occupied tier makes room, so
/// a message is never evicted while one of strictly lower priority is still
/// queued and an enqueue never fails.
#[derive(Debug)]
pub struct PriorityQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
}

impl PriorityQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Add a message, evicting to stay within capacity
    ///
    /// Always stores the message and returns `true`. At capacity the oldest
    /// message of the lowest occupied tier is dropped first, which may be
    /// the incoming tier itself or a tier above it when nothing lower is queued.
    pub fn enqueue(&self, message: Message) -> bool {
        let mut inner = self.inner.lock();

        if inner.len >= self.capacity {
            if let Some(tier) = inner.lowest_tier() {
                if let Some(dropped) = inner.tiers[tier].pop_front() {
                    inner.len -= 1;
                    inner.evicted += 1;
                    if dropped.message.priority > message.priority {
                        warn!(
                            "Queue at capacity {}, evicted {} message {} for lower-priority {}",
                            self.capacity, dropped.message.priority, dropped.message.id, message.id
                        );
                    } else {
                        debug!(
                            "Queue at capacity {}, evicted {} message {} (seq {})",
                            self.capacity,
                            dropped.message.priority,
                            dropped.message.id,
                            dropped.seq
                        );
                    }
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.len += 1;
        inner.tiers[message.priority.index()].push_back(QueueSlot { seq, message });
        true
    }

    /// Remove and return the highest-priority, oldest message
    pub fn dequeue(&self) -> Option<Message> {
        let mut inner = self.inner.lock();
        let tier = inner.highest_tier()?;
        let slot = inner.tiers[tier].pop_front()?;
        inner.len -= 1;
        Some(slot.message)
    }

    /// Return a copy of the message `dequeue` would return
    pub fn peek(&self) -> Option<Message> {
        let inner = self.inner.lock();
        let tier = inner.highest_tier()?;
        inner.tiers[tier].front().map(|slot| slot.message.clone())
    }

    /// Remove every message matching `pred`
    ///
    /// Matches come back in dequeue order; the rest keep their relative order.
    pub fn drain_matching<F>(&self, mut pred: F) -> Vec<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut inner = self.inner.lock();
        let mut drained = Vec::new();

        for tier in (0..TIER_COUNT).rev() {
            let slots = std::mem::take(&mut inner.tiers[tier]);
            let mut kept = VecDeque::with_capacity(slots.len());
            for slot in slots {
                if pred(&slot.message) {
                    drained.push(slot.message);
                } else {
                    kept.push_back(slot);
                }
            }
            inner.tiers[tier] = kept;
        }

        inner.len -= drained.len();
        drained
    }

    /// Remove all messages
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for tier in inner.tiers.iter_mut() {
            tier.clear();
        }
        inner.len = 0;
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued messages with the given priority
    pub fn tier_len(&self, priority: Priority) -> usize {
        self.inner.lock().tiers[priority.index()].len()
    }

    /// Messages dropped to respect capacity since creation
    pub fn evicted_count(&self) -> u64 {
        self.inner.lock().evicted
    }

    /// Insertion sequence of the next dequeued message
    #[cfg(test)]
    fn front_seq(&self) -> Option<u64> {
        let inner = self.inner.lock();
        let tier = inner.highest_tier()?;
        inner.tiers[tier].front().map(|slot| slot.seq)
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::MessageType;
    use serde_json::json;
    use std::sync::Arc;

    fn msg(priority: Priority, tag: &str) -> Message {
        Message::new("sender", "worker", MessageType::Direct, json!(tag)).with_priority(priority)
    }

    fn tag(message: &Message) -> &str {
        message.payload.as_str().unwrap()
    }

    #[test]
    fn test_dequeue_priority_then_fifo() {
        let queue = PriorityQueue::new(10);
        queue.enqueue(msg(Priority::Low, "low-1"));
        queue.enqueue(msg(Priority::High, "high-1"));
        queue.enqueue(msg(Priority::Normal, "normal-1"));
        queue.enqueue(msg(Priority::High, "high-2"));
        queue.enqueue(msg(Priority::Critical, "critical-1"));

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|m| tag(&m).to_string())
            .collect();
        assert_eq!(order, vec!["critical-1", "high-1", "high-2", "normal-1", "low-1"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_peek_is_non_destructive() {
        let queue = PriorityQueue::new(4);
        assert!(queue.peek().is_none());

        queue.enqueue(msg(Priority::Normal, "a"));
        queue.enqueue(msg(Priority::High, "b"));

        assert_eq!(tag(&queue.peek().unwrap()), "b");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front_seq(), Some(1));
    }

    #[test]
    fn test_high_evicts_low_when_full() {
        let queue = PriorityQueue::new(2);
        assert!(queue.enqueue(msg(Priority::Low, "low-1")));
        assert!(queue.enqueue(msg(Priority::Low, "low-2")));
        assert!(queue.enqueue(msg(Priority::High, "high")));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.evicted_count(), 1);
        assert_eq!(tag(&queue.dequeue().unwrap()), "high");
        // Oldest low message was the one evicted
        assert_eq!(tag(&queue.dequeue().unwrap()), "low-2");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_same_tier_evicts_own_oldest() {
        let queue = PriorityQueue::new(2);
        queue.enqueue(msg(Priority::Normal, "n-1"));
        queue.enqueue(msg(Priority::Normal, "n-2"));
        assert!(queue.enqueue(msg(Priority::Normal, "n-3")));

        assert_eq!(tag(&queue.dequeue().unwrap()), "n-2");
        assert_eq!(tag(&queue.dequeue().unwrap()), "n-3");
    }

    #[test]
    fn test_lower_incoming_still_stored_when_queue_outranks_it() {
        let queue = PriorityQueue::new(2);
        queue.enqueue(msg(Priority::Critical, "c-1"));
        queue.enqueue(msg(Priority::High, "h-1"));

        assert!(queue.enqueue(msg(Priority::Low, "low")));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.evicted_count(), 1);
        assert_eq!(queue.tier_len(Priority::Critical), 1);
        assert_eq!(queue.tier_len(Priority::High), 0);
        assert_eq!(queue.tier_len(Priority::Low), 1);

        assert_eq!(tag(&queue.dequeue().unwrap()), "c-1");
        assert_eq!(tag(&queue.dequeue().unwrap()), "low");
    }

    #[test]
    fn test_overflow_never_evicts_above_lower_priority() {
        let queue = PriorityQueue::new(5);
        let pattern = [
            Priority::Low,
            Priority::Critical,
            Priority::Normal,
            Priority::High,
            Priority::Low,
            Priority::Normal,
            Priority::Critical,
            Priority::High,
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Critical,
        ];

        for (i, priority) in pattern.iter().enumerate() {
            let before: Vec<usize> = Priority::ALL.iter().map(|p| queue.tier_len(*p)).collect();
            assert!(queue.enqueue(msg(*priority, &format!("m{}", i))));
            let after: Vec<usize> = Priority::ALL.iter().map(|p| queue.tier_len(*p)).collect();

            // Any tier that shrank must be the lowest occupied tier before the insert
            let lowest_before = before.iter().position(|&n| n > 0);
            for tier in 0..TIER_COUNT {
                if after[tier] < before[tier] {
                    assert_eq!(Some(tier), lowest_before);
                }
            }
            assert!(queue.len() <= queue.capacity());
        }
    }

    #[test]
    fn test_drain_matching_preserves_remainder_order() {
        let queue = PriorityQueue::new(10);
        queue.enqueue(msg(Priority::Normal, "keep-1"));
        queue.enqueue(msg(Priority::Normal, "take-1"));
        queue.enqueue(msg(Priority::High, "take-2"));
        queue.enqueue(msg(Priority::Normal, "keep-2"));

        let drained = queue.drain_matching(|m| tag(m).starts_with("take"));
        let drained: Vec<&str> = drained.iter().map(tag).collect();
        assert_eq!(drained, vec!["take-2", "take-1"]);

        assert_eq!(queue.len(), 2);
        assert_eq!(tag(&queue.dequeue().unwrap()), "keep-1");
        assert_eq!(tag(&queue.dequeue().unwrap()), "keep-2");
    }

    #[test]
    fn test_clear() {
        let queue = PriorityQueue::new(3);
        queue.enqueue(msg(Priority::Low, "a"));
        queue.enqueue(msg(Priority::Critical, "b"));
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.peek().is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let queue = PriorityQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.enqueue(msg(Priority::Normal, "only")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_concurrent_enqueue() {
        let queue = Arc::new(PriorityQueue::new(10_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.enqueue(msg(Priority::ALL[i % 4], &format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 1000);
        let mut last = Priority::Critical;
        while let Some(m) = queue.dequeue() {
            assert!(m.priority <= last);
            last = m.priority;
        }
    }
}
