use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{
    algorithm::SecurityType,
    orders::OrderEvent,
    packet::{AlgorithmStatus, JobIds},
};

/// Outbound record produced by the algorithm and consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Debug {
        job: JobIds,
        message: String,
    },
    Log {
        job: JobIds,
        message: String,
    },
    RuntimeError {
        job: JobIds,
        message: String,
        stack_trace: String,
    },
    SecurityTypes {
        job: JobIds,
        types: Vec<SecurityType>,
    },
    AlgorithmStatus {
        job: JobIds,
        algorithm_id: String,
        status: AlgorithmStatus,
        message: String,
    },
    OrderEvent {
        job: JobIds,
        event: OrderEvent,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Debug { .. } => "debug",
            Event::Log { .. } => "log",
            Event::RuntimeError { .. } => "runtime_error",
            Event::SecurityTypes { .. } => "security_types",
            Event::AlgorithmStatus { .. } => "algorithm_status",
            Event::OrderEvent { .. } => "order_event",
        }
    }
}

/// FIFO for many producers and a single consumer.
///
/// Producers never block on the consumer; the consumer may wait with a timeout.
#[derive(Default)]
pub struct EventQueue {
    inner: Mutex<VecDeque<Event>>,
    ready: Condvar,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, event: Event) {
        self.inner.lock().push_back(event);
        self.ready.notify_one();
    }

    /// Enqueues unless the queue already holds `cap` or more events, in which case the
    /// event is discarded. Returns whether it was accepted.
    pub fn enqueue_capped(&self, event: Event, cap: usize) -> bool {
        {
            let mut q = self.inner.lock();
            if q.len() >= cap {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("queue.drop kind={} len={} dropped_total={}", event.kind(), q.len(), n);
                return false;
            }
            q.push_back(event);
        }
        self.ready.notify_one();
        true
    }

    pub fn try_dequeue(&self) -> Option<Event> {
        self.inner.lock().pop_front()
    }

    /// Waits up to `timeout` for an event. Returns early on `wake()`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut q = self.inner.lock();
        if q.is_empty() {
            self.ready.wait_for(&mut q, timeout);
        }
        q.pop_front()
    }

    /// Wakes a consumer blocked in `dequeue_timeout`.
    pub fn wake(&self) {
        self.ready.notify_all();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Discards everything currently queued and returns how many events were dropped.
    pub fn clear(&self) -> usize {
        let mut q = self.inner.lock();
        let n = q.len();
        q.clear();
        n
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    fn debug(i: usize) -> Event {
        Event::Debug {
            job: JobIds::default(),
            message: format!("m{i}"),
        }
    }

    fn status() -> Event {
        Event::AlgorithmStatus {
            job: JobIds::default(),
            algorithm_id: "a".to_string(),
            status: AlgorithmStatus::Running,
            message: String::new(),
        }
    }

    #[test]
    fn fifo_order() {
        let q = EventQueue::new();
        for i in 0..10 {
            q.enqueue(debug(i));
        }
        for i in 0..10 {
            assert_eq!(q.try_dequeue(), Some(debug(i)));
        }
        assert_eq!(q.try_dequeue(), None);
    }

    #[test]
    fn capped_enqueue_drops_at_cap_but_uncapped_still_accepted() {
        let q = EventQueue::new();
        for i in 0..500 {
            assert!(q.enqueue_capped(debug(i), 500));
        }
        assert!(!q.enqueue_capped(debug(500), 500));
        assert!(!q.enqueue_capped(debug(501), 500));
        assert_eq!(q.size(), 500);
        assert_eq!(q.dropped(), 2);

        q.enqueue(status());
        assert_eq!(q.size(), 501);
    }

    #[test]
    fn clear_discards_everything() {
        let q = EventQueue::new();
        for i in 0..5 {
            q.enqueue(debug(i));
        }
        assert_eq!(q.clear(), 5);
        assert!(q.is_empty());
    }

    #[test]
    fn dequeue_timeout_returns_none_when_idle() {
        let q = EventQueue::new();
        let start = Instant::now();
        assert!(q.dequeue_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn blocked_consumer_sees_event_from_producer() {
        let q = Arc::new(EventQueue::new());
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                q.enqueue(debug(7));
            })
        };
        let mut got = None;
        for _ in 0..100 {
            got = q.dequeue_timeout(Duration::from_millis(50));
            if got.is_some() {
                break;
            }
        }
        producer.join().unwrap();
        assert_eq!(got, Some(debug(7)));
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        let q = Arc::new(EventQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        q.enqueue(Event::Log {
                            job: JobIds::default(),
                            message: format!("{p}:{i}"),
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut last = [-1i64; 4];
        let mut n = 0;
        while let Some(Event::Log { message, .. }) = q.try_dequeue() {
            let (p, i) = message.split_once(':').unwrap();
            let (p, i): (usize, i64) = (p.parse().unwrap(), i.parse().unwrap());
            assert!(i > last[p]);
            last[p] = i;
            n += 1;
        }
        assert_eq!(n, 1000);
    }
}
