//! Simulated line transport with fault injection.

use async_trait::async_trait;
use motionview_env::{EnvError, LineTransport};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// Faults applied to lines as they are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportFaults {
    /// Probability that a line is delivered twice
    pub duplicate_rate: f64,
    /// Probability that a junk line is inserted before a line
    pub garbage_rate: f64,
    /// Prepend a console-style timestamp prefix to every line
    pub prefix: bool,
}

/// What the transport injected, so scenarios can check the engine's counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub delivered: u64,
    /// Duplicated `[DATA]` lines
    pub duplicated_data: u64,
    /// Duplicated `[WATCH]` lines
    pub duplicated_watch: u64,
    /// Untagged noise lines
    pub noise: u64,
    /// Tagged but unparsable lines
    pub malformed: u64,
}

struct Inner {
    queue: VecDeque<String>,
    faults: TransportFaults,
    stats: TransportStats,
    rng: ChaCha8Rng,
}

/// In-memory line transport.
///
/// The harness plays the backend: it calls [`SimTransport::deliver`] with the
/// robot's lines, and the engine side drains them through [`LineTransport`].
pub struct SimTransport {
    inner: Mutex<Inner>,
    closed: AtomicBool,
    notify: Notify,
}

const NOISE: &[&str] = &[
    "Program started",
    "Battery: 87%",
    "Motor 3 disconnected",
    "",
];

const MALFORMED: &[&str] = &[
    "[DATA],abc,1,2,3,4,5",
    "[DATA],100,1",
    "[WATCH],12",
    "[DATA],,,,,,",
];

impl SimTransport {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                faults: TransportFaults::default(),
                stats: TransportStats::default(),
                rng,
            }),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_faults(&self, faults: TransportFaults) {
        self.lock().faults = faults;
    }

    pub fn stats(&self) -> TransportStats {
        self.lock().stats
    }

    /// Lines waiting to be received.
    pub fn backlog(&self) -> usize {
        self.lock().queue.len()
    }

    /// Sends one backend line, applying the configured faults.
    pub fn deliver(&self, line: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut inner = self.lock();
            let Inner { queue, faults, stats, rng } = &mut *inner;

            if faults.garbage_rate > 0.0 && rng.gen_bool(faults.garbage_rate.min(1.0)) {
                if rng.gen_bool(0.5) {
                    queue.push_back(NOISE[rng.gen_range(0..NOISE.len())].to_string());
                    stats.noise += 1;
                } else {
                    queue.push_back(MALFORMED[rng.gen_range(0..MALFORMED.len())].to_string());
                    stats.malformed += 1;
                }
            }

            let framed = if faults.prefix {
                let secs = rng.gen_range(0.0..1000.0_f64);
                format!("[{secs:.3}] {line}")
            } else {
                line.to_string()
            };

            let copies = if faults.duplicate_rate > 0.0 && rng.gen_bool(faults.duplicate_rate.min(1.0)) {
                if line.contains("[DATA]") {
                    stats.duplicated_data += 1;
                } else if line.contains("[WATCH]") {
                    stats.duplicated_watch += 1;
                }
                2
            } else {
                1
            };
            for _ in 0..copies {
                queue.push_back(framed.clone());
            }
            stats.delivered += 1;
        }
        self.notify.notify_one();
    }
}

#[async_trait]
impl LineTransport for SimTransport {
    async fn recv(&self) -> Option<String> {
        loop {
            match self.try_recv() {
                Ok(Some(line)) => return Some(line),
                Err(_) => return None,
                Ok(None) => self.notify.notified().await,
            }
        }
    }

    fn try_recv(&self) -> Result<Option<String>, EnvError> {
        match self.lock().queue.pop_front() {
            Some(line) => Ok(Some(line)),
            None if self.closed.load(Ordering::Acquire) => Err(EnvError::Closed),
            None => Ok(None),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn transport() -> SimTransport {
        SimTransport::new(ChaCha8Rng::seed_from_u64(7))
    }

    #[test]
    fn test_clean_delivery_preserves_order() {
        let t = transport();
        t.deliver("[DATA],1,0,0,0,0,0");
        t.deliver("[DATA],2,0,0,0,0,0");
        assert_eq!(t.try_recv().ok().flatten().as_deref(), Some("[DATA],1,0,0,0,0,0"));
        assert_eq!(t.try_recv().ok().flatten().as_deref(), Some("[DATA],2,0,0,0,0,0"));
        assert!(matches!(t.try_recv(), Ok(None)));
    }

    #[test]
    fn test_always_duplicate() {
        let t = transport();
        t.set_faults(TransportFaults {
            duplicate_rate: 1.0,
            ..TransportFaults::default()
        });
        t.deliver("[DATA],1,0,0,0,0,0");
        assert_eq!(t.backlog(), 2);
        assert_eq!(t.stats().duplicated_data, 1);
    }

    #[test]
    fn test_prefix_keeps_tag() {
        let t = transport();
        t.set_faults(TransportFaults {
            prefix: true,
            ..TransportFaults::default()
        });
        t.deliver("[WATCH],5,INFO,a:,1");
        let line = t.try_recv().ok().flatten().unwrap_or_default();
        assert!(line.starts_with('['));
        assert!(line.ends_with("[WATCH],5,INFO,a:,1"));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let t = transport();
        t.deliver("last");
        t.close();
        assert_eq!(t.recv().await.as_deref(), Some("last"));
        assert_eq!(t.recv().await, None);
        t.deliver("late");
        assert!(matches!(t.try_recv(), Err(EnvError::Closed)));
    }
}
