//! Virtual clock and seeded randomness for the harness.

use async_trait::async_trait;
use motionview_env::EngineContext;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// `EngineContext` whose clock only moves when the harness (or a sleep)
/// moves it.
///
/// Clones share one clock. Sleeping returns immediately after jumping the
/// clock to the wake-up time, so a control request raced against a timeout
/// loses deterministically when the backend hangs.
#[derive(Clone)]
pub struct SimContext {
    seed: u64,
    clock_us: Arc<AtomicU64>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock_us: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Moves the clock forward. Sub-microsecond remainders are dropped.
    pub fn advance_time(&self, duration: Duration) {
        self.clock_us.fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// Random stream for one named part of the world.
    ///
    /// The stream depends only on the master seed and `label`, so adding a
    /// new consumer never perturbs the streams of existing ones.
    pub fn rng_for(&self, label: &str) -> ChaCha8Rng {
        // FNV-1a over the label, folded into the seed
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in label.bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        ChaCha8Rng::seed_from_u64(self.seed ^ h)
    }
}

#[async_trait]
impl EngineContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_micros(self.clock_us.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "spawning simulated task");
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_clock_moves_only_when_advanced() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now_ms(), 1500.0);
    }

    #[test]
    fn test_labelled_streams() {
        let a = SimContext::new(42);
        let b = SimContext::new(42);

        let x: u64 = a.rng_for("robot").gen();
        let y: u64 = b.rng_for("robot").gen();
        assert_eq!(x, y);

        let z: u64 = a.rng_for("transport").gen();
        assert_ne!(x, z);

        let w: u64 = SimContext::new(43).rng_for("robot").gen();
        assert_ne!(x, w);
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_clock() {
        let ctx = SimContext::new(1);
        ctx.sleep(Duration::from_millis(250)).await;
        assert_eq!(ctx.now(), Duration::from_millis(250));
    }

    #[test]
    fn test_clones_share_clock() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();
        ctx1.advance_time(Duration::from_secs(5));
        assert_eq!(ctx2.now(), Duration::from_secs(5));
    }
}
