//! Production implementations backed by Tokio.

use crate::error::EnvError;
use crate::{EngineContext, LineTransport};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

/// Production context backed by Tokio.
///
/// This is the "real" implementation used when driving a live backend.
/// Time comes from the system monotonic clock.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "spawning task");
        tokio::spawn(future);
    }
}

/// Races `future` against a context sleep of `limit`.
///
/// The request branch is polled first, so a request that is already complete
/// always wins. Timing goes through the context, which keeps timeouts
/// deterministic under a virtual clock.
pub async fn with_timeout<Ctx, F, T>(ctx: &Ctx, limit: Duration, future: F) -> Result<T, EnvError>
where
    Ctx: EngineContext + ?Sized,
    F: Future<Output = Result<T, EnvError>>,
{
    tokio::select! {
        biased;
        result = future => result,
        _ = ctx.sleep(limit) => Err(EnvError::Timeout(limit.as_millis() as u64)),
    }
}

/// Line transport fed through an unbounded channel.
///
/// The socket task that owns the backend connection holds the
/// `UnboundedSender` returned by [`ChannelTransport::new`] and pushes every
/// received line into it.
pub struct ChannelTransport {
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: AtomicBool,
}

impl ChannelTransport {
    /// Creates a transport and the sender half the producer writes into.
    pub fn new() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(rx),
                closed: AtomicBool::new(false),
            },
            tx,
        )
    }
}

#[async_trait]
impl LineTransport for ChannelTransport {
    async fn recv(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    fn try_recv(&self) -> Result<Option<String>, EnvError> {
        let mut rx = match self.rx.try_lock() {
            Ok(rx) => rx,
            // A pending recv() holds the receiver; nothing to hand out here.
            Err(_) => return Ok(None),
        };
        match rx.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(TryRecvError::Empty) if !self.closed.load(Ordering::Acquire) => Ok(None),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Err(EnvError::Closed),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut rx) = self.rx.try_lock() {
            rx.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_with_timeout_ready_future_wins() {
        let ctx = TokioContext::new();
        let result = with_timeout(&ctx, Duration::from_millis(50), async { Ok::<_, EnvError>(7) }).await;
        assert_eq!(result.ok(), Some(7));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let ctx = TokioContext::new();
        let result = with_timeout(&ctx, Duration::from_millis(20), async {
            std::future::pending::<Result<(), EnvError>>().await
        })
        .await;
        assert!(matches!(result, Err(EnvError::Timeout(20))));
    }

    #[tokio::test]
    async fn test_channel_transport_preserves_order() {
        let (transport, tx) = ChannelTransport::new();
        tx.send("a".to_string()).ok();
        tx.send("b".to_string()).ok();

        assert_eq!(transport.try_recv().ok().flatten().as_deref(), Some("a"));
        assert_eq!(transport.recv().await.as_deref(), Some("b"));
        assert!(matches!(transport.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_channel_transport_close_drains_then_ends() {
        let (transport, tx) = ChannelTransport::new();
        tx.send("last".to_string()).ok();
        transport.close();

        assert_eq!(transport.try_recv().ok().flatten().as_deref(), Some("last"));
        assert!(matches!(transport.try_recv(), Err(EnvError::Closed)));
        assert!(tx.send("late".to_string()).is_err());
    }
}
