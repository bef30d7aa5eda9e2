// Process-wide cancellation and cleanup hooks.
//
// `CancelToken` is the single shared cancellation signal. Relay loops poll it
// at the top of each iteration; backoff waits block on it so shutdown cuts
// them short. Cancelling does not interrupt blocked socket reads: callers
// close transports after cancelling.
//
// `CleanupHooks` holds callbacks registered by services (e.g. the claim
// refresher) that must run exactly once before cancellation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block for up to `timeout`. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock();
        while !*cancelled {
            if cvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct CleanupHooks {
    hooks: Mutex<Vec<Hook>>,
}

impl CleanupHooks {
    pub fn register(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Run and drop every registered hook, in registration order.
    pub fn run(&self) {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn wait_returns_early_on_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_times_out_without_cancel() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(10)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn hooks_run_once() {
        let hooks = CleanupHooks::default();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        hooks.register(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        hooks.run();
        hooks.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
