use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Runtime that drives asynchronous event subscribers.
///
/// Bridges blocking callers (the update thread calling [`Event::invoke`])
/// with real async subscriber work: futures are spawned onto a small
/// dedicated tokio runtime and the caller blocks on a channel until the
/// subscriber completes.
///
/// Clone is cheap (Arc-wrapped). Most code never touches this type directly;
/// the event bus uses the process-wide instance from [`EventRuntime::global`].
///
/// [`Event::invoke`]: crate::Event::invoke
#[derive(Clone)]
pub struct EventRuntime {
    inner: Arc<EventRuntimeInner>,
}

struct EventRuntimeInner {
    runtime: tokio::runtime::Runtime,
}

impl EventRuntime {
    /// Creates a new runtime with one worker thread dedicated to driving
    /// subscriber futures.
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("Failed to create tokio event runtime");

        Self {
            inner: Arc::new(EventRuntimeInner { runtime }),
        }
    }

    /// Returns the process-wide runtime, creating it on first use.
    pub fn global() -> &'static EventRuntime {
        static GLOBAL: OnceLock<EventRuntime> = OnceLock::new();
        GLOBAL.get_or_init(EventRuntime::new)
    }

    /// Spawns a future on the runtime.
    ///
    /// Returns a [`TaskHandle`] whose `recv()` blocks the calling thread
    /// until the future completes. The future runs on the runtime's worker
    /// threads, so blocking on the handle from any other thread is safe —
    /// including threads that belong to a different tokio runtime.
    pub fn run<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (sender, receiver) = std::sync::mpsc::channel();

        self.inner.runtime.spawn(async move {
            let result = future.await;
            let _ = sender.send(result);
        });

        TaskHandle { receiver }
    }
}

impl Default for EventRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a future spawned via [`EventRuntime::run`].
pub struct TaskHandle<T> {
    receiver: std::sync::mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task completes and returns its result.
    ///
    /// Returns `None` if the task was dropped without producing a result
    /// (e.g. it panicked on the runtime).
    pub fn recv(self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Non-blocking poll for the result.
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_simple_task() {
        let runtime = EventRuntime::new();
        let handle = runtime.run(async { 42u32 });
        assert_eq!(handle.recv(), Some(42));
    }

    #[test]
    fn run_with_sleep() {
        let runtime = EventRuntime::new();
        let handle = runtime.run(async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            99u32
        });
        assert_eq!(handle.recv(), Some(99));
    }

    #[test]
    fn multiple_concurrent_tasks() {
        let runtime = EventRuntime::new();
        let h1 = runtime.run(async { 1u32 });
        let h2 = runtime.run(async { 2u32 });
        let h3 = runtime.run(async { 3u32 });

        assert_eq!(h1.recv(), Some(1));
        assert_eq!(h2.recv(), Some(2));
        assert_eq!(h3.recv(), Some(3));
    }

    #[test]
    fn global_is_shared() {
        let a = EventRuntime::global();
        let b = EventRuntime::global();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn clone_used_in_closure() {
        let runtime = EventRuntime::new();
        let clone = runtime.clone();

        let joined = std::thread::spawn(move || {
            let handle = clone.run(async { "from_thread" });
            handle.recv()
        });

        assert_eq!(joined.join().unwrap(), Some("from_thread"));
    }
}
