//! Runtime abstraction layer for async operations
//!
//! The engine never owns an executor. Components that need to run fetches in
//! the background take an [`AsyncSpawner`] from the caller, so the same code
//! runs on tokio or on any other runtime with a small adapter.

use crate::prelude::{Arc, Future, Pin};

/// Boxed future accepted by [`AsyncSpawner::spawn_boxed`]
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawn a typed future on `spawner`
pub fn spawn<F>(spawner: &dyn AsyncSpawner, future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(future))
}

/// Spawner for the ambient runtime, if one is running on this thread
pub fn default_spawner() -> Option<Arc<dyn AsyncSpawner>> {
    #[cfg(feature = "tokio-runtime")]
    {
        spawners::tokio_impl::TokioSpawner::current()
            .map(|spawner| Arc::new(spawner) as Arc<dyn AsyncSpawner>)
    }

    #[cfg(not(feature = "tokio-runtime"))]
    {
        None
    }
}

/// Default spawner implementations
pub mod spawners {
    #[cfg(feature = "tokio-runtime")]
    pub mod tokio_impl {
        use super::super::{AsyncHandle, AsyncSpawner, BoxedTask};
        use ::tokio::runtime::Handle;
        use ::tokio::task::JoinHandle;

        /// Tokio-based async spawner bound to one runtime
        #[derive(Clone)]
        pub struct TokioSpawner {
            handle: Handle,
        }

        impl TokioSpawner {
            pub fn new(handle: Handle) -> Self {
                Self { handle }
            }

            /// Spawner for the runtime driving the current thread
            pub fn current() -> Option<Self> {
                Handle::try_current().ok().map(Self::new)
            }
        }

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(&self, future: BoxedTask) -> Box<dyn AsyncHandle> {
                Box::new(TokioHandle(self.handle.spawn(future)))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "tokio-runtime")]
    #[::tokio::test]
    async fn test_tokio_spawner_runs_task() {
        let spawner = default_spawner().expect("inside a tokio runtime");
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = spawn(spawner.as_ref(), async move {
            let _ = tx.send(42u32);
        });

        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            ::tokio::task::yield_now().await;
        }
        assert!(handle.is_finished());
        assert_eq!(rx.try_recv(), Ok(42));
    }

    #[cfg(feature = "tokio-runtime")]
    #[test]
    fn test_no_spawner_outside_runtime() {
        assert!(default_spawner().is_none());
    }
}
