use crate::domain::errors::{LifecycleError, LifecycleResult};
use anyhow::anyhow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Cooperative cancellation signal shared between a job and its caller.
///
/// Long-running fits poll it between iterations/epochs.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a background training or validation job.
///
/// `id` is known before the job finishes (the training run id or report id),
/// so callers may poll model status instead of awaiting.
#[derive(Debug)]
pub struct JobHandle<T> {
    id: Uuid,
    model_id: Uuid,
    cancel: CancellationFlag,
    handle: JoinHandle<LifecycleResult<T>>,
}

impl<T> JobHandle<T> {
    pub fn new(
        id: Uuid,
        model_id: Uuid,
        cancel: CancellationFlag,
        handle: JoinHandle<LifecycleResult<T>>,
    ) -> Self {
        Self {
            id,
            model_id,
            cancel,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model_id(&self) -> Uuid {
        self.model_id
    }

    /// Request cooperative cancellation. The job still runs to its next
    /// checkpoint and records a partial run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> LifecycleResult<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(LifecycleError::Storage(anyhow!(
                "job {} for model {} aborted: {}",
                self.id,
                self.model_id,
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_job_handle_wait() {
        let cancel = CancellationFlag::new();
        let id = Uuid::new_v4();
        let handle = tokio::spawn(async move { Ok::<_, LifecycleError>(42) });
        let job = JobHandle::new(id, Uuid::nil(), cancel, handle);
        assert_eq!(job.id(), id);
        assert_eq!(job.wait().await.unwrap(), 42);
    }
}
