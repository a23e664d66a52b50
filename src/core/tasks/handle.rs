use std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread::{
        self,
        JoinHandle,
    },
};

use crate::core::StudyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellableTask {
    NextItemPrefetch,
}

impl CancellableTask {
    fn thread_name(self) -> &'static str {
        match self {
            CancellableTask::NextItemPrefetch => "study-next-item",
        }
    }
}

/// A background computation with a cooperative abort flag.
///
/// The worker receives the flag and is expected to poll it at every loop
/// boundary. Dropping the handle cancels the task and waits for it to exit.
pub struct TaskHandle<T> {
    kind: CancellableTask,
    cancel_token: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn spawn<F>(kind: CancellableTask, work: F) -> Result<Self, StudyError>
    where
        F: FnOnce(&AtomicBool) -> T + Send + 'static,
    {
        let cancel_token = Arc::new(AtomicBool::new(false));
        let token = cancel_token.clone();

        let join_handle = thread::Builder::new()
            .name(kind.thread_name().to_string())
            .spawn(move || work(&token))
            .map_err(|e| StudyError::TaskFailed(format!("{}: {}", kind.thread_name(), e)))?;

        Ok(Self { kind, cancel_token, join_handle: Some(join_handle) })
    }
}

impl<T> TaskHandle<T> {
    pub fn kind(&self) -> CancellableTask {
        self.kind
    }

    pub fn cancel(&self) {
        self.cancel_token.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Blocks until the worker returns.
    pub fn wait(mut self) -> Result<T, StudyError> {
        self.join()
    }

    /// Raises the abort flag and blocks until the worker has observed it.
    pub fn cancel_and_wait(mut self) -> Result<T, StudyError> {
        self.cancel();
        self.join()
    }

    fn join(&mut self) -> Result<T, StudyError> {
        let handle = self.join_handle.take().ok_or_else(|| {
            StudyError::TaskFailed(format!("{} was already joined", self.kind.thread_name()))
        })?;

        handle
            .join()
            .map_err(|_| StudyError::TaskFailed(format!("{} panicked", self.kind.thread_name())))
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            self.cancel_token.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }
    }
}
