use std::sync::Arc;

use log::{
    debug,
    warn,
};

use super::{
    scheduler::{
        self,
        NextItem,
        Selection,
        SelectionInput,
    },
    state::DeckCore,
};
use crate::{
    core::{
        tasks::{
            CancellableTask,
            TaskHandle,
        },
        Result,
        StudyError,
    },
    engine::SrsEngine,
};

pub(crate) type PrefetchTask = TaskHandle<Selection>;

/// Starts computing the item that follows `input.previous` on a worker thread.
/// The worker only reads `core`; the foreground must cancel it before mutating.
pub(crate) fn spawn<E: SrsEngine + 'static>(
    core: &Arc<DeckCore<E>>,
    input: SelectionInput,
) -> Result<PrefetchTask> {
    let core = Arc::clone(core);
    let task = TaskHandle::spawn(CancellableTask::NextItemPrefetch, move |abort| {
        scheduler::select_next(&core.state, &core.engine, &input, abort)
    })?;
    debug!("prefetch started after item {:?}", input.previous);
    Ok(task)
}

/// Waits for a prefetch. `None` when it was aborted or failed, in which case the
/// caller computes the selection itself.
pub(crate) fn collect(task: PrefetchTask) -> Option<Option<NextItem>> {
    if !task.is_finished() {
        debug!("waiting for prefetch to finish");
    }
    match task.wait() {
        Ok(Ok(next)) => Some(next),
        Ok(Err(_)) => {
            debug!("prefetch was aborted");
            None
        }
        Err(e) => {
            warn!("prefetch failed: {}", e);
            None
        }
    }
}

/// Cancels any running prefetch and hands out the deck core for mutation.
pub(crate) fn exclusive<'a, E: SrsEngine>(
    core: &'a mut Arc<DeckCore<E>>,
    prefetch: &mut Option<PrefetchTask>,
) -> Result<&'a mut DeckCore<E>> {
    if let Some(task) = prefetch.take() {
        if let Err(e) = task.cancel_and_wait() {
            warn!("cancelled {:?} ended with an error: {}", CancellableTask::NextItemPrefetch, e);
        }
    }
    Arc::get_mut(core).ok_or_else(|| {
        StudyError::InvalidOperation("deck state is still shared with a worker".to_string())
    })
}
