use std::sync::Arc;
use std::time::Instant;

use crate::cancel::Signal;
use crate::lookup::{until_cancelled, Lookup};

/// What a finished lookup reports to the coordinator.
#[derive(Debug)]
pub(crate) struct Outcome<T> {
    /// Position of the provider in declaration order.
    pub index: usize,
    pub provider: String,
    pub result: Result<T, String>,
}

/// Run one lookup in the background. The task is detached: the race never
/// waits for it, it only listens on `outcomes`.
pub(crate) fn spawn<T: Send + 'static>(
    executor: &async_executor::Executor<'static>,
    index: usize,
    lookup: Arc<dyn Lookup<Record = T>>,
    key: String,
    cancel: Signal,
    outcomes: async_channel::Sender<Outcome<T>>,
) {
    executor
        .spawn(async move {
            run(index, lookup.as_ref(), key, &cancel, &outcomes).await;
        })
        .detach();
}

/// Fetch once, then deliver the outcome unless the race is already decided.
pub(crate) async fn run<T: Send + 'static>(
    index: usize,
    lookup: &dyn Lookup<Record = T>,
    key: String,
    cancel: &Signal,
    outcomes: &async_channel::Sender<Outcome<T>>,
) {
    let provider = lookup.name().to_owned();
    let started = Instant::now();
    tracing::debug!(%provider, %key, "lookup started");

    // Implementations honor the signal themselves; racing it here as well
    // means one that does not still cannot outlive the race.
    let result =
        futures_lite::future::or(lookup.fetch(key, cancel.clone()), until_cancelled(cancel)).await;

    if cancel.is_cancelled() {
        tracing::debug!(%provider, elapsed = ?started.elapsed(), "race decided, dropping outcome");
        return;
    }

    let result = match result {
        Ok(record) => {
            tracing::debug!(%provider, elapsed = ?started.elapsed(), "lookup succeeded");
            Ok(record)
        }
        Err(e) => {
            tracing::warn!(%provider, %e, "lookup failed");
            Err(e.to_string())
        }
    };

    // Capacity covers one outcome per provider, so this never blocks; it
    // only fails when the coordinator has stopped listening.
    if outcomes
        .try_send(Outcome {
            index,
            provider,
            result,
        })
        .is_err()
    {
        tracing::debug!("coordinator gone, outcome dropped");
    }
}
