//! Fan-in over spawned tasks
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// Wait for every task in `handles` and report the first failure, in
/// completion order.
///
/// A failing task does not cancel the others: every handle is awaited before
/// returning so no task outlives the call. A panicked or aborted task counts
/// as a failure through `E: From<JoinError>`. On success the outputs are
/// returned in the order the handles were given.
pub async fn join_all<T, E, I>(handles: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = JoinHandle<Result<T, E>>>,
    E: From<JoinError> + std::fmt::Display,
{
    let mut pending = handles
        .into_iter()
        .enumerate()
        .map(|(idx, handle)| async move { (idx, handle.await) })
        .collect::<FuturesUnordered<_>>();

    let mut done = Vec::with_capacity(pending.len());
    let mut first_err = None;
    while let Some((idx, res)) = pending.next().await {
        match res.map_err(E::from).and_then(|out| out) {
            Ok(out) => done.push((idx, out)),
            Err(err) if first_err.is_none() => first_err = Some(err),
            Err(err) => debug!(%err, idx, "task failed after an earlier failure"),
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => {
            done.sort_by_key(|(idx, _)| *idx);
            Ok(done.into_iter().map(|(_, out)| out).collect())
        }
    }
}
