//! Deadline-bounded racing of cooperative tasks
//!
//! The completion watch needs "first of N operations, bounded by a deadline,
//! with guaranteed cancellation and join of the losers". That shape lives
//! here, separate from what the contenders actually do.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::JoinSet;

/// Run contenders concurrently and return the first definitive result
///
/// Each contender resolves to `Some(value)` to win or `None` to withdraw
/// (a withdrawn contender leaves the others racing). The whole wait is
/// bounded by `deadline`. Returns `None` when the deadline elapses or every
/// contender withdraws.
///
/// On return, every losing contender has been cancelled *and* joined — no
/// contender continues to run after this function exits. A panicking
/// contender propagates its panic.
pub async fn first_within<T>(
    deadline: Duration,
    contenders: Vec<BoxFuture<'static, Option<T>>>,
) -> Option<T>
where
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    for contender in contenders {
        set.spawn(contender);
    }

    let winner = tokio::time::timeout(deadline, async {
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(value)) => return Some(value),
                Ok(None) => continue,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => continue,
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    // Abort the losers and wait for them to finish unwinding before handing
    // the result back.
    set.shutdown().await;

    winner
}
