//! "Wait for N done-signals" synchronization primitive.
//!
//! [`CompletionGroup`] tracks an outstanding-unit count in a
//! `tokio::sync::watch` channel. Units are registered with
//! [`add`](CompletionGroup::add) or [`token`](CompletionGroup::token) and
//! signalled with [`done`](CompletionGroup::done); [`wait`](CompletionGroup::wait)
//! resolves once the count reaches zero.
//!
//! Prefer tokens: a [`CompletionToken`] signals exactly once when dropped,
//! including on early return or panic.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable handle to a shared outstanding-unit counter.
#[derive(Clone)]
pub struct CompletionGroup {
    outstanding: Arc<watch::Sender<usize>>,
}

impl CompletionGroup {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(sender),
        }
    }

    /// Register `n` more units of work.
    pub fn add(&self, n: usize) {
        self.outstanding.send_modify(|count| *count += n);
    }

    /// Signal that one registered unit has finished.
    ///
    /// A surplus call (more `done()` than registered units) is logged and
    /// ignored; the count never goes below zero.
    pub fn done(&self) {
        let mut surplus = false;
        self.outstanding.send_modify(|count| match count.checked_sub(1) {
            Some(next) => *count = next,
            None => surplus = true,
        });
        if surplus {
            tracing::error!("CompletionGroup::done called more times than registered");
        }
    }

    /// Register one unit and return a guard that signals it on drop.
    pub fn token(&self) -> CompletionToken {
        self.add(1);
        CompletionToken {
            group: self.clone(),
        }
    }

    /// Number of registered units that have not signalled yet.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until every registered unit has signalled.
    ///
    /// Returns immediately if nothing is outstanding.
    pub async fn wait(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}

impl Default for CompletionGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionGroup")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// One registered unit of a [`CompletionGroup`].
///
/// Calls [`CompletionGroup::done`] exactly once, when dropped.
#[must_use = "dropping the token immediately signals completion"]
#[derive(Debug)]
pub struct CompletionToken {
    group: CompletionGroup,
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        self.group.done();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_empty() {
        let group = CompletionGroup::new();
        tokio::time::timeout(Duration::from_millis(100), group.wait())
            .await
            .expect("empty group should not block");
    }

    #[tokio::test]
    async fn wait_blocks_until_all_done() {
        let group = CompletionGroup::new();
        group.add(2);

        let waiter = {
            let group = group.clone();
            tokio::spawn(async move { group.wait().await })
        };

        group.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "one unit is still outstanding");
        assert_eq!(group.outstanding(), 1);

        group.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("waiter should not panic");
    }

    #[tokio::test]
    async fn token_signals_on_drop() {
        let group = CompletionGroup::new();
        let first = group.token();
        let second = group.token();
        assert_eq!(group.outstanding(), 2);

        drop(first);
        assert_eq!(group.outstanding(), 1);
        drop(second);
        assert_eq!(group.outstanding(), 0);

        group.wait().await;
    }

    #[tokio::test]
    async fn token_signals_when_task_panics() {
        let group = CompletionGroup::new();
        let token = group.token();

        let task = tokio::spawn(async move {
            let _token = token;
            panic!("worker blew up");
        });
        assert!(task.await.is_err());

        assert_eq!(group.outstanding(), 0);
        group.wait().await;
    }

    #[test]
    fn surplus_done_saturates_at_zero() {
        let group = CompletionGroup::new();
        group.done();
        assert_eq!(group.outstanding(), 0);
    }
}
