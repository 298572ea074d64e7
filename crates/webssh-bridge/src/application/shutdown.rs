//! One-shot session shutdown signal.
//!
//! A session runs three independent tasks (inbound relay, output relay,
//! shell pump) and any of them can be the first to observe a terminal
//! condition: a WebSocket read error, a failed send, or the remote shell
//! exiting.  [`ShutdownSignal`] is the single primitive they coordinate
//! through.
//!
//! # Requirements
//!
//! - **Multi-broadcaster**: any task may fire the signal; firing twice (or
//!   three times, concurrently) must not block, panic, or deadlock.
//! - **Multi-waiter**: every task waits on the same signal; each must wake
//!   exactly once and exit its loop.
//! - **No lost wakeup**: a waiter that checks the flag and then suspends must
//!   still wake if the signal fires in between.  This is why `wait` creates
//!   the [`Notify`] future *before* re-checking the flag; `Notify` wakes
//!   futures that exist at `notify_waiters` time, so the check-then-suspend
//!   window is covered.
//!
//! A bounded channel with capacity equal to the producer count would also
//! work (each producer sends one token), but it couples correctness to the
//! producer count: adding a fourth task silently reintroduces a potential
//! block on send.  An atomic flag plus a notifier has no such coupling.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A one-shot, multi-broadcaster, multi-waiter completion signal.
///
/// Wrap it in an `Arc` and hand a clone to every session task.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Creates a signal in the un-fired state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal, waking every current and future waiter.
    ///
    /// Safe to call any number of times from any number of tasks.  Returns
    /// `true` for the first caller and `false` for all others, so the
    /// triggering task can be identified in logs.
    pub fn fire(&self) -> bool {
        // `swap` makes first-signaler-wins explicit: exactly one caller sees
        // the transition from false to true.
        let first = !self.fired.swap(true, Ordering::SeqCst);
        // Wake all waiters registered at this point; later waiters see the
        // flag before suspending.
        self.notify.notify_waiters();
        first
    }

    /// Returns `true` once the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Waits until the signal fires.  Returns immediately if it already has.
    ///
    /// Cancel-safe: dropping the future and waiting again later still
    /// observes the signal.
    pub async fn wait(&self) {
        loop {
            // Register interest BEFORE checking the flag.  If `fire` runs
            // between the check and the await, `notify_waiters` has already
            // seen this future and will wake it.
            let notified = self.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_starts_unfired() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_fired());
    }

    #[test]
    fn test_first_fire_wins() {
        // Arrange
        let signal = ShutdownSignal::new();

        // Act / Assert: only the first caller observes the transition
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_fired() {
        let signal = ShutdownSignal::new();
        signal.fire();

        // Must not hang.
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait() hung on an already-fired signal");
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_fire() {
        // Arrange: a task parked on wait()
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait().await })
        };

        // Give the waiter a chance to suspend before firing.
        tokio::task::yield_now().await;

        // Act
        signal.fire();

        // Assert
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter was not woken by fire()")
            .unwrap();
    }

    #[tokio::test]
    async fn test_all_three_waiters_wake() {
        // One waiter per session activity.
        let signal = Arc::new(ShutdownSignal::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        signal.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("a waiter missed the shutdown broadcast")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_simultaneous_broadcasters_neither_block_nor_panic() {
        // All three activities detect terminal conditions at once and race to
        // broadcast.  Exactly one must win; none may deadlock.
        let signal = Arc::new(ShutdownSignal::new());

        let broadcasters: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move { signal.fire() })
            })
            .collect();

        let mut firsts = 0;
        for b in broadcasters {
            if tokio::time::timeout(Duration::from_secs(1), b)
                .await
                .expect("a broadcaster blocked on fire()")
                .unwrap()
            {
                firsts += 1;
            }
        }

        assert_eq!(firsts, 1, "exactly one broadcaster must observe the transition");
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_no_lost_wakeup_under_fire_wait_race() {
        // Repeatedly race a waiter against a firer.  With the
        // register-then-check pattern the waiter must always complete.
        for _ in 0..100 {
            let signal = Arc::new(ShutdownSignal::new());
            let waiter = {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move { signal.wait().await })
            };
            let firer = {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move {
                    signal.fire();
                })
            };

            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("lost wakeup: waiter hung")
                .unwrap();
            firer.await.unwrap();
        }
    }
}
