use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel;
use crate::lookup::Lookup;
use crate::task::{self, Outcome};

/// What a race does when providers fail before the deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Failed providers go silent. Without a success the race only ends at
    /// the deadline, so "all down" and "all slow" look the same.
    AwaitDeadline,
    /// Resolve with [`Error::AllFailed`] as soon as every provider failed.
    #[default]
    FailFast,
}

/// One provider that reported an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub provider: String,
    pub message: String,
}

/// Why a race produced no winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No provider succeeded within the timeout.
    TimedOut(Duration),
    /// Every provider failed (only with [`FailurePolicy::FailFast`]).
    AllFailed(Vec<Failure>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut(after) => write!(f, "timed out after {after:?}"),
            Self::AllFailed(failures) => {
                f.write_str("all providers failed")?;
                for failure in failures {
                    write!(f, "; {}: {}", failure.provider, failure.message)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

/// The accepted result of a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner<T> {
    pub provider: String,
    pub record: T,
    /// Time from race start until the winner was accepted.
    pub elapsed: Duration,
}

/// Fetch one key from several providers and keep the first success.
///
/// Every call to [`Race::run`] starts one lookup per provider, waits for the
/// first success or the deadline, then fires a cancellation signal shared by
/// all lookups so the losers tear down their requests.
///
/// Ties are broken deterministically: an outcome that is ready beats a
/// deadline that is ready at the same time, and among successes already
/// queued when the race wakes up, the provider registered first wins.
pub struct Race<T> {
    lookups: Vec<Arc<dyn Lookup<Record = T>>>,
    timeout: Duration,
    policy: FailurePolicy,
}

enum Step<T> {
    Outcome(Outcome<T>),
    /// Every lookup has finished without a success left to read.
    Exhausted,
    Deadline,
}

impl<T: Send + 'static> Race<T> {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            lookups: Vec::new(),
            timeout,
            policy: FailurePolicy::default(),
        }
    }

    /// Add a provider. Registration order is the tie-break order.
    #[must_use]
    pub fn with_lookup(mut self, lookup: impl Lookup<Record = T>) -> Self {
        self.lookups.push(Arc::new(lookup));
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one race for `key`, spawning the lookups on `executor`.
    ///
    /// The executor must be driven while the race runs, e.g. by awaiting the
    /// race inside `executor.run(..)`. Lookups spawned on an idle executor
    /// never start, and the race ends as [`Error::TimedOut`].
    ///
    /// # Errors
    ///
    /// [`Error::TimedOut`] when no provider succeeds in time, and
    /// [`Error::AllFailed`] when every provider failed under
    /// [`FailurePolicy::FailFast`].
    pub async fn run(
        &self,
        executor: &async_executor::Executor<'static>,
        key: &str,
    ) -> Result<Winner<T>, Error> {
        let started = Instant::now();
        let (trigger, signal) = cancel::pair();
        let (outcome_tx, outcome_rx) = async_channel::bounded(self.lookups.len().max(1));

        tracing::info!(
            key,
            providers = self.lookups.len(),
            timeout = ?self.timeout,
            "race started"
        );

        for (index, lookup) in self.lookups.iter().enumerate() {
            task::spawn(
                executor,
                index,
                Arc::clone(lookup),
                key.to_owned(),
                signal.clone(),
                outcome_tx.clone(),
            );
        }
        // Only the tasks hold senders now, so the channel closes once all of
        // them are done.
        drop(outcome_tx);

        let result = self.decide(&outcome_rx, started).await;
        trigger.cancel();

        match &result {
            Ok(winner) => {
                tracing::info!(provider = %winner.provider, elapsed = ?winner.elapsed, "race won");
            }
            Err(e @ Error::AllFailed(_)) => tracing::warn!(%e, "race lost"),
            Err(Error::TimedOut(_)) => {}
        }
        result
    }

    /// Read outcomes until a winner, the deadline, or (fail-fast) the last
    /// failure. Anything arriving later stays unread.
    async fn decide(
        &self,
        outcomes: &async_channel::Receiver<Outcome<T>>,
        started: Instant,
    ) -> Result<Winner<T>, Error> {
        let deadline = started + self.timeout;
        let mut failures = Vec::new();
        loop {
            let step = futures_lite::future::or(
                async { outcomes.recv().await.map_or(Step::Exhausted, Step::Outcome) },
                async {
                    async_io::Timer::at(deadline).await;
                    Step::Deadline
                },
            )
            .await;

            match step {
                Step::Outcome(Outcome {
                    index,
                    provider,
                    result: Ok(record),
                }) => {
                    let (provider, record) = earliest_queued(outcomes, index, provider, record);
                    return Ok(Winner {
                        provider,
                        record,
                        elapsed: started.elapsed(),
                    });
                }
                Step::Outcome(Outcome {
                    provider,
                    result: Err(message),
                    ..
                }) => {
                    failures.push(Failure { provider, message });
                    if self.policy == FailurePolicy::FailFast
                        && failures.len() == self.lookups.len()
                    {
                        return Err(Error::AllFailed(failures));
                    }
                }
                Step::Exhausted => match self.policy {
                    FailurePolicy::FailFast => return Err(Error::AllFailed(failures)),
                    FailurePolicy::AwaitDeadline => {
                        async_io::Timer::at(deadline).await;
                        tracing::warn!(failed = failures.len(), "race timed out");
                        return Err(Error::TimedOut(self.timeout));
                    }
                },
                Step::Deadline => {
                    tracing::warn!(failed = failures.len(), "race timed out");
                    return Err(Error::TimedOut(self.timeout));
                }
            }
        }
    }
}

/// Among the successes already waiting in the channel, pick the one from the
/// earliest registered provider.
fn earliest_queued<T>(
    outcomes: &async_channel::Receiver<Outcome<T>>,
    index: usize,
    provider: String,
    record: T,
) -> (String, T) {
    let mut best = (index, provider, record);
    while let Ok(next) = outcomes.try_recv() {
        if let Ok(record) = next.result {
            if next.index < best.0 {
                best = (next.index, next.provider, record);
            }
        }
    }
    (best.1, best.2)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::cancel::Signal;
    use crate::lookup::{self, LookupFuture};

    #[derive(Clone, Copy)]
    enum Reply {
        Succeed(&'static str),
        Fail,
        Hang,
    }

    /// What a scripted lookup saw while the race ran.
    #[derive(Default)]
    struct Tracker {
        signal: Mutex<Option<Signal>>,
        completed: AtomicBool,
        dropped: AtomicBool,
    }

    impl Tracker {
        fn cancelled(&self) -> bool {
            self.signal
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(Signal::is_cancelled)
        }

        /// The fetch future was dropped before it produced a value.
        fn torn_down(&self) -> bool {
            self.dropped.load(Ordering::SeqCst) && !self.completed.load(Ordering::SeqCst)
        }
    }

    struct InFlight(Arc<Tracker>);

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.dropped.store(true, Ordering::SeqCst);
        }
    }

    struct Scripted {
        name: &'static str,
        delay: Duration,
        reply: Reply,
        tracker: Arc<Tracker>,
    }

    fn scripted(name: &'static str, delay_ms: u64, reply: Reply) -> (Scripted, Arc<Tracker>) {
        let tracker = Arc::new(Tracker::default());
        let lookup = Scripted {
            name,
            delay: Duration::from_millis(delay_ms),
            reply,
            tracker: Arc::clone(&tracker),
        };
        (lookup, tracker)
    }

    impl Lookup for Scripted {
        type Record = &'static str;

        fn name(&self) -> &str {
            self.name
        }

        fn fetch(&self, _key: String, cancel: Signal) -> LookupFuture<'_, &'static str> {
            *self.tracker.signal.lock().unwrap() = Some(cancel);
            let guard = InFlight(Arc::clone(&self.tracker));
            Box::pin(async move {
                let _guard = guard;
                async_io::Timer::after(self.delay).await;
                let result: exn::Result<&'static str, lookup::Error> = match self.reply {
                    Reply::Succeed(record) => Ok(record),
                    Reply::Fail => Err(lookup::Error::Transport("connection refused".into()).into()),
                    Reply::Hang => futures_lite::future::pending().await,
                };
                self.tracker.completed.store(true, Ordering::SeqCst);
                result
            })
        }
    }

    /// Run a race, then keep the executor busy briefly so cancelled tasks
    /// get to observe the signal.
    fn run_race(race: &Race<&'static str>) -> Result<Winner<&'static str>, Error> {
        let executor = async_executor::Executor::new();
        async_io::block_on(executor.run(async {
            let result = race.run(&executor, "01153000").await;
            async_io::Timer::after(Duration::from_millis(50)).await;
            result
        }))
    }

    #[test]
    fn first_success_wins() {
        let (a, _) = scripted("a", 50, Reply::Succeed("Foo"));
        let (b, _) = scripted("b", 200, Reply::Succeed("Bar"));
        let race = Race::new(Duration::from_millis(1000))
            .with_lookup(a)
            .with_lookup(b);

        let winner = run_race(&race).unwrap();
        assert_eq!(winner.provider, "a");
        assert_eq!(winner.record, "Foo");
        assert!(winner.elapsed < Duration::from_millis(200), "{:?}", winner.elapsed);
    }

    #[test]
    fn later_registered_provider_can_win() {
        let (a, _) = scripted("a", 200, Reply::Succeed("Foo"));
        let (b, _) = scripted("b", 20, Reply::Succeed("Bar"));
        let race = Race::new(Duration::from_millis(1000))
            .with_lookup(a)
            .with_lookup(b);

        assert_eq!(run_race(&race).unwrap().record, "Bar");
    }

    #[test]
    fn failure_does_not_count_as_a_win() {
        let (a, _) = scripted("a", 0, Reply::Fail);
        let (b, _) = scripted("b", 80, Reply::Succeed("Bar"));
        let race = Race::new(Duration::from_millis(1000))
            .with_lookup(a)
            .with_lookup(b);

        let winner = run_race(&race).unwrap();
        assert_eq!(winner.provider, "b");
        assert_eq!(winner.record, "Bar");
    }

    #[test]
    fn hang_and_failure_time_out_at_deadline() {
        for policy in [FailurePolicy::AwaitDeadline, FailurePolicy::FailFast] {
            let (a, _) = scripted("a", 0, Reply::Hang);
            let (b, _) = scripted("b", 0, Reply::Fail);
            let race = Race::new(Duration::from_millis(500))
                .with_lookup(a)
                .with_lookup(b)
                .with_policy(policy);

            let started = Instant::now();
            let executor = async_executor::Executor::new();
            let result = async_io::block_on(executor.run(race.run(&executor, "01153000")));
            let elapsed = started.elapsed();

            assert_eq!(result, Err(Error::TimedOut(Duration::from_millis(500))));
            assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
            assert!(elapsed < Duration::from_millis(900), "{elapsed:?}");
        }
    }

    #[test]
    fn all_failures_are_absorbed_until_deadline() {
        let (a, _) = scripted("a", 0, Reply::Fail);
        let (b, _) = scripted("b", 0, Reply::Fail);
        let race = Race::new(Duration::from_millis(300))
            .with_lookup(a)
            .with_lookup(b)
            .with_policy(FailurePolicy::AwaitDeadline);

        let started = Instant::now();
        let executor = async_executor::Executor::new();
        let result = async_io::block_on(executor.run(race.run(&executor, "01153000")));

        assert_eq!(result, Err(Error::TimedOut(Duration::from_millis(300))));
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn all_failures_fail_fast() {
        let (a, _) = scripted("a", 0, Reply::Fail);
        let (b, _) = scripted("b", 10, Reply::Fail);
        let race = Race::new(Duration::from_millis(1000))
            .with_lookup(a)
            .with_lookup(b);

        let started = Instant::now();
        let executor = async_executor::Executor::new();
        let result = async_io::block_on(executor.run(race.run(&executor, "01153000")));

        let Err(Error::AllFailed(failures)) = result else {
            panic!("expected AllFailed, got {result:?}");
        };
        let mut providers: Vec<_> = failures.iter().map(|f| f.provider.as_str()).collect();
        providers.sort_unstable();
        assert_eq!(providers, ["a", "b"]);
        assert!(failures[0].message.contains("connection refused"));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn losers_are_cancelled_once_a_winner_is_chosen() {
        let (a, winner_tracker) = scripted("a", 10, Reply::Succeed("Foo"));
        let (b, b_tracker) = scripted("b", 0, Reply::Hang);
        let (c, c_tracker) = scripted("c", 5_000, Reply::Succeed("Baz"));
        let race = Race::new(Duration::from_millis(1000))
            .with_lookup(a)
            .with_lookup(b)
            .with_lookup(c);

        assert_eq!(run_race(&race).unwrap().record, "Foo");
        for tracker in [&winner_tracker, &b_tracker, &c_tracker] {
            assert!(tracker.cancelled());
        }
        assert!(b_tracker.torn_down());
        assert!(c_tracker.torn_down());
        assert!(!winner_tracker.torn_down());
    }

    #[test]
    fn timeout_cancels_every_lookup() {
        let (a, a_tracker) = scripted("a", 0, Reply::Hang);
        let (b, b_tracker) = scripted("b", 0, Reply::Hang);
        let race = Race::new(Duration::from_millis(100))
            .with_lookup(a)
            .with_lookup(b);

        assert_eq!(run_race(&race), Err(Error::TimedOut(Duration::from_millis(100))));
        assert!(a_tracker.cancelled() && a_tracker.torn_down());
        assert!(b_tracker.cancelled() && b_tracker.torn_down());
    }

    #[test]
    fn repeated_races_are_independent() {
        let (a, _) = scripted("a", 10, Reply::Succeed("Foo"));
        let (b, _) = scripted("b", 30, Reply::Succeed("Bar"));
        let race = Race::new(Duration::from_millis(1000))
            .with_lookup(a)
            .with_lookup(b);

        assert_eq!(run_race(&race).unwrap().record, "Foo");
        assert_eq!(run_race(&race).unwrap().record, "Foo");
    }

    #[test]
    fn outcomes_after_the_decision_are_ignored() {
        let race: Race<&'static str> = Race::new(Duration::from_millis(1000));
        let (tx, rx) = async_channel::bounded(2);
        let late = tx.clone();
        tx.try_send(Outcome {
            index: 1,
            provider: "b".to_owned(),
            result: Ok("Foo"),
        })
        .unwrap();

        let winner = async_io::block_on(race.decide(&rx, Instant::now())).unwrap();

        // A loser finishing now still finds room and does not block.
        late.try_send(Outcome {
            index: 0,
            provider: "a".to_owned(),
            result: Ok("Bar"),
        })
        .unwrap();
        assert_eq!(winner.provider, "b");
        assert_eq!(winner.record, "Foo");

        // Once the race is gone, delivery fails quietly instead of panicking.
        drop(rx);
        assert!(late
            .try_send(Outcome {
                index: 0,
                provider: "a".to_owned(),
                result: Ok("Baz"),
            })
            .is_err());
    }

    #[test]
    fn queued_successes_resolve_in_registration_order() {
        let (tx, rx) = async_channel::bounded(4);
        for (index, provider, result) in [
            (2, "c", Ok("C")),
            (0, "a", Ok("A")),
            (3, "d", Err("boom".to_owned())),
        ] {
            tx.try_send(Outcome {
                index,
                provider: provider.to_owned(),
                result,
            })
            .unwrap();
        }

        let (provider, record) = earliest_queued(&rx, 1, "b".to_owned(), "B");
        assert_eq!(provider, "a");
        assert_eq!(record, "A");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_race() {
        let race: Race<&'static str> = Race::new(Duration::from_millis(50));
        assert_eq!(run_race(&race), Err(Error::AllFailed(Vec::new())));

        let race = race.with_policy(FailurePolicy::AwaitDeadline);
        let started = Instant::now();
        assert_eq!(run_race(&race), Err(Error::TimedOut(Duration::from_millis(50))));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
