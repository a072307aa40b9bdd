//! Wall-clock budget for query workloads.

use std::time::{Duration, Instant};

use crate::Progress;

/// Budget applied to each query file unless configured otherwise.
pub const DEFAULT_QUERY_BUDGET: Duration = Duration::from_secs(120);

/// Stops a query workload once its wall-clock budget is spent.
///
/// The budget is checked between queries only, so a single slow query may
/// overrun it. Expiry is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBox {
    budget: Duration,
}

impl TimeBox {
    /// Create a time box with the given budget.
    #[must_use]
    pub const fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Configured budget.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Execute `queries` in order until they run out or the budget expires.
    ///
    /// `execute` returns the number of matches for one query. Progress is
    /// updated after every query.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use geoindex_core::{Progress, TimeBox};
    ///
    /// let outcome = TimeBox::new(Duration::from_secs(5))
    ///     .run(&[1_usize, 2, 3], &Progress::new(), |q| *q);
    /// assert_eq!(outcome.executed, 3);
    /// assert_eq!(outcome.matches, 6);
    /// assert!(!outcome.time_boxed);
    /// ```
    pub fn run<Q, F>(&self, queries: &[Q], progress: &Progress, mut execute: F) -> QueryOutcome
    where
        F: FnMut(&Q) -> usize,
    {
        let total = queries.len();
        progress.set(0, total);

        let start = Instant::now();
        let mut outcome = QueryOutcome {
            total,
            ..QueryOutcome::default()
        };
        for query in queries {
            outcome.matches += execute(query);
            outcome.executed += 1;
            progress.set(outcome.executed, total);

            if outcome.executed < total && start.elapsed() >= self.budget {
                outcome.time_boxed = true;
                break;
            }
        }
        outcome.elapsed = start.elapsed();
        outcome
    }
}

impl Default for TimeBox {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_BUDGET)
    }
}

/// Result of running one query workload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QueryOutcome {
    /// Queries present in the workload.
    pub total: usize,
    /// Queries actually executed before the workload ended.
    pub executed: usize,
    /// Matches summed over executed queries.
    pub matches: usize,
    /// Wall-clock time spent executing.
    pub elapsed: Duration,
    /// Whether the budget expired before every query ran.
    pub time_boxed: bool,
}

impl QueryOutcome {
    /// Executed queries per second, or `0.0` when none ran.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.executed == 0 {
            return 0.0;
        }
        let seconds = self.elapsed.as_secs_f64().max(1e-9);
        self.executed as f64 / seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;

    #[rstest]
    fn runs_every_query_within_budget() {
        let progress = Progress::new();
        let outcome = TimeBox::default().run(&[3_usize, 0, 4], &progress, |q| *q);

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.executed, 3);
        assert_eq!(outcome.matches, 7);
        assert!(!outcome.time_boxed);
        assert_eq!(progress.snapshot(), (3, 3));
    }

    #[rstest]
    fn stops_once_budget_is_spent() {
        let time_box = TimeBox::new(Duration::from_millis(5));
        let queries = vec![1_usize; 50];
        let outcome = time_box.run(&queries, &Progress::new(), |q| {
            thread::sleep(Duration::from_millis(2));
            *q
        });

        assert!(outcome.time_boxed);
        assert!(outcome.executed < outcome.total);
        assert_eq!(outcome.matches, outcome.executed);
        assert!(outcome.elapsed >= time_box.budget());
    }

    #[rstest]
    fn expiry_on_the_last_query_is_not_reported() {
        let outcome = TimeBox::new(Duration::ZERO).run(&[1_usize], &Progress::new(), |q| *q);
        assert_eq!(outcome.executed, 1);
        assert!(!outcome.time_boxed);
    }

    #[rstest]
    fn empty_workload_has_zero_throughput() {
        let outcome = TimeBox::default().run::<usize, _>(&[], &Progress::new(), |q| *q);
        assert_eq!(outcome.executed, 0);
        assert!(outcome.throughput().abs() < f64::EPSILON);
    }

    #[rstest]
    fn throughput_counts_executed_queries_only() {
        let outcome = QueryOutcome {
            total: 100,
            executed: 10,
            matches: 0,
            elapsed: Duration::from_secs(2),
            time_boxed: true,
        };
        assert!((outcome.throughput() - 5.0).abs() < 1e-9);
    }
}
