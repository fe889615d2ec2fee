//! Escalating wait schedule for robot-detection responses.

use std::time::Duration;

/// Linearly spaced wait durations indexed by a step counter.
///
/// The counter moves up by one for every consecutive robot-detection
/// response and drops back to zero on the first response that is not
/// rate limited. It saturates at the last element of the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    schedule: Vec<Duration>,
    step: usize,
}

impl Backoff {
    /// Build a schedule of `steps` waits from `start_secs` to `end_secs`
    /// (both inclusive).
    pub fn new(start_secs: f64, end_secs: f64, steps: usize) -> Self {
        let schedule = linspace(start_secs, end_secs, steps)
            .into_iter()
            .map(|secs| Duration::try_from_secs_f64(secs).unwrap_or_default())
            .collect();

        Self { schedule, step: 0 }
    }

    /// Wait duration at the current step (zero for an empty schedule)
    pub fn current_wait(&self) -> Duration {
        self.schedule.get(self.step).copied().unwrap_or_default()
    }

    /// Move one step up the schedule, staying on the last step once reached
    pub fn escalate(&mut self) {
        if self.step + 1 < self.schedule.len() {
            self.step += 1;
        }
    }

    /// Return to the first step
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Current step index
    pub fn step(&self) -> usize {
        self.step
    }

    /// The full wait schedule
    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }
}

fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let span = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + span * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_linear_and_inclusive() {
        let backoff = Backoff::new(10.0, 100.0, 10);
        let secs: Vec<u64> = backoff.schedule().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(backoff.current_wait(), Duration::from_secs(10));
    }

    #[test]
    fn test_escalate_then_reset() {
        let mut backoff = Backoff::new(1.0, 4.0, 4);
        backoff.escalate();
        backoff.escalate();
        assert_eq!(backoff.step(), 2);
        assert_eq!(backoff.current_wait(), Duration::from_secs(3));

        backoff.reset();
        assert_eq!(backoff.step(), 0);
        assert_eq!(backoff.current_wait(), Duration::from_secs(1));
    }

    #[test]
    fn test_escalation_saturates_at_last_step() {
        for (start, end, steps) in [(10.0, 120.0, 10), (0.5, 2.0, 4), (5.0, 5.0, 1), (2.0, 60.0, 30)] {
            let mut backoff = Backoff::new(start, end, steps);
            let expected = linspace(start, end, steps);
            for n in 0..(steps * 2 + 3) {
                let idx = n.min(steps - 1);
                assert_eq!(
                    backoff.current_wait(),
                    Duration::from_secs_f64(expected[idx]),
                    "start={start} end={end} steps={steps} after {n} escalations"
                );
                backoff.escalate();
            }
            assert_eq!(backoff.step(), steps - 1);
            backoff.reset();
            assert_eq!(backoff.step(), 0);
        }
    }

    #[test]
    fn test_empty_schedule_never_panics() {
        let mut backoff = Backoff::new(1.0, 2.0, 0);
        backoff.escalate();
        assert_eq!(backoff.current_wait(), Duration::ZERO);
        assert_eq!(backoff.step(), 0);
    }

    #[test]
    fn test_negative_bounds_clamp_to_zero() {
        let backoff = Backoff::new(-5.0, 5.0, 3);
        assert_eq!(backoff.schedule()[0], Duration::ZERO);
        assert_eq!(backoff.schedule()[2], Duration::from_secs(5));
    }
}
