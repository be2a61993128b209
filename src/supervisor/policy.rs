use std::time::Duration;

/// Bounded, linearly backing-off automatic restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnPolicy {
    pub max_attempts: u32,
    pub delay_step: Duration,
    pub max_delay: Duration,
    /// A run longer than this starts a fresh failure streak.
    pub stability_window: Duration,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_step: Duration::from_secs(8),
            max_delay: Duration::from_secs(30),
            stability_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnDecision {
    Respawn { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

impl RespawnDecision {
    /// The respawn counter after this decision.
    pub fn count(&self) -> u32 {
        match self {
            Self::Respawn { attempt, .. } => *attempt,
            Self::GiveUp { attempts } => *attempts,
        }
    }
}

impl RespawnPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_step.saturating_mul(attempt).min(self.max_delay)
    }

    /// Decide what follows a process exit, given the counter before the exit
    /// and how long the run lasted.
    pub fn on_exit(&self, previous_count: u32, ran_for: Duration) -> RespawnDecision {
        let mut count = previous_count.saturating_add(1);
        if ran_for > self.stability_window {
            count = 1;
        }

        if count <= self.max_attempts {
            RespawnDecision::Respawn { attempt: count, delay: self.delay_for(count) }
        } else {
            RespawnDecision::GiveUp { attempts: count }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUICK_CRASH: Duration = Duration::from_secs(2);

    #[test]
    fn test_flapping_schedule() {
        let policy = RespawnPolicy::default();
        let mut count = 0;
        let mut delays = Vec::new();
        loop {
            match policy.on_exit(count, QUICK_CRASH) {
                RespawnDecision::Respawn { attempt, delay } => {
                    count = attempt;
                    delays.push(delay.as_secs());
                }
                RespawnDecision::GiveUp { attempts } => {
                    assert_eq!(attempts, 6);
                    break;
                }
            }
        }
        assert_eq!(delays, vec![8, 16, 24, 30, 30]);
    }

    #[test]
    fn test_long_run_resets_streak() {
        let policy = RespawnPolicy::default();
        let first = policy.on_exit(0, QUICK_CRASH);
        assert_eq!(first, RespawnDecision::Respawn { attempt: 1, delay: Duration::from_secs(8) });

        let second = policy.on_exit(first.count(), Duration::from_secs(70));
        assert_eq!(second, RespawnDecision::Respawn { attempt: 1, delay: Duration::from_secs(8) });
    }

    #[test]
    fn test_long_run_rescues_exhausted_counter() {
        let policy = RespawnPolicy::default();
        assert_eq!(
            policy.on_exit(5, Duration::from_secs(61)),
            RespawnDecision::Respawn { attempt: 1, delay: Duration::from_secs(8) }
        );
        assert_eq!(policy.on_exit(5, Duration::from_secs(60)), RespawnDecision::GiveUp { attempts: 6 });
    }

    #[test]
    fn test_zero_attempts_never_respawns() {
        let policy = RespawnPolicy { max_attempts: 0, ..Default::default() };
        assert_eq!(policy.on_exit(0, QUICK_CRASH), RespawnDecision::GiveUp { attempts: 1 });
    }
}
