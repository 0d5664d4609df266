use std::time::Duration;

/// Inter-unit pacing between consecutive fetches. `Fixed` waits the
/// same interval every time; `Backoff` doubles the wait after a failed
/// unit (capped at `max`) and resets to `initial` once a unit succeeds,
/// easing off an API that has started throttling.
#[derive(Debug, Clone)]
pub enum PacingPolicy {
    Fixed(Duration),
    Backoff {
        initial: Duration,
        max: Duration,
        current: Duration,
    },
}

impl PacingPolicy {
    pub fn fixed(delay: Duration) -> Self {
        PacingPolicy::Fixed(delay)
    }

    pub fn backoff(initial: Duration, max: Duration) -> Self {
        PacingPolicy::Backoff {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next unit, given whether the unit that
    /// just finished failed.
    pub fn next_delay(&mut self, failed: bool) -> Duration {
        match self {
            PacingPolicy::Fixed(delay) => *delay,
            PacingPolicy::Backoff {
                initial,
                max,
                current,
            } => {
                if failed {
                    *current = (*current).saturating_mul(2).min(*max);
                } else {
                    *current = *initial;
                }
                *current
            }
        }
    }
}
