use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

/// Bounded readiness polling: at most `max_attempts` probes with `delay`
/// between consecutive ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(2),
        }
    }
}

impl Poller {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn wait_until_ready<E, P>(&self, probe: P) -> bool
    where
        E: Display,
        P: FnMut() -> Result<bool, E>,
    {
        self.wait_until_ready_with(probe, std::thread::sleep)
    }

    /// Like [`Poller::wait_until_ready`] with an injectable sleep. A probe
    /// error counts as "not ready".
    pub fn wait_until_ready_with<E, P, S>(&self, mut probe: P, mut sleep: S) -> bool
    where
        E: Display,
        P: FnMut() -> Result<bool, E>,
        S: FnMut(Duration),
    {
        for attempt in 1..=self.max_attempts {
            match probe() {
                Ok(true) => {
                    debug!("ready after {attempt} attempt(s)");
                    return true;
                }
                Ok(false) => debug!("not ready ({attempt}/{})", self.max_attempts),
                Err(e) => debug!("readiness probe failed ({attempt}/{}): {e}", self.max_attempts),
            }
            if attempt < self.max_attempts {
                sleep(self.delay);
            }
        }
        false
    }
}
