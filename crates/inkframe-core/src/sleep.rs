//! Deep sleep scheduling.

use core::time::Duration;

use crate::config::WAKE_INTERVAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeTrigger {
    /// Scheduled timer expiry.
    Timer,
    /// Button press (ext0 wake line).
    External,
    /// Power-on or reset; RTC retention memory is gone.
    ColdBoot,
}

/// What the firmware arms before entering deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakePlan {
    pub timer: Duration,
    /// Arm the button wake line alongside the timer.
    pub external_wake: bool,
}

/// Platform power control. `deep_sleep` never returns; the next wake
/// restarts the program from the top.
pub trait Power {
    fn wake_trigger(&mut self) -> WakeTrigger;

    /// Polls `done` until it returns true or `timeout` elapses,
    /// napping between polls. Returns false on timeout.
    fn wait_until(&mut self, done: &mut dyn FnMut() -> bool, timeout: Duration) -> bool;

    fn deep_sleep(&mut self, plan: &WakePlan) -> !;
}

pub struct SleepScheduler;

impl SleepScheduler {
    /// Every cycle ends the same way: a full interval timer with the
    /// button armed. No outcome shortens or stretches the interval.
    pub fn next_wake_plan() -> WakePlan {
        WakePlan {
            timer: WAKE_INTERVAL,
            external_wake: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_plan_uses_full_interval_with_button_armed() {
        let plan = SleepScheduler::next_wake_plan();
        assert_eq!(plan.timer, WAKE_INTERVAL);
        assert!(plan.external_wake);
    }
}
