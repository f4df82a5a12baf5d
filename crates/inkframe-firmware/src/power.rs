//! Light and deep sleep entry and wake cause classification.

use core::time::Duration;

use esp_idf_svc::sys;

use inkframe_core::sleep::{Power, WakePlan, WakeTrigger};

use crate::config::BUTTON_GPIO;

pub struct EspPower {
    /// Extra light-sleep wake source: a high level on this GPIO ends
    /// the nap early. Used for the panel busy line.
    gpio_wake: Option<i32>,
}

impl EspPower {
    pub fn new() -> Self {
        Self { gpio_wake: None }
    }

    pub fn with_gpio_wake(gpio: i32) -> Self {
        Self {
            gpio_wake: Some(gpio),
        }
    }
}

impl Power for EspPower {
    fn wake_trigger(&mut self) -> WakeTrigger {
        let cause = unsafe { sys::esp_sleep_get_wakeup_cause() };
        #[allow(non_upper_case_globals)]
        match cause {
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeTrigger::Timer,
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0
            | sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1
            | sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => WakeTrigger::External,
            _ => WakeTrigger::ColdBoot,
        }
    }

    /// Naps in light sleep between predicate checks. The timer bounds
    /// each nap; the optional GPIO wake line cuts it short as soon as
    /// the level goes high.
    fn wait_until(&mut self, done: &mut dyn FnMut() -> bool, timeout: Duration) -> bool {
        let mut waited = Duration::ZERO;
        let step = Duration::from_millis(100);
        while !done() {
            if waited >= timeout {
                return false;
            }
            unsafe {
                if let Some(gpio) = self.gpio_wake {
                    sys::gpio_wakeup_enable(gpio, sys::gpio_int_type_t_GPIO_INTR_HIGH_LEVEL);
                    sys::esp_sleep_enable_gpio_wakeup();
                }
                sys::esp_sleep_enable_timer_wakeup(step.as_micros() as u64);
                sys::esp_light_sleep_start();
            }
            waited += step;
        }
        true
    }

    fn deep_sleep(&mut self, plan: &WakePlan) -> ! {
        log::info!(
            "entering deep sleep for {} s (button wake: {})",
            plan.timer.as_secs(),
            plan.external_wake
        );

        unsafe {
            sys::esp_sleep_enable_timer_wakeup(plan.timer.as_micros() as u64);
            if plan.external_wake {
                // Button pulls the line low.
                sys::esp_sleep_enable_ext0_wakeup(BUTTON_GPIO, 0);
            }
            sys::esp_deep_sleep_start();
        }
        unreachable!("esp_deep_sleep_start returned");
    }
}
