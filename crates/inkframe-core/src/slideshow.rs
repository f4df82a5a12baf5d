//! Slideshow progression.
//!
//! Decides, once per wake, whether the panel needs a refresh and which
//! image it should show. The wake counter advances the slide every
//! `WAKES_PER_CYCLE` wakes; a fresh sync or a recovered flash always
//! forces a refresh.

use crate::config::WAKES_PER_CYCLE;
use crate::state::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowState {
    /// Nothing stored and nothing recovered; the panel keeps whatever
    /// it already shows.
    NoImages,
    /// Counter advanced but the slide did not change.
    Idle,
    /// The slide index moved and the panel must be refreshed.
    NeedsAdvance,
    NeedsDisplay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayReason {
    /// A new slideshow version was just adopted. The only reason that
    /// is acked back to the server.
    NewSlideshow,
    SlideAdvance,
    /// Durable record was empty but images were found on flash.
    SelfHeal,
    ManualAdvance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideshowOutcome {
    pub state: SlideshowState,
    pub reason: Option<DisplayReason>,
}

impl SlideshowOutcome {
    fn display(reason: DisplayReason) -> Self {
        Self {
            state: SlideshowState::NeedsDisplay,
            reason: Some(reason),
        }
    }

    fn quiet(state: SlideshowState) -> Self {
        Self { state, reason: None }
    }

    pub fn needs_display(&self) -> bool {
        self.state == SlideshowState::NeedsDisplay
    }
}

/// Evaluates one timer wake. `synced` marks a slideshow adopted this
/// cycle; `discovered_slots` is the contiguous populated slot count,
/// consulted only when the durable record says the store is empty.
pub fn evaluate_wake(
    state: &mut DeviceState,
    synced: bool,
    discovered_slots: usize,
) -> SlideshowOutcome {
    if synced {
        return SlideshowOutcome::display(DisplayReason::NewSlideshow);
    }

    if !state.has_images() && discovered_slots > 0 {
        log::warn!(
            "durable record empty but {} images on flash, re-adopting",
            discovered_slots
        );
        state.image_count = discovered_slots;
        state.image_ids = vec![String::new(); discovered_slots];
        state.image_hashes = vec![String::new(); discovered_slots];
        state.current_image_index = 0;
        return SlideshowOutcome::display(DisplayReason::SelfHeal);
    }

    if !state.has_images() {
        return SlideshowOutcome::quiet(SlideshowState::NoImages);
    }

    state.wake_counter += 1;
    if state.wake_counter >= WAKES_PER_CYCLE {
        state.wake_counter = 0;
        state.advance_image();
        log::info!("slide advanced to index {}", state.current_image_index);
        return SlideshowOutcome::display(DisplayReason::SlideAdvance);
    }
    log::info!(
        "wake {}/{}, keeping current slide",
        state.wake_counter,
        WAKES_PER_CYCLE
    );
    SlideshowOutcome::quiet(SlideshowState::Idle)
}

/// External (button) wake: advance immediately and restart the
/// interval so the new slide gets its full dwell time.
pub fn manual_advance(state: &mut DeviceState) -> SlideshowOutcome {
    if !state.has_images() {
        return SlideshowOutcome::quiet(SlideshowState::NoImages);
    }
    state.advance_image();
    state.wake_counter = 0;
    SlideshowOutcome::display(DisplayReason::ManualAdvance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(count: usize, index: usize, counter: u32) -> DeviceState {
        DeviceState {
            image_count: count,
            current_image_index: index,
            wake_counter: counter,
            image_ids: vec![String::new(); count],
            image_hashes: vec![String::new(); count],
            ..Default::default()
        }
    }

    #[test]
    fn sync_forces_display() {
        let mut state = state_with(3, 1, 2);
        let outcome = evaluate_wake(&mut state, true, 0);
        assert_eq!(outcome.reason, Some(DisplayReason::NewSlideshow));
    }

    #[test]
    fn mid_cycle_wake_only_counts() {
        let mut state = state_with(3, 1, 2);
        let outcome = evaluate_wake(&mut state, false, 0);
        assert_eq!(outcome.state, SlideshowState::Idle);
        assert_eq!(state.wake_counter, 3);
        assert_eq!(state.current_image_index, 1);
    }

    #[test]
    fn final_wake_of_cycle_advances_slide() {
        let mut state = state_with(3, 1, WAKES_PER_CYCLE - 1);
        let outcome = evaluate_wake(&mut state, false, 0);
        assert_eq!(outcome.reason, Some(DisplayReason::SlideAdvance));
        assert_eq!(state.wake_counter, 0);
        assert_eq!(state.current_image_index, 2);
    }

    #[test]
    fn empty_record_with_flash_images_self_heals() {
        let mut state = state_with(0, 0, 0);
        let outcome = evaluate_wake(&mut state, false, 4);
        assert_eq!(outcome.reason, Some(DisplayReason::SelfHeal));
        assert_eq!(state.image_count, 4);
        assert_eq!(state.image_ids, vec![String::new(); 4]);
        assert_eq!(state.current_image_index, 0);
    }

    #[test]
    fn truly_empty_device_stays_quiet() {
        let mut state = state_with(0, 0, 0);
        let outcome = evaluate_wake(&mut state, false, 0);
        assert_eq!(outcome.state, SlideshowState::NoImages);
        assert_eq!(state.wake_counter, 0);
    }

    #[test]
    fn manual_advance_restarts_interval() {
        let mut state = state_with(3, 0, 4);
        let outcome = manual_advance(&mut state);
        assert_eq!(outcome.reason, Some(DisplayReason::ManualAdvance));
        assert_eq!(state.current_image_index, 1);
        assert_eq!(state.wake_counter, 0);
    }

    #[test]
    fn manual_advance_without_images_is_quiet() {
        let mut state = state_with(0, 0, 0);
        let outcome = manual_advance(&mut state);
        assert_eq!(outcome.state, SlideshowState::NoImages);
    }
}
