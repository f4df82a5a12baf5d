//! Wake cycle orchestration.
//!
//! One wake is one straight-line pass: load state, connect, sync if
//! the server moved, decide the slide, refresh if needed, ack a new
//! slideshow, commit, and report. The caller (firmware `main`) enters
//! deep sleep afterwards; this module never sleeps the device itself,
//! which keeps every branch host-testable.

use crate::blob::{self, BlobStore};
use crate::connectivity::{ConnectivityManager, Radio};
use crate::display::{DisplayDriver, DisplaySequencer};
use crate::sleep::WakeTrigger;
use crate::slideshow::{self, DisplayReason, SlideshowOutcome, SlideshowState};
use crate::state::ConnectivityHint;
use crate::store::{KvStore, StateStore};
use crate::sync::{self, RemoteApi, SyncClient};

/// What one wake cycle did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub trigger: WakeTrigger,
    pub synced: bool,
    pub displayed: bool,
    pub acked: bool,
    pub committed: bool,
    pub slideshow: SlideshowOutcome,
}

pub struct WakeCycle<'a, K, B, R, A, D>
where
    K: KvStore,
    B: BlobStore,
    R: Radio,
    A: RemoteApi,
    D: DisplayDriver,
{
    pub store: &'a mut StateStore<K>,
    pub blobs: &'a mut B,
    pub network: &'a mut ConnectivityManager<R>,
    pub api: &'a mut A,
    pub display: &'a mut DisplaySequencer<D>,
}

impl<'a, K, B, R, A, D> WakeCycle<'a, K, B, R, A, D>
where
    K: KvStore,
    B: BlobStore,
    R: Radio,
    A: RemoteApi,
    D: DisplayDriver,
{
    /// Runs one cycle to completion. Never panics and never aborts
    /// early on a degraded step; every failure downgrades the cycle
    /// and the device still reaches deep sleep.
    pub fn run(&mut self, trigger: WakeTrigger, hint: &mut ConnectivityHint) -> CycleOutcome {
        let mut state = self.store.load();
        let mut outcome = CycleOutcome {
            trigger,
            synced: false,
            displayed: false,
            acked: false,
            committed: false,
            slideshow: SlideshowOutcome {
                state: SlideshowState::Idle,
                reason: None,
            },
        };

        if trigger == WakeTrigger::External {
            // Button wake: no network, just flip to the next slide and
            // restart the dwell interval.
            outcome.slideshow = slideshow::manual_advance(&mut state);
            if outcome.slideshow.needs_display() {
                outcome.displayed = self.show_current(&state);
            }
            outcome.committed = self.commit_degraded(&state);
            return outcome;
        }

        let device_key = match self.store.load_device_key() {
            Some(key) => key,
            None => {
                log::error!("no device key provisioned, skipping cycle");
                return outcome;
            }
        };

        if let Err(err) = self.network.connect(hint) {
            log::warn!("offline this cycle: {}", err);
            // Re-push the cached frame so a brownout during the last
            // refresh cannot leave the panel blank until connectivity
            // returns.
            if state.has_images() {
                outcome.displayed = self.show_current(&state);
            }
            return outcome;
        }

        let mut client = SyncClient::new(&mut *self.api, &device_key);
        match client.check_version() {
            Ok(server) => {
                if sync::should_resync(server, state.slideshow_version) {
                    match client.sync_slideshow(self.blobs, &mut state) {
                        Ok(()) => outcome.synced = true,
                        Err(err) => {
                            log::warn!("sync failed, keeping current slideshow: {}", err);
                        }
                    }
                } else {
                    log::info!("slideshow v{} is current", state.slideshow_version);
                }
            }
            Err(err) => {
                log::warn!("version check failed: {}", err);
            }
        }

        let discovered = if state.has_images() {
            0
        } else {
            blob::discover_slots(self.blobs)
        };
        outcome.slideshow = slideshow::evaluate_wake(&mut state, outcome.synced, discovered);

        if outcome.slideshow.needs_display() {
            outcome.displayed = self.show_current(&state);
        }

        if outcome.displayed && outcome.slideshow.reason == Some(DisplayReason::NewSlideshow) {
            outcome.acked = self.ack(hint, &device_key, state.slideshow_version);
        }

        outcome.committed = self.commit_degraded(&state);
        outcome
    }

    fn show_current(&mut self, state: &crate::state::DeviceState) -> bool {
        match self
            .display
            .show(self.blobs, state.current_image_index, self.network.radio_mut())
        {
            Ok(()) => true,
            Err(err) => {
                log::error!("panel refresh failed: {}", err);
                false
            }
        }
    }

    /// The refresh powered the radio down, so the ack needs its own
    /// reconnect. A lost ack is fine: the server keeps flagging the
    /// version as new and the next wake re-syncs and acks again.
    fn ack(&mut self, hint: &mut ConnectivityHint, device_key: &str, version: u32) -> bool {
        if let Err(err) = self.network.quick_reconnect(hint) {
            log::warn!("reconnect for ack failed: {}", err);
            return false;
        }
        let mut client = SyncClient::new(&mut *self.api, device_key);
        match client.ack_displayed(version) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("ack failed, server will re-offer v{}: {}", version, err);
                false
            }
        }
    }

    fn commit_degraded(&mut self, state: &crate::state::DeviceState) -> bool {
        match self.store.commit(state) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("state commit failed: {}", err);
                false
            }
        }
    }
}
