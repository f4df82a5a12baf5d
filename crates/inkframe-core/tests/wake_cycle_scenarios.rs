//! End-to-end wake cycle scenarios against in-memory hardware doubles.

use inkframe_core::blob::BlobStore;
use inkframe_core::config::{IMAGE_SIZE_BYTES, WAKES_PER_CYCLE};
use inkframe_core::connectivity::{ConnectivityManager, LinkInfo, RadioError};
use inkframe_core::cycle::WakeCycle;
use inkframe_core::display::DisplaySequencer;
use inkframe_core::slideshow::{DisplayReason, SlideshowState};
use inkframe_core::sleep::WakeTrigger;
use inkframe_core::state::{ConnectivityHint, DeviceState};
use inkframe_core::store::StateStore;
use inkframe_core::sync::{ApiError, ManifestItem, SlideshowManifest, VersionInfo};
use inkframe_core::testkit::{
    MemoryBlobStore, MemoryKv, RecordingDisplay, ScriptedApi, ScriptedPayload, ScriptedRadio,
};

fn device_key() -> String {
    "ab".repeat(32)
}

fn link() -> LinkInfo {
    LinkInfo {
        channel: 1,
        bssid: [2; 6],
        ip: [192, 168, 1, 50],
        gateway: [192, 168, 1, 1],
        subnet: [255, 255, 255, 0],
        dns: [1, 1, 1, 1],
    }
}

fn frame(fill: u8) -> Vec<u8> {
    vec![fill; IMAGE_SIZE_BYTES]
}

struct Fixture {
    store: StateStore<MemoryKv>,
    blobs: MemoryBlobStore,
    network: ConnectivityManager<ScriptedRadio>,
    api: ScriptedApi,
    display: DisplaySequencer<RecordingDisplay>,
    hint: ConnectivityHint,
}

impl Fixture {
    /// Provisioned device with an adopted 3-image slideshow at v4 and
    /// a connectable radio.
    fn steady() -> Self {
        let mut store = StateStore::new(MemoryKv::new());
        store.save_device_key(&device_key()).unwrap();
        let mut blobs = MemoryBlobStore::new();
        for (i, fill) in [0x11u8, 0x22, 0x33].iter().enumerate() {
            let body = frame(*fill);
            blobs
                .put(i, &mut body.as_slice(), IMAGE_SIZE_BYTES)
                .unwrap();
        }
        let state = DeviceState {
            current_image_index: 1,
            wake_counter: 2,
            slideshow_version: 4,
            image_count: 3,
            image_ids: vec!["img-a".into(), "img-b".into(), "img-c".into()],
            image_hashes: vec!["h-a".into(), "h-b".into(), "h-c".into()],
        };
        store.commit(&state).unwrap();

        let mut api = ScriptedApi::new();
        api.version = Some(Ok(VersionInfo {
            version: 4,
            is_new: false,
        }));

        Self {
            store,
            blobs,
            network: ConnectivityManager::new(ScriptedRadio::new(vec![Ok(link()); 4])),
            api,
            display: DisplaySequencer::new(RecordingDisplay::new()),
            hint: ConnectivityHint::empty(),
        }
    }

    fn run(&mut self, trigger: WakeTrigger) -> inkframe_core::cycle::CycleOutcome {
        let mut cycle = WakeCycle {
            store: &mut self.store,
            blobs: &mut self.blobs,
            network: &mut self.network,
            api: &mut self.api,
            display: &mut self.display,
        };
        cycle.run(trigger, &mut self.hint)
    }

    fn offer_new_slideshow(&mut self, version: u32, items: &[(&str, &str, u8)]) {
        self.api.version = Some(Ok(VersionInfo {
            version,
            is_new: true,
        }));
        self.api.manifest = Some(Ok(SlideshowManifest {
            version,
            items: items
                .iter()
                .map(|(id, hash, _)| ManifestItem {
                    id: (*id).into(),
                    hash: (*hash).into(),
                })
                .collect(),
        }));
        for (id, _, fill) in items {
            self.api.add_payload(
                &format!("https://cdn.test/{}", id),
                ScriptedPayload {
                    body: frame(*fill),
                    declared_len: Some(IMAGE_SIZE_BYTES as u64),
                },
            );
        }
    }
}

#[test]
fn quiet_wake_counts_and_commits_without_refresh() {
    let mut fx = Fixture::steady();
    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    assert!(!outcome.displayed);
    assert!(!outcome.acked);
    assert!(outcome.committed);
    assert_eq!(outcome.slideshow.state, SlideshowState::Idle);

    let state = fx.store.load();
    assert_eq!(state.wake_counter, 3);
    assert_eq!(state.current_image_index, 1);
    assert_eq!(fx.display.driver().frames.len(), 0);
}

#[test]
fn final_wake_of_cycle_advances_and_refreshes_without_ack() {
    let mut fx = Fixture::steady();
    let mut state = fx.store.load();
    state.wake_counter = WAKES_PER_CYCLE - 1;
    fx.store.commit(&state).unwrap();

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(outcome.displayed);
    assert!(!outcome.acked);
    assert_eq!(outcome.slideshow.reason, Some(DisplayReason::SlideAdvance));
    assert!(fx.api.acks.is_empty());

    let state = fx.store.load();
    assert_eq!(state.wake_counter, 0);
    assert_eq!(state.current_image_index, 2);

    let display = fx.display.driver();
    assert_eq!(display.frames.len(), 1);
    assert_eq!(display.frames[0], frame(0x33));
}

#[test]
fn new_version_syncs_displays_and_acks() {
    let mut fx = Fixture::steady();
    fx.offer_new_slideshow(5, &[("new-a", "nh-a", 0x44), ("new-b", "nh-b", 0x55)]);

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(outcome.synced);
    assert!(outcome.displayed);
    assert!(outcome.acked);
    assert!(outcome.committed);
    assert_eq!(outcome.slideshow.reason, Some(DisplayReason::NewSlideshow));
    assert_eq!(fx.api.acks, vec![(device_key(), 5)]);

    let state = fx.store.load();
    assert_eq!(state.slideshow_version, 5);
    assert_eq!(state.image_count, 2);
    assert_eq!(state.image_ids, vec!["new-a".to_string(), "new-b".to_string()]);
    assert_eq!(state.current_image_index, 0);
    assert_eq!(state.wake_counter, 0);

    // The old third slot is gone and the first frame shown is the new
    // slot 0.
    assert_eq!(fx.blobs.slot_count(), 2);
    assert_eq!(fx.blobs.slot(0), Some(frame(0x44).as_slice()));
    let display = fx.display.driver();
    assert_eq!(display.frames[0], frame(0x44));
}

#[test]
fn failed_download_leaves_previous_slideshow_intact() {
    let mut fx = Fixture::steady();
    fx.offer_new_slideshow(5, &[("new-a", "nh-a", 0x44), ("new-b", "nh-b", 0x55)]);
    // Second image resolves to a URL with no payload behind it.
    fx.api.signed_urls = Some(Ok(vec![
        Some("https://cdn.test/new-a".into()),
        Some("https://cdn.test/missing".into()),
    ]));

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    assert!(outcome.committed);

    let state = fx.store.load();
    assert_eq!(state.slideshow_version, 4);
    assert_eq!(state.image_count, 3);
    assert_eq!(state.wake_counter, 3);
    // Slot 1 was never touched; only slot 0 got the new payload, and
    // the next successful sync will rewrite it.
    assert_eq!(fx.blobs.slot(1), Some(frame(0x22).as_slice()));
}

#[test]
fn download_without_declared_length_aborts_sync() {
    let mut fx = Fixture::steady();
    fx.offer_new_slideshow(5, &[("new-a", "nh-a", 0x44)]);
    // Oversized body behind a response with no Content-Length; an
    // unchecked stream would truncate at the slot size and adopt a
    // corrupt frame.
    fx.api.add_payload(
        "https://cdn.test/new-a",
        ScriptedPayload {
            body: vec![0x44; IMAGE_SIZE_BYTES + 1000],
            declared_len: None,
        },
    );

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    let state = fx.store.load();
    assert_eq!(state.slideshow_version, 4);
    assert_eq!(fx.blobs.slot(0), Some(frame(0x11).as_slice()));
}

#[test]
fn wrong_declared_length_aborts_sync_before_streaming() {
    let mut fx = Fixture::steady();
    fx.offer_new_slideshow(5, &[("new-a", "nh-a", 0x44)]);
    fx.api.add_payload(
        "https://cdn.test/new-a",
        ScriptedPayload {
            body: frame(0x44),
            declared_len: Some((IMAGE_SIZE_BYTES + 1) as u64),
        },
    );

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    assert_eq!(fx.store.load().slideshow_version, 4);
}

#[test]
fn unsigned_manifest_item_aborts_sync_before_any_download() {
    let mut fx = Fixture::steady();
    fx.offer_new_slideshow(5, &[("new-a", "nh-a", 0x44), ("new-b", "nh-b", 0x55)]);
    fx.api.signed_urls = Some(Ok(vec![None, Some("https://cdn.test/new-b".into())]));

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    assert!(fx.api.download_calls.is_empty());
    assert_eq!(fx.store.load().slideshow_version, 4);
}

#[test]
fn connect_failure_redisplays_cached_image_and_skips_commit() {
    let mut fx = Fixture::steady();
    fx.network = ConnectivityManager::new(ScriptedRadio::new(vec![
        Err(RadioError::Timeout),
        Err(RadioError::Timeout),
    ]));
    fx.hint.valid = true;

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    assert!(outcome.displayed);
    assert!(!outcome.committed);
    assert!(!fx.hint.valid);
    assert_eq!(fx.api.version_calls, 0);

    // Counter did not advance; the cached current slide was re-pushed.
    let state = fx.store.load();
    assert_eq!(state.wake_counter, 2);
    let display = fx.display.driver();
    assert_eq!(display.frames[0], frame(0x22));
}

#[test]
fn unprovisioned_device_does_nothing() {
    let mut fx = Fixture::steady();
    fx.store = StateStore::new(MemoryKv::new());

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.displayed);
    assert!(!outcome.committed);
    assert_eq!(fx.api.version_calls, 0);
    assert_eq!(fx.network.radio_mut().calls().len(), 0);
}

#[test]
fn button_wake_advances_immediately_without_network() {
    let mut fx = Fixture::steady();
    let outcome = fx.run(WakeTrigger::External);

    assert!(outcome.displayed);
    assert!(outcome.committed);
    assert_eq!(outcome.slideshow.reason, Some(DisplayReason::ManualAdvance));
    assert_eq!(fx.api.version_calls, 0);
    assert_eq!(fx.network.radio_mut().calls().len(), 0);

    let state = fx.store.load();
    assert_eq!(state.current_image_index, 2);
    assert_eq!(state.wake_counter, 0);
}

#[test]
fn empty_record_with_populated_flash_self_heals() {
    let mut fx = Fixture::steady();
    fx.store.commit(&DeviceState::default()).unwrap();

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(outcome.displayed);
    assert_eq!(outcome.slideshow.reason, Some(DisplayReason::SelfHeal));

    let state = fx.store.load();
    assert_eq!(state.image_count, 3);
    assert_eq!(state.image_ids, vec![String::new(); 3]);
    assert_eq!(state.current_image_index, 0);
}

#[test]
fn lost_ack_resyncs_same_version_next_wake() {
    let mut fx = Fixture::steady();
    fx.offer_new_slideshow(5, &[("new-a", "nh-a", 0x44)]);
    fx.api.ack_result = Err(ApiError::Timeout);

    let first = fx.run(WakeTrigger::Timer);
    assert!(first.synced);
    assert!(first.displayed);
    assert!(!first.acked);
    assert!(first.committed);

    // Server still flags v5 as new, so the next wake syncs it again
    // and the second ack lands.
    fx.api.ack_result = Ok(());
    let second = fx.run(WakeTrigger::Timer);
    assert!(second.synced);
    assert!(second.acked);

    let state = fx.store.load();
    assert_eq!(state.slideshow_version, 5);
    assert_eq!(state.wake_counter, 0);
    assert_eq!(fx.api.manifest_calls, 2);
}

#[test]
fn version_check_failure_degrades_to_quiet_wake() {
    let mut fx = Fixture::steady();
    fx.api.version = Some(Err(ApiError::Status(500)));

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.synced);
    assert!(outcome.committed);
    assert_eq!(fx.store.load().wake_counter, 3);
}

#[test]
fn failed_commit_is_reported_but_cycle_completes() {
    let mut fx = Fixture::steady();
    fx.store.kv_mut().corrupt_writes_to("wakeCnt");

    let outcome = fx.run(WakeTrigger::Timer);

    assert!(!outcome.committed);
    assert_eq!(outcome.slideshow.state, SlideshowState::Idle);
}
