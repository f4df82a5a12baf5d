//! Hardware-independent core of the inkframe photo frame firmware.
//!
//! Everything the device does between waking and sleeping lives here,
//! behind traits for the radio, backend API, key/value store, blob
//! partition, and panel. The firmware crate supplies the ESP-IDF
//! implementations; tests supply in-memory ones from [`testkit`].

#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::unreachable,
        clippy::unwrap_used
    )
)]

pub mod blob;
pub mod config;
pub mod connectivity;
pub mod cycle;
pub mod display;
pub mod sleep;
pub mod slideshow;
pub mod state;
pub mod store;
pub mod sync;
pub mod testkit;

pub use blob::{BlobError, BlobStore};
pub use connectivity::{ConnectivityManager, Radio, RadioError};
pub use cycle::{CycleOutcome, WakeCycle};
pub use display::{DisplayDriver, DisplaySequencer};
pub use sleep::{Power, SleepScheduler, WakePlan, WakeTrigger};
pub use state::{ConnectivityHint, DeviceState};
pub use store::{KvStore, StateStore};
pub use sync::{RemoteApi, SyncClient};
