//! Panel refresh sequencing.
//!
//! The panel draws a lot of current while refreshing, so the radio is
//! shut down first. Frames stream from the blob store straight into
//! the driver; a full frame never sits in RAM.

use crate::blob::{BlobError, BlobStore};
use crate::connectivity::Radio;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    Driver(String),
    Blob(BlobError),
}

impl core::fmt::Display for DisplayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DisplayError::Driver(msg) => write!(f, "panel error: {}", msg),
            DisplayError::Blob(err) => write!(f, "frame read failed: {}", err),
        }
    }
}

impl From<BlobError> for DisplayError {
    fn from(err: BlobError) -> Self {
        DisplayError::Blob(err)
    }
}

pub trait DisplayDriver {
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Pushes one packed full frame from `frame` and runs the refresh
    /// waveform to completion.
    fn push_full_frame(&mut self, frame: &mut dyn std::io::Read) -> Result<(), DisplayError>;

    /// Puts the panel into its low-power state. Always attempted, even
    /// after a failed refresh.
    fn sleep(&mut self) -> Result<(), DisplayError>;
}

pub struct DisplaySequencer<D: DisplayDriver> {
    driver: D,
    initialized: bool,
}

impl<D: DisplayDriver> DisplaySequencer<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            initialized: false,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Shows the image in `index`. Initializes the panel on first use,
    /// powers the radio down before the waveform runs, and puts the
    /// panel back to sleep afterwards.
    pub fn show<R: Radio>(
        &mut self,
        blobs: &mut dyn BlobStore,
        index: usize,
        radio: &mut R,
    ) -> Result<(), DisplayError> {
        if !self.initialized {
            self.driver.init()?;
            self.initialized = true;
        }

        radio.shutdown();

        let refresh = {
            let mut frame = blobs.open_for_read(index)?;
            self.driver.push_full_frame(frame.as_mut())
        };
        let sleep = self.driver.sleep();

        refresh?;
        sleep
    }
}
