//! Waveshare 4.0" (E) six-color panel driver.
//!
//! Command and waveform sequences follow the vendor reference for
//! this panel. The frame is streamed into display RAM in chunks; the
//! controller latches it and runs the refresh on its own.

use std::io::Read;

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver};
use esp_idf_svc::hal::spi::{SpiDeviceDriver, SpiDriver};

use inkframe_core::config::{BUSY_WAIT_TIMEOUT, DOWNLOAD_CHUNK};
use inkframe_core::display::{DisplayDriver, DisplayError};
use inkframe_core::sleep::Power as _;

use crate::power::EspPower;

pub struct Epd4in0e<'d> {
    spi: SpiDeviceDriver<'d, SpiDriver<'d>>,
    dc: PinDriver<'d, AnyOutputPin, Output>,
    rst: PinDriver<'d, AnyOutputPin, Output>,
    busy: PinDriver<'d, AnyInputPin, Input>,
    power: EspPower,
}

impl<'d> Epd4in0e<'d> {
    pub fn new(
        spi: SpiDeviceDriver<'d, SpiDriver<'d>>,
        dc: PinDriver<'d, AnyOutputPin, Output>,
        rst: PinDriver<'d, AnyOutputPin, Output>,
        busy: PinDriver<'d, AnyInputPin, Input>,
        power: EspPower,
    ) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            power,
        }
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(esp_err)?;
        FreeRtos::delay_ms(20);
        self.rst.set_low().map_err(esp_err)?;
        FreeRtos::delay_ms(2);
        self.rst.set_high().map_err(esp_err)?;
        FreeRtos::delay_ms(20);
        Ok(())
    }

    fn command(&mut self, reg: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(esp_err)?;
        self.spi.write(&[reg]).map_err(esp_err)?;
        if !data.is_empty() {
            self.send_data(data)?;
        }
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(esp_err)?;
        self.spi.write(data).map_err(esp_err)?;
        Ok(())
    }

    /// BUSY is low while the controller works. The refresh waveform
    /// takes tens of seconds on this panel.
    fn wait_busy_high(&mut self) {
        let busy = &self.busy;
        if !self
            .power
            .wait_until(&mut || busy.is_high(), BUSY_WAIT_TIMEOUT)
        {
            log::warn!("panel busy wait timed out");
        }
        FreeRtos::delay_ms(200);
    }

    fn run_refresh(&mut self) -> Result<(), DisplayError> {
        self.command(0x04, &[])?; // power on
        self.wait_busy_high();
        FreeRtos::delay_ms(200);

        self.command(0x06, &[0x6F, 0x1F, 0x17, 0x27])?;
        FreeRtos::delay_ms(200);

        self.command(0x12, &[0x00])?; // display refresh
        self.wait_busy_high();

        self.command(0x02, &[0x00])?; // power off
        self.wait_busy_high();
        FreeRtos::delay_ms(200);
        Ok(())
    }
}

impl DisplayDriver for Epd4in0e<'_> {
    fn init(&mut self) -> Result<(), DisplayError> {
        self.reset()?;
        self.wait_busy_high();
        FreeRtos::delay_ms(30);

        self.command(0xAA, &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18])?;
        self.command(0x01, &[0x3F])?;
        self.command(0x00, &[0x5F, 0x69])?;
        self.command(0x05, &[0x40, 0x1F, 0x1F, 0x2C])?;
        self.command(0x08, &[0x6F, 0x1F, 0x1F, 0x22])?;
        self.command(0x06, &[0x6F, 0x1F, 0x17, 0x17])?;
        self.command(0x03, &[0x00, 0x54, 0x00, 0x44])?;
        self.command(0x60, &[0x02, 0x00])?;
        self.command(0x30, &[0x08])?;
        self.command(0x50, &[0x3F])?;
        self.command(0x61, &[0x01, 0x90, 0x02, 0x58])?; // 400 x 600
        self.command(0xE3, &[0x2F])?;
        self.command(0x84, &[0x01])?;
        self.wait_busy_high();
        Ok(())
    }

    fn push_full_frame(&mut self, frame: &mut dyn Read) -> Result<(), DisplayError> {
        self.command(0x10, &[])?; // start data transmission

        let mut buffer = vec![0u8; DOWNLOAD_CHUNK];
        loop {
            let n = frame
                .read(&mut buffer)
                .map_err(|err| DisplayError::Driver(err.to_string()))?;
            if n == 0 {
                break;
            }
            self.send_data(&buffer[..n])?;
        }

        self.run_refresh()
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.command(0x07, &[0xA5])
    }
}

fn esp_err(err: esp_idf_svc::sys::EspError) -> DisplayError {
    DisplayError::Driver(err.to_string())
}
