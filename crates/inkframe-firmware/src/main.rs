mod api;
mod blobfs;
mod config;
mod nvs;
mod panel;
mod power;
mod wifi;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputPin, OutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys;

use inkframe_core::connectivity::ConnectivityManager;
use inkframe_core::display::DisplaySequencer;
use inkframe_core::sleep::{Power, SleepScheduler, WakeTrigger};
use inkframe_core::state::ConnectivityHint;
use inkframe_core::store::StateStore;
use inkframe_core::cycle::WakeCycle;

use api::HttpApi;
use blobfs::FlashBlobStore;
use nvs::NvsKv;
use panel::Epd4in0e;
use power::EspPower;
use wifi::EspRadio;

// Survives deep sleep in RTC retention memory; zeroed on cold boot.
#[link_section = ".rtc.data"]
static mut CONNECTIVITY_HINT: ConnectivityHint = ConnectivityHint::empty();
#[link_section = ".rtc.data"]
static mut CYCLE_COUNT: u32 = 0;

/// One-time provisioning: baked in at build time and copied to NVS on
/// the first wake that finds no stored key.
const PROVISIONED_DEVICE_KEY: Option<&str> = option_env!("INKFRAME_DEVICE_KEY");

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let mut power = EspPower::new();
    let trigger = power.wake_trigger();

    let (cycle_number, mut hint) = unsafe {
        let count = core::ptr::addr_of_mut!(CYCLE_COUNT);
        *count += 1;
        (*count, *core::ptr::addr_of!(CONNECTIVITY_HINT))
    };
    log::info!("wake #{} ({:?})", cycle_number, trigger);
    log_heap("wake");

    if trigger == WakeTrigger::ColdBoot {
        hint.invalidate();
    }

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut store = StateStore::new(NvsKv::new(nvs_partition.clone())?);
    if store.load_device_key().is_none() {
        if let Some(key) = PROVISIONED_DEVICE_KEY {
            match store.save_device_key(key) {
                Ok(()) => log::info!("device key provisioned from build"),
                Err(err) => log::error!("device key provisioning failed: {}", err),
            }
        }
    }

    let mut blobs = FlashBlobStore::mount()?;

    let radio = EspRadio::new(peripherals.modem, sys_loop, nvs_partition)?;
    let mut network = ConnectivityManager::new(radio);
    let mut api = HttpApi::new(device_id());

    let spi = SpiDriver::new(
        peripherals.spi2,
        peripherals.pins.gpio18,
        peripherals.pins.gpio23,
        Option::<AnyIOPin>::None,
        &SpiDriverConfig::new(),
    )?;
    let spi_config = SpiConfig::default()
        .baudrate(Hertz(10_000_000))
        .data_mode(embedded_hal::spi::MODE_0);
    let spi_device = SpiDeviceDriver::new(spi, Some(peripherals.pins.gpio5), &spi_config)?;

    let dc = PinDriver::output(peripherals.pins.gpio17.downgrade_output())?;
    let rst = PinDriver::output(peripherals.pins.gpio16.downgrade_output())?;
    let busy = PinDriver::input(peripherals.pins.gpio4.downgrade_input())?;
    let mut display = DisplaySequencer::new(Epd4in0e::new(
        spi_device,
        dc,
        rst,
        busy,
        EspPower::with_gpio_wake(config::PANEL_BUSY_GPIO),
    ));

    let outcome = {
        let mut cycle = WakeCycle {
            store: &mut store,
            blobs: &mut blobs,
            network: &mut network,
            api: &mut api,
            display: &mut display,
        };
        cycle.run(trigger, &mut hint)
    };
    log::info!("cycle finished: {:?}", outcome);
    log_heap("pre-sleep");

    unsafe {
        *core::ptr::addr_of_mut!(CONNECTIVITY_HINT) = hint;
    }

    network.radio_mut().shutdown();

    // Close storage handles before cutting power: the FAT unmount runs
    // in the blob store's Drop and NVS closes with the store.
    drop(blobs);
    drop(store);

    power.deep_sleep(&SleepScheduler::next_wake_plan())
}

/// Stable per-unit identifier from the factory MAC.
fn device_id() -> String {
    let mut mac = [0u8; 6];
    unsafe {
        sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac.iter().map(|byte| format!("{:02x}", byte)).collect()
}

fn log_heap(label: &str) {
    let free_heap = unsafe { sys::esp_get_free_heap_size() };
    let min_free = unsafe { sys::esp_get_minimum_free_heap_size() };
    log::info!(
        "[HEAP] {}: free={} bytes min_free={} bytes",
        label,
        free_heap,
        min_free
    );
}
