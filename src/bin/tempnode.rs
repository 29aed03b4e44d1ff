// bin/tempnode.rs

#![warn(clippy::large_futures)]

use std::{io, sync::Arc, thread, time::Duration};

use esp_idf_hal::{delay::FreeRtos, gpio, prelude::Peripherals};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs, timer::EspTaskTimerService, wifi::WifiDriver};
use esp_idf_sys::{esp, esp_app_desc};
use log::*;
use one_wire_bus::OneWire;
use tempnode::*;
use tokio::time::sleep;

const CACHE_NAMESPACE: &str = "apcache";

esp_app_desc!();

#[allow(unreachable_code)]
fn main() -> anyhow::Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // eventfd is needed by our mio poll implementation.  Note you should set max_fds
    // higher if you have other code that may need eventfd.

    #[allow(clippy::needless_update)]
    let config = esp_idf_sys::esp_vfs_eventfd_config_t {
        max_fds: 1,
        ..Default::default()
    };
    esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

    info!("Hello.");
    info!("Starting up, firmware {FW_VERSION}.");

    let sysloop = EspSystemEventLoop::take()?;
    let timer = EspTaskTimerService::new()?;
    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

    let ns = env!("CARGO_BIN_NAME");
    let mut nvs = nvs::EspNvs::new(nvs_default_partition.clone(), ns, true)?;
    info!("Got namespace {ns:?} from default partition");
    let cache_nvs = nvs::EspNvs::new(nvs_default_partition.clone(), CACHE_NAMESPACE, true)?;

    #[cfg(feature = "reset_settings")]
    let config = {
        let c = NodeConfig::default();
        c.to_nvs(&mut nvs)?;
        c
    };

    #[cfg(not(feature = "reset_settings"))]
    let config = NodeConfig::load_or_default(&mut nvs)?;
    info!("My config:\n{config:#?}");

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    #[cfg(feature = "esp32c3")]
    let (data_pin, power_pin) = (pins.gpio3.downgrade(), pins.gpio2.downgrade_output());

    #[cfg(not(feature = "esp32c3"))]
    let (data_pin, power_pin) = (pins.gpio12.downgrade(), pins.gpio13.downgrade_output());

    let mut data_drv = gpio::PinDriver::input_output_od(data_pin)?;
    data_drv.set_pull(gpio::Pull::Up)?;
    let bus = OneWire::new(data_drv).map_err(|e| anyhow::anyhow!("one-wire init: {e:?}"))?;
    let sensor = Ds18b20Sensor::new(bus, gpio::PinDriver::output(power_pin)?);

    let wifidriver = WifiDriver::new(peripherals.modem, sysloop.clone(), Some(nvs_default_partition))?;
    let radio = EspRadio::new(wifidriver, sysloop, timer, &config)?;
    let transport = CoapTransport::new((unsafe { esp_idf_sys::esp_random() } & 0xffff) as u16);

    let state = Arc::new(NodeState::new(config, Tunables::default()));

    console_uart_init()?;
    let console_state = state.clone();
    thread::Builder::new()
        .name("console".into())
        .stack_size(4096)
        .spawn(move || {
            let stdin = io::stdin();
            if let Err(e) = run_console(&console_state, stdin.lock(), io::stdout()) {
                error!("Console ended: {e:?}");
            }
        })?;

    let res = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async {
            info!("Entering main loop...");
            tokio::select! {
                res = Box::pin(run_boot(state.clone(), sensor, radio, transport, cache_nvs)) => res,
                _ = Box::pin(poll_reset(state.clone())) => { bail!("poll_reset() ended.") }
            }
        }));

    match res {
        Ok(d) => {
            let us = d.as_micros() as u64;
            info!("Powering off for {us} us.");
            unsafe { esp_idf_sys::esp_deep_sleep(us) };
        }
        Err(e) => {
            error!("Boot failed: {e:?}");
        }
    }

    // only reached on failure, reboot
    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

// Without the driver, stdin reads through the VFS return at once and the
// console thread would see end of input.
fn console_uart_init() -> anyhow::Result<()> {
    let uart = esp_idf_sys::CONFIG_ESP_CONSOLE_UART_NUM as esp_idf_sys::uart_port_t;
    unsafe {
        // terminals send CR on enter
        esp_idf_sys::esp_vfs_dev_uart_set_rx_line_endings(esp_idf_sys::esp_line_endings_t_ESP_LINE_ENDINGS_CR);
        esp_idf_sys::esp_vfs_dev_uart_set_tx_line_endings(esp_idf_sys::esp_line_endings_t_ESP_LINE_ENDINGS_CRLF);
        esp!(esp_idf_sys::uart_driver_install(uart, 256, 0, 0, std::ptr::null_mut(), 0))?;
        esp_idf_sys::esp_vfs_dev_uart_use_driver(uart);
    }
    info!("Console on UART{uart}");
    Ok(())
}

async fn poll_reset(state: Arc<NodeState>) {
    loop {
        sleep(Duration::from_secs(1)).await;
        if state.restart_requested() {
            sleep(Duration::from_millis(500)).await;
            esp_idf_hal::reset::restart();
        }
    }
}

// EOF
