// config.rs

use std::net;

use anyhow::bail;
use crc::{Crc, CRC_32_ISCSI};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{coap::Destination, KvStore};

pub const NVS_BUF_SIZE: usize = 256;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSPHRASE_LEN: usize = 64;
pub const MAX_STATION_NAME_LEN: usize = 64;

const DEFAULT_POLL_INTERVAL: u16 = 600;

const CONFIG_NAME: &str = "cfg";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub station_name: String,

    pub use_celsius: bool,
    pub poll_interval: u16,
    pub dest_uri: String,
    pub use_ap_cache: bool,

    pub v4dhcp: bool,
    pub v4addr: net::Ipv4Addr,
    pub v4mask: u8,
    pub v4gw: net::Ipv4Addr,
    pub dns1: net::Ipv4Addr,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: option_env!("WIFI_SSID").unwrap_or("internet").into(),
            wifi_pass: option_env!("WIFI_PASS").unwrap_or("password").into(),
            station_name: option_env!("STATION_NAME").unwrap_or("tempnode").into(),

            use_celsius: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            dest_uri: option_env!("DEST_URI")
                .unwrap_or("coap://coap.local/temperature")
                .into(),
            use_ap_cache: true,

            v4dhcp: true,
            v4addr: net::Ipv4Addr::new(0, 0, 0, 0),
            v4mask: 0,
            v4gw: net::Ipv4Addr::new(0, 0, 0, 0),
            dns1: net::Ipv4Addr::new(0, 0, 0, 0),
        }
    }
}

impl NodeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval as u64)
    }

    pub fn unit_suffix(&self) -> &'static str {
        if self.use_celsius {
            "C"
        } else {
            "F"
        }
    }

    /// Refuses anything that would make a connect attempt pointless.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.wifi_ssid.is_empty() {
            bail!("SSID is not set");
        }
        if self.wifi_ssid.len() > MAX_SSID_LEN {
            bail!("SSID too long, maximum is {MAX_SSID_LEN} characters");
        }
        if self.wifi_pass.len() > MAX_PASSPHRASE_LEN {
            bail!("password too long, maximum is {MAX_PASSPHRASE_LEN} characters");
        }
        if self.station_name.is_empty() {
            bail!("station name is not set");
        }
        if self.station_name.len() > MAX_STATION_NAME_LEN {
            bail!("station name too long, maximum is {MAX_STATION_NAME_LEN} characters");
        }
        if self.poll_interval == 0 {
            bail!("poll interval must be between 1..65535 seconds");
        }
        Destination::parse(&self.dest_uri)?;

        if !self.v4dhcp {
            if self.v4addr.is_unspecified() {
                bail!("static IPv4 address is not set");
            }
            if self.v4mask > 30 {
                bail!("IPv4 mask error: bits must be between 0..30");
            }
        }
        Ok(())
    }

    pub fn from_nvs(nvs: &mut impl KvStore) -> Option<Self> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
            Err(e) => {
                error!("Nvs read error {e:?}");
                return None;
            }
            Ok(Some(b)) => b,
            _ => {
                error!("Nvs key not found");
                return None;
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());

        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::from_bytes_crc32::<NodeConfig>(b, digest) {
            Ok(c) => {
                info!("Successfully parsed config from nvs.");
                Some(c)
            }
            Err(e) => {
                error!("Cannot parse config from nvs: {e:?}");
                None
            }
        }
    }

    pub fn to_nvs(&self, nvs: &mut impl KvStore) -> anyhow::Result<()> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        let nvsdata = match postcard::to_slice_crc32(self, &mut nvsbuf, digest) {
            Ok(d) => d,
            Err(e) => {
                bail!("Cannot encode config to buffer {e:?}");
            }
        };
        info!(
            "Encoded config to {sz} bytes. Saving to nvs...",
            sz = nvsdata.len()
        );

        match nvs.set_raw(CONFIG_NAME, nvsdata) {
            Ok(_) => {
                info!("Config saved.");
                Ok(())
            }
            Err(e) => {
                bail!("Cannot save to nvs: {e:?}");
            }
        }
    }

    /// Boot-time load: use what flash holds, otherwise persist and use defaults.
    pub fn load_or_default(nvs: &mut impl KvStore) -> anyhow::Result<Self> {
        match Self::from_nvs(nvs) {
            Some(c) => Ok(c),
            None => {
                error!("Could not read nvs config, using defaults");
                let c = Self::default();
                c.to_nvs(nvs)?;
                info!("Successfully saved default config to nvs.");
                Ok(c)
            }
        }
    }
}

/// Every retry cap and timeout in the duty cycle. Not persisted.
#[derive(Clone, Debug)]
pub struct Tunables {
    pub sample_attempts: u32,
    pub sensor_config_attempts: u32,
    pub radio_reconnects: u32,
    pub connect_wait: Duration,
    pub send_wait: Duration,
    pub ack_timeout: Duration,
    pub poweroff_wait: Duration,
    pub pause_delay: Duration,
    /// DS18B20 power-on-reset value in Celsius; never a real measurement.
    pub sentinel: f32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            sample_attempts: 5,
            sensor_config_attempts: 5,
            radio_reconnects: 3,
            connect_wait: Duration::from_secs(30),
            send_wait: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(5),
            poweroff_wait: Duration::from_secs(5),
            pause_delay: Duration::from_secs(10),
            sentinel: 85.0,
        }
    }
}


// EOF
