// wifi.rs

use std::future::Future;

use crate::{ApCacheEntry, NodeConfig};

/// Station-mode radio. Every call is one step; retry policy lives in the network unit.
pub trait Radio {
    /// Sets credentials. With a hint the radio skips scanning and goes
    /// straight for that channel and BSSID.
    fn configure(
        &mut self,
        config: &NodeConfig,
        hint: Option<ApCacheEntry>,
    ) -> impl Future<Output = anyhow::Result<()>>;

    fn start(&mut self) -> impl Future<Output = anyhow::Result<()>>;

    /// One association attempt. Resolves once the interface is up, reporting
    /// the access point actually joined, or with the reason it failed.
    fn connect(&mut self) -> impl Future<Output = anyhow::Result<ApCacheEntry>>;

    fn disconnect(&mut self) -> impl Future<Output = anyhow::Result<()>>;

    fn stop(&mut self) -> impl Future<Output = anyhow::Result<()>>;
}

#[cfg(feature = "esp")]
pub use esp::*;

#[cfg(feature = "esp")]
mod esp {
    use anyhow::anyhow;
    use embedded_svc::wifi::{ClientConfiguration, Configuration};
    use esp_idf_svc::{
        eventloop::EspSystemEventLoop,
        ipv4,
        netif::{self, EspNetif},
        timer::EspTaskTimerService,
        wifi::{AsyncWifi, EspWifi, WifiDriver},
    };
    use esp_idf_sys::{esp, esp_wifi_sta_get_ap_info, wifi_ap_record_t};
    use log::*;

    use super::Radio;
    use crate::{ApCacheEntry, NodeConfig};

    pub struct EspRadio<'a> {
        wifi: AsyncWifi<EspWifi<'a>>,
    }

    impl<'a> EspRadio<'a> {
        pub fn new(
            wifidriver: WifiDriver<'a>,
            sysloop: EspSystemEventLoop,
            timer: EspTaskTimerService,
            config: &NodeConfig,
        ) -> anyhow::Result<Self> {
            info!("Initializing Wi-Fi...");

            let ipv4_config = if config.v4dhcp {
                ipv4::ClientConfiguration::DHCP(ipv4::DHCPClientSettings::default())
            } else {
                ipv4::ClientConfiguration::Fixed(ipv4::ClientSettings {
                    ip: config.v4addr,
                    subnet: ipv4::Subnet {
                        gateway: config.v4gw,
                        mask: ipv4::Mask(config.v4mask),
                    },
                    dns: (!config.dns1.is_unspecified()).then_some(config.dns1),
                    secondary_dns: None,
                })
            };

            let net_if = EspNetif::new_with_conf(&netif::NetifConfiguration {
                ip_configuration: Some(ipv4::Configuration::Client(ipv4_config)),
                ..netif::NetifConfiguration::wifi_default_client()
            })?;

            let espwifi = EspWifi::wrap_all(wifidriver, net_if, EspNetif::new(netif::NetifStack::Ap)?)?;
            Ok(EspRadio {
                wifi: AsyncWifi::wrap(espwifi, sysloop, timer)?,
            })
        }
    }

    fn joined_ap() -> anyhow::Result<ApCacheEntry> {
        let mut rec: wifi_ap_record_t = Default::default();
        esp!(unsafe { esp_wifi_sta_get_ap_info(&mut rec) })?;
        Ok(ApCacheEntry {
            channel: rec.primary,
            bssid: rec.bssid,
        })
    }

    impl Radio for EspRadio<'_> {
        async fn configure(&mut self, config: &NodeConfig, hint: Option<ApCacheEntry>) -> anyhow::Result<()> {
            info!("WiFi setting credentials...");
            match &hint {
                Some(h) => info!("WiFi using cached AP {h}"),
                None => info!("WiFi will scan for {}", config.wifi_ssid),
            }
            self.wifi.set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: config
                    .wifi_ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("SSID too long"))?,
                password: config
                    .wifi_pass
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("password too long"))?,
                bssid: hint.map(|h| h.bssid),
                channel: hint.map(|h| h.channel),
                ..Default::default()
            }))?;
            Ok(())
        }

        async fn start(&mut self) -> anyhow::Result<()> {
            info!("WiFi driver starting...");
            Ok(Box::pin(self.wifi.start()).await?)
        }

        async fn connect(&mut self) -> anyhow::Result<ApCacheEntry> {
            info!("WiFi connecting...");
            Box::pin(self.wifi.connect()).await?;
            info!("WiFi waiting for association...");
            Box::pin(self.wifi.wait_netif_up()).await?;
            let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
            info!("WiFi connected, got ip {}", ip_info.ip);
            joined_ap()
        }

        async fn disconnect(&mut self) -> anyhow::Result<()> {
            Ok(Box::pin(self.wifi.disconnect()).await?)
        }

        async fn stop(&mut self) -> anyhow::Result<()> {
            info!("WiFi driver stopping...");
            Ok(Box::pin(self.wifi.stop()).await?)
        }
    }
}

// EOF
