//! Station Wi-Fi with a cached fast path.
//!
//! The associate parameters carry an optional channel, BSSID, and
//! static IP remembered from the last wake. With all three set the
//! scan and DHCP exchange are skipped, which typically cuts the
//! connect from seconds to well under one.

use core::convert::TryInto;
use core::time::Duration;
use std::net::Ipv4Addr;
use std::time::Instant;

use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::ipv4::{
    ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
    Configuration as IpConfiguration, Mask, Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys;
use esp_idf_svc::wifi::EspWifi;

use inkframe_core::connectivity::{AssociateParams, LinkInfo, Radio, RadioError, StaticIpConfig};

use crate::config::{WIFI_PASSWORD, WIFI_SSID};

const POLL_INTERVAL_MS: u32 = 100;

pub struct EspRadio {
    wifi: EspWifi<'static>,
}

impl EspRadio {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> anyhow::Result<Self> {
        let wifi = EspWifi::new(modem, sys_loop, Some(nvs))?;
        Ok(Self { wifi })
    }

    fn apply_netif(&mut self, static_ip: Option<&StaticIpConfig>) -> Result<(), RadioError> {
        let conf = match static_ip {
            Some(fixed) => NetifConfiguration {
                ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
                    IpClientSettings {
                        ip: octets_to_addr(fixed.ip),
                        subnet: Subnet {
                            gateway: octets_to_addr(fixed.gateway),
                            mask: octets_to_mask(fixed.subnet),
                        },
                        dns: Some(octets_to_addr(fixed.dns)),
                        secondary_dns: None,
                    },
                ))),
                ..NetifConfiguration::wifi_default_client()
            },
            None => NetifConfiguration::wifi_default_client(),
        };

        let netif = EspNetif::new_with_conf(&conf).map_err(hw_err)?;
        self.wifi.swap_netif_sta(netif).map_err(hw_err)?;
        Ok(())
    }

    fn link_info(&self) -> Result<LinkInfo, RadioError> {
        let mut ap_info = sys::wifi_ap_record_t::default();
        let rc = unsafe { sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        if rc != sys::ESP_OK {
            return Err(RadioError::Hardware(format!(
                "esp_wifi_sta_get_ap_info failed: {}",
                rc
            )));
        }

        let info = self
            .wifi
            .sta_netif()
            .get_ip_info()
            .map_err(hw_err)?;

        Ok(LinkInfo {
            channel: ap_info.primary,
            bssid: ap_info.bssid,
            ip: info.ip.octets(),
            gateway: info.subnet.gateway.octets(),
            subnet: mask_to_octets(info.subnet.mask),
            dns: info.dns.map(|addr| addr.octets()).unwrap_or([0; 4]),
        })
    }
}

impl Radio for EspRadio {
    fn associate(
        &mut self,
        params: &AssociateParams,
        timeout: Duration,
    ) -> Result<LinkInfo, RadioError> {
        if self.wifi.is_started().unwrap_or(false) {
            let _ = self.wifi.stop();
        }
        self.apply_netif(params.static_ip.as_ref())?;

        let auth_method = if WIFI_PASSWORD.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let conf = Configuration::Client(ClientConfiguration {
            ssid: WIFI_SSID
                .try_into()
                .map_err(|_| RadioError::Hardware("SSID too long".into()))?,
            password: WIFI_PASSWORD
                .try_into()
                .map_err(|_| RadioError::Hardware("password too long".into()))?,
            auth_method,
            channel: params.channel,
            bssid: params.bssid,
            ..Default::default()
        });

        self.wifi.set_configuration(&conf).map_err(hw_err)?;
        self.wifi.start().map_err(hw_err)?;
        // Power save slows association; the radio is only up for a few
        // seconds per wake anyway.
        unsafe {
            sys::esp_wifi_set_ps(sys::wifi_ps_type_t_WIFI_PS_NONE);
        }
        self.wifi.connect().map_err(hw_err)?;

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let connected = self.wifi.is_connected().unwrap_or(false);
            if connected {
                let ip = self
                    .wifi
                    .sta_netif()
                    .get_ip_info()
                    .map(|info| info.ip)
                    .unwrap_or(Ipv4Addr::UNSPECIFIED);
                if ip != Ipv4Addr::UNSPECIFIED {
                    break;
                }
            }
            if Instant::now() >= deadline {
                let _ = self.wifi.stop();
                return Err(RadioError::Timeout);
            }
            FreeRtos::delay_ms(POLL_INTERVAL_MS);
        }

        let link = self.link_info()?;
        log::info!(
            "associated in {} ms (channel {}, ip {}.{}.{}.{})",
            started.elapsed().as_millis(),
            link.channel,
            link.ip[0],
            link.ip[1],
            link.ip[2],
            link.ip[3]
        );
        Ok(link)
    }

    fn shutdown(&mut self) {
        let _ = self.wifi.disconnect();
        let _ = self.wifi.stop();
    }
}

fn hw_err(err: esp_idf_svc::sys::EspError) -> RadioError {
    RadioError::Hardware(err.to_string())
}

fn octets_to_addr(octets: [u8; 4]) -> Ipv4Addr {
    Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])
}

fn octets_to_mask(octets: [u8; 4]) -> Mask {
    Mask(u32::from_be_bytes(octets).leading_ones() as u8)
}

fn mask_to_octets(mask: Mask) -> [u8; 4] {
    if mask.0 == 0 {
        return [0; 4];
    }
    (u32::MAX << (32 - u32::from(mask.0))).to_be_bytes()
}
