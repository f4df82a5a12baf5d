//! Wi-Fi association strategy.
//!
//! Two tiers: a fast path that reuses the channel, BSSID, and static
//! IP remembered from the previous wake, and a full scan + DHCP
//! fallback. The hint lives in RTC retention memory and is refreshed
//! after every successful association.

use core::time::Duration;

use crate::config::{FAST_CONNECT_TIMEOUT, FULL_CONNECT_TIMEOUT};
use crate::state::ConnectivityHint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    Timeout,
    AssociationFailed(String),
    Hardware(String),
}

impl core::fmt::Display for RadioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RadioError::Timeout => write!(f, "association timed out"),
            RadioError::AssociationFailed(msg) => write!(f, "association failed: {}", msg),
            RadioError::Hardware(msg) => write!(f, "radio hardware error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIpConfig {
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub subnet: [u8; 4],
    pub dns: [u8; 4],
}

/// Association request. `None` fields mean scan/negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssociateParams {
    pub channel: Option<u8>,
    pub bssid: Option<[u8; 6]>,
    pub static_ip: Option<StaticIpConfig>,
}

/// Link parameters observed after a successful association, used to
/// refresh the hint for the next wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub channel: u8,
    pub bssid: [u8; 6],
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub subnet: [u8; 4],
    pub dns: [u8; 4],
}

pub trait Radio {
    fn associate(
        &mut self,
        params: &AssociateParams,
        timeout: Duration,
    ) -> Result<LinkInfo, RadioError>;

    /// Powers the radio down. Idempotent.
    fn shutdown(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectError {
    pub last: RadioError,
}

impl core::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "all connect strategies failed, last: {}", self.last)
    }
}

struct Strategy {
    name: &'static str,
    params: AssociateParams,
    timeout: Duration,
}

pub struct ConnectivityManager<R: Radio> {
    radio: R,
}

impl<R: Radio> ConnectivityManager<R> {
    pub fn new(radio: R) -> Self {
        Self { radio }
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Tries the fast path first when the hint is valid, then the full
    /// scan. Success refreshes the hint; exhausting every strategy
    /// invalidates it so the next wake goes straight to the full scan.
    pub fn connect(&mut self, hint: &mut ConnectivityHint) -> Result<LinkInfo, ConnectError> {
        let mut strategies = Vec::new();
        if hint.valid {
            strategies.push(Strategy {
                name: "fast",
                params: fast_params(hint),
                timeout: FAST_CONNECT_TIMEOUT,
            });
        }
        strategies.push(Strategy {
            name: "full",
            params: AssociateParams::default(),
            timeout: FULL_CONNECT_TIMEOUT,
        });

        let mut last = RadioError::Timeout;
        for strategy in &strategies {
            log::info!(
                "connecting via {} path (timeout {}s)",
                strategy.name,
                strategy.timeout.as_secs()
            );
            match self.radio.associate(&strategy.params, strategy.timeout) {
                Ok(link) => {
                    refresh_hint(hint, &link);
                    return Ok(link);
                }
                Err(err) => {
                    log::warn!("{} connect failed: {}", strategy.name, err);
                    last = err;
                }
            }
        }
        hint.invalidate();
        Err(ConnectError { last })
    }

    /// Single fast-path attempt, used to bring the radio back for the
    /// post-display ack. Failure leaves the hint untouched; the wake
    /// is already degraded and the hint may still be good next cycle.
    pub fn quick_reconnect(&mut self, hint: &mut ConnectivityHint) -> Result<LinkInfo, RadioError> {
        let params = if hint.valid {
            fast_params(hint)
        } else {
            AssociateParams::default()
        };
        let link = self.radio.associate(&params, FAST_CONNECT_TIMEOUT)?;
        refresh_hint(hint, &link);
        Ok(link)
    }
}

fn fast_params(hint: &ConnectivityHint) -> AssociateParams {
    AssociateParams {
        channel: Some(hint.channel),
        bssid: Some(hint.bssid),
        static_ip: Some(StaticIpConfig {
            ip: hint.ip,
            gateway: hint.gateway,
            subnet: hint.subnet,
            dns: hint.dns,
        }),
    }
}

fn refresh_hint(hint: &mut ConnectivityHint, link: &LinkInfo) {
    hint.valid = true;
    hint.channel = link.channel;
    hint.bssid = link.bssid;
    hint.ip = link.ip;
    hint.gateway = link.gateway;
    hint.subnet = link.subnet;
    hint.dns = link.dns;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedRadio;

    fn link() -> LinkInfo {
        LinkInfo {
            channel: 6,
            bssid: [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01],
            ip: [192, 168, 1, 40],
            gateway: [192, 168, 1, 1],
            subnet: [255, 255, 255, 0],
            dns: [192, 168, 1, 1],
        }
    }

    fn valid_hint() -> ConnectivityHint {
        let mut hint = ConnectivityHint::empty();
        refresh_hint(&mut hint, &link());
        hint
    }

    #[test]
    fn valid_hint_takes_fast_path_first() {
        let mut manager = ConnectivityManager::new(ScriptedRadio::new(vec![Ok(link())]));
        let mut hint = valid_hint();
        manager.connect(&mut hint).unwrap();

        let calls = manager.radio_mut().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].timeout, FAST_CONNECT_TIMEOUT);
        assert_eq!(calls[0].params.channel, Some(6));
        assert!(calls[0].params.static_ip.is_some());
    }

    #[test]
    fn fast_failure_falls_back_to_full_scan() {
        let mut manager = ConnectivityManager::new(ScriptedRadio::new(vec![
            Err(RadioError::Timeout),
            Ok(link()),
        ]));
        let mut hint = valid_hint();
        manager.connect(&mut hint).unwrap();
        assert!(hint.valid);

        let calls = manager.radio_mut().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].params, AssociateParams::default());
        assert_eq!(calls[1].timeout, FULL_CONNECT_TIMEOUT);
    }

    #[test]
    fn invalid_hint_skips_fast_path() {
        let mut manager = ConnectivityManager::new(ScriptedRadio::new(vec![Ok(link())]));
        let mut hint = ConnectivityHint::empty();
        manager.connect(&mut hint).unwrap();

        let calls = manager.radio_mut().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params, AssociateParams::default());
    }

    #[test]
    fn total_failure_invalidates_hint() {
        let mut manager = ConnectivityManager::new(ScriptedRadio::new(vec![
            Err(RadioError::Timeout),
            Err(RadioError::AssociationFailed("no ap".into())),
        ]));
        let mut hint = valid_hint();
        let err = manager.connect(&mut hint).unwrap_err();
        assert!(!hint.valid);
        assert_eq!(err.last, RadioError::AssociationFailed("no ap".into()));
    }

    #[test]
    fn success_refreshes_hint_from_observed_link() {
        let moved = LinkInfo {
            channel: 11,
            ip: [10, 0, 0, 5],
            ..link()
        };
        let mut manager = ConnectivityManager::new(ScriptedRadio::new(vec![Ok(moved)]));
        let mut hint = ConnectivityHint::empty();
        manager.connect(&mut hint).unwrap();
        assert!(hint.valid);
        assert_eq!(hint.channel, 11);
        assert_eq!(hint.ip, [10, 0, 0, 5]);
    }

    #[test]
    fn quick_reconnect_failure_keeps_hint_valid() {
        let mut manager =
            ConnectivityManager::new(ScriptedRadio::new(vec![Err(RadioError::Timeout)]));
        let mut hint = valid_hint();
        assert!(manager.quick_reconnect(&mut hint).is_err());
        assert!(hint.valid);
    }
}
