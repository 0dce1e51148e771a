//! Recorder settings, read from `ADS1X15_*` environment variables.

use std::env;
use std::time::Duration;

use ads1x15::{ChannelNode, ConfigSource, DeviceOptions, UnknownVariant, Variant, CHANNELS};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{var}={value:?} is not valid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error(transparent)]
    Variant(#[from] UnknownVariant),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Poll one channel with direct reads.
    Direct,
    /// Run a buffered capture session on one channel.
    Buffered,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub i2c_bus: String,
    pub address: u8,
    pub variant: Variant,
    pub channel: usize,
    pub mode: Mode,
    pub nodes: Vec<ChannelNode>,
    pub poll_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build settings from any variable lookup. Unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let i2c_bus = lookup("ADS1X15_I2C_BUS").unwrap_or_else(|| "/dev/i2c-1".to_string());

        let address = match lookup("ADS1X15_ADDRESS") {
            Some(value) => parse_address(&value).ok_or(SettingsError::Invalid {
                var: "ADS1X15_ADDRESS",
                value,
                reason: "expected 0x48..0x4b",
            })?,
            None => 0x48,
        };

        let variant = match lookup("ADS1X15_VARIANT") {
            Some(value) => value.parse()?,
            None => Variant::Ads1015,
        };

        let channel = match lookup("ADS1X15_CHANNEL") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(channel) if channel < CHANNELS => channel,
                _ => {
                    return Err(SettingsError::Invalid {
                        var: "ADS1X15_CHANNEL",
                        value,
                        reason: "expected a channel index 0..7",
                    })
                }
            },
            None => 4,
        };

        let mode = match lookup("ADS1X15_MODE").as_deref().map(str::trim) {
            None | Some("direct") => Mode::Direct,
            Some("buffered") => Mode::Buffered,
            Some(other) => {
                return Err(SettingsError::Invalid {
                    var: "ADS1X15_MODE",
                    value: other.to_string(),
                    reason: "expected direct or buffered",
                })
            }
        };

        let nodes = match lookup("ADS1X15_CHANNELS") {
            Some(value) => parse_nodes(&value).ok_or(SettingsError::Invalid {
                var: "ADS1X15_CHANNELS",
                value,
                reason: "expected reg:gain:rate[,reg:gain:rate...]",
            })?,
            None => Vec::new(),
        };

        let poll_interval = match lookup("ADS1X15_POLL_MS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(SettingsError::Invalid {
                        var: "ADS1X15_POLL_MS",
                        value,
                        reason: "expected a positive number of milliseconds",
                    })
                }
            },
            None => Duration::from_millis(1000),
        };

        Ok(Settings { i2c_bus, address, variant, channel, mode, nodes, poll_interval })
    }

    pub fn device_options(&self) -> DeviceOptions {
        DeviceOptions::new(self.variant).with_config(ConfigSource::Nodes(self.nodes.clone()))
    }
}

/// `0x48` style hex or plain decimal.
fn parse_address(value: &str) -> Option<u8> {
    let value = value.trim();
    let address = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok()?,
        None => value.parse().ok()?,
    };
    (0x48..=0x4b).contains(&address).then_some(address)
}

/// Comma separated `reg:gain:rate` triples. Gain and rate may be left empty.
fn parse_nodes(value: &str) -> Option<Vec<ChannelNode>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(|node| {
            let mut fields = node.split(':');
            let reg = fields.next()?.trim().parse().ok()?;
            let gain = optional_field(fields.next())?;
            let data_rate = optional_field(fields.next())?;
            if fields.next().is_some() {
                return None;
            }
            Some(ChannelNode { reg, gain, data_rate })
        })
        .collect()
}

/// `None` if the field is malformed, `Some(None)` if it is absent or empty.
fn optional_field(field: Option<&str>) -> Option<Option<u32>> {
    match field.map(str::trim) {
        None | Some("") => Some(None),
        Some(value) => value.parse().ok().map(Some),
    }
}
