//! Per-channel configuration store and where it comes from at construction.

use std::time::Duration;

use tracing::{debug, error};

use crate::error::InvalidArgument;
use crate::tables::{Variant, CHANNELS};

pub const DEFAULT_GAIN: u8 = 2;
pub const DEFAULT_DATA_RATE: u8 = 4;
pub const DEFAULT_AUTOSUSPEND_DELAY: Duration = Duration::from_millis(2000);

/// Largest gain index accepted from a node description. Index 7 only exists for platform tables.
const MAX_NODE_GAIN: u32 = 6;
const MAX_PLATFORM_GAIN: u32 = 7;
const MAX_DATA_RATE: u32 = 7;

/// What a channel should be sampled at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Index into the full-scale range table.
    pub gain: u8,
    /// Index into the variant's data rate table.
    pub data_rate: u8,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig { gain: DEFAULT_GAIN, data_rate: DEFAULT_DATA_RATE }
    }
}

/// Device-tree-like description of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelNode {
    pub reg: u32,
    pub gain: Option<u32>,
    pub data_rate: Option<u32>,
}

/// Source of the channel configuration, consulted once at construction.
#[derive(Clone, Debug, Default)]
pub enum ConfigSource {
    /// A complete table, used as-is.
    Platform([ChannelConfig; CHANNELS]),
    /// Per-channel nodes. Channels without a node get defaults.
    Nodes(Vec<ChannelNode>),
    #[default]
    Defaults,
}

impl ConfigSource {
    /// Resolve into one configuration per channel.
    pub fn load(&self) -> Result<[ChannelConfig; CHANNELS], InvalidArgument> {
        match self {
            ConfigSource::Platform(table) => Self::check_platform(table),
            ConfigSource::Nodes(nodes) if !nodes.is_empty() => match Self::load_nodes(nodes) {
                Ok(channels) => Ok(channels),
                Err(e) => {
                    error!("{e}, using defaults for all channels");
                    Ok([ChannelConfig::default(); CHANNELS])
                }
            },
            _ => Ok([ChannelConfig::default(); CHANNELS]),
        }
    }

    fn check_platform(table: &[ChannelConfig; CHANNELS]) -> Result<[ChannelConfig; CHANNELS], InvalidArgument> {
        for config in table {
            if config.gain as u32 > MAX_PLATFORM_GAIN {
                return Err(InvalidArgument::GainIndex(config.gain as u32));
            }
            if config.data_rate as u32 > MAX_DATA_RATE {
                return Err(InvalidArgument::DataRateIndex(config.data_rate as u32));
            }
        }
        Ok(*table)
    }

    /// Fails on the first node with an out-of-range gain or rate.
    fn load_nodes(nodes: &[ChannelNode]) -> Result<[ChannelConfig; CHANNELS], InvalidArgument> {
        let mut channels = [ChannelConfig::default(); CHANNELS];
        for node in nodes {
            let channel = node.reg as usize;
            if channel >= CHANNELS {
                error!(reg = node.reg, "invalid channel index, node ignored");
                continue;
            }

            let gain = node.gain.unwrap_or(DEFAULT_GAIN as u32);
            if gain > MAX_NODE_GAIN {
                error!(reg = node.reg, gain, "invalid gain");
                return Err(InvalidArgument::GainIndex(gain));
            }
            let data_rate = node.data_rate.unwrap_or(DEFAULT_DATA_RATE as u32);
            if data_rate > MAX_DATA_RATE {
                error!(reg = node.reg, data_rate, "invalid data rate");
                return Err(InvalidArgument::DataRateIndex(data_rate));
            }

            channels[channel] = ChannelConfig { gain: gain as u8, data_rate: data_rate as u8 };
            debug!(channel, gain, data_rate, "channel configured");
        }
        Ok(channels)
    }
}

/// Construction options for [`crate::Ads1x15`].
#[derive(Clone, Debug)]
pub struct DeviceOptions {
    pub variant: Variant,
    pub config: ConfigSource,
    /// Quiescence window before an idle device drops to single-shot mode.
    pub autosuspend_delay: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions {
            variant: Variant::Ads1015,
            config: ConfigSource::Defaults,
            autosuspend_delay: DEFAULT_AUTOSUSPEND_DELAY,
        }
    }
}

impl DeviceOptions {
    pub fn new(variant: Variant) -> Self {
        DeviceOptions { variant, ..Default::default() }
    }

    pub fn with_config(mut self, config: ConfigSource) -> Self {
        self.config = config;
        self
    }

    pub fn with_autosuspend_delay(mut self, delay: Duration) -> Self {
        self.autosuspend_delay = delay;
        self
    }
}
