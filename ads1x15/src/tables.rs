//! Chip-variant tables: data rates, full-scale ranges and channel descriptors.

use std::str::FromStr;

use thiserror::Error;

/// Voltage channels per device (4 differential + 4 single-ended).
pub const CHANNELS: usize = 8;

/// Scan index of the software timestamp element.
pub const TIMESTAMP_SCAN_INDEX: usize = CHANNELS;

const ADS1015_DATA_RATE: [u32; 8] = [128, 250, 490, 920, 1600, 2400, 3300, 3300];
const ADS1115_DATA_RATE: [u32; 8] = [8, 16, 32, 64, 128, 250, 475, 860];

/// Full-scale input range in mV per PGA setting. Settings 5, 6 and 7 are all 256 mV on silicon.
pub const FULLSCALE_RANGE_MV: [i32; 8] = [6144, 4096, 2048, 1024, 512, 256, 256, 256];

/// Supported chips. They differ only in tables and result width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// 12-bit, 128..3300 SPS.
    Ads1015,
    /// 16-bit, 8..860 SPS.
    Ads1115,
}

impl Variant {
    /// Data rate in Hz for each rate index.
    pub fn data_rates(self) -> &'static [u32; 8] {
        match self {
            Variant::Ads1015 => &ADS1015_DATA_RATE,
            Variant::Ads1115 => &ADS1115_DATA_RATE,
        }
    }

    pub fn channels(self) -> &'static [ChannelSpec; CHANNELS] {
        match self {
            Variant::Ads1015 => &ADS1015_CHANNELS,
            Variant::Ads1115 => &ADS1115_CHANNELS,
        }
    }

    /// Significant bits of a conversion result.
    pub fn realbits(self) -> u32 {
        match self {
            Variant::Ads1015 => 12,
            Variant::Ads1115 => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Ads1015 => "ads1015",
            Variant::Ads1115 => "ads1115",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown chip variant {0:?}, expected ads1015 or ads1115")]
pub struct UnknownVariant(pub String);

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ads1015" => Ok(Variant::Ads1015),
            "ads1115" => Ok(Variant::Ads1115),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Static description of one voltage channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Index into the configuration store; also the mux selection.
    pub address: usize,
    /// Positive input.
    pub channel: u8,
    /// Negative input of a differential pair.
    pub channel2: Option<u8>,
    pub scan_index: usize,
    pub realbits: u32,
    pub storagebits: u32,
    /// Right shift from the conversion register to the result.
    pub shift: u32,
    pub datasheet_name: &'static str,
}

impl ChannelSpec {
    const fn voltage(
        address: usize,
        channel: u8,
        channel2: Option<u8>,
        realbits: u32,
        shift: u32,
        datasheet_name: &'static str,
    ) -> Self {
        ChannelSpec {
            address,
            channel,
            channel2,
            scan_index: address,
            realbits,
            storagebits: 16,
            shift,
            datasheet_name,
        }
    }

    pub fn is_differential(&self) -> bool {
        self.channel2.is_some()
    }

    /// Convert a raw conversion register value to a signed result.
    pub fn sign_extend(&self, raw: u16) -> i32 {
        let bits = 16 - self.shift;
        let value = (raw >> self.shift) as i32;
        (value << (32 - bits)) >> (32 - bits)
    }
}

const fn channel_table(realbits: u32, shift: u32) -> [ChannelSpec; CHANNELS] {
    [
        ChannelSpec::voltage(0, 0, Some(1), realbits, shift, "AIN0-AIN1"),
        ChannelSpec::voltage(1, 0, Some(3), realbits, shift, "AIN0-AIN3"),
        ChannelSpec::voltage(2, 1, Some(3), realbits, shift, "AIN1-AIN3"),
        ChannelSpec::voltage(3, 2, Some(3), realbits, shift, "AIN2-AIN3"),
        ChannelSpec::voltage(4, 0, None, realbits, shift, "AIN0"),
        ChannelSpec::voltage(5, 1, None, realbits, shift, "AIN1"),
        ChannelSpec::voltage(6, 2, None, realbits, shift, "AIN2"),
        ChannelSpec::voltage(7, 3, None, realbits, shift, "AIN3"),
    ]
}

static ADS1015_CHANNELS: [ChannelSpec; CHANNELS] = channel_table(12, 4);
static ADS1115_CHANNELS: [ChannelSpec; CHANNELS] = channel_table(16, 0);

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn ads1015_results_are_left_aligned() {
        let spec = Variant::Ads1015.channels()[4];
        assert_eq!(spec.sign_extend(0x7FF0), 2047);
        assert_eq!(spec.sign_extend(0x8000), -2048);
        assert_eq!(spec.sign_extend(0xFFF0), -1);
        assert_eq!(spec.sign_extend(0x0010), 1);
    }

    #[test]
    fn ads1115_results_use_all_bits() {
        let spec = Variant::Ads1115.channels()[0];
        assert_eq!(spec.sign_extend(0x7FFF), 32767);
        assert_eq!(spec.sign_extend(0x8000), -32768);
    }

    #[test]
    fn channel_layout() {
        for variant in [Variant::Ads1015, Variant::Ads1115] {
            let channels = variant.channels();
            assert!(channels[..4].iter().all(ChannelSpec::is_differential));
            assert!(!channels[4..].iter().any(ChannelSpec::is_differential));
            for (i, spec) in channels.iter().enumerate() {
                assert_eq!(spec.address, i);
                assert_eq!(spec.scan_index, i);
                assert_eq!(spec.realbits, variant.realbits());
            }
        }
        assert_eq!(Variant::Ads1015.channels()[3].datasheet_name, "AIN2-AIN3");
    }

    #[test]
    fn variant_from_str() {
        assert_eq!("ADS1115".parse::<Variant>(), Ok(Variant::Ads1115));
        assert_eq!(" ads1015 ".parse::<Variant>(), Ok(Variant::Ads1015));
        assert!("ads1016".parse::<Variant>().is_err());
    }
}
