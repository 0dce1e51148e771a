//! Translation between table indices and public physical units.
//!
//! Lookups are exact-match only: a value that is not in a table is rejected, never rounded.

use crate::tables::{Variant, FULLSCALE_RANGE_MV};

/// Per-channel attributes exposed by the read/write surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelInfo {
    /// Conversion result (direct mode only).
    Raw,
    /// mV per LSB.
    Scale,
    /// Data rate in Hz.
    SampleRate,
}

/// Value of a [`ChannelInfo`] attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoValue {
    Int(i32),
    /// `numerator / 2^shift`.
    FractionalLog2 { numerator: i32, shift: u32 },
}

impl InfoValue {
    pub fn as_f64(self) -> f64 {
        match self {
            InfoValue::Int(v) => v as f64,
            InfoValue::FractionalLog2 { numerator, shift } => numerator as f64 / (1u64 << shift) as f64,
        }
    }
}

/// Full-scale range in mV implied by a scale of `scale + micro / 1e6` mV per LSB.
/// Wide enough that no `i32` pair can overflow.
pub fn fullscale_for_scale(scale: i32, micro: i32, realbits: u32) -> i128 {
    ((scale as i128 * 1_000_000 + micro as i128) << (realbits - 1)) / 1_000_000
}

/// First gain index whose full-scale range matches `scale` exactly.
pub fn gain_index_for_scale(scale: i32, micro: i32, realbits: u32) -> Option<u8> {
    let fullscale = fullscale_for_scale(scale, micro, realbits);
    FULLSCALE_RANGE_MV
        .iter()
        .position(|&range| range as i128 == fullscale)
        .map(|i| i as u8)
}

/// First rate index whose data rate is exactly `hz`.
pub fn rate_index_for(variant: Variant, hz: i32) -> Option<u8> {
    variant
        .data_rates()
        .iter()
        .position(|&rate| rate as i64 == hz as i64)
        .map(|i| i as u8)
}

/// Scale of a gain index in fractional-log2 form.
pub fn scale_of(gain: u8, realbits: u32) -> InfoValue {
    InfoValue::FractionalLog2 {
        numerator: FULLSCALE_RANGE_MV[gain as usize],
        shift: realbits - 1,
    }
}

pub fn sample_rate_of(variant: Variant, data_rate: u8) -> u32 {
    variant.data_rates()[data_rate as usize]
}

/// Scales a caller may write, in mV.
pub fn available_scales(variant: Variant) -> &'static str {
    match variant {
        Variant::Ads1015 => "3 2 1 0.5 0.25 0.125",
        Variant::Ads1115 => "0.1875 0.125 0.0625 0.03125 0.015625 0.007813",
    }
}

/// Sampling frequencies a caller may write, in Hz.
pub fn available_sample_rates(variant: Variant) -> &'static str {
    match variant {
        Variant::Ads1015 => "128 250 490 920 1600 2400 3300",
        Variant::Ads1115 => "8 16 32 64 128 250 475 860",
    }
}
