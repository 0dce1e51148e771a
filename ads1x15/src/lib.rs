//! ADS1015/ADS1115 acquisition engine for Linux using linux_embedded_hal and embedded-hal.
//!
//! The converter runs in continuous mode with its comparator repurposed as a conversion-ready pin.
//! [`Ads1x15`] serves one-off reads and configuration changes per channel, and can switch into a
//! buffered capture session where each data-ready edge produces one timestamped [`ScanSample`].
//! An idle device drops to single-shot mode after the autosuspend delay and wakes up on the next
//! access.
//!
//! ```no_run
//! use ads1x15::{linux, ChannelInfo, DeviceOptions, Variant};
//!
//! let adc = linux::open("/dev/i2c-1", 0x48, DeviceOptions::new(Variant::Ads1115))?;
//! let raw = adc.read(4, ChannelInfo::Raw)?;
//! # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
//! ```

mod capture;
mod config;
mod conversion;
mod device;
mod error;
mod power;
mod registers;
mod tables;
mod units;

#[cfg(test)]
mod testing;

pub use capture::{now_ns, CapturePhase, CaptureStats, DataReadyTrigger, SampleSink, ScanSample, SinkError};
pub use config::{
    ChannelConfig, ChannelNode, ConfigSource, DeviceOptions, DEFAULT_AUTOSUSPEND_DELAY, DEFAULT_DATA_RATE,
    DEFAULT_GAIN,
};
pub use conversion::settling_delay_us;
pub use device::Ads1x15;
pub use error::{Error, InvalidArgument};
pub use power::PowerState;
pub use registers::{cfg, ConfigWord, ConvMode, I2cRegisters, RegisterDevice, RegisterError};
pub use registers::{CFG_REG, CONV_REG, HI_THRESH_REG, LO_THRESH_REG};
pub use tables::{ChannelSpec, UnknownVariant, Variant, CHANNELS, FULLSCALE_RANGE_MV, TIMESTAMP_SCAN_INDEX};
pub use units::{ChannelInfo, InfoValue};

/// Convenience constructors for a converter on a Linux I2C character device.
pub mod linux {
    use linux_embedded_hal::{Delay, I2cdev};
    use tracing::info;

    use crate::{Ads1x15, DeviceOptions, I2cRegisters};

    pub type LinuxAds1x15 = Ads1x15<I2cRegisters<I2cdev>, Delay>;

    /// Open `path` and bring up the converter at `address`.
    pub fn open(
        path: &str,
        address: u8,
        options: DeviceOptions,
    ) -> Result<LinuxAds1x15, Box<dyn std::error::Error + Send + Sync>> {
        let i2c = I2cdev::new(path)?;
        let adc = Ads1x15::new(I2cRegisters::new(i2c, address), Delay, options)?;
        info!("{} ready on {path} at {address:#04x}", adc.variant().name());
        Ok(adc)
    }
}
