use thiserror::Error;

use crate::units::ChannelInfo;

/// Errors for the ADS1x15 driver, generic over the register device's error.
#[derive(Error, Debug)]
pub enum Error<E: std::error::Error + 'static> {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),
    /// Returned verbatim from the register device; never retried here.
    #[error("register bus error: {0}")]
    Bus(#[source] E),
    #[error("buffered capture owns the device, try again later")]
    Busy,
    #[error("device did not become ready: {0}")]
    NotReady(#[source] E),
    #[error("failed to start worker thread: {0}")]
    Worker(#[from] std::io::Error),
}

/// Why an argument was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    #[error("channel {0} does not exist")]
    Channel(usize),
    #[error("scale {scale}.{micro:06} is not supported")]
    Scale { scale: i32, micro: i32 },
    #[error("sampling frequency {0} Hz is not supported")]
    SampleRate(i32),
    #[error("gain index {0} out of range")]
    GainIndex(u32),
    #[error("data rate index {0} out of range")]
    DataRateIndex(u32),
    #[error("scan mask {0:#x} must select exactly one channel")]
    ScanMask(u32),
    #[error("{0:?} cannot be written")]
    ReadOnly(ChannelInfo),
}
