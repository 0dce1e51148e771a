//! Reconciles the device configuration with a channel's stored settings before trusting a sample.

use std::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use tracing::debug;

use crate::config::ChannelConfig;
use crate::error::{Error, InvalidArgument};
use crate::registers::{ConfigWord, RegisterDevice, SharedRegisters, CFG_REG, CONV_REG};
use crate::tables::{Variant, CHANNELS};

const USEC_PER_SEC: u32 = 1_000_000;

/// Microseconds to wait after a configuration change before the conversion register can be trusted.
///
/// One full period at the old rate flushes the conversion in flight, one at the new rate produces
/// the first valid sample. The sum is inflated by 10% for internal oscillator inaccuracy. The old
/// period is counted even when only the gain changed.
pub fn settling_delay_us(old_rate_hz: u32, new_rate_hz: u32) -> u32 {
    let conv_time = USEC_PER_SEC.div_ceil(old_rate_hz) + USEC_PER_SEC.div_ceil(new_rate_hz);
    conv_time + conv_time.div_ceil(10)
}

/// Set whenever the last conversion result cannot be trusted.
#[derive(Debug)]
pub(crate) struct ConversionValidity(AtomicBool);

impl ConversionValidity {
    pub(crate) fn new(invalid: bool) -> Self {
        Self(AtomicBool::new(invalid))
    }

    pub(crate) fn invalidate(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_invalid(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Everything the serialization lock guards.
pub(crate) struct Acquisition<D> {
    pub(crate) variant: Variant,
    pub(crate) channels: [ChannelConfig; CHANNELS],
    /// Buffered capture reached steady state and may take the fast path.
    pub(crate) use_buffer: bool,
    delay: D,
}

impl<D: DelayNs> Acquisition<D> {
    pub(crate) fn new(variant: Variant, channels: [ChannelConfig; CHANNELS], delay: D) -> Self {
        Self { variant, channels, use_buffer: false, delay }
    }

    pub(crate) fn channel(&self, channel: usize) -> Result<ChannelConfig, InvalidArgument> {
        self.channels.get(channel).copied().ok_or(InvalidArgument::Channel(channel))
    }

    /// Program `channel`'s selection if needed, wait out any invalid conversion, then read.
    pub(crate) fn acquire<R: RegisterDevice>(
        &mut self,
        regs: &SharedRegisters<R>,
        validity: &ConversionValidity,
        channel: usize,
    ) -> Result<u16, Error<R::Error>> {
        let config = self.channel(channel)?;

        let old = ConfigWord(regs.read(CFG_REG).map_err(Error::Bus)?);
        let new = old.with_selection(channel as u16, config.gain, config.data_rate);
        if new != old {
            regs.write(CFG_REG, new.bits()).map_err(Error::Bus)?;
            validity.invalidate();
            debug!(channel, old = old.bits(), new = new.bits(), "configuration changed");
        }

        if validity.is_invalid() {
            let rates = self.variant.data_rates();
            let wait_us = settling_delay_us(
                rates[old.data_rate() as usize],
                rates[config.data_rate as usize],
            );
            debug!(channel, wait_us, "waiting for a valid conversion");
            self.delay.delay_us(wait_us);
            validity.clear();
        }

        regs.read(CONV_REG).map_err(Error::Bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::cfg;
    use crate::testing::{Access, FakeAdc, RecordingDelay};
    use test_log::test;

    fn acquisition(delay: RecordingDelay) -> Acquisition<RecordingDelay> {
        Acquisition::new(Variant::Ads1015, [ChannelConfig::default(); CHANNELS], delay)
    }

    #[test]
    fn settling_delay_128_to_3300() {
        // ceil(7812.5) + ceil(303.03) = 8117, plus ceil(811.7)
        assert_eq!(settling_delay_us(128, 3300), 8117 + 812);
    }

    #[test]
    fn settling_delay_is_symmetric_in_rates() {
        assert_eq!(settling_delay_us(1600, 1600), 1250 + 125);
        assert_eq!(settling_delay_us(8, 860), settling_delay_us(860, 8));
    }

    #[test]
    fn config_change_writes_merged_word_and_waits() {
        let adc = FakeAdc::new();
        adc.set_register(CFG_REG, 0x8583);
        adc.set_register(CONV_REG, 0x1230);
        let regs = SharedRegisters::new(adc.clone());
        let validity = ConversionValidity::new(false);
        let delay = RecordingDelay::default();
        let mut acq = acquisition(delay.clone());
        acq.channels[5] = ChannelConfig { gain: 1, data_rate: 6 };

        assert_eq!(acq.acquire(&regs, &validity, 5).unwrap(), 0x1230);

        let word = ConfigWord(adc.register(CFG_REG));
        assert_eq!((word.mux(), word.gain(), word.data_rate()), (5, 1, 6));
        // mode and comparator bits untouched
        assert_eq!(word.bits() & !cfg::SELECTION_MASK, 0x8583 & !cfg::SELECTION_MASK);
        // old rate index 4 (1600 Hz) to new rate index 6 (3300 Hz)
        assert_eq!(delay.calls(), vec![settling_delay_us(1600, 3300)]);
        assert!(!validity.is_invalid());
    }

    #[test]
    fn current_configuration_reads_without_delay() {
        let adc = FakeAdc::new();
        let word = ConfigWord(0x8583).with_selection(4, 2, 4);
        adc.set_register(CFG_REG, word.bits());
        let regs = SharedRegisters::new(adc.clone());
        let validity = ConversionValidity::new(false);
        let delay = RecordingDelay::default();
        let mut acq = acquisition(delay.clone());

        acq.acquire(&regs, &validity, 4).unwrap();

        assert!(delay.calls().is_empty());
        assert_eq!(adc.accesses(), vec![Access::Read(CFG_REG), Access::Read(CONV_REG)]);
    }

    #[test]
    fn invalid_conversion_waits_even_without_change() {
        let adc = FakeAdc::new();
        adc.set_register(CFG_REG, ConfigWord(0).with_selection(0, 2, 0).bits());
        let regs = SharedRegisters::new(adc.clone());
        let validity = ConversionValidity::new(true);
        let delay = RecordingDelay::default();
        let mut acq = acquisition(delay.clone());
        acq.channels[0].data_rate = 0;

        acq.acquire(&regs, &validity, 0).unwrap();
        assert_eq!(delay.calls(), vec![settling_delay_us(128, 128)]);

        // Second read is steady.
        acq.acquire(&regs, &validity, 0).unwrap();
        assert_eq!(delay.calls().len(), 1);
    }

    #[test]
    fn bad_channel_is_rejected_before_bus_access() {
        let adc = FakeAdc::new();
        let regs = SharedRegisters::new(adc.clone());
        let validity = ConversionValidity::new(false);
        let mut acq = acquisition(RecordingDelay::default());

        let err = acq.acquire(&regs, &validity, CHANNELS).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(InvalidArgument::Channel(8))));
        assert!(adc.accesses().is_empty());
    }

    #[test]
    fn bus_errors_propagate_without_retry() {
        let adc = FakeAdc::new();
        adc.fail_next_read(CFG_REG);
        let regs = SharedRegisters::new(adc.clone());
        let validity = ConversionValidity::new(true);
        let delay = RecordingDelay::default();
        let mut acq = acquisition(delay.clone());

        assert!(matches!(acq.acquire(&regs, &validity, 4), Err(Error::Bus(_))));
        assert_eq!(adc.accesses(), vec![Access::Read(CFG_REG)]);
        assert!(delay.calls().is_empty());
        assert!(validity.is_invalid());
    }

    #[test]
    fn failed_config_write_leaves_validity_alone() {
        let adc = FakeAdc::new();
        adc.set_register(CFG_REG, 0x8583);
        adc.fail_writes(true);
        let regs = SharedRegisters::new(adc.clone());
        let validity = ConversionValidity::new(false);
        let mut acq = acquisition(RecordingDelay::default());
        acq.channels[1].gain = 0;

        assert!(matches!(acq.acquire(&regs, &validity, 1), Err(Error::Bus(_))));
        assert!(!validity.is_invalid());
        assert_eq!(adc.register(CFG_REG), 0x8583);
    }
}
