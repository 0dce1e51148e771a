//! The device instance and its public read/write surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capture::{CaptureCounters, CapturePhase, CaptureStats, CaptureWorker, DataReadyTrigger, SampleSink};
use crate::config::DeviceOptions;
use crate::conversion::{Acquisition, ConversionValidity};
use crate::error::{Error, InvalidArgument};
use crate::power::{PowerController, PowerState};
use crate::registers::{cfg, ConvMode, RegisterDevice, SharedRegisters, CFG_REG, HI_THRESH_REG, LO_THRESH_REG};
use crate::tables::{ChannelSpec, Variant, CHANNELS, TIMESTAMP_SCAN_INDEX};
use crate::units::{self, ChannelInfo, InfoValue};

/// State shared with the capture worker.
pub(crate) struct Inner<R, D> {
    pub(crate) regs: Arc<SharedRegisters<R>>,
    pub(crate) validity: Arc<ConversionValidity>,
    /// The serialization lock.
    pub(crate) state: Mutex<Acquisition<D>>,
    pub(crate) buffer_enabled: AtomicBool,
    pub(crate) counters: Arc<CaptureCounters>,
}

/// An ADS1015/ADS1115 behind a register device.
///
/// Direct reads, configuration writes and buffered capture cycles are serialized by one lock.
/// Dropping the device stops any capture session and powers the converter down.
pub struct Ads1x15<R, D>
where
    R: RegisterDevice + Send + 'static,
    D: DelayNs + Send + 'static,
{
    variant: Variant,
    inner: Arc<Inner<R, D>>,
    power: PowerController<R>,
    capture: Option<CaptureWorker>,
    powered_down: bool,
}

impl<R, D> Ads1x15<R, D>
where
    R: RegisterDevice + Send + 'static,
    D: DelayNs + Send + 'static,
{
    /// Load the channel configuration, arm the ready pin and start continuous conversion.
    pub fn new(regs: R, delay: D, options: DeviceOptions) -> Result<Self, Error<R::Error>> {
        let channels = options.config.load()?;
        let regs = Arc::new(SharedRegisters::new(regs));

        // Comparator as conversion-ready pin: thresholds 0 / 0xFFFF, assert after one conversion.
        regs.write(LO_THRESH_REG, 0).map_err(Error::Bus)?;
        regs.write(HI_THRESH_REG, 0xFFFF).map_err(Error::Bus)?;
        regs.update_bits(CFG_REG, cfg::COMP_QUE_MASK, 0).map_err(Error::Bus)?;
        regs.update_bits(CFG_REG, cfg::MOD_MASK, ConvMode::Continuous.field())
            .map_err(Error::Bus)?;

        let validity = Arc::new(ConversionValidity::new(true));
        let power = PowerController::start(regs.clone(), validity.clone(), options.autosuspend_delay)?;

        info!(variant = options.variant.name(), "ADC initialized");
        Ok(Self {
            variant: options.variant,
            inner: Arc::new(Inner {
                regs,
                validity,
                state: Mutex::new(Acquisition::new(options.variant, channels, delay)),
                buffer_enabled: AtomicBool::new(false),
                counters: Arc::new(CaptureCounters::default()),
            }),
            power,
            capture: None,
            powered_down: false,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Descriptor of a voltage channel.
    pub fn channel_spec(&self, channel: usize) -> Result<&'static ChannelSpec, InvalidArgument> {
        self.variant.channels().get(channel).ok_or(InvalidArgument::Channel(channel))
    }

    /// Read a channel attribute.
    pub fn read(&self, channel: usize, info: ChannelInfo) -> Result<InfoValue, Error<R::Error>> {
        match info {
            ChannelInfo::Raw => self.read_raw(channel).map(InfoValue::Int),
            ChannelInfo::Scale => self.scale(channel),
            ChannelInfo::SampleRate => Ok(InfoValue::Int(self.sample_rate(channel)? as i32)),
        }
    }

    /// Write a channel attribute. `val2` is the micro part of a scale and ignored for rates.
    pub fn write(&self, channel: usize, info: ChannelInfo, val: i32, val2: i32) -> Result<(), Error<R::Error>> {
        match info {
            ChannelInfo::Scale => self.set_scale(channel, val, val2),
            ChannelInfo::SampleRate => self.set_sample_rate(channel, val),
            ChannelInfo::Raw => Err(InvalidArgument::ReadOnly(info).into()),
        }
    }

    /// Signed conversion result of `channel`. Fails with [`Error::Busy`] while capture runs.
    pub fn read_raw(&self, channel: usize) -> Result<i32, Error<R::Error>> {
        let spec = self.channel_spec(channel)?;
        let mut state = self.inner.state.lock();
        if self.inner.buffer_enabled.load(Ordering::Acquire) {
            return Err(Error::Busy);
        }

        self.power.acquire()?;
        let result = state.acquire(&self.inner.regs, &self.inner.validity, channel);
        self.power.release();
        Ok(spec.sign_extend(result?))
    }

    /// Conversion result of `channel` in millivolts.
    pub fn read_millivolts(&self, channel: usize) -> Result<f64, Error<R::Error>> {
        let raw = self.read_raw(channel)?;
        Ok(raw as f64 * self.scale(channel)?.as_f64())
    }

    /// mV per LSB, as `numerator / 2^shift`.
    pub fn scale(&self, channel: usize) -> Result<InfoValue, Error<R::Error>> {
        let spec = self.channel_spec(channel)?;
        let state = self.inner.state.lock();
        Ok(units::scale_of(state.channels[channel].gain, spec.realbits))
    }

    /// Data rate in Hz.
    pub fn sample_rate(&self, channel: usize) -> Result<u32, Error<R::Error>> {
        let spec = self.channel_spec(channel)?;
        let state = self.inner.state.lock();
        Ok(units::sample_rate_of(self.variant, state.channels[spec.address].data_rate))
    }

    /// Select the gain whose scale is exactly `scale + micro / 1e6` mV per LSB.
    pub fn set_scale(&self, channel: usize, scale: i32, micro: i32) -> Result<(), Error<R::Error>> {
        let spec = self.channel_spec(channel)?;
        let gain = units::gain_index_for_scale(scale, micro, spec.realbits)
            .ok_or(InvalidArgument::Scale { scale, micro })?;
        let mut state = self.inner.state.lock();
        if state.channels[channel].gain != gain {
            state.channels[channel].gain = gain;
            state.use_buffer = false;
            debug!(channel, gain, "gain changed");
        }
        Ok(())
    }

    /// Select the data rate that is exactly `hz`.
    pub fn set_sample_rate(&self, channel: usize, hz: i32) -> Result<(), Error<R::Error>> {
        self.channel_spec(channel)?;
        let data_rate = units::rate_index_for(self.variant, hz).ok_or(InvalidArgument::SampleRate(hz))?;
        let mut state = self.inner.state.lock();
        if state.channels[channel].data_rate != data_rate {
            state.channels[channel].data_rate = data_rate;
            state.use_buffer = false;
            debug!(channel, data_rate, "data rate changed");
        }
        Ok(())
    }

    pub fn available_scales(&self) -> &'static str {
        units::available_scales(self.variant)
    }

    pub fn available_sample_rates(&self) -> &'static str {
        units::available_sample_rates(self.variant)
    }

    /// Start buffered capture of the one channel selected by `scan_mask`.
    ///
    /// The timestamp bit may be set and is ignored: every sample carries its timestamp.
    /// Returns the handle the data-ready source calls on each edge.
    pub fn enable_buffer<S>(&mut self, scan_mask: u32, sink: S) -> Result<DataReadyTrigger, Error<R::Error>>
    where
        S: SampleSink + 'static,
    {
        let channel = one_hot_channel(scan_mask)?;
        if self.capture.is_some() {
            return Err(Error::Busy);
        }

        {
            let mut state = self.inner.state.lock();
            self.on_enable()?;
            state.use_buffer = false;
            self.inner.buffer_enabled.store(true, Ordering::Release);
        }

        match CaptureWorker::spawn(self.inner.clone(), channel, Box::new(sink)) {
            Ok(worker) => {
                let trigger = worker.trigger();
                self.capture = Some(worker);
                info!(channel, "buffered capture enabled");
                Ok(trigger)
            }
            Err(e) => {
                self.inner.buffer_enabled.store(false, Ordering::Release);
                self.on_disable();
                Err(e.into())
            }
        }
    }

    /// Stop buffered capture. Does nothing if capture is not running.
    pub fn disable_buffer(&mut self) {
        let Some(worker) = self.capture.take() else {
            return;
        };
        self.inner.buffer_enabled.store(false, Ordering::Release);
        worker.stop();
        self.on_disable();
        info!("buffered capture disabled");
    }

    pub fn buffer_enabled(&self) -> bool {
        self.inner.buffer_enabled.load(Ordering::Acquire)
    }

    /// Handle for the running capture session's data-ready source.
    pub fn trigger(&self) -> Option<DataReadyTrigger> {
        self.capture.as_ref().map(CaptureWorker::trigger)
    }

    pub fn capture_phase(&self) -> CapturePhase {
        if !self.buffer_enabled() {
            return CapturePhase::Disabled;
        }
        if self.inner.state.lock().use_buffer {
            CapturePhase::SteadyState
        } else {
            CapturePhase::AwaitingFirstSample
        }
    }

    pub fn capture_stats(&self) -> CaptureStats {
        self.inner.counters.snapshot()
    }

    pub fn power_state(&self) -> PowerState {
        self.power.state()
    }

    /// Stop capture and autosuspend, then put the converter in single-shot mode.
    pub fn shutdown(mut self) -> Result<(), Error<R::Error>> {
        self.power_down().map_err(Error::Bus)
    }

    fn on_enable(&self) -> Result<(), Error<R::Error>> {
        self.power.acquire()
    }

    fn on_disable(&self) {
        self.power.release();
    }

    fn power_down(&mut self) -> Result<(), R::Error> {
        self.disable_buffer();
        self.powered_down = true;
        self.power.shutdown()
    }
}

impl<R, D> Drop for Ads1x15<R, D>
where
    R: RegisterDevice + Send + 'static,
    D: DelayNs + Send + 'static,
{
    fn drop(&mut self) {
        if self.powered_down {
            return;
        }
        if let Err(e) = self.power_down() {
            warn!("failed to power down: {e}");
        }
    }
}

/// The single voltage channel selected by a scan mask.
fn one_hot_channel(scan_mask: u32) -> Result<usize, InvalidArgument> {
    let channels = scan_mask & !(1 << TIMESTAMP_SCAN_INDEX);
    if channels.count_ones() != 1 || channels >= 1 << CHANNELS {
        return Err(InvalidArgument::ScanMask(scan_mask));
    }
    Ok(channels.trailing_zeros() as usize)
}
