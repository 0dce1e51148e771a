//! Active/suspended power model with debounced autosuspend.
//!
//! Users bracket device access with [`PowerController::acquire`] and [`PowerController::release`].
//! Releasing never suspends directly: a worker thread drops the converter to single-shot mode once
//! it has been idle for the autosuspend delay. Resuming switches back to continuous conversion and
//! marks the conversion register untrusted.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::conversion::ConversionValidity;
use crate::error::Error;
use crate::registers::{cfg, ConvMode, RegisterDevice, SharedRegisters, CFG_REG};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerState {
    /// Powered, continuous conversion.
    Active,
    /// Single-shot (power-down) mode.
    Suspended,
}

struct PmState {
    status: PowerState,
    usage: u32,
    last_busy: Instant,
    running: bool,
}

struct PmShared<R> {
    regs: Arc<SharedRegisters<R>>,
    validity: Arc<ConversionValidity>,
    state: Mutex<PmState>,
    idle: Condvar,
    autosuspend_delay: Duration,
}

impl<R: RegisterDevice> PmShared<R> {
    fn resume(&self) -> Result<(), R::Error> {
        self.regs
            .update_bits(CFG_REG, cfg::MOD_MASK, ConvMode::Continuous.field())?;
        self.validity.invalidate();
        Ok(())
    }

    fn suspend(&self) -> Result<(), R::Error> {
        self.regs
            .update_bits(CFG_REG, cfg::MOD_MASK, ConvMode::SingleShot.field())
    }
}

pub(crate) struct PowerController<R> {
    shared: Arc<PmShared<R>>,
    worker: Option<JoinHandle<()>>,
}

impl<R> PowerController<R>
where
    R: RegisterDevice + Send + 'static,
{
    /// Start in the active state. The idle window begins now.
    pub(crate) fn start(
        regs: Arc<SharedRegisters<R>>,
        validity: Arc<ConversionValidity>,
        autosuspend_delay: Duration,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(PmShared {
            regs,
            validity,
            state: Mutex::new(PmState {
                status: PowerState::Active,
                usage: 0,
                last_busy: Instant::now(),
                running: true,
            }),
            idle: Condvar::new(),
            autosuspend_delay,
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("ads1x15-autosuspend".into())
            .spawn(move || autosuspend(worker_shared))?;
        Ok(Self { shared, worker: Some(worker) })
    }

    /// Take a usage reference, resuming the device if it is suspended.
    pub(crate) fn acquire(&self) -> Result<(), Error<R::Error>> {
        let mut pm = self.shared.state.lock();
        pm.usage += 1;
        if pm.status == PowerState::Suspended {
            if let Err(e) = self.shared.resume() {
                pm.usage -= 1;
                return Err(Error::NotReady(e));
            }
            pm.status = PowerState::Active;
            debug!("resumed");
        }
        Ok(())
    }

    /// Drop a usage reference and restart the idle window.
    pub(crate) fn release(&self) {
        let mut pm = self.shared.state.lock();
        pm.usage = pm.usage.saturating_sub(1);
        pm.last_busy = Instant::now();
        self.shared.idle.notify_all();
    }

    pub(crate) fn state(&self) -> PowerState {
        self.shared.state.lock().status
    }

    pub(crate) fn usage(&self) -> u32 {
        self.shared.state.lock().usage
    }

    /// Stop autosuspending and power the converter down.
    pub(crate) fn shutdown(&mut self) -> Result<(), R::Error> {
        self.stop_worker();
        self.shared.suspend()?;
        self.shared.state.lock().status = PowerState::Suspended;
        Ok(())
    }
}

impl<R> PowerController<R> {
    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.state.lock().running = false;
            self.shared.idle.notify_all();
            if worker.join().is_err() {
                error!("autosuspend worker panicked");
            }
        }
    }
}

impl<R> Drop for PowerController<R> {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn autosuspend<R: RegisterDevice>(shared: Arc<PmShared<R>>) {
    let mut pm = shared.state.lock();
    while pm.running {
        if pm.status != PowerState::Active || pm.usage > 0 {
            shared.idle.wait(&mut pm);
            continue;
        }

        let deadline = pm.last_busy + shared.autosuspend_delay;
        if Instant::now() < deadline {
            shared.idle.wait_until(&mut pm, deadline);
            continue;
        }

        match shared.suspend() {
            Ok(()) => {
                pm.status = PowerState::Suspended;
                debug!("autosuspended");
            }
            Err(e) => {
                warn!("autosuspend failed: {e}");
                pm.last_busy = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::ConfigWord;
    use crate::testing::FakeAdc;
    use test_log::test;

    const SHORT: Duration = Duration::from_millis(30);

    fn controller(adc: &FakeAdc, delay: Duration) -> (PowerController<FakeAdc>, Arc<ConversionValidity>) {
        let regs = Arc::new(SharedRegisters::new(adc.clone()));
        let validity = Arc::new(ConversionValidity::new(false));
        let pm = PowerController::start(regs, validity.clone(), delay).unwrap();
        (pm, validity)
    }

    fn wait_for_state(pm: &PowerController<FakeAdc>, want: PowerState) {
        let give_up = Instant::now() + Duration::from_secs(5);
        while pm.state() != want {
            assert!(Instant::now() < give_up, "never reached {want:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn idle_device_autosuspends_to_single_shot() {
        let adc = FakeAdc::new();
        adc.set_register(CFG_REG, 0x8483);
        let (pm, _) = controller(&adc, SHORT);

        wait_for_state(&pm, PowerState::Suspended);
        assert_eq!(ConfigWord(adc.register(CFG_REG)).mode(), ConvMode::SingleShot);
    }

    #[test]
    fn release_does_not_suspend_synchronously() {
        let adc = FakeAdc::new();
        let (pm, _) = controller(&adc, Duration::from_secs(60));
        pm.acquire().unwrap();
        pm.release();
        assert_eq!(pm.state(), PowerState::Active);
        assert_eq!(pm.usage(), 0);
    }

    #[test]
    fn held_device_stays_active() {
        let adc = FakeAdc::new();
        let (pm, _) = controller(&adc, SHORT);
        pm.acquire().unwrap();
        thread::sleep(SHORT * 4);
        assert_eq!(pm.state(), PowerState::Active);
        pm.release();
        wait_for_state(&pm, PowerState::Suspended);
    }

    #[test]
    fn resume_invalidates_conversion() {
        let adc = FakeAdc::new();
        let (pm, validity) = controller(&adc, SHORT);
        wait_for_state(&pm, PowerState::Suspended);
        assert!(!validity.is_invalid());

        pm.acquire().unwrap();
        assert_eq!(pm.state(), PowerState::Active);
        assert!(validity.is_invalid());
        assert_eq!(ConfigWord(adc.register(CFG_REG)).mode(), ConvMode::Continuous);
        pm.release();
    }

    #[test]
    fn failed_resume_stays_suspended() {
        let adc = FakeAdc::new();
        let (pm, validity) = controller(&adc, SHORT);
        wait_for_state(&pm, PowerState::Suspended);

        adc.fail_next_read(CFG_REG);
        assert!(matches!(pm.acquire(), Err(Error::NotReady(_))));
        assert_eq!(pm.state(), PowerState::Suspended);
        assert_eq!(pm.usage(), 0);
        assert!(!validity.is_invalid());
    }

    #[test]
    fn shutdown_powers_down() {
        let adc = FakeAdc::new();
        adc.set_register(CFG_REG, 0x8483);
        let (mut pm, _) = controller(&adc, Duration::from_secs(60));
        pm.shutdown().unwrap();
        assert_eq!(pm.state(), PowerState::Suspended);
        assert_eq!(ConfigWord(adc.register(CFG_REG)).mode(), ConvMode::SingleShot);
    }
}
