//! In-memory register device and delay recorder for unit tests.

use std::collections::HashSet;
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;
use thiserror::Error;

use crate::registers::{RegisterDevice, CONV_REG, HI_THRESH_REG};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    Read(u8),
    Write(u8, u16),
}

#[derive(Error, Debug)]
#[error("injected bus failure at register {0:#04x}")]
pub(crate) struct FakeBusError(pub u8);

#[derive(Default)]
struct FakeState {
    registers: [u16; 4],
    accesses: Vec<Access>,
    fail_reads: HashSet<u8>,
    fail_writes: bool,
}

/// Register file with an access log. Clones share state so tests can inspect it after handing it over.
#[derive(Clone, Default)]
pub(crate) struct FakeAdc {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAdc {
    pub(crate) fn new() -> Self {
        let adc = Self::default();
        // power-on default of the configuration register
        adc.state.lock().registers[1] = 0x8583;
        adc
    }

    pub(crate) fn set_register(&self, addr: u8, value: u16) {
        self.state.lock().registers[addr as usize] = value;
    }

    pub(crate) fn register(&self, addr: u8) -> u16 {
        self.state.lock().registers[addr as usize]
    }

    pub(crate) fn accesses(&self) -> Vec<Access> {
        self.state.lock().accesses.clone()
    }

    pub(crate) fn clear_accesses(&self) {
        self.state.lock().accesses.clear();
    }

    pub(crate) fn reads_of(&self, addr: u8) -> usize {
        self.accesses().iter().filter(|a| **a == Access::Read(addr)).count()
    }

    /// The next read of `addr` fails once.
    pub(crate) fn fail_next_read(&self, addr: u8) {
        self.state.lock().fail_reads.insert(addr);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

impl RegisterDevice for FakeAdc {
    type Error = FakeBusError;

    fn read(&mut self, addr: u8) -> Result<u16, Self::Error> {
        let mut state = self.state.lock();
        state.accesses.push(Access::Read(addr));
        if state.fail_reads.remove(&addr) || addr > HI_THRESH_REG {
            return Err(FakeBusError(addr));
        }
        Ok(state.registers[addr as usize])
    }

    fn write(&mut self, addr: u8, value: u16) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.accesses.push(Access::Write(addr, value));
        if state.fail_writes || addr == CONV_REG || addr > HI_THRESH_REG {
            return Err(FakeBusError(addr));
        }
        state.registers[addr as usize] = value;
        Ok(())
    }
}

/// Records requested delays in microseconds instead of sleeping.
#[derive(Clone, Default)]
pub(crate) struct RecordingDelay {
    calls: Arc<Mutex<Vec<u32>>>,
}

impl RecordingDelay {
    pub(crate) fn calls(&self) -> Vec<u32> {
        self.calls.lock().clone()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls.lock().push(ns.div_ceil(1_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.calls.lock().push(us);
    }
}
