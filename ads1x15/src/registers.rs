//! Register map of the ADS1x15 and the bus abstraction the engine talks through.

use embedded_hal::i2c::I2c;
use parking_lot::Mutex;
use thiserror::Error;

/// Conversion result (read-only).
pub const CONV_REG: u8 = 0x00;
/// Configuration.
pub const CFG_REG: u8 = 0x01;
/// Comparator low threshold.
pub const LO_THRESH_REG: u8 = 0x02;
/// Comparator high threshold.
pub const HI_THRESH_REG: u8 = 0x03;

/// Bit fields of the configuration register.
pub mod cfg {
    pub const COMP_QUE_MASK: u16 = 0b11;
    pub const COMP_LAT_MASK: u16 = 1 << 2;
    pub const COMP_POL_MASK: u16 = 1 << 3;
    pub const COMP_MODE_MASK: u16 = 1 << 4;
    pub const DR_SHIFT: u16 = 5;
    pub const DR_MASK: u16 = 0b111 << DR_SHIFT;
    pub const MOD_SHIFT: u16 = 8;
    pub const MOD_MASK: u16 = 1 << MOD_SHIFT;
    pub const PGA_SHIFT: u16 = 9;
    pub const PGA_MASK: u16 = 0b111 << PGA_SHIFT;
    pub const MUX_SHIFT: u16 = 12;
    pub const MUX_MASK: u16 = 0b111 << MUX_SHIFT;

    /// Comparator queue value that disables the ALERT/RDY pin.
    pub const COMP_DISABLE: u16 = 0b11;
    /// Fields that select what the converter samples.
    pub const SELECTION_MASK: u16 = MUX_MASK | PGA_MASK | DR_MASK;
}

/// Operating mode field of the configuration register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvMode {
    Continuous = 0,
    SingleShot = 1,
}

impl ConvMode {
    /// The mode positioned in the configuration word.
    pub fn field(self) -> u16 {
        (self as u16) << cfg::MOD_SHIFT
    }
}

/// A configuration register value as programmed into the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigWord(pub u16);

impl ConfigWord {
    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn mux(self) -> u16 {
        (self.0 & cfg::MUX_MASK) >> cfg::MUX_SHIFT
    }

    pub fn gain(self) -> u8 {
        ((self.0 & cfg::PGA_MASK) >> cfg::PGA_SHIFT) as u8
    }

    pub fn data_rate(self) -> u8 {
        ((self.0 & cfg::DR_MASK) >> cfg::DR_SHIFT) as u8
    }

    pub fn mode(self) -> ConvMode {
        if self.0 & cfg::MOD_MASK == 0 {
            ConvMode::Continuous
        } else {
            ConvMode::SingleShot
        }
    }

    /// Replace the mux/gain/rate fields, keeping mode and comparator bits.
    pub fn with_selection(self, mux: u16, gain: u8, data_rate: u8) -> Self {
        let selection = (mux << cfg::MUX_SHIFT)
            | ((gain as u16) << cfg::PGA_SHIFT)
            | ((data_rate as u16) << cfg::DR_SHIFT);
        ConfigWord((self.0 & !cfg::SELECTION_MASK) | (selection & cfg::SELECTION_MASK))
    }
}

/// Anything that can read and write the converter's 16-bit registers by address.
///
/// The engine never retries: whatever retry policy exists belongs to the implementation.
pub trait RegisterDevice {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read(&mut self, addr: u8) -> Result<u16, Self::Error>;

    fn write(&mut self, addr: u8, value: u16) -> Result<(), Self::Error>;

    /// Read-modify-write of the bits in `mask`. Skips the write when nothing changes.
    fn update_bits(&mut self, addr: u8, mask: u16, value: u16) -> Result<(), Self::Error> {
        let old = self.read(addr)?;
        let new = (old & !mask) | (value & mask);
        if new != old {
            self.write(addr, new)?;
        }
        Ok(())
    }
}

/// Errors from [`I2cRegisters`].
#[derive(Error, Debug)]
pub enum RegisterError<E: std::error::Error + 'static> {
    #[error("I2C bus error: {0}")]
    Bus(#[source] E),
    #[error("register {0:#04x} is read-only")]
    ReadOnly(u8),
    #[error("register {0:#04x} does not exist")]
    OutOfRange(u8),
}

/// Register access over I2C: 8-bit register pointer, 16-bit big-endian values.
pub struct I2cRegisters<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cRegisters<I2C> {
    /// Wrap a bus. `address` is the 7-bit slave address (0x48..=0x4B).
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn is_writeable(addr: u8) -> bool {
        matches!(addr, CFG_REG | LO_THRESH_REG | HI_THRESH_REG)
    }
}

impl<I2C, E> RegisterDevice for I2cRegisters<I2C>
where
    I2C: I2c<Error = E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = RegisterError<E>;

    fn read(&mut self, addr: u8) -> Result<u16, Self::Error> {
        if addr > HI_THRESH_REG {
            return Err(RegisterError::OutOfRange(addr));
        }
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[addr], &mut buf)
            .map_err(RegisterError::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn write(&mut self, addr: u8, value: u16) -> Result<(), Self::Error> {
        if addr > HI_THRESH_REG {
            return Err(RegisterError::OutOfRange(addr));
        }
        if !Self::is_writeable(addr) {
            return Err(RegisterError::ReadOnly(addr));
        }
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[addr, hi, lo])
            .map_err(RegisterError::Bus)
    }
}

/// A register device shared by callers, the capture worker and the autosuspend worker.
///
/// Each access holds the bus only for its own duration.
pub(crate) struct SharedRegisters<R> {
    inner: Mutex<R>,
}

impl<R: RegisterDevice> SharedRegisters<R> {
    pub(crate) fn new(regs: R) -> Self {
        Self { inner: Mutex::new(regs) }
    }

    pub(crate) fn read(&self, addr: u8) -> Result<u16, R::Error> {
        self.inner.lock().read(addr)
    }

    pub(crate) fn write(&self, addr: u8, value: u16) -> Result<(), R::Error> {
        self.inner.lock().write(addr, value)
    }

    pub(crate) fn update_bits(&self, addr: u8, mask: u16, value: u16) -> Result<(), R::Error> {
        self.inner.lock().update_bits(addr, mask, value)
    }
}
