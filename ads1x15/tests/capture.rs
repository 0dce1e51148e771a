use std::sync::Arc;
use std::time::Duration;

use ads1x15::{Ads1x15, CapturePhase, ConfigWord, DeviceOptions, RegisterDevice, ScanSample, Variant, CFG_REG, CONV_REG};
use embedded_hal::delay::DelayNs;
use parking_lot::Mutex;
use test_log::test;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("no such register {0}")]
struct NoSuchRegister(u8);

/// Four registers behind a shared lock; the conversion register counts up on every read.
#[derive(Clone, Default)]
struct CountingAdc(Arc<Mutex<[u16; 4]>>);

impl RegisterDevice for CountingAdc {
    type Error = NoSuchRegister;

    fn read(&mut self, addr: u8) -> Result<u16, Self::Error> {
        let mut regs = self.0.lock();
        let value = *regs.get(addr as usize).ok_or(NoSuchRegister(addr))?;
        if addr == CONV_REG {
            regs[0] = value.wrapping_add(0x10);
        }
        Ok(value)
    }

    fn write(&mut self, addr: u8, value: u16) -> Result<(), Self::Error> {
        let mut regs = self.0.lock();
        *regs.get_mut(addr as usize).ok_or(NoSuchRegister(addr))? = value;
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[test(tokio::test(flavor = "multi_thread"))]
async fn samples_arrive_in_edge_order_with_timestamps() {
    let adc = CountingAdc::default();
    adc.0.lock()[CFG_REG as usize] = 0x8583;
    let options = DeviceOptions::new(Variant::Ads1115).with_autosuspend_delay(Duration::from_secs(60));
    let mut dev = Ads1x15::new(adc.clone(), NoDelay, options).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<ScanSample>(16);
    let trigger = dev.enable_buffer(1 << 7, tx).unwrap();

    let mut received = Vec::new();
    for timestamp in 1..=5 {
        trigger.notify_at(timestamp * 1_000);
        received.push(rx.recv().await.unwrap());
    }

    let stamps: Vec<i64> = received.iter().map(|s| s.timestamp).collect();
    assert_eq!(stamps, vec![1_000, 2_000, 3_000, 4_000, 5_000]);
    let raws: Vec<i16> = received.iter().map(|s| s.raw).collect();
    assert_eq!(raws, vec![0x00, 0x10, 0x20, 0x30, 0x40]);

    assert_eq!(ConfigWord(adc.0.lock()[CFG_REG as usize]).mux(), 7);
    assert_eq!(dev.capture_phase(), CapturePhase::SteadyState);
    let stats = dev.capture_stats();
    assert_eq!((stats.full_reads, stats.fast_reads, stats.missed_edges), (1, 4, 0));

    dev.disable_buffer();
    assert!(rx.recv().await.is_none());
    assert!(dev.read_raw(7).is_ok());
    dev.shutdown().unwrap();
}
