use ads1x15::{linux, ChannelInfo, DeviceOptions, Variant};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let adc = linux::open("/dev/i2c-1", 0x48, DeviceOptions::new(Variant::Ads1115))?;
    adc.set_sample_rate(7, 128)?;
    adc.set_scale(7, 0, 125_000)?;
    let raw = adc.read(7, ChannelInfo::Raw)?;
    let mv = adc.read_millivolts(7)?;
    println!("AIN3: raw {raw:?}, {mv:.3} mV");
    adc.shutdown()?;
    Ok(())
}
