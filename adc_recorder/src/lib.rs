use std::error::Error;
use std::time::Duration;

use ads1x15::linux::{self, LinuxAds1x15};
use ads1x15::{ChannelSpec, InfoValue, ScanSample};
use chrono::DateTime;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use settings::{Mode, Settings};

pub mod settings;

/// How often buffered mode reports capture statistics.
const STATS_PERIOD: Duration = Duration::from_secs(10);
/// Sink depth for buffered capture.
const SAMPLE_QUEUE: usize = 1024;

pub async fn adc_recorder(settings: Settings) -> Result<(), Box<dyn Error + Send + Sync>> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutdown signal received.");
        shutdown.cancel();
    });

    let mut adc = linux::open(&settings.i2c_bus, settings.address, settings.device_options())?;
    info!(
        channel = adc.channel_spec(settings.channel)?.datasheet_name,
        scales = adc.available_scales(),
        rates = adc.available_sample_rates(),
        "ADC opened."
    );

    match settings.mode {
        Mode::Direct => {
            tokio::select! {
                result = poll_channel(&adc, settings.channel, settings.poll_interval) => result?,
                _ = cancel.cancelled() => info!("Stopped polling."),
            }
        }
        Mode::Buffered => capture(&mut adc, settings.channel, cancel).await?,
    }

    adc.shutdown()?;
    info!("Recorder stopped.");
    Ok(())
}

#[tracing::instrument(skip(adc))]
async fn poll_channel(adc: &LinuxAds1x15, channel: usize, period: Duration) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match adc.read_raw(channel) {
            Ok(raw) => {
                let mv = raw as f64 * adc.scale(channel)?.as_f64();
                info!(raw, "{mv:.3} mV");
            }
            Err(e) => warn!("Read failed: {e}"),
        }
    }
}

/// Buffered capture driven by a software data-ready source at the channel's sample rate.
#[tracing::instrument(skip(adc, cancel))]
async fn capture(adc: &mut LinuxAds1x15, channel: usize, cancel: CancellationToken) -> Result<(), Box<dyn Error + Send + Sync>> {
    let spec = *adc.channel_spec(channel)?;
    let scale = adc.scale(channel)?;
    let rate = adc.sample_rate(channel)?;

    let (tx, mut rx) = mpsc::channel(SAMPLE_QUEUE);
    let trigger = adc.enable_buffer(1 << channel, tx)?;
    info!(rate, "Buffered capture started.");

    let mut data_ready = tokio::time::interval(Duration::from_secs_f64(1.0 / rate as f64));
    data_ready.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = tokio::time::interval(STATS_PERIOD);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = data_ready.tick() => trigger.notify(),
            Some(sample) = rx.recv() => log_sample(&spec, scale, &sample),
            _ = stats.tick() => info!(stats = ?adc.capture_stats(), phase = ?adc.capture_phase(), "Capture running."),
        }
    }

    adc.disable_buffer();
    // drain what the worker pushed before it stopped
    while let Ok(sample) = rx.try_recv() {
        log_sample(&spec, scale, &sample);
    }
    info!(stats = ?adc.capture_stats(), "Buffered capture stopped.");
    Ok(())
}

fn log_sample(spec: &ChannelSpec, scale: InfoValue, sample: &ScanSample) {
    let value = spec.sign_extend(sample.raw as u16);
    let time = DateTime::from_timestamp_nanos(sample.timestamp);
    debug!(raw = sample.raw, value, %time, "{:.3} mV", value as f64 * scale.as_f64());
}
