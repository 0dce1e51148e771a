use adc_recorder::adc_recorder;
use adc_recorder::settings::Settings;

#[tokio::main]
async fn main() {
    // construct a subscriber that prints formatted traces to stdout
    let subscriber = tracing_subscriber::FmtSubscriber::new();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber.");

    let settings = Settings::from_env().expect("Invalid ADS1X15_* settings");

    adc_recorder(settings)
        .await
        .expect("ADC recorder failed");
}
