use std::time::Duration;

use cm19a::{InitializationError, Transceiver, TransceiverConfig};
use log::info;
use tokio::{select, signal, time::interval};

#[tokio::main]
async fn main() -> Result<(), InitializationError> {
    simplelog::TermLogger::init(
        log::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    // Poll the device quickly so that button presses show up promptly
    let config = TransceiverConfig::new(Duration::from_millis(250), true);
    let transceiver = Transceiver::initialize(config).await?;

    info!("Listening for RF remotes, press Ctrl-C to stop");

    let mut ticker = interval(Duration::from_secs(2));
    loop {
        select! {
            _ = signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for event in transceiver.drain_queue() {
                    info!("{}", event);
                }
            }
        }
    }

    transceiver.shutdown().await;

    Ok(())
}
