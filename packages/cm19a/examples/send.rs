use std::time::Duration;

use cm19a::{
    protocol::{Action, HouseCode},
    InitializationError, Transceiver, TransceiverConfig,
};
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), InitializationError> {
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    // Usage: send <house> <unit> <action>, e.g. `send A 1 on`
    let mut args = std::env::args().skip(1);
    let house: HouseCode = args.next().unwrap_or("A".into()).parse().unwrap();
    let unit = args.next().unwrap_or("1".into());
    let action: Action = args.next().unwrap_or("on".into()).parse().unwrap();

    // Nothing is being received here, so don't bother polling
    let config = TransceiverConfig::new(Duration::from_secs(1), false);
    let transceiver = Transceiver::initialize(config).await?;

    if transceiver.send(house, &unit, action).await {
        info!("Sent {}{}{}", house, unit, action);
    } else {
        error!("The transceiver did not accept {}{}{}", house, unit, action);
    }

    transceiver.shutdown().await;

    Ok(())
}
