use std::time::Duration;

use cm19a::{InitializationError, Response, Transceiver, TransceiverConfig};
use rustyline::DefaultEditor;

#[tokio::main]
async fn main() -> Result<(), InitializationError> {
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Always,
    )
    .unwrap();

    let config = TransceiverConfig::new(Duration::from_secs(1), true);
    let transceiver = Transceiver::initialize(config).await?;

    // Each line is a request query, e.g. `?house=A&unit=1&command=ON` or `?command=getqueue`
    let mut editor = DefaultEditor::new().unwrap();
    while let Ok(line) = editor.readline("cm19a >> ") {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }

        let _ = editor.add_history_entry(line);
        println!("{}", Response::respond(&transceiver, line).await);
    }

    transceiver.shutdown().await;

    Ok(())
}
