use std::{fs, path::PathBuf, time::Duration};

use cm19a_protocol::ProtocolTable;
use log::debug;

use crate::transceiver::InitializationError;

/// File the protocol definition is read from unless told otherwise.
pub const PROTOCOL_FILE: &str = "CM19aProtocol.ini";

/// The default time between two polls for inbound frames.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(1);

/// The default timeout for writing a frame
pub const SEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// The default timeout for reading a frame
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Where the protocol definition comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolSource {
    File(PathBuf),
    Inline(String),
}

impl ProtocolSource {
    /// Reads and parses the definition.
    pub fn load(&self) -> Result<ProtocolTable, InitializationError> {
        let table = match self {
            ProtocolSource::File(path) => {
                debug!("Loading protocol definition from {}", path.display());
                ProtocolTable::parse(&fs::read_to_string(path)?)?
            }
            ProtocolSource::Inline(text) => ProtocolTable::parse(text)?,
        };

        debug!(
            "Loaded {} base and {} remote codes",
            table.base().count(),
            table.remote().count()
        );

        Ok(table)
    }
}

impl Default for ProtocolSource {
    fn default() -> Self {
        ProtocolSource::File(PathBuf::from(PROTOCOL_FILE))
    }
}

/// Settings for a [`Transceiver`](crate::Transceiver).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransceiverConfig {
    /// Time between two polls for inbound frames.
    pub refresh: Duration,
    /// Whether to poll for inbound frames in the background at all.
    pub polling: bool,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
    pub protocol: ProtocolSource,
}

impl TransceiverConfig {
    pub fn new(refresh: Duration, polling: bool) -> Self {
        Self {
            refresh,
            polling,
            ..Default::default()
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolSource) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH,
            polling: true,
            send_timeout: SEND_TIMEOUT,
            receive_timeout: RECEIVE_TIMEOUT,
            protocol: ProtocolSource::default(),
        }
    }
}
