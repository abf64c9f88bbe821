//! Crate for driving the X10 CM19A USB RF transceiver. Not affiliated with X10 Wireless Technology.
//!
//! ```no_run
//! use cm19a::{protocol::{Action, HouseCode}, Transceiver, TransceiverConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transceiver = Transceiver::initialize(TransceiverConfig::default()).await?;
//!
//! transceiver.send(HouseCode::new('A')?, "1", Action::On).await;
//! for event in transceiver.drain_queue() {
//!     println!("{event}");
//! }
//!
//! transceiver.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub use cm19a_protocol as protocol;

pub mod config;
pub mod request;
pub mod transceiver;
pub mod transport;
pub mod usb;

#[cfg(test)]
mod mock;

pub use config::{ProtocolSource, TransceiverConfig};
pub use request::{Request, RequestError, Response};
pub use transceiver::{DriverState, InitializationError, SendError, Transceiver};
pub use transport::{Transport, TransportError};
pub use usb::{DeviceIdentity, OpenError, UsbTransport, CM19A};
