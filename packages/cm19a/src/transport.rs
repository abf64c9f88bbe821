//! The device handle seam between the transceiver and the bus.

use std::time::Duration;

use cm19a_protocol::{Frame, FrameSizeError, MAX_FRAME_LEN};
use log::trace;
use thiserror::Error;

/// A claimed, exclusively owned link to a transceiver.
///
/// Every call blocks for at most `timeout`. Implementations are not expected
/// to be reentrant; the [`Transceiver`](crate::Transceiver) guarantees that at
/// most one call is in flight at a time.
pub trait Transport: Send + 'static {
    /// Performs a single inbound transfer into `buf`, returning the number of
    /// bytes received.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Performs a single outbound transfer, returning the number of bytes the
    /// bus accepted.
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Releases the claimed interface.
    ///
    /// Calling this more than once is harmless. Failures are logged rather
    /// than returned because the device may already be unplugged.
    fn release(&mut self);

    /// Reads one frame.
    ///
    /// A timeout or an empty transfer means nothing was waiting and yields
    /// `Ok(None)`.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let mut buf = [0u8; MAX_FRAME_LEN];

        match self.read(&mut buf, timeout) {
            Ok(0) | Err(TransportError::Timeout) => Ok(None),
            Ok(len) => {
                let frame = Frame::new(&buf[..len.min(buf.len())])?;
                trace!("received frame: {:x?}", frame.as_bytes());
                Ok(Some(frame))
            }
            Err(e) => Err(e),
        }
    }

    /// Writes one frame. Anything short of the whole frame is an error; there
    /// is no retry at this layer.
    fn write_frame(&mut self, frame: &Frame, timeout: Duration) -> Result<(), TransportError> {
        trace!("sending frame: {:x?}", frame.as_bytes());

        let written = self.write(frame.as_bytes(), timeout)?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                expected: frame.len(),
                written,
            });
        }

        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transfer timed out")]
    Timeout,

    #[error("USB Error: {0}")]
    Usb(rusb::Error),

    #[error("Short write: {written} of {expected} bytes accepted")]
    ShortWrite { expected: usize, written: usize },

    #[error("The interface has been released")]
    Released,

    #[error(transparent)]
    FrameSize(#[from] FrameSizeError),
}

impl From<rusb::Error> for TransportError {
    fn from(value: rusb::Error) -> Self {
        match value {
            rusb::Error::Timeout => TransportError::Timeout,
            other => TransportError::Usb(other),
        }
    }
}
