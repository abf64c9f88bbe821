use core::{
    fmt::{self, Display},
    ops::Deref,
};

use crate::{ACK, MAX_FRAME_LEN};

/// A byte sequence exchanged with the transceiver.
///
/// `Frame` stores its bytes inline, backed by a `[u8; MAX_FRAME_LEN]` buffer.
/// Inbound and outbound transfers share this type; the protocol adds no
/// padding or checksum of its own.
///
/// # Invariants
///
/// - `1 <= len <= MAX_FRAME_LEN`.
/// - All bytes past `len` are zeroed, so the derived equality, ordering and
///   hashing only ever observe the meaningful bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frame {
    bytes: [u8; MAX_FRAME_LEN],
    len: u8,
}

impl Frame {
    /// Creates a new [`Frame`] from the given bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSizeError`] if `bytes` is empty or longer than
    /// [`MAX_FRAME_LEN`].
    pub fn new(bytes: &[u8]) -> Result<Self, FrameSizeError> {
        if bytes.is_empty() || bytes.len() > MAX_FRAME_LEN {
            return Err(FrameSizeError {
                input_size: bytes.len(),
                max_size: MAX_FRAME_LEN,
            });
        }

        let mut buf = [0; MAX_FRAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    /// Creates a [`Frame`] from an array whose length is checked at compile time.
    pub const fn from_array<const N: usize>(bytes: [u8; N]) -> Self {
        const { assert!(N >= 1 && N <= MAX_FRAME_LEN, "frame length out of range") };

        let mut buf = [0; MAX_FRAME_LEN];
        let mut i = 0;
        while i < N {
            buf[i] = bytes[i];
            i += 1;
        }

        Self {
            bytes: buf,
            len: N as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always `false`; a frame holds at least one byte.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this is the single-byte acknowledgement the CM19A emits after
    /// it has transmitted a frame.
    pub fn is_ack(&self) -> bool {
        self.as_bytes() == [ACK]
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = FrameSizeError;

    fn try_from(value: &[u8]) -> Result<Self, FrameSizeError> {
        Self::new(value)
    }
}

impl<const N: usize> From<[u8; N]> for Frame {
    fn from(value: [u8; N]) -> Self {
        Self::from_array(value)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:02x?})", self.as_bytes())
    }
}

/// Renders the frame as space separated decimal bytes, e.g. `20 52 203 88 167`.
impl Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.as_bytes().iter();
        if let Some(first) = bytes.next() {
            write!(f, "{first}")?;
        }
        for byte in bytes {
            write!(f, " {byte}")?;
        }
        Ok(())
    }
}

/// Returned when a byte sequence cannot be stored in a [`Frame`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FrameSizeError {
    pub input_size: usize,
    pub max_size: usize,
}

impl fmt::Display for FrameSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame with size {} is outside the allowed range of 1 to {} bytes",
            self.input_size, self.max_size
        )
    }
}

impl core::error::Error for FrameSizeError {
    fn description(&self) -> &str {
        "frame size outside the allowed range"
    }
}
