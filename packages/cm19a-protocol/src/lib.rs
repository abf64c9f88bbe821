//! Frames and protocol table for the X10 CM19A USB RF transceiver.
//!
//! The CM19A speaks in short, fixed-capacity byte frames. Which frame means
//! which X10 command is not derived from any structure in the bytes; it is
//! defined by an external protocol table. This crate models the frames,
//! the symbolic commands and the table that maps between them. It performs no
//! I/O.

#![no_std]

extern crate alloc;

pub mod command;
pub mod frame;
pub mod table;

pub use command::{Action, CommandKey, HouseCode, InvalidAction, InvalidHouseCode};
pub use frame::{Frame, FrameSizeError};
pub use table::{
    BASE_SECTION, DecodedEvent, ParseErrorKind, ProtocolParseError, ProtocolTable, REMOTE_SECTION,
    Tier,
};

/// Largest frame the CM19A sends or accepts.
pub const MAX_FRAME_LEN: usize = 8;

/// Byte the CM19A reports after it has transmitted a frame.
pub const ACK: u8 = 0xFF;

/// Frames written once after the device is claimed so that it starts
/// relaying codes from RF remotes.
pub const INIT_SEQUENCES: [Frame; 3] = [
    Frame::from_array([0x20, 0x34, 0xCB, 0x58, 0xA7]),
    Frame::from_array([0x80, 0x01, 0x00, 0x20, 0x14]),
    Frame::from_array([0x80, 0x01, 0x00, 0x00, 0x14, 0x24, 0x20, 0x20]),
];
