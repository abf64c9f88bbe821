use core::{
    fmt::{self, Display},
    str::FromStr,
};

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};
use thiserror::Error;

use crate::{
    command::{Action, CommandKey, HouseCode, InvalidAction, InvalidHouseCode},
    frame::{Frame, FrameSizeError},
};

/// Section header selecting the standard X10 codes.
pub const BASE_SECTION: &str = "[CM19A X10 CODES]";

/// Section header selecting the codes sent by X10 RF remotes.
pub const REMOTE_SECTION: &str = "[X10 RF REMOTE DIM/BRIGHT CODES]";

/// Which half of a [`ProtocolTable`] an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Base,
    Remote,
}

impl Tier {
    fn from_section(header: &str) -> Option<Self> {
        match header {
            BASE_SECTION => Some(Tier::Base),
            REMOTE_SECTION => Some(Tier::Remote),
            _ => None,
        }
    }
}

/// An inbound frame after it has been looked up in the protocol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// The frame matched a known command.
    Command(CommandKey),
    /// Nothing in the table matched; the frame is kept as received.
    Raw(Frame),
}

impl Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedEvent::Command(key) => key.fmt(f),
            DecodedEvent::Raw(frame) => frame.fmt(f),
        }
    }
}

/// Static mapping between symbolic commands and the frames that carry them.
///
/// The table has two tiers. Outbound commands are encoded from the base tier.
/// When decoding, a match in the remote tier takes precedence over a match in
/// the base tier, since several RF remote codes reuse base sequences.
///
/// Tables are built once with [`ProtocolTable::parse`] from a line oriented
/// definition:
///
/// ```text
/// # comment
/// [CM19A X10 CODES]
/// A,1,ON,14,34,CB,58,A7
/// A,1,OFF,14,34,CB,58,27
///
/// [X10 RF REMOTE DIM/BRIGHT CODES]
/// A,1,DIM,14,34,CB,58,B7
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolTable {
    base: BTreeMap<CommandKey, Frame>,
    remote: BTreeMap<CommandKey, Frame>,
}

impl ProtocolTable {
    /// Parses a protocol definition.
    ///
    /// Blank lines and `#` comments are skipped, `[...]` lines switch
    /// sections and data lines outside the two known sections are ignored.
    /// When a key appears twice in a section the later line wins.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed data line; no partial table is returned.
    pub fn parse(source: &str) -> Result<Self, ProtocolParseError> {
        let mut table = Self::default();
        let mut tier = None;

        for (index, line) in source.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                tier = Tier::from_section(line);
                continue;
            }

            let Some(tier) = tier else {
                continue;
            };

            let (key, frame) = parse_entry(line).map_err(|kind| ProtocolParseError {
                line: index + 1,
                kind,
            })?;

            table.insert(tier, key, frame);
        }

        Ok(table)
    }

    /// Adds or replaces an entry, returning the frame it replaced.
    pub fn insert(&mut self, tier: Tier, key: CommandKey, frame: Frame) -> Option<Frame> {
        match tier {
            Tier::Base => self.base.insert(key, frame),
            Tier::Remote => self.remote.insert(key, frame),
        }
    }

    /// Looks up the frame to transmit for `key`. Exact matches only.
    pub fn encode(&self, key: &CommandKey) -> Option<&Frame> {
        self.base.get(key)
    }

    /// Looks up the command carried by an inbound frame.
    pub fn decode(&self, frame: &Frame) -> DecodedEvent {
        let find = |tier: &BTreeMap<CommandKey, Frame>| {
            tier.iter()
                .find(|(_, candidate)| *candidate == frame)
                .map(|(key, _)| key.clone())
        };

        find(&self.remote)
            .or_else(|| find(&self.base))
            .map_or(DecodedEvent::Raw(*frame), DecodedEvent::Command)
    }

    pub fn base(&self) -> impl Iterator<Item = (&CommandKey, &Frame)> {
        self.base.iter()
    }

    pub fn remote(&self) -> impl Iterator<Item = (&CommandKey, &Frame)> {
        self.remote.iter()
    }

    /// Total number of entries across both tiers.
    pub fn len(&self) -> usize {
        self.base.len() + self.remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.remote.is_empty()
    }
}

impl FromStr for ProtocolTable {
    type Err = ProtocolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parses `house,unit,action,byte1,byte2,...` with bytes in hex.
fn parse_entry(line: &str) -> Result<(CommandKey, Frame), ParseErrorKind> {
    let line: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let fields: Vec<&str> = line.split(',').collect();

    let [house, unit, action, bytes @ ..] = fields.as_slice() else {
        return Err(ParseErrorKind::FieldCount { found: fields.len() });
    };
    if bytes.is_empty() {
        return Err(ParseErrorKind::FieldCount { found: fields.len() });
    }

    let house = house.parse::<HouseCode>()?;
    let action = action.parse::<Action>()?;
    let bytes = bytes
        .iter()
        .map(|field| parse_hex(field))
        .collect::<Result<Vec<u8>, _>>()?;

    Ok((CommandKey::new(house, *unit, action), Frame::new(&bytes)?))
}

fn parse_hex(field: &str) -> Result<u8, ParseErrorKind> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);

    u8::from_str_radix(digits, 16).map_err(|_| ParseErrorKind::InvalidByte(field.to_string()))
}

/// A malformed line in a protocol definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed protocol definition on line {line}: {kind}")]
pub struct ProtocolParseError {
    /// 1-based line number within the definition.
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("expected house,unit,action followed by at least one byte, found {found} fields")]
    FieldCount { found: usize },

    #[error("{0:?} is not a hexadecimal byte")]
    InvalidByte(String),

    #[error(transparent)]
    HouseCode(#[from] InvalidHouseCode),

    #[error(transparent)]
    Action(#[from] InvalidAction),

    #[error(transparent)]
    FrameSize(#[from] FrameSizeError),
}

#[cfg(test)]
mod tests {
    use alloc::string::{String, ToString};

    use super::{DecodedEvent, ParseErrorKind, ProtocolTable, Tier};
    use crate::{
        command::{Action, CommandKey, HouseCode},
        frame::Frame,
    };

    const SAMPLE: &str = "\
# CM19A protocol
[CM19A X10 CODES]
A,1,ON,14,34,CB,58,A7
A,1,OFF,14,34,CB,58,27
 b , 2 , on , 0x14 , 0x74 , CB , 58 , A7

[X10 RF REMOTE DIM/BRIGHT CODES]
A,1,DIM,14,34,CB,58,27

[OTHER]
this line is not parsed
";

    fn key(house: char, unit: &str, action: Action) -> CommandKey {
        CommandKey::new(HouseCode::new(house).unwrap(), unit, action)
    }

    #[test]
    fn encodes_sample_definition() {
        let table = ProtocolTable::parse(SAMPLE).unwrap();

        let frame = table.encode(&key('A', "1", Action::On)).unwrap();
        assert_eq!(frame.as_bytes(), &[0x14, 0x34, 0xCB, 0x58, 0xA7]);

        assert_eq!(
            table.decode(&Frame::from_array([0x14, 0x34, 0xCB, 0x58, 0xA7])),
            DecodedEvent::Command(key('A', "1", Action::On))
        );
    }

    #[test]
    fn normalizes_keys_and_strips_whitespace() {
        let table = ProtocolTable::parse(SAMPLE).unwrap();
        let frame = table.encode(&key('B', "2", Action::On)).unwrap();
        assert_eq!(frame.as_bytes(), &[0x14, 0x74, 0xCB, 0x58, 0xA7]);
    }

    #[test]
    fn encode_is_exact() {
        let table = ProtocolTable::parse(SAMPLE).unwrap();
        assert!(table.encode(&key('A', "01", Action::On)).is_none());
        assert!(table.encode(&key('A', "1", Action::Bright)).is_none());
    }

    #[test]
    fn remote_codes_win_when_decoding() {
        let table = ProtocolTable::parse(SAMPLE).unwrap();

        // A1OFF and the remote A1DIM share a byte sequence.
        let frame = Frame::from_array([0x14, 0x34, 0xCB, 0x58, 0x27]);
        assert_eq!(
            table.decode(&frame),
            DecodedEvent::Command(key('A', "1", Action::Dim))
        );
    }

    #[test]
    fn round_trips_every_base_key() {
        let table = ProtocolTable::parse(SAMPLE).unwrap();
        let remote: alloc::vec::Vec<_> = table.remote().map(|(_, frame)| *frame).collect();

        for (key, frame) in table.base() {
            if remote.contains(frame) {
                continue;
            }
            let DecodedEvent::Command(decoded) = table.decode(frame) else {
                panic!("{key} did not decode");
            };
            assert_eq!(&decoded, key);
            assert_eq!(table.encode(&decoded), Some(frame));
        }
    }

    #[test]
    fn unknown_frames_decode_raw() {
        let table = ProtocolTable::parse(SAMPLE).unwrap();
        let event = table.decode(&Frame::from_array([0x14, 0x34, 0xCB]));

        assert_eq!(event, DecodedEvent::Raw(Frame::from_array([0x14, 0x34, 0xCB])));
        assert_eq!(event.to_string(), "20 52 203");
    }

    #[test]
    fn later_duplicates_win() {
        let table = ProtocolTable::parse("[CM19A X10 CODES]\nA,1,ON,01\na,1,on,02\n").unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.encode(&key('A', "1", Action::On)).unwrap().as_bytes(),
            &[0x02]
        );
    }

    #[test]
    fn ignores_lines_outside_known_sections() {
        let table = ProtocolTable::parse("A,1,ON,zz\n[OTHER]\nA,1,ON,zz\n").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn reports_malformed_lines() {
        let source = "[CM19A X10 CODES]\n\nA,1,ON,14,34\nA,1,OFF,14,GG\n";
        let err = ProtocolTable::parse(source).unwrap_err();

        assert_eq!(err.line, 4);
        assert_eq!(err.kind, ParseErrorKind::InvalidByte(String::from("GG")));

        let err = ProtocolTable::parse("[CM19A X10 CODES]\nA,1,ON\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::FieldCount { found: 3 });

        let err = ProtocolTable::parse("[CM19A X10 CODES]\nA,1,FLASH,01\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Action(_)));

        let err = ProtocolTable::parse("[CM19A X10 CODES]\nA,1,ON,1,2,3,4,5,6,7,8,9\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::FrameSize(_)));

        let err = ProtocolTable::parse("[CM19A X10 CODES]\nA,1,ON,100\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidByte(_)));
    }

    #[test]
    fn programmatic_insert() {
        let mut table = ProtocolTable::default();
        assert!(table
            .insert(Tier::Base, key('C', "3", Action::On), Frame::from_array([1]))
            .is_none());
        assert_eq!(
            table.insert(Tier::Base, key('C', "3", Action::On), Frame::from_array([2])),
            Some(Frame::from_array([1]))
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.base().count(), 1);
        assert_eq!(key('C', "3", Action::On).to_string(), "C3ON");
    }
}
