use core::{
    fmt::{self, Display},
    str::FromStr,
};

use alloc::string::{String, ToString};
use thiserror::Error;

/// The letter half of an X10 address.
///
/// Always stored upper-case so that `a` and `A` select the same devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HouseCode(u8);

impl HouseCode {
    pub fn new(code: char) -> Result<Self, InvalidHouseCode> {
        if code.is_ascii_alphabetic() {
            Ok(Self(code.to_ascii_uppercase() as u8))
        } else {
            Err(InvalidHouseCode(code.to_string()))
        }
    }

    pub const fn as_char(self) -> char {
        self.0 as char
    }
}

impl FromStr for HouseCode {
    type Err = InvalidHouseCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Self::new(code),
            _ => Err(InvalidHouseCode(s.to_string())),
        }
    }
}

impl TryFrom<char> for HouseCode {
    type Error = InvalidHouseCode;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Display for HouseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid house code {0:?}, expected a single letter")]
pub struct InvalidHouseCode(pub String);

/// What an X10 command asks the addressed device(s) to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    On,
    Off,
    Dim,
    Bright,
    AllOn,
    AllOff,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::On,
        Action::Off,
        Action::Dim,
        Action::Bright,
        Action::AllOn,
        Action::AllOff,
    ];

    /// The upper-case token used in protocol definitions and command keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::On => "ON",
            Action::Off => "OFF",
            Action::Dim => "DIM",
            Action::Bright => "BRIGHT",
            Action::AllOn => "ALLON",
            Action::AllOff => "ALLOFF",
        }
    }
}

impl FromStr for Action {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| InvalidAction(s.to_string()))
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action {0:?}")]
pub struct InvalidAction(pub String);

/// A symbolic X10 command: house code, unit token and action.
///
/// Displays as the three parts concatenated (`A1ON`), which is how decoded
/// commands are reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandKey {
    pub house: HouseCode,
    pub unit: String,
    pub action: Action,
}

impl CommandKey {
    pub fn new(house: HouseCode, unit: impl Into<String>, action: Action) -> Self {
        Self {
            house,
            unit: unit.into(),
            action,
        }
    }
}

impl Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.house, self.unit, self.action)
    }
}
