use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::data::data_instance::{AccessMode, DataAccessId};
use crate::domain::utils::id::DataName;
use crate::error::ConversionError;

/// How a task accesses one of its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
    InOut,
    /// Reader that never orders against other concurrent accesses of the same data.
    Concurrent,
    /// Read-modify-write whose members may run in any order, one at a time.
    Commutative,
}

impl Direction {
    pub fn reads(&self) -> bool {
        !matches!(self, Direction::Out)
    }

    pub fn writes(&self) -> bool {
        matches!(self, Direction::Out | Direction::InOut | Direction::Commutative)
    }

    pub fn access_mode(&self) -> AccessMode {
        match self {
            Direction::In | Direction::Concurrent => AccessMode::Read,
            Direction::Out => AccessMode::Write,
            Direction::InOut | Direction::Commutative => AccessMode::ReadWrite,
        }
    }
}

impl FromStr for Direction {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            "INOUT" => Ok(Direction::InOut),
            "CONCURRENT" => Ok(Direction::Concurrent),
            "COMMUTATIVE" => Ok(Direction::Commutative),
            _ => Err(ConversionError::UnknownDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    File,
    Object,
    /// Persistent self-contained object, kept by the storage backend.
    Psco,
    /// Passed by value, never tracked.
    Basic,
}

impl FromStr for DataType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FILE" => Ok(DataType::File),
            "OBJECT" => Ok(DataType::Object),
            "PSCO" => Ok(DataType::Psco),
            "BASIC" => Ok(DataType::Basic),
            _ => Err(ConversionError::UnknownDataType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub direction: Direction,
    pub data_type: DataType,
    /// Logical data accessed, `None` for basic values.
    pub data: Option<DataName>,
    /// Textual value of basic parameters.
    pub value: Option<String>,
    /// Versions assigned by the access processor.
    pub access: Option<DataAccessId>,
}

impl Parameter {
    pub fn data(direction: Direction, data_type: DataType, name: impl Into<String>) -> Self {
        Parameter { direction, data_type, data: Some(DataName::new(name)), value: None, access: None }
    }

    pub fn file(direction: Direction, name: impl Into<String>) -> Self {
        Self::data(direction, DataType::File, name)
    }

    pub fn value(value: impl Into<String>) -> Self {
        Parameter { direction: Direction::In, data_type: DataType::Basic, data: None, value: Some(value.into()), access: None }
    }

    pub fn is_tracked(&self) -> bool {
        self.data_type != DataType::Basic && self.data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_str() {
        assert_eq!("inout".parse::<Direction>(), Ok(Direction::InOut));
        assert_eq!("COMMUTATIVE".parse::<Direction>(), Ok(Direction::Commutative));
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_access_modes() {
        assert!(Direction::Concurrent.reads());
        assert!(!Direction::Concurrent.writes());
        assert!(Direction::Commutative.writes());
        assert_eq!(Direction::Out.access_mode(), AccessMode::Write);
        assert_eq!(Direction::Commutative.access_mode(), AccessMode::ReadWrite);
    }

    #[test]
    fn test_basic_values_are_untracked() {
        assert!(!Parameter::value("42").is_tracked());
        assert!(Parameter::file(Direction::In, "f").is_tracked());
    }
}
