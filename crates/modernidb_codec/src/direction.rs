//! Cursor iteration directions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// Order in which a cursor visits a store or index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorDirection {
    /// Ascending, every record.
    #[default]
    Next,
    /// Ascending, first record of each distinct key.
    NextUnique,
    /// Descending, every record.
    Prev,
    /// Descending, first record of each distinct key.
    PrevUnique,
}

impl CursorDirection {
    /// Engine name of the direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::NextUnique => "nextunique",
            Self::Prev => "prev",
            Self::PrevUnique => "prevunique",
        }
    }

    /// Whether keys ascend.
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Next | Self::NextUnique)
    }

    /// Whether duplicate keys are skipped.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Self::NextUnique | Self::PrevUnique)
    }
}

impl fmt::Display for CursorDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CursorDirection {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Self::Next),
            "nextunique" => Ok(Self::NextUnique),
            "prev" => Ok(Self::Prev),
            "prevunique" => Ok(Self::PrevUnique),
            other => Err(CodecError::InvalidDirection {
                direction: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for direction in [
            CursorDirection::Next,
            CursorDirection::NextUnique,
            CursorDirection::Prev,
            CursorDirection::PrevUnique,
        ] {
            assert_eq!(direction.as_str().parse::<CursorDirection>(), Ok(direction));
        }
        assert!("sideways".parse::<CursorDirection>().is_err());
    }

    #[test]
    fn flags() {
        assert!(CursorDirection::default().is_forward());
        assert!(!CursorDirection::PrevUnique.is_forward());
        assert!(CursorDirection::PrevUnique.is_unique());
        assert!(!CursorDirection::Prev.is_unique());
    }
}
