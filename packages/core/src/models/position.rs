//! Position directives and target references
//!
//! Callers address a placement as a target page plus a position relative to
//! it. Both arrive as strings at the API boundary and are resolved into
//! these tagged unions once, before any mutation logic runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a page lands relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Position {
    FirstChild,
    LastChild,
    Before,
    After,
    /// Index among the target's children
    Index(usize),
}

impl Position {
    /// True for positions whose parent is the target itself
    pub fn is_child(&self) -> bool {
        matches!(self, Position::FirstChild | Position::LastChild)
    }

    /// True for positions whose parent is the target's parent
    pub fn is_sibling(&self) -> bool {
        matches!(self, Position::Before | Position::After)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::FirstChild => f.write_str("firstChild"),
            Position::LastChild => f.write_str("lastChild"),
            Position::Before => f.write_str("before"),
            Position::After => f.write_str("after"),
            Position::Index(index) => write!(f, "{}", index),
        }
    }
}

impl FromStr for Position {
    type Err = String;

    /// A non-negative integer always wins over keyword parsing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<usize>() {
            return Ok(Position::Index(index));
        }
        match trimmed {
            "firstChild" => Ok(Position::FirstChild),
            "lastChild" => Ok(Position::LastChild),
            "before" => Ok(Position::Before),
            "after" => Ok(Position::After),
            other => Err(format!("invalid position '{}'", other)),
        }
    }
}

impl TryFrom<String> for Position {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.to_string()
    }
}

/// Target of an insert or move
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetRef {
    /// `_home`: the tree root of the current locale/mode
    Home,
    /// `_archive`: the archive root of the current locale/mode
    Archive,
    /// Full `_id` or bare `aposDocId`
    Id(String),
}

impl TargetRef {
    pub fn id(id: impl Into<String>) -> Self {
        TargetRef::Id(id.into())
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Home => f.write_str("_home"),
            TargetRef::Archive => f.write_str("_archive"),
            TargetRef::Id(id) => f.write_str(id),
        }
    }
}

impl FromStr for TargetRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("target id is required".to_string()),
            "_home" => Ok(TargetRef::Home),
            "_archive" => Ok(TargetRef::Archive),
            other => Ok(TargetRef::Id(other.to_string())),
        }
    }
}

impl From<&str> for TargetRef {
    fn from(value: &str) -> Self {
        value
            .parse()
            .unwrap_or_else(|_| TargetRef::Id(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_positions() {
        assert_eq!("firstChild".parse::<Position>().unwrap(), Position::FirstChild);
        assert_eq!("lastChild".parse::<Position>().unwrap(), Position::LastChild);
        assert_eq!("before".parse::<Position>().unwrap(), Position::Before);
        assert_eq!("after".parse::<Position>().unwrap(), Position::After);
    }

    #[test]
    fn test_numeric_position_wins_when_non_negative() {
        assert_eq!("3".parse::<Position>().unwrap(), Position::Index(3));
        assert_eq!(" 0 ".parse::<Position>().unwrap(), Position::Index(0));
        assert!("-1".parse::<Position>().is_err());
        assert!("sideways".parse::<Position>().is_err());
    }

    #[test]
    fn test_position_serde_as_string() {
        let json = serde_json::to_string(&Position::LastChild).unwrap();
        assert_eq!(json, "\"lastChild\"");
        let parsed: Position = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(parsed, Position::Index(2));
    }

    #[test]
    fn test_target_sentinels() {
        assert_eq!("_home".parse::<TargetRef>().unwrap(), TargetRef::Home);
        assert_eq!("_archive".parse::<TargetRef>().unwrap(), TargetRef::Archive);
        assert_eq!(TargetRef::from("abc"), TargetRef::Id("abc".to_string()));
        assert!("".parse::<TargetRef>().is_err());
    }
}
