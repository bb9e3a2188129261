use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller category with its own freshness and budget policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityClass {
    /// Unwinding an open position. Gets the largest budget share.
    CriticalExit,
    /// Opening a new position.
    NormalEntry,
    /// Background market scans. First to starve.
    Discovery,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 3] = [
        PriorityClass::CriticalExit,
        PriorityClass::NormalEntry,
        PriorityClass::Discovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalExit => "CRITICAL_EXIT",
            Self::NormalEntry => "NORMAL_ENTRY",
            Self::Discovery => "DISCOVERY",
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = String;

    /// Accepts both `CRITICAL_EXIT` and `critical_exit` / `critical-exit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CRITICAL_EXIT" => Ok(Self::CriticalExit),
            "NORMAL_ENTRY" => Ok(Self::NormalEntry),
            "DISCOVERY" => Ok(Self::Discovery),
            other => Err(format!("Unknown priority class: {}", other)),
        }
    }
}

/// Declared trust tier of a source.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTier {
    Primary,
    Fallback,
    /// Only consulted after every primary and fallback source was tried or skipped.
    Emergency,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "Primary"),
            Self::Fallback => write!(f, "Fallback"),
            Self::Emergency => write!(f, "Emergency"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse() {
        assert_eq!(
            "critical_exit".parse::<PriorityClass>(),
            Ok(PriorityClass::CriticalExit)
        );
        assert_eq!(
            "normal-entry".parse::<PriorityClass>(),
            Ok(PriorityClass::NormalEntry)
        );
        assert_eq!(
            "DISCOVERY".parse::<PriorityClass>(),
            Ok(PriorityClass::Discovery)
        );
        assert!("urgent".parse::<PriorityClass>().is_err());
    }

    #[test]
    fn test_priority_serde_names() {
        let json = serde_json::to_string(&PriorityClass::CriticalExit).unwrap();
        assert_eq!(json, "\"CRITICAL_EXIT\"");

        let tier: SourceTier = serde_json::from_str("\"EMERGENCY\"").unwrap();
        assert_eq!(tier, SourceTier::Emergency);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(SourceTier::Primary < SourceTier::Fallback);
        assert!(SourceTier::Fallback < SourceTier::Emergency);
    }
}
