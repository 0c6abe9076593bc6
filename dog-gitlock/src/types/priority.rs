use serde::{Deserialize, Serialize};

/// Operation priority (higher values run first).
///
/// Any signed value is valid; the named levels are conventions used by the
/// backup scheduler and the HTTP handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationPriority(pub i32);

// Queue ordering: (Reverse(priority), submission sequence)
// - Higher priority first
// - Within same priority: earlier submissions first

impl OperationPriority {
    /// Background housekeeping (periodic snapshots)
    pub const LOW: Self = Self(-10);

    /// Default for callers that do not care
    pub const NORMAL: Self = Self(0);

    /// User-initiated actions (manual backup, restore)
    pub const HIGH: Self = Self(10);

    /// Must run before anything else queued
    pub const CRITICAL: Self = Self(100);

    pub fn value(self) -> i32 {
        self.0
    }

    /// Get human-readable name, if this is one of the named levels
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::LOW => Some("low"),
            Self::NORMAL => Some("normal"),
            Self::HIGH => Some("high"),
            Self::CRITICAL => Some("critical"),
            _ => None,
        }
    }
}

impl Default for OperationPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for OperationPriority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for OperationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl std::str::FromStr for OperationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "normal" => Ok(Self::NORMAL),
            "high" => Ok(Self::HIGH),
            "critical" => Ok(Self::CRITICAL),
            other => other
                .parse::<i32>()
                .map(Self)
                .map_err(|_| format!("Invalid priority: {}", s)),
        }
    }
}
