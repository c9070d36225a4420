use serde::{Deserialize, Serialize};

/// Discrete trading signal derived from the aggregate tag sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Short,
    Flat,
    Long,
}

impl Signal {
    /// Threshold an aggregate tag sum: strictly above `threshold` is Long,
    /// strictly below `-threshold` is Short.
    pub fn from_aggregate(aggregate: i32, threshold: i32) -> Self {
        if aggregate > threshold {
            Self::Long
        } else if aggregate < -threshold {
            Self::Short
        } else {
            Self::Flat
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "SHORT"),
            Self::Flat => write!(f, "FLAT"),
            Self::Long => write!(f, "LONG"),
        }
    }
}
