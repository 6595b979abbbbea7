//! Derived reputation view
//!
//! Nothing in here is stored. Dispute penalties decay with wall-clock time,
//! so a breakdown is only valid for the instant it was computed at.

use serde::{Deserialize, Serialize};

/// Coarse trust tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustTier {
    /// score <= 100
    Probation,
    /// 100 < score <= 500
    Tier2,
    /// score > 500
    Tier1,
}

impl TrustTier {
    pub fn from_score(score: i64) -> Self {
        if score > 500 {
            TrustTier::Tier1
        } else if score > 100 {
            TrustTier::Tier2
        } else {
            TrustTier::Probation
        }
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustTier::Tier1 => write!(f, "Tier 1"),
            TrustTier::Tier2 => write!(f, "Tier 2"),
            TrustTier::Probation => write!(f, "Probation"),
        }
    }
}

/// Risk color shown next to a worker.
///
/// Thresholds differ from [`TrustTier`]; the two are separate scales.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustColor {
    Green,
    Yellow,
    Red,
}

impl TrustColor {
    pub fn from_score(score: i64) -> Self {
        if score >= 700 {
            TrustColor::Green
        } else if score >= 200 {
            TrustColor::Yellow
        } else {
            TrustColor::Red
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustColor::Green => "HIGH",
            TrustColor::Yellow => "MEDIUM",
            TrustColor::Red => "LOW",
        }
    }
}

/// Full score decomposition for one profile at one instant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationBreakdown {
    pub score: i64,
    pub jobs_bonus: i64,
    pub dispute_penalty: i64,
    pub staked_bonus: i64,
    pub tier: TrustTier,
    pub trust_color: TrustColor,
    pub trust_label: String,
    pub unlock_duration_ms: u64,
}
