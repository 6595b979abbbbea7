//! Capability required to resolve disputes

/// Proof that the caller may resolve disputes.
///
/// The engine does not decide who gets one; the host constructs it after
/// whatever authentication it runs, and the holder is recorded in logs and
/// events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeAuthority {
    holder: String,
}

impl DisputeAuthority {
    pub fn new(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}
