//! # Identifiers and Exit Reasons
//!
//! Small value types shared by every layer: process identifiers, unique
//! references, termination reasons, and the arbitrary payload type.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Arbitrary message payload. Encoding for the wire is not this crate's concern.
pub type Term = serde_json::Value;

/// Node-unique process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(pub u64);

impl Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<0.{}.0>", self.0)
    }
}

/// Node-unique reference, stable for the lifetime of whatever it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ref(pub u64);

impl Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#Ref<{}>", self.0)
    }
}

/// Why a process terminated (or is being asked to terminate).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    Normal,
    Shutdown,
    /// Untrappable. Delivered through context cancellation.
    Kill,
    Failed,
    Other(String),
}

impl ExitReason {
    pub fn as_str(&self) -> &str {
        match self {
            ExitReason::Normal => "normal",
            ExitReason::Shutdown => "shutdown",
            ExitReason::Kill => "kill",
            ExitReason::Failed => "failed",
            ExitReason::Other(reason) => reason,
        }
    }

    /// `normal` and `shutdown` are the two reasons a transient child may exit with
    /// without escalating.
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitReason::Normal | ExitReason::Shutdown)
    }
}

impl Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ExitReason {
    fn from(reason: &str) -> Self {
        match reason {
            "normal" => ExitReason::Normal,
            "shutdown" => ExitReason::Shutdown,
            "kill" => ExitReason::Kill,
            "failed" => ExitReason::Failed,
            other => ExitReason::Other(other.to_string()),
        }
    }
}

impl From<String> for ExitReason {
    fn from(reason: String) -> Self {
        ExitReason::from(reason.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reason_string_forms() {
        assert_eq!(ExitReason::from("normal"), ExitReason::Normal);
        assert_eq!(ExitReason::from("shutdown"), ExitReason::Shutdown);
        assert_eq!(ExitReason::from("boom"), ExitReason::Other("boom".into()));
        assert_eq!(ExitReason::Failed.to_string(), "failed");
        assert!(ExitReason::Shutdown.is_clean());
        assert!(!ExitReason::Other("normal-ish".into()).is_clean());
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(42).to_string(), "<0.42.0>");
        assert_eq!(Ref(7).to_string(), "#Ref<7>");
    }
}
