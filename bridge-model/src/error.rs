//! Crate-wide error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Shared `Result` alias for the bridge.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// All errors the bridge can surface, matching the taxonomy the lifecycle
/// coordinator and every long-running task log and recover from.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("[BRG-CFG-1] bad dynamic-states config at {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("[BRG-CFG-2] dynamic-states file parse failure: {source}")]
    ConfigParse {
        #[source]
        source: serde_json::Error,
    },

    #[error("[BRG-CFG-3] dynamic-states file io failure at {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BRG-CONN-1] simulator beacon not found")]
    ConnectionNotFound,

    #[error("[BRG-CONN-2] unsupported beacon version {major}.{minor}")]
    ConnectionVersion { major: u8, minor: u8 },

    #[error("[BRG-CONN-3] lost connection after {timeouts} consecutive timeouts")]
    ConnectionLost { timeouts: u32 },

    #[error("[BRG-CAP-1] subscription capacity exceeded ({max} slots in use)")]
    CapacityExceeded { max: usize },

    #[error("[BRG-EVAL-1] formula evaluation failed: {details}")]
    Evaluation { details: String },

    #[error("[BRG-PROTO-1] unrecognised packet header: {header}")]
    Protocol { header: String },

    #[error("[BRG-SINK-1] external sink not connected")]
    SinkNotConnected,
}

impl BridgeError {
    /// Stable machine-parseable error code, for log correlation.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "BRG-CFG-1",
            Self::ConfigParse { .. } => "BRG-CFG-2",
            Self::ConfigIo { .. } => "BRG-CFG-3",
            Self::ConnectionNotFound => "BRG-CONN-1",
            Self::ConnectionVersion { .. } => "BRG-CONN-2",
            Self::ConnectionLost { .. } => "BRG-CONN-3",
            Self::CapacityExceeded { .. } => "BRG-CAP-1",
            Self::Evaluation { .. } => "BRG-EVAL-1",
            Self::Protocol { .. } => "BRG-PROTO-1",
            Self::SinkNotConnected => "BRG-SINK-1",
        }
    }

    /// Whether the owning task should keep looping (vs. the failure being
    /// local to the operation that raised it).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionNotFound
                | Self::ConnectionVersion { .. }
                | Self::ConnectionLost { .. }
                | Self::CapacityExceeded { .. }
                | Self::Protocol { .. }
                | Self::SinkNotConnected
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(source: serde_json::Error) -> Self {
        Self::ConfigParse { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let errs: Vec<BridgeError> = vec![
            BridgeError::Config { path: PathBuf::new(), details: String::new() },
            BridgeError::ConnectionNotFound,
            BridgeError::ConnectionVersion { major: 2, minor: 0 },
            BridgeError::ConnectionLost { timeouts: 5 },
            BridgeError::CapacityExceeded { max: 80 },
            BridgeError::Evaluation { details: String::new() },
            BridgeError::Protocol { header: String::new() },
            BridgeError::SinkNotConnected,
        ];
        let mut codes: Vec<&str> = errs.iter().map(BridgeError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn retryable_classification_matches_taxonomy() {
        assert!(BridgeError::ConnectionNotFound.is_retryable());
        assert!(BridgeError::CapacityExceeded { max: 80 }.is_retryable());
        assert!(BridgeError::Protocol { header: "XXXX\0".into() }.is_retryable());
        assert!(BridgeError::SinkNotConnected.is_retryable());
        assert!(!BridgeError::Config { path: PathBuf::new(), details: String::new() }.is_retryable());
        assert!(!BridgeError::Evaluation { details: String::new() }.is_retryable());
    }
}
