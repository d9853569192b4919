use std::{error::Error as StdError, path::PathBuf, time::Duration};

/// Why a completion request failed, from the caller's point of view.
///
/// The optimizer never retries a failed completion — the proposal it was
/// feeding is simply abandoned — so the distinction only matters for logs
/// and for transports that implement their own retry policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LmFailure {
    /// The same request may well succeed if repeated.
    Transient,
    /// A response arrived but could not be used.
    Malformed,
    /// Repeating the request will not help until something changes.
    Permanent,
}

/// Completion-transport failures surfaced by a
/// [`LanguageModel`](crate::lm::LanguageModel).
#[derive(Debug, thiserror::Error)]
pub enum LmError {
    #[error("completion endpoint unreachable: {detail}")]
    Unreachable { detail: String },

    #[error("provider throttled the request")]
    Throttled { retry_after: Option<Duration> },

    #[error("model returned an unusable response: {reason}")]
    MalformedResponse { reason: String },

    #[error("no completion arrived within {waited:?}")]
    TimedOut { waited: Duration },

    #[error("{provider} rejected the request: {detail}")]
    Rejected { provider: String, detail: String },
}

impl LmError {
    pub fn failure(&self) -> LmFailure {
        match self {
            Self::Unreachable { .. } | Self::Throttled { .. } | Self::TimedOut { .. } => {
                LmFailure::Transient
            }
            Self::MalformedResponse { .. } => LmFailure::Malformed,
            Self::Rejected { .. } => LmFailure::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.failure() == LmFailure::Transient
    }
}

/// Systemic adapter failures. Per-item failures are the adapter's to absorb
/// (scored low, never raised); these variants cover the cases where the whole
/// call is unusable.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("candidate evaluation failed: {message}")]
    Evaluation {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("reflective dataset construction failed: {message}")]
    Reflection { message: String },

    #[error("proposed component texts rejected: {message}")]
    Proposal { message: String },

    #[error(
        "evaluation batch shape mismatch: expected {expected} items, got {outputs} outputs and {scores} scores"
    )]
    ShapeMismatch {
        expected: usize,
        outputs: usize,
        scores: usize,
    },

    #[error("trajectories missing or mismatched: expected {expected} when traces are captured")]
    TrajectoryMismatch { expected: usize },

    #[error("non-finite score at batch position {position}")]
    NonFiniteScore { position: usize },
}

impl AdapterError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
            source: None,
        }
    }

    pub fn evaluation_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Evaluation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn reflection(message: impl Into<String>) -> Self {
        Self::Reflection {
            message: message.into(),
        }
    }

    pub fn proposal(message: impl Into<String>) -> Self {
        Self::Proposal {
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state snapshot")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode state snapshot at {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported state schema version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Fatal optimizer errors. Everything else (a failed proposal, a flaky
/// adapter call, a best-effort persistence write) is logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum GepaError {
    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("state invariant violated: {reason}")]
    Invariant { reason: String },

    #[error("seed candidate evaluation failed")]
    SeedEvaluation {
        #[source]
        source: AdapterError,
    },

    #[error("data loader failure: {message}")]
    Data { message: String },

    #[error("failed to resume from persisted state")]
    Resume {
        #[source]
        source: PersistError,
    },
}

impl GepaError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant {
            reason: reason.into(),
        }
    }

    pub(crate) fn data(err: anyhow::Error) -> Self {
        Self::Data {
            message: format!("{err:#}"),
        }
    }
}
