use thiserror::Error;

/// Structured error kinds surfaced to RPC callers and audit events (see SPEC_FULL.md §7).
#[derive(Error, Debug)]
pub enum Error {
    #[error("max concurrent instances reached ({current}/{max})")]
    CapacityExceeded { current: usize, max: usize },

    #[error("could not resolve a parent instance for spawn: {reason}")]
    ParentUnresolvable { reason: String },

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("instance {id} is in state {state}, which does not permit this operation")]
    InstanceWrongState { id: String, state: String },

    #[error("timed out waiting for a reply from {id} after {seconds}s")]
    Timeout { id: String, seconds: u64 },

    #[error("multiplexer error: {0}")]
    MultiplexerError(String),

    #[error("failed to configure tool-server wiring: {0}")]
    ToolWiringError(String),

    #[error("shared-state daemon is down: {0}")]
    DaemonDown(String),

    #[error("instance {id} exceeded its resource quota ({reason})")]
    QuotaExceeded { id: String, reason: String },

    #[error("team template malformed, using defaults: {0}")]
    TemplateMalformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn instance_not_found(id: impl Into<String>) -> Self {
        Error::InstanceNotFound(id.into())
    }

    pub fn wrong_state(id: impl Into<String>, state: impl Into<String>) -> Self {
        Error::InstanceWrongState {
            id: id.into(),
            state: state.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Stable machine-readable kind name, mirrored into RPC error `data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::CapacityExceeded { .. } => "CapacityExceeded",
            Error::ParentUnresolvable { .. } => "ParentUnresolvable",
            Error::InstanceNotFound(_) => "InstanceNotFound",
            Error::InstanceWrongState { .. } => "InstanceWrongState",
            Error::Timeout { .. } => "Timeout",
            Error::MultiplexerError(_) => "MultiplexerError",
            Error::ToolWiringError(_) => "ToolWiringError",
            Error::DaemonDown(_) => "DaemonDown",
            Error::QuotaExceeded { .. } => "QuotaExceeded",
            Error::TemplateMalformed(_) => "TemplateMalformed",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Config(_) => "Config",
            Error::Internal(_) => "Internal",
        }
    }
}
