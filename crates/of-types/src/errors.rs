use thiserror::Error;

/// Main error type for the ObjectiveFunction client
#[derive(Error, Debug)]
pub enum ObjFunError {
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no parameters given")]
    EmptyParameterSet,

    #[error("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("no scenario given and no default scenario set")]
    NoScenario,

    #[error("only derivative-free optimisation is supported, got gradient of length {len}")]
    UnsupportedGradient { len: usize },

    /// Expected absence: the remote service answered 404.
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("no new run available")]
    NoNewRun,

    #[error("waiting for completed runs")]
    Waiting,

    #[error("preliminary run created, restart optimisation")]
    PreliminaryRun,

    #[error("new parameter set without result")]
    NewRun,

    #[error("run {run_id} is in state {state}, refusing to set result")]
    InvalidRunState { run_id: i64, state: String },

    #[error("permission denied: {body}")]
    PermissionDenied { body: String },

    #[error("[HTTP {status}]: Content: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObjFunError {
    /// True for the named outcomes an optimiser driver branches on.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Self::Waiting | Self::PreliminaryRun | Self::NewRun | Self::NoNewRun
        )
    }

    /// True when the error reports the absence of a remote or cached entry.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::NoNewRun | Self::Cache(CacheError::NotFound)
        )
    }
}

/// Parameter construction and conversion errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("minv ({minv}) must be smaller than maxv ({maxv})")]
    InvalidRange { minv: f64, maxv: f64 },

    #[error("value {value} outside bounds [{minv}, {maxv}]")]
    OutOfBounds { value: f64, minv: f64, maxv: f64 },

    #[error("resolution {resolution} is too fine for range [{minv}, {maxv}]")]
    ResolutionTooFine { resolution: f64, minv: f64, maxv: f64 },

    #[error("{field} should be an integer, got {value}")]
    TypeMismatch { field: String, value: String },

    #[error("wrong parameter name {name}")]
    InvalidName { name: String },

    #[error("unknown parameter {name}")]
    Unknown { name: String },

    #[error("parameter {name} missing")]
    Missing { name: String },
}

/// Local result cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("expected keys {expected:?}, got {actual:?}")]
    KeyMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("no cached entry")]
    NotFound,

    #[error("entry already exists")]
    DuplicateEntry,

    #[error("columns in cache do not match: {message}")]
    SchemaMismatch { message: String },

    #[error("wrong result type {0}")]
    InvalidResultType(String),

    #[error("cached value does not match result type {expected}")]
    ValueType { expected: String },

    #[error("number of parameters must be larger than 0")]
    EmptyParameterSet,

    #[error("Database error: {message}")]
    Database { message: String },
}

/// Result type alias for ObjectiveFunction operations
pub type ObjFunResult<T> = Result<T, ObjFunError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ObjFunError::Config(format!($($arg)*))
    };
}

/// Macro for creating protocol errors
#[macro_export]
macro_rules! protocol_error {
    ($($arg:tt)*) => {
        $crate::ObjFunError::Protocol(format!($($arg)*))
    };
}
