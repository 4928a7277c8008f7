use thiserror::Error;

use crate::tier::QualityTier;


/// Transport failure while retrieving a tier payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("payload not found: {0}")]
    NotFound(String),

    #[error("http status {status} fetching {location}")]
    Http {
        location: String,
        status: u16,
    },

    #[error("io error fetching {location}: {message}")]
    Io {
        location: String,
        message: String,
    },

    #[error("no payload source registered for {0}")]
    UnsupportedLocation(String),
}


/// Structural failure turning a payload into a [`crate::PointBuffer`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("gzip decompression failed: {0}")]
    Decompress(String),

    #[error("payload is not valid utf-8 text")]
    InvalidText,

    #[error("header has no `end_header` line")]
    MissingEndHeader,

    #[error("header has no `element vertex <count>` line")]
    MissingVertexCount,

    #[error("unsupported ply format `{0}`")]
    UnsupportedFormat(String),

    #[error("malformed vertex on line {line}: {reason}")]
    MalformedVertex {
        line: usize,
        reason: String,
    },

    #[error("binary ply body: {0}")]
    BinaryBody(String),

    #[error("expected {expected} vertices, body holds {found}")]
    TruncatedBody {
        expected: usize,
        found: usize,
    },

    #[error("{attribute} has {found} values, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("decoded geometry has no position attribute")]
    MissingPosition,

    #[error("geometry decoder unavailable: {0}")]
    DecoderUnavailable(String),

    #[error("geometry decoder failed: {0}")]
    Backend(String),
}


/// Malformed configuration supplied by a collaborator.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("model id must not be empty")]
    EmptyId,

    #[error("duplicate model id `{0}`")]
    DuplicateId(String),

    #[error("model `{id}` has no url for tier {tier}")]
    MissingTierUrl {
        id: String,
        tier: QualityTier,
    },

    #[error("model `{0}` declares neither `url` nor per-tier urls")]
    MissingUrls(String),

    #[error("model `{id}` has invalid color `{color}`")]
    InvalidColor {
        id: String,
        color: String,
    },

    #[error("model `{id}` has invalid point size {size}")]
    InvalidPointSize {
        id: String,
        size: f32,
    },

    #[error("resolution must be finite and positive, got {0}")]
    InvalidResolution(f32),

    #[error("max_attempts must be at least 1")]
    InvalidAttempts,

    #[error("stall timeout must be finite and positive, got {0}")]
    InvalidStallTimeout(f32),

    #[error("invalid config json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err.to_string())
    }
}


/// Outcome of a failed tier load.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled)
    }
}
