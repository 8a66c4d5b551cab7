use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The native failure a backend reported, kept for diagnostics once it has
/// been translated into an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Underlying {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl Underlying {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Captures an io error with its kind as the code and, when present, the
    /// raw OS errno.
    pub fn from_io(err: &std::io::Error) -> Self {
        let code = match err.raw_os_error() {
            Some(errno) => format!("{:?} (os error {errno})", err.kind()),
            None => format!("{:?}", err.kind()),
        };
        Self::new(code, err.to_string())
    }

    pub(crate) fn path_escape() -> Self {
        Self::new("PathEscapesRoot", "path resolves outside the volume root")
    }
}

impl fmt::Display for Underlying {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Underlying {}

/// Storage failures, independent of the backend that produced them.
///
/// Drivers translate every native error into one of these before returning,
/// so callers never see `std::io::Error` or S3 responses directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found at {path}\n{underlying}")]
    NotFound {
        path: String,
        #[source]
        underlying: Underlying,
    },

    #[error(
        "Operation not permitted for file {path}\n{underlying}{}",
        .hint.as_ref().map(|h| format!("\nHint: {h}")).unwrap_or_default()
    )]
    OperationNotPermitted {
        path: String,
        hint: Option<String>,
        #[source]
        underlying: Underlying,
    },

    #[error("Missing required permission for file {path}\n{underlying}")]
    PermissionRequired {
        path: String,
        #[source]
        underlying: Underlying,
    },

    #[error("The bucket {bucket} was not found\n{underlying}")]
    UnknownBucket {
        bucket: String,
        path: String,
        #[source]
        underlying: Underlying,
    },

    #[error("The \"{operation}\" requires argument \"{argument}\"")]
    MissingArgument {
        operation: &'static str,
        argument: &'static str,
    },

    #[error(
        "Unknown error for file {path}\n    Error: {}\n    Error message: {}",
        .underlying.code,
        .underlying.message
    )]
    Unknown {
        path: String,
        bucket: Option<String>,
        #[source]
        underlying: Underlying,
    },

    #[error("The volume {name} was not found")]
    UnknownVolume { name: String },

    #[error("No driver registered for protocol \"{protocol}\"")]
    UnknownDriver { protocol: String },
}

impl Error {
    pub(crate) fn escapes_root(path: &str) -> Self {
        Error::OperationNotPermitted {
            path: path.to_string(),
            hint: Some("path escapes volume root".to_string()),
            underlying: Underlying::path_escape(),
        }
    }

    pub(crate) fn target_exists(path: &str) -> Self {
        Error::OperationNotPermitted {
            path: path.to_string(),
            hint: Some("Use overwrite option.".to_string()),
            underlying: Underlying::new("AlreadyExists", "dest already exists"),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "ERR_FILE_NOT_FOUND",
            Error::OperationNotPermitted { .. } => "ERR_OPERATION_NOT_PERMITTED",
            Error::PermissionRequired { .. } => "ERR_PERMISSION_REQUIRED",
            Error::UnknownBucket { .. } => "ERR_UNKNOWN_BUCKET",
            Error::MissingArgument { .. } => "ERR_MISSING_ARGUMENT",
            Error::Unknown { .. } => "ERR_UNKNOWN",
            Error::UnknownVolume { .. } => "ERR_UNKNOWN_VOLUME",
            Error::UnknownDriver { .. } => "ERR_UNKNOWN_DRIVER",
        }
    }

    /// HTTP-style status for API surfaces.
    pub fn status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::OperationNotPermitted { .. } => 403,
            Error::PermissionRequired { .. } => 401,
            Error::UnknownBucket { .. } => 404,
            Error::MissingArgument { .. } => 400,
            Error::Unknown { .. } => 500,
            Error::UnknownVolume { .. } => 404,
            Error::UnknownDriver { .. } => 400,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn data(&self) -> ErrorData {
        let mut data = ErrorData::default();
        match self {
            Error::NotFound { path, underlying }
            | Error::PermissionRequired { path, underlying } => {
                data.path = Some(path.clone());
                data.underlying = Some(underlying.clone());
            }
            Error::OperationNotPermitted {
                path, underlying, ..
            } => {
                data.path = Some(path.clone());
                data.underlying = Some(underlying.clone());
            }
            Error::UnknownBucket {
                bucket,
                path,
                underlying,
            } => {
                data.path = Some(path.clone());
                data.bucket = Some(bucket.clone());
                data.underlying = Some(underlying.clone());
            }
            Error::Unknown {
                path,
                bucket,
                underlying,
            } => {
                data.path = Some(path.clone());
                data.bucket = bucket.clone();
                data.underlying = Some(underlying.clone());
            }
            Error::MissingArgument {
                operation,
                argument,
            } => {
                data.operation = Some(*operation);
                data.argument = Some(*argument);
            }
            Error::UnknownVolume { name } => data.volume = Some(name.clone()),
            Error::UnknownDriver { protocol } => data.protocol = Some(protocol.clone()),
        }
        data
    }

    /// Plain serializable form of this error. The source chain is only
    /// included when `include_trace` is set.
    pub fn report(&self, include_trace: bool) -> ErrorReport {
        let trace = include_trace.then(|| {
            let mut chain = Vec::new();
            let mut source = std::error::Error::source(self);
            while let Some(err) = source {
                chain.push(err.to_string());
                source = err.source();
            }
            chain
        });
        ErrorReport {
            message: self.to_string(),
            code: self.code(),
            status: self.status(),
            data: self.data(),
            trace,
        }
    }
}

/// Structured payload attached to every [`Error`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying: Option<Underlying>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub message: String,
    pub code: &'static str,
    pub status: u16,
    pub data: ErrorData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

impl ErrorReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
