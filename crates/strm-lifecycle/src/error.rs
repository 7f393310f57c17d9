use std::fmt;

use strm_ledger::{LedgerError, LedgerErrorKind};
use strm_schemas::StreamStatus;
use strm_store::RepoError;

/// Machine-readable error class for the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    RemoteFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::RemoteFailure => "REMOTE_FAILURE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteFailureKind {
    /// Retryable. Nothing was committed.
    Transient,
    /// Terminal. The ledger or gateway refused.
    Rejected,
    /// Terminal. The contract refused because of the stream's on-chain state.
    ConflictingState,
}

impl RemoteFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteFailureKind::Transient => "TRANSIENT",
            RemoteFailureKind::Rejected => "REJECTED",
            RemoteFailureKind::ConflictingState => "CONFLICTING_STATE",
        }
    }
}

impl From<LedgerErrorKind> for RemoteFailureKind {
    fn from(k: LedgerErrorKind) -> Self {
        match k {
            LedgerErrorKind::Transient => RemoteFailureKind::Transient,
            LedgerErrorKind::Rejected => RemoteFailureKind::Rejected,
            LedgerErrorKind::ConflictingState => RemoteFailureKind::ConflictingState,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Bad input. Never reaches the ledger.
    Validation { field: &'static str, message: String },
    NotFound { id: String },
    /// The operation is not valid for the stream's current derived status.
    Conflict {
        id: String,
        status: StreamStatus,
        message: String,
    },
    /// The ledger refused or could not be reached. Local state is unchanged.
    Remote {
        kind: RemoteFailureKind,
        source: LedgerError,
    },
}

impl StreamError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        StreamError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn conflict(id: &str, status: StreamStatus, message: impl Into<String>) -> Self {
        StreamError::Conflict {
            id: id.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Validation { .. } => ErrorKind::Validation,
            StreamError::NotFound { .. } => ErrorKind::NotFound,
            StreamError::Conflict { .. } => ErrorKind::Conflict,
            StreamError::Remote { .. } => ErrorKind::RemoteFailure,
        }
    }

    /// Sub-classification, present only for [`ErrorKind::RemoteFailure`].
    pub fn remote_kind(&self) -> Option<RemoteFailureKind> {
        match self {
            StreamError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.remote_kind() == Some(RemoteFailureKind::Transient)
    }
}

impl From<LedgerError> for StreamError {
    fn from(e: LedgerError) -> Self {
        StreamError::Remote {
            kind: e.kind().into(),
            source: e,
        }
    }
}

impl From<RepoError> for StreamError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound { id } => StreamError::NotFound { id },
            RepoError::DuplicateId { id } => StreamError::Validation {
                field: "id",
                message: format!("stream id already exists: {id}"),
            },
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Validation { field, message } => {
                write!(f, "{}: {field}: {message}", ErrorKind::Validation.as_str())
            }
            StreamError::NotFound { id } => {
                write!(f, "{}: stream {id}", ErrorKind::NotFound.as_str())
            }
            StreamError::Conflict {
                id,
                status,
                message,
            } => write!(
                f,
                "{}: stream {id} is {}: {message}",
                ErrorKind::Conflict.as_str(),
                status.as_str()
            ),
            StreamError::Remote { kind, source } => write!(
                f,
                "{}/{}: {source}",
                ErrorKind::RemoteFailure.as_str(),
                kind.as_str()
            ),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_keep_their_classification() {
        let e: StreamError = LedgerError::Timeout.into();
        assert_eq!(e.kind(), ErrorKind::RemoteFailure);
        assert_eq!(e.remote_kind(), Some(RemoteFailureKind::Transient));

        let e: StreamError = LedgerError::ConflictingState {
            code: "ALREADY_CANCELED".into(),
            message: "x".into(),
        }
        .into();
        assert_eq!(e.remote_kind(), Some(RemoteFailureKind::ConflictingState));
        assert!(!e.is_transient());
    }

    #[test]
    fn display_leads_with_the_machine_code() {
        let e = StreamError::conflict("s-1", StreamStatus::Completed, "nothing to cancel");
        assert!(e.to_string().starts_with("CONFLICT: stream s-1 is completed"));
        let e: StreamError = RepoError::NotFound { id: "s-2".into() }.into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }
}
