use std::fmt;

use crate::backend::BackendError;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalid,
    AuthRequired,
    CredentialRejected,
    PermissionDenied,
    WorkItemNotFound,
    DuplicateWorkItem,
    InvalidUrl,
    InvalidDate,
    InvalidProgress,
    RangeNotFound,
    InvalidSchemaVersion,
    UnsupportedMigration,
    BackendFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "E1001",
            Self::AuthRequired => "E1002",
            Self::CredentialRejected => "E1003",
            Self::PermissionDenied => "E1004",
            Self::WorkItemNotFound => "E2001",
            Self::DuplicateWorkItem => "E2002",
            Self::InvalidUrl => "E2003",
            Self::InvalidDate => "E2004",
            Self::InvalidProgress => "E2005",
            Self::RangeNotFound => "E3001",
            Self::InvalidSchemaVersion => "E3002",
            Self::UnsupportedMigration => "E3003",
            Self::BackendFailure => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "Configuration error",
            Self::AuthRequired => "Write credential required",
            Self::CredentialRejected => "Credential rejected by the spreadsheet backend",
            Self::PermissionDenied => "Permission denied",
            Self::WorkItemNotFound => "Epic not found",
            Self::DuplicateWorkItem => "Epic already exists",
            Self::InvalidUrl => "Invalid epic URL",
            Self::InvalidDate => "Invalid date",
            Self::InvalidProgress => "Progress out of range",
            Self::RangeNotFound => "Sheet or range not found",
            Self::InvalidSchemaVersion => "Invalid schema version",
            Self::UnsupportedMigration => "Unsupported schema migration",
            Self::BackendFailure => "Spreadsheet backend failure",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid => Some("Check SPREADSHEET_ID and the epicsheet config file."),
            Self::AuthRequired => {
                Some("Set GOOGLE_SHEETS_ACCESS_TOKEN to a token with spreadsheet write scope.")
            }
            Self::CredentialRejected => Some("Refresh the access token and retry."),
            Self::PermissionDenied => {
                Some("Grant the credential's account edit access to the spreadsheet.")
            }
            Self::WorkItemNotFound => Some("Run `es list` to see known epic ids."),
            Self::DuplicateWorkItem => None,
            Self::InvalidUrl => {
                Some("Use a tracker URL such as https://company.atlassian.net/browse/PROJ-123.")
            }
            Self::InvalidDate => Some("Use the YYYY-MM-DD date format."),
            Self::InvalidProgress => Some("Progress is a percentage between 0 and 100."),
            Self::RangeNotFound => Some("Check the spreadsheet id and the sheet names."),
            Self::InvalidSchemaVersion => {
                Some("Fix the schema_version row in the Metadata sheet (expected MAJOR.MINOR.PATCH).")
            }
            Self::UnsupportedMigration => {
                Some("Upgrade epicsheet to a release that knows this schema version.")
            }
            Self::BackendFailure => Some("Retry once. If persistent, check network access."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the data-access layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write was attempted without a write-capable credential.
    #[error(
        "write operations require a write credential; set GOOGLE_SHEETS_ACCESS_TOKEN to enable them"
    )]
    AuthRequired,

    /// The named sheet or range does not exist.
    #[error("sheet or range not found: {range}")]
    NotFound { range: String },

    /// A date string did not parse to a calendar date.
    #[error("invalid date '{0}'")]
    InvalidDate(String),

    /// No epic id could be extracted from a URL.
    #[error("invalid epic url '{0}': expected .../browse/PREFIX-NUMBER")]
    InvalidUrl(String),

    /// Progress outside `0..=100`.
    #[error("invalid progress {0}: must be between 0 and 100")]
    InvalidProgress(u32),

    /// The stored schema version is not a `MAJOR.MINOR.PATCH` string.
    #[error("invalid schema version '{0}'")]
    InvalidSchemaVersion(String),

    /// No registered migration leads from `from` to `to`.
    #[error("no migration path from schema {from} to {to}")]
    UnsupportedMigration { from: String, to: String },

    /// The referenced epic does not exist.
    #[error("epic {0} not found")]
    WorkItemNotFound(String),

    /// An epic with this id already exists.
    #[error("epic {0} already exists")]
    DuplicateWorkItem(String),

    /// Configuration is incomplete or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backend failed for a reason other than a missing range.
    #[error("{message}")]
    Backend {
        message: String,
        #[source]
        source: BackendError,
    },
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::AuthRequired => ErrorCode::AuthRequired,
            Self::NotFound { .. } => ErrorCode::RangeNotFound,
            Self::InvalidDate(_) => ErrorCode::InvalidDate,
            Self::InvalidUrl(_) => ErrorCode::InvalidUrl,
            Self::InvalidProgress(_) => ErrorCode::InvalidProgress,
            Self::InvalidSchemaVersion(_) => ErrorCode::InvalidSchemaVersion,
            Self::UnsupportedMigration { .. } => ErrorCode::UnsupportedMigration,
            Self::WorkItemNotFound(_) => ErrorCode::WorkItemNotFound,
            Self::DuplicateWorkItem(_) => ErrorCode::DuplicateWorkItem,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Backend { source, .. } => match source {
                BackendError::Unauthenticated(_) => ErrorCode::CredentialRejected,
                BackendError::PermissionDenied(_) => ErrorCode::PermissionDenied,
                _ => ErrorCode::BackendFailure,
            },
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Returns `true` when the error means "this named resource does not exist".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(range) => Self::NotFound { range },
            BackendError::Unauthenticated(_) => Self::Backend {
                message: "Authentication failed. Please check the spreadsheet access token."
                    .to_string(),
                source: err,
            },
            BackendError::PermissionDenied(_) => Self::Backend {
                message: "Permission denied. Please ensure the credential has edit access to the spreadsheet."
                    .to_string(),
                source: err,
            },
            other => Self::Backend {
                message: other.to_string(),
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigInvalid,
            ErrorCode::AuthRequired,
            ErrorCode::CredentialRejected,
            ErrorCode::PermissionDenied,
            ErrorCode::WorkItemNotFound,
            ErrorCode::DuplicateWorkItem,
            ErrorCode::InvalidUrl,
            ErrorCode::InvalidDate,
            ErrorCode::InvalidProgress,
            ErrorCode::RangeNotFound,
            ErrorCode::InvalidSchemaVersion,
            ErrorCode::UnsupportedMigration,
            ErrorCode::BackendFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::UnsupportedMigration.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn backend_not_found_becomes_store_not_found() {
        let err = StoreError::from(BackendError::NotFound("Status_Updates_2025_Q1!A:Z".into()));
        assert!(err.is_not_found());
        assert_eq!(err.code(), ErrorCode::RangeNotFound);
    }

    #[test]
    fn backend_status_codes_get_actionable_messages() {
        let denied = StoreError::from(BackendError::from_status(403, "forbidden", "Epics!A:Z"));
        assert_eq!(denied.code(), ErrorCode::PermissionDenied);
        assert!(denied.to_string().contains("edit access"));

        let rejected = StoreError::from(BackendError::from_status(401, "expired", "Epics!A:Z"));
        assert_eq!(rejected.code(), ErrorCode::CredentialRejected);
        assert!(rejected.to_string().contains("Authentication failed"));

        let missing = StoreError::from(BackendError::from_status(404, "nope", "Epics!A:Z"));
        assert!(missing.is_not_found());
    }
}
