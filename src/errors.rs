//! Errors for the TripWatch link
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("bad input for {field}: {detail}")]
    BadInput { field: String, detail: String },

    #[error("schema error on table {table}: {detail}")]
    SchemaError { table: String, detail: String },

    #[error("match column {column} on table {table} is zero")]
    MissingMatchKey { table: String, column: String },

    #[error("sequence column {column} on table {table} has no seed row")]
    SequenceUnavailable { table: String, column: String },

    #[error("upstream returned status {status}")]
    UpstreamError { status: u16 },

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("upstream record not found")]
    NotFound,

    #[error("cycle deadline exceeded")]
    Timeout,

    #[error("statement `{sql}` on table {table} failed")]
    Statement {
        table: String,
        sql: String,
        #[source]
        source: Box<LinkError>,
    },

    #[error("database failure")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    LockError(String),

    #[error("http transport failure")]
    TransportError(#[from] reqwest::Error),

    #[error("payload decode failure")]
    DecodeError(#[from] serde_json::Error),

    #[error("configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("configuration invalid: {message}")]
    ConfigurationError { message: String },

    #[error("{detail}")]
    InternalError { detail: String },
}

impl LinkError {
    pub fn internal(detail: impl Into<String>) -> Self {
        LinkError::InternalError {
            detail: detail.into(),
        }
    }

    pub fn bad_input(field: impl Into<String>, detail: impl Into<String>) -> Self {
        LinkError::BadInput {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Wrap a failure with the statement and table it came from.
    pub fn statement(table: &str, sql: &str, source: LinkError) -> Self {
        LinkError::Statement {
            table: table.to_string(),
            sql: sql.to_string(),
            source: Box::new(source),
        }
    }

    /// Innermost error of a `Statement` wrapper chain.
    fn root(&self) -> &LinkError {
        match self {
            LinkError::Statement { source, .. } => source.root(),
            other => other,
        }
    }

    /// Identity check used by the run loop to shorten log output. Looks
    /// through statement wrappers so the classification survives context.
    pub fn is_missing_match_key(&self) -> bool {
        matches!(self.root(), LinkError::MissingMatchKey { .. })
    }

    pub fn is_sequence_unavailable(&self) -> bool {
        matches!(self.root(), LinkError::SequenceUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_match_key_survives_wrapping() {
        let inner = LinkError::MissingMatchKey {
            table: "DUTYJOBS".to_string(),
            column: "JOBTIMEOUT".to_string(),
        };
        let wrapped = LinkError::statement(
            "DUTYJOBS",
            "UPDATE DUTYJOBS SET JOBSEAS=? WHERE JOBTIMEOUT=?",
            inner,
        );
        let doubly = LinkError::statement("DUTYJOBS", "INSERT INTO DUTYJOBS ...", wrapped);
        assert!(doubly.is_missing_match_key());
        assert!(!doubly.is_sequence_unavailable());
    }

    #[test]
    fn other_kinds_do_not_classify_as_match_failures() {
        let err = LinkError::statement(
            "DUTYJOBS",
            "SELECT MAX(JOBJOBSEQUENCE) FROM DUTYJOBS",
            LinkError::SequenceUnavailable {
                table: "DUTYJOBS".to_string(),
                column: "JOBJOBSEQUENCE".to_string(),
            },
        );
        assert!(!err.is_missing_match_key());
        assert!(err.is_sequence_unavailable());
    }
}
