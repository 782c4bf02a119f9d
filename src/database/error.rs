use std::fmt;

/// Storage failure classified by cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: String },
    ConnectionError { message: String },
    /// Pool exhausted or statement timed out
    Timeout { message: String },
    QueryError { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        })
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Unknown {
            message: message.into(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::Timeout {
                message: err.to_string(),
            },
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseErrorKind::ConnectionError {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db_err) => {
                // 23505 unique_violation
                if db_err.code().as_deref() == Some("23505") {
                    DatabaseErrorKind::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or_default().to_string(),
                    }
                } else {
                    DatabaseErrorKind::QueryError {
                        message: db_err.message().to_string(),
                    }
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }

    /// Transient failures worth retrying on the next cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionError { .. } | DatabaseErrorKind::Timeout { .. }
        )
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => write!(f, "{} not found: {}", entity, id),
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                write!(f, "database connection error: {}", message)
            }
            DatabaseErrorKind::Timeout { message } => write!(f, "database timeout: {}", message),
            DatabaseErrorKind::QueryError { message } => write!(f, "query failed: {}", message),
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn pool_timeout_is_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timeout"));
    }
}
