use thiserror::Error;

/// Errors surfaced by the query catalog.
///
/// An operation that matches nothing is not an error; it returns an empty
/// [`QueryResult`](crate::db::QueryResult).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NexusError {
    /// Missing or invalid connection parameters, manifest or config.
    #[error("{0}")]
    Configuration(String),
    /// Malformed relation name or identifier chain.
    #[error("{0}")]
    Format(String),
    /// Filter missing a required value or carrying the wrong value shape.
    #[error("{0}")]
    Validation(String),
    /// Execution failure reported by the warehouse.
    #[error("{0}")]
    Warehouse(String),
}

impl NexusError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        NexusError::Configuration(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        NexusError::Format(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        NexusError::Validation(msg.into())
    }

    pub fn warehouse(msg: impl Into<String>) -> Self {
        NexusError::Warehouse(msg.into())
    }

    /// Short label for the error family, used in CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            NexusError::Configuration(_) => "ConfigurationError",
            NexusError::Format(_) => "FormatError",
            NexusError::Validation(_) => "ValidationError",
            NexusError::Warehouse(_) => "WarehouseError",
        }
    }
}

pub type Result<T> = std::result::Result<T, NexusError>;
