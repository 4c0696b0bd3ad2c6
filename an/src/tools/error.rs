//! Tool error types

use thiserror::Error;

/// Errors that abort a tool invocation instead of being shown to the model
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    UnknownTool { name: String },
}

/// Failures reported by an external data collaborator
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No {what} for {subject}")]
    NotFound { subject: String, what: String },

    #[error("Section '{section}' not present in {doc_type} for {subject} {period}")]
    SectionNotFound {
        subject: String,
        period: String,
        doc_type: String,
        section: String,
    },

    #[error("Invalid {field} '{value}': must be a single name inside the data directory")]
    InvalidPath { field: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),
}
