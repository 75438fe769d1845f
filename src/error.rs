//! Error model for the scripted scan.
//!
//! Errors are layered the same way the scan is: a `ConvertError` for one value,
//! a `RowError` for one produced row, and a `ScanError` for the scan as a whole.
//! `ScanError::pg_fields` maps each failure to the (sqlstate, severity, message)
//! triple a Postgres-speaking front end reports.

use std::collections::BTreeMap;

use polars::prelude::PolarsError;
use thiserror::Error;

use crate::runtime::RuntimeException;
use crate::session::SessionState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid option \"{name}\" ({hint})")]
    UnknownOption { name: String, hint: String },
    #[error("conflicting or redundant options: \"{0}\" given more than once")]
    DuplicateOption(String),
    #[error("wrapper_path and wrapper_class are mutually exclusive")]
    ConflictingSource,
    #[error("wrapper_path (path of the .lua source file) or wrapper_class is required")]
    MissingSource,
    #[error("option \"{0}\" must not be empty")]
    EmptyValue(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("{kind} values are not supported: {detail}")]
    UnsupportedValueKind { kind: &'static str, detail: String },
    #[error("unknown value kind ({0})")]
    UnknownValueKind(String),
    #[error("unsupported foreign object '{type_name}': {reason}")]
    UnsupportedOpaqueType { type_name: String, reason: String },
    #[error("timestamp of {seconds}s is outside the representable range")]
    TimestampOutOfRange { seconds: i64 },
    #[error(transparent)]
    Runtime(#[from] RuntimeException),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    /// `each` returned something other than a sequence. The scan treats this as end of data.
    #[error("#each must provide a sequence (was {inspected})")]
    NotASequence { inspected: String },
    #[error("column {index}: {cause}")]
    ElementFailed {
        index: usize,
        #[source]
        cause: ConvertError,
    },
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("failed to open script runtime: {0}")]
    RuntimeOpen(#[source] RuntimeException),
    #[error("failed to load {label}: {cause}")]
    LoadFailed {
        label: String,
        #[source]
        cause: RuntimeException,
    },
    #[error("wrapper constructor raised: {message} (parameters: {parameters:?})")]
    ConstructorFailed { message: String, parameters: BTreeMap<String, String> },
    #[error("#each raised: {0}")]
    IterationFailed(#[source] RuntimeException),
    #[error("row {row}: {cause}")]
    Row {
        row: u64,
        #[source]
        cause: RowError,
    },
    #[error("scan session is {state}; cannot {operation}")]
    InvalidState { state: SessionState, operation: &'static str },
    #[error("frame assembly failed: {0}")]
    Frame(#[from] PolarsError),
}

impl ScanError {
    pub fn sqlstate(&self) -> &'static str {
        match self {
            ScanError::Configuration(ConfigError::UnknownOption { .. }) => "HV00D", // fdw_invalid_option_name
            ScanError::Configuration(ConfigError::DuplicateOption(_))
            | ScanError::Configuration(ConfigError::ConflictingSource) => "42601", // syntax_error
            ScanError::Configuration(ConfigError::MissingSource) => "HV00J",    // fdw_option_name_not_found
            ScanError::Configuration(ConfigError::EmptyValue(_)) => "HV024",    // fdw_invalid_attribute_value
            ScanError::RuntimeOpen(_)
            | ScanError::LoadFailed { .. }
            | ScanError::ConstructorFailed { .. } => "HV00L", // fdw_unable_to_create_execution
            ScanError::IterationFailed(_) => "HV000",          // fdw_error
            ScanError::Row { .. } => "HV004",                  // fdw_invalid_data_type
            ScanError::InvalidState { .. } => "HV010",         // fdw_function_sequence_error
            ScanError::Frame(_) => "XX000",                    // internal_error
        }
    }

    pub fn severity(&self) -> &'static str {
        match self {
            ScanError::RuntimeOpen(_) => "FATAL",
            _ => "ERROR",
        }
    }

    /// (sqlstate, severity, message)
    pub fn pg_fields(&self) -> (&'static str, &'static str, String) { (self.sqlstate(), self.severity(), self.to_string()) }
}

pub type ScanResult<T> = Result<T, ScanError>;
