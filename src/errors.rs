//! Fatal error types for the benchmark run.
//!
//! Only configuration-time failures are fatal: an unresolvable reference
//! location, invalid argument combinations, or a missing external tool.
//! Everything that goes wrong while testing a single server is folded into
//! that server's [`crate::results::TestResult`] instead and never surfaces
//! here.

use std::error::Error;
use std::fmt;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Runtime failure outside any single test cycle.
    pub const RUNTIME_ERROR: i32 = 1;
    /// Configuration error (invalid arguments, unresolvable location,
    /// missing external tool).
    pub const CONFIG_ERROR: i32 = 2;
    /// The run finished but found fewer viable servers than requested.
    pub const PARTIAL_RESULTS: i32 = 4;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Categories of fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The reference location could not be resolved to coordinates and no
    /// fallback coordinates were supplied.
    LocationUnresolved,
    /// Invalid configuration or arguments.
    Config,
    /// A required external tool is missing or not responding.
    MissingTool,
    /// Fatal failure outside any single test cycle, such as an empty relay
    /// list or an unwritable results file.
    Runtime,
    /// Unknown or unexpected errors.
    Unknown,
}

impl ErrorKind {
    /// Get the exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::LocationUnresolved => exit_codes::CONFIG_ERROR,
            ErrorKind::Config => exit_codes::CONFIG_ERROR,
            ErrorKind::MissingTool => exit_codes::CONFIG_ERROR,
            ErrorKind::Runtime => exit_codes::RUNTIME_ERROR,
            ErrorKind::Unknown => exit_codes::UNKNOWN_ERROR,
        }
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::LocationUnresolved => "Location error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::MissingTool => "Missing tool",
            ErrorKind::Runtime => "Runtime error",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

/// A fatal error that aborts the run before or between test cycles.
#[derive(Debug)]
pub struct RunError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// User-friendly error message.
    pub message: String,
    /// Optional suggestion for how to resolve the error.
    pub suggestion: Option<String>,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl RunError {
    /// Create a new RunError.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggestion: None, source: None }
    }

    /// Add a suggestion for how to resolve the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add the underlying error source.
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Create a location-resolution error.
    pub fn location_unresolved(location: &str) -> Self {
        Self::new(
            ErrorKind::LocationUnresolved,
            format!("could not resolve coordinates for \"{}\"", location),
        )
        .with_suggestion(
            "Use a more specific location string, or supply fallback \
             coordinates with --default-lat and --default-lon.",
        )
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Create a runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Create a missing-tool error with an install hint.
    pub fn missing_tool(tool: &str, install_hint: &str) -> Self {
        Self::new(ErrorKind::MissingTool, format!("{} is not installed or not responding", tool))
            .with_suggestion(install_hint.to_string())
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)?;

        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  Suggestion: {}", suggestion)?;
        }

        Ok(())
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_exit_codes() {
        assert_eq!(ErrorKind::LocationUnresolved.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::Config.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::MissingTool.exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(ErrorKind::Runtime.exit_code(), exit_codes::RUNTIME_ERROR);
        assert_eq!(ErrorKind::Unknown.exit_code(), exit_codes::UNKNOWN_ERROR);
    }

    #[test]
    fn test_location_unresolved_has_remediation_hint() {
        let error = RunError::location_unresolved("Atlantis");

        let display = format!("{}", error);
        assert!(display.contains("Atlantis"));
        assert!(display.contains("--default-lat"));
        assert!(display.contains("Suggestion"));
    }

    #[test]
    fn test_missing_tool_display() {
        let error = RunError::missing_tool("mtr", "Install mtr using your package manager.");

        let display = format!("{}", error);
        assert!(display.contains("Missing tool"));
        assert!(display.contains("mtr"));
        assert!(display.contains("package manager"));
    }

    #[test]
    fn test_config_error_without_suggestion() {
        let error = RunError::config("weights must sum to 1.0");
        assert_eq!(error.exit_code(), exit_codes::CONFIG_ERROR);
        assert!(!format!("{}", error).contains("Suggestion"));
    }
}
