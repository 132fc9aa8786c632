//! Enhanced error handling module for ksg-cli.
//!
//! Provides helpful error messages with context and suggestions for common issues.

use anyhow::Result;
use colored::Colorize;

/// Trait for adding helpful context and suggestions to errors
#[allow(dead_code)]
pub trait EnhancedError<T> {
    /// Add context with helpful suggestions
    fn context_with_help(self, msg: &str, help: &[&str]) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> EnhancedError<T> for Result<T, E> {
    fn context_with_help(self, msg: &str, help: &[&str]) -> Result<T> {
        self.map_err(|e| {
            let mut error_msg = format!("{}\n\n{}", msg.red().bold(), e);

            if !help.is_empty() {
                error_msg.push_str(&format!("\n\n{}", "Possible solutions:".yellow().bold()));
                for (i, h) in help.iter().enumerate() {
                    error_msg.push_str(&format!("\n  {}. {}", i + 1, h));
                }
            }

            anyhow::anyhow!(error_msg)
        })
    }
}

/// Common error messages and help text
#[allow(dead_code)]
pub mod helpers {
    /// Procedure not found error help
    #[allow(dead_code)]
    pub const PROCEDURE_NOT_FOUND_HELP: &[&str] = &[
        "Check that the procedure UUID is correct (use 'ksg-cli procedure search <query>')",
        "Verify the procedure hasn't been soft-deleted",
        "Check store connectivity: 'ksg-cli health'",
    ];

    /// Queue item not found error help
    #[allow(dead_code)]
    pub const QUEUE_ITEM_NOT_FOUND_HELP: &[&str] = &[
        "Check that the queue item UUID is correct (use 'ksg-cli queue list')",
        "The item may already be done or failed and dropped from the active listing",
        "Check store connectivity: 'ksg-cli health'",
    ];

    /// Store connection error help
    #[allow(dead_code)]
    pub const STORE_CONNECTION_HELP: &[&str] = &[
        "Verify the redb file path is correct in configuration",
        "Check the process has read/write permission on the store path",
        "Try the in-memory backend instead: set backend = \"memory\" in ksg-cli.toml",
        "Validate configuration: 'ksg-cli config show'",
    ];

    /// Configuration error help
    #[allow(dead_code)]
    pub const CONFIG_ERROR_HELP: &[&str] = &[
        "Check the config file at ./ksg-cli.toml (or pass --config <FILE>)",
        "Verify all required fields are present",
        "Use 'ksg-cli config show' to inspect the resolved configuration",
        "See documentation for configuration examples",
    ];

    /// Invalid input error help
    #[allow(dead_code)]
    pub const INVALID_INPUT_HELP: &[&str] = &[
        "Check input format and data types",
        "Verify JSON syntax if providing a --props or --payload argument",
        "Use --help to see valid options",
    ];

    /// Plan confidence / ask-user error help
    #[allow(dead_code)]
    pub const ASK_USER_HELP: &[&str] = &[
        "The agent loop could not reach PLAN_MIN_CONFIDENCE for this request",
        "Rephrase the request with more specific detail",
        "Lower PLAN_MIN_CONFIDENCE if this is expected for your workload",
    ];

    /// Format enhanced error message
    #[allow(dead_code)]
    pub fn format_error_message(error: &str, context: &str, help: &[&str]) -> String {
        use colored::Colorize;

        let mut msg = format!("{}\n\n{}", context.red().bold(), error);

        if !help.is_empty() {
            msg.push_str(&format!("\n\n{}", "Possible solutions:".yellow().bold()));
            for (i, h) in help.iter().enumerate() {
                msg.push_str(&format!("\n  {}. {}", i + 1, h));
            }
        }

        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhanced_error_contains_help() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let enhanced = result.context_with_help("Operation failed", &["Solution 1", "Solution 2"]);

        assert!(enhanced.is_err());
        let error_str = enhanced.unwrap_err().to_string();
        assert!(error_str.contains("Possible solutions:"));
        assert!(error_str.contains("Solution 1"));
        assert!(error_str.contains("Solution 2"));
    }

    #[test]
    fn test_enhanced_error_without_help() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let enhanced = result.context_with_help("Operation failed", &[]);

        assert!(enhanced.is_err());
        let error_str = enhanced.unwrap_err().to_string();
        assert!(error_str.contains("Operation failed"));
        assert!(!error_str.contains("Possible solutions:"));
    }

    #[test]
    fn test_format_error_message() {
        let formatted = helpers::format_error_message(
            "Test error",
            "Operation failed",
            &["Solution 1", "Solution 2"],
        );

        assert!(formatted.contains("Operation failed"));
        assert!(formatted.contains("Test error"));
        assert!(formatted.contains("Possible solutions:"));
        assert!(formatted.contains("1. Solution 1"));
        assert!(formatted.contains("2. Solution 2"));
    }
}
