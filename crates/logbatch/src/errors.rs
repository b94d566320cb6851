// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by the pipeline's lifecycle operations.
///
/// Nothing on the `add_entry` path returns an error outward; admission
/// failures communicate through boolean returns and metrics so producers can
/// never be broken by the logging subsystem itself.
/// Redundant `start`/`stop` calls are idempotent no-ops rather than errors,
/// and a shutdown timeout is logged and absorbed, so neither condition has a
/// variant here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Sink(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PipelineError::Config("batch_size must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: batch_size must be greater than 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: PipelineError = io.into();
        assert!(matches!(error, PipelineError::Sink(_)));
    }
}
