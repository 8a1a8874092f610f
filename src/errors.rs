// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the filter engine

use std::fmt;

/// Result type alias using FilterError
pub type FilterResult<T> = Result<T, FilterError>;

/// Why a filter refused to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The device reported itself lost; the module must be rebuilt
    DeviceLost,
    /// The recorder still holds submitted work that was never reset
    RecorderBusy,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::DeviceLost => write!(f, "device lost"),
            NotReadyReason::RecorderBusy => write!(f, "command recorder busy"),
        }
    }
}

/// Main error type
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    /// No adapter matched the selector
    #[error("no compute device available: {0}")]
    DeviceUnavailable(String),

    /// Adapter found but the logical device could not be created
    #[error("device request failed: {0}")]
    DeviceRequest(String),

    /// Validation, poll or submission failure reported by the device
    #[error("device error: {0}")]
    Device(String),

    /// WGSL parse or validation failure
    #[error("shader `{name}` failed to compile: {message}")]
    Compile { name: String, message: String },

    /// Pipeline object creation failure
    #[error("pipeline `{name}` creation failed: {message}")]
    Pipeline { name: String, message: String },

    /// The module cannot dispatch right now
    #[error("filter not ready: {0}")]
    NotReady(NotReadyReason),

    /// Binding set does not match the stage layout
    #[error("binding error in stage `{stage}`: {message}")]
    Binding { stage: String, message: String },

    /// Buffer shape rejected (zero size, channel count, data length)
    #[error("invalid shape: {0}")]
    Shape(String),

    /// Staging buffer could not be mapped for readback
    #[error("buffer mapping failed: {0}")]
    Map(String),

    /// Configuration file errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FilterError {
    pub(crate) fn binding(stage: &str, message: impl Into<String>) -> Self {
        FilterError::Binding {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// True when the filter refused to dispatch
    pub fn is_not_ready(&self) -> bool {
        matches!(self, FilterError::NotReady(_))
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_display() {
        let err = FilterError::NotReady(NotReadyReason::DeviceLost);
        assert_eq!(err.to_string(), "filter not ready: device lost");
        assert!(err.is_not_ready());
    }

    #[test]
    fn test_binding_helper() {
        let err = FilterError::binding("harris_nms", "missing slot `dst`");
        assert_eq!(
            err.to_string(),
            "binding error in stage `harris_nms`: missing slot `dst`"
        );
        assert!(!err.is_not_ready());
    }
}
