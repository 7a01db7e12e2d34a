//! Parsing error types
//!
//! Field-level decode failures are isolated to the single field or widget
//! and never fail the whole item; a missing identity is the one hard failure
//! an item can have.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParseError {
    #[error("no SKU could be derived for item")]
    IdentityMissing { context: Option<String> },

    #[error("malformed widget payload: {reason}")]
    WidgetDecodeFailed {
        widget: Option<String>,
        reason: String,
    },

    #[error("invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("anti-bot interstitial detected on page")]
    InterstitialDetected,

    #[error("HTML parsing failed: {message}")]
    HtmlParsingFailed { message: String },
}

impl ParseError {
    pub fn identity_missing(context: Option<&str>) -> Self {
        Self::IdentityMissing {
            context: context.map(str::to_string),
        }
    }

    pub fn widget_decode(widget: Option<&str>, reason: impl Into<String>) -> Self {
        Self::WidgetDecodeFailed {
            widget: widget.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Whether the item as a whole survives this error (degraded), or the
    /// item must be discarded.
    pub fn is_item_fatal(&self) -> bool {
        matches!(
            self,
            Self::IdentityMissing { .. } | Self::InterstitialDetected
        )
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
