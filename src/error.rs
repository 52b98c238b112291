//! Error taxonomy for certificate generation.
//!
//! Fatal variants abort the running session; `AssetLoadTimeout` and
//! `DateParse` are recorded and logged but never stop generation.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::locale::{LabelTable, Locale};

#[derive(Debug, Error)]
pub enum CertificateError {
    /// Assets were still pending when the readiness wait elapsed.
    #[error("{pending} asset(s) still loading after {waited:?}")]
    AssetLoadTimeout { pending: usize, waited: Duration },

    #[error("render host could not be created: {0}")]
    RenderHostCreation(String),

    #[error("capture of sheet {index} failed: {reason}")]
    Capture { index: usize, reason: String },

    #[error("print invocation failed: {0}")]
    PrintInvocation(String),

    #[error("unparseable date {0:?}")]
    DateParse(String),

    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CertificateError {
    /// Whether the pipeline may continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CertificateError::AssetLoadTimeout { .. } | CertificateError::DateParse(_)
        )
    }

    /// Label key of the message shown to the user for this failure.
    fn message_key(&self) -> &'static str {
        match self {
            CertificateError::PrintInvocation(_) => "printError",
            CertificateError::Capture { .. } => "exportError",
            _ => "generationError",
        }
    }
}

/// The single human-readable message surfaced for a failed session.
///
/// The internal cause is kept for logging but never rendered by `Display`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UserFacingError {
    pub message: String,
    #[source]
    pub cause: CertificateError,
}

impl UserFacingError {
    pub fn new(cause: CertificateError, labels: &LabelTable, locale: Locale) -> Self {
        Self {
            message: labels.get(locale, cause.message_key()).to_string(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_fatal_variants() {
        assert!(!CertificateError::DateParse("x".into()).is_fatal());
        assert!(!CertificateError::AssetLoadTimeout {
            pending: 1,
            waited: Duration::from_secs(1)
        }
        .is_fatal());
        assert!(CertificateError::Capture {
            index: 2,
            reason: "boom".into()
        }
        .is_fatal());
    }

    #[test]
    fn user_message_hides_cause() {
        let labels = LabelTable::default();
        let err = UserFacingError::new(
            CertificateError::PrintInvocation("lp: exit status 1".into()),
            &labels,
            Locale::En,
        );
        let shown = err.to_string();
        assert!(!shown.contains("lp:"));
        assert_eq!(shown, labels.get(Locale::En, "printError"));
    }
}
