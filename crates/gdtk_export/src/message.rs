//! User-visible export messages, distinct from the internal error codes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One line destined for the export log.
#[derive(Debug, Clone)]
pub struct ExportMessage {
    pub severity: Severity,
    pub category: String,
    pub text: String,
}

/// The highest severity across `messages`, if any.
pub fn worst_severity(messages: &[ExportMessage]) -> Option<Severity> {
    messages.iter().map(|m| m.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_severity_picks_the_maximum() {
        let messages = vec![
            ExportMessage {
                severity: Severity::Info,
                category: "Save PCK".into(),
                text: "done".into(),
            },
            ExportMessage {
                severity: Severity::Warning,
                category: "Save PCK".into(),
                text: "hm".into(),
            },
        ];
        assert_eq!(worst_severity(&messages), Some(Severity::Warning));
        assert_eq!(worst_severity(&[]), None);
    }
}
