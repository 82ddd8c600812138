use eda_common::db::core::DbError;
use eda_common::util::message::{ErrorMessage, Severity};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CtsError {
    #[error("ClockTree: {0}")]
    InvalidRegion(String),
    #[error("ClockTree: {}", .0.join(" "))]
    Config(Vec<String>),
    #[error("ClockTree: Cell \"{0}\" has no clock net.")]
    NoClockNet(String),
    #[error("ClockTree: {0}")]
    MissingConnection(String),
    #[error("ClockTree: \"{0}\" has not been built.")]
    NotBuilt(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CtsError {
    pub fn message(&self) -> ErrorMessage {
        match self {
            CtsError::Config(lines) => {
                let mut lines = lines.clone();
                if let Some(first) = lines.first_mut() {
                    *first = format!("ClockTree: {}", first);
                }
                ErrorMessage::new(Severity::Fatal, lines)
            }
            CtsError::MissingConnection(_) => ErrorMessage::new(Severity::Fatal, [self.to_string()]),
            _ => ErrorMessage::new(Severity::Error, [self.to_string()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_keep_their_lines() {
        let err = CtsError::Config(vec![
            "Buffer cell \"buf_x9\" not found in library,".into(),
            "please check the \"clock_tree.buffer\" configuration parameter.".into(),
        ]);
        let msg = err.message();
        assert_eq!(msg.severity, Severity::Fatal);
        assert_eq!(msg.lines.len(), 2);
        assert!(msg.lines[0].starts_with("ClockTree: Buffer cell"));
    }

    #[test]
    fn database_errors_convert() {
        let err: CtsError = DbError::SessionAlreadyOpen.into();
        assert_eq!(err.message().severity, Severity::Error);
        assert_eq!(err.to_string(), "an update session is already open");
    }
}
