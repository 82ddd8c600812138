use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// User facing failure report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMessage {
    pub severity: Severity,
    pub lines: Vec<String>,
}

impl ErrorMessage {
    pub fn new<I, S>(severity: Severity, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            severity,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn log(&self) {
        for line in &self.lines {
            match self.severity {
                Severity::Warning => log::warn!("{}", line),
                Severity::Error | Severity::Fatal => log::error!("{}", line),
            }
        }
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = format!("[{}]", self.severity);
        for (i, line) in self.lines.iter().enumerate() {
            if i == 0 {
                write!(f, "{} {}", tag, line)?;
            } else {
                write!(f, "\n{:width$} {}", "", line, width = tag.len())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_lines_are_aligned() {
        let msg = ErrorMessage::new(Severity::Error, ["first", "second"]);
        assert_eq!(msg.to_string(), "[ERROR] first\n        second");
    }
}
