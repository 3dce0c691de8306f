//! Output of one command run outside the apply path.

use std::fmt;
use std::time::Duration;

/// What a device printed for one command.
#[derive(Debug, Clone)]
pub struct Response {
    pub command: String,
    /// Output between the echo line and the closing prompt.
    pub result: String,
    /// Output including the echo line.
    pub raw_result: String,
    /// The prompt that closed the output, trimmed.
    pub prompt: String,
    pub elapsed: Duration,
    /// First output line the family classifies as fatal.
    pub failure_message: Option<String>,
}

impl Response {
    pub fn new(
        command: impl Into<String>,
        result: impl Into<String>,
        raw_result: impl Into<String>,
        prompt: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            raw_result: raw_result.into(),
            prompt: prompt.into(),
            elapsed,
            failure_message: None,
        }
    }

    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    /// No line of the output was classified fatal.
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.result.contains(needle)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.result)
    }
}

/// Drop the echoed command line from raw output.
pub(crate) fn strip_echo(raw: &str) -> &str {
    match raw.find('\n') {
        Some(i) => &raw[i + 1..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_echo() {
        assert_eq!(strip_echo("show clock\n10:00:00 UTC\n"), "10:00:00 UTC\n");
        assert_eq!(strip_echo("terminal length 0"), "");
    }

    #[test]
    fn test_failure_marks_response() {
        let ok = Response::new("show x", "x", "show x\nx", "r1#", Duration::ZERO);
        assert!(ok.is_success());
        let failed = ok.with_failure("% Invalid input detected at '^' marker.");
        assert!(!failed.is_success());
        assert!(failed.contains("x"));
        assert_eq!(failed.to_string(), "x");
    }
}
