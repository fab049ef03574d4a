use log::{error, info, warn};
use serde::Serialize;

/// Chronological, human-readable record of one refresh or clear.
///
/// Every line is also forwarded to the process logger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RefreshLog {
    lines: Vec<String>,
}

impl RefreshLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.lines.push(line);
    }

    /// A stage that was skipped on purpose.
    pub fn skip(&mut self, line: impl Into<String>) {
        let line = line.into();
        warn!("{}", line);
        self.lines.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        error!("{}", line);
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Index of the first line containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines.iter().position(|line| line.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_keep_insertion_order() {
        let mut log = RefreshLog::new();
        log.info("Loading DimTerm...");
        log.skip("ETL skipped FACTPREREQUISITE");
        log.error("ETL failed: boom");

        assert_eq!(
            log.lines(),
            ["Loading DimTerm...", "ETL skipped FACTPREREQUISITE", "ETL failed: boom"]
        );
        assert_eq!(log.position("skipped"), Some(1));
        assert_eq!(log.last(), Some("ETL failed: boom"));
    }

    #[test]
    fn serializes_as_a_plain_list() {
        let mut log = RefreshLog::new();
        log.info("ETL process started.");
        assert_eq!(
            serde_json::to_string(&log).unwrap(),
            r#"["ETL process started."]"#
        );
    }
}
