//! Commit message formatting for sync commits.

use chrono::{DateTime, Local};

/// Timestamp format substituted for `{timestamp}`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats commit messages from the configured template.
///
/// Supported placeholders: `{hostname}`, `{timestamp}`, `{branch}` and
/// `{profile}`. Unknown placeholders are left as written.
#[derive(Debug, Clone)]
pub struct CommitFormatter {
    template: String,
    hostname: String,
    branch: String,
    profile: String,
}

impl CommitFormatter {
    pub fn new(template: &str, hostname: &str, branch: &str, profile: Option<&str>) -> Self {
        Self {
            template: template.to_string(),
            hostname: hostname.to_string(),
            branch: branch.to_string(),
            profile: profile.unwrap_or("default").to_string(),
        }
    }

    /// Format a message stamped with the current local time.
    pub fn format_now(&self) -> String {
        self.format_at(Local::now())
    }

    /// Format a message stamped with `at`.
    pub fn format_at(&self, at: DateTime<Local>) -> String {
        let message = self
            .template
            .replace("{hostname}", &self.hostname)
            .replace("{timestamp}", &at.format(TIMESTAMP_FORMAT).to_string())
            .replace("{branch}", &self.branch)
            .replace("{profile}", &self.profile);
        let trimmed = message.trim();
        if trimmed.is_empty() {
            format!("Sync from {}", self.hostname)
        } else {
            trimmed.to_string()
        }
    }

    /// An explicit message replaces the template entirely.
    pub fn message(&self, explicit: Option<&str>) -> String {
        match explicit.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None => self.format_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_default_template() {
        let fmt = CommitFormatter::new("Sync from {hostname} - {timestamp}", "laptop", "main", None);
        assert_eq!(fmt.format_at(at()), "Sync from laptop - 2024-03-09 14:05:07");
    }

    #[test]
    fn test_all_placeholders() {
        let fmt = CommitFormatter::new(
            "[{profile}] {branch} on {hostname}",
            "desk",
            "desk-branch",
            Some("work"),
        );
        assert_eq!(fmt.format_at(at()), "[work] desk-branch on desk");
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let fmt = CommitFormatter::new("{hostname} {unknown}", "h", "b", None);
        assert_eq!(fmt.format_at(at()), "h {unknown}");
    }

    #[test]
    fn test_empty_template_falls_back() {
        let fmt = CommitFormatter::new("   ", "h", "b", None);
        assert_eq!(fmt.format_at(at()), "Sync from h");
    }

    #[test]
    fn test_explicit_message_wins() {
        let fmt = CommitFormatter::new("{hostname}", "h", "b", None);
        assert_eq!(fmt.message(Some("  tuned PETG  ")), "tuned PETG");
        assert_eq!(fmt.message(Some("")), "h");
        assert_eq!(fmt.message(None), "h");
    }
}
