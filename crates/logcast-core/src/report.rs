//! Markdown report generated from the JSONL files written by the file sink.
//!
//! The report is a view of the raw files and can be regenerated at any time.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

use crate::entry::WireEntry;
use crate::error::LogcastResult;
use crate::level::{LevelCounts, LogLevel};
use crate::sink::file::read_all_entries;

/// Options for report generation.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Include TRACE entries (very verbose)
    pub include_trace: bool,

    /// Include DEBUG entries
    pub include_debug: bool,

    /// Maximum entries listed per tag (0 = unlimited)
    pub max_per_tag: usize,

    /// Show full timestamps instead of the time of day
    pub full_timestamps: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_trace: false,
            include_debug: true,
            max_per_tag: 0,
            full_timestamps: false,
        }
    }
}

impl ReportOptions {
    fn includes(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Trace => self.include_trace,
            LogLevel::Debug => self.include_debug,
            _ => true,
        }
    }
}

/// Generate a Markdown report from every JSONL file under `logs_dir/raw`.
pub fn generate_report(logs_dir: impl AsRef<Path>, options: &ReportOptions) -> LogcastResult<String> {
    let entries: Vec<WireEntry> = read_all_entries(logs_dir)?
        .into_iter()
        .filter(|e| options.includes(e.level))
        .collect();

    Ok(render(&entries, options)?)
}

/// Write the report to `output_path`.
pub fn write_report(
    logs_dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    options: &ReportOptions,
) -> LogcastResult<()> {
    let report = generate_report(logs_dir, options)?;
    fs::write(output_path, report)?;
    Ok(())
}

fn render(entries: &[WireEntry], options: &ReportOptions) -> Result<String, std::fmt::Error> {
    let mut report = String::new();
    writeln!(report, "# Log Report")?;
    writeln!(report)?;

    if entries.is_empty() {
        writeln!(report, "No log entries found.")?;
        return Ok(report);
    }

    let mut counts = LevelCounts::default();
    let mut by_tag: BTreeMap<&str, Vec<&WireEntry>> = BTreeMap::new();
    for entry in entries {
        counts.increment(entry.level);
        by_tag.entry(tag_of(entry)).or_default().push(entry);
    }

    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        writeln!(report, "**Window:** {} to {}", first.timestamp, last.timestamp)?;
        let sessions: std::collections::BTreeSet<&str> =
            entries.iter().filter_map(|e| e.session_id.as_deref()).collect();
        if !sessions.is_empty() {
            writeln!(report, "**Sessions:** {}", sessions.into_iter().collect::<Vec<_>>().join(", "))?;
        }
        writeln!(report)?;
    }

    writeln!(report, "## Statistics")?;
    writeln!(report)?;
    writeln!(report, "| Level | Count |")?;
    writeln!(report, "|-------|-------|")?;
    writeln!(report, "| Total | {} |", counts.total())?;
    for (level, count) in counts.iter() {
        if options.includes(level) {
            writeln!(report, "| {} | {} |", level, count)?;
        }
    }
    writeln!(report)?;
    let error_rate = counts.get(LogLevel::Error) as f64 / counts.total() as f64;
    writeln!(report, "**Error rate:** {:.2}%", error_rate * 100.0)?;
    writeln!(report)?;

    let errors: Vec<_> = entries.iter().filter(|e| e.level.is_escalated()).collect();
    if !errors.is_empty() {
        writeln!(report, "## Errors")?;
        writeln!(report)?;
        for entry in errors {
            writeln!(report, "- **[{}]** `{}` - {}", entry.level, tag_of(entry), entry.message)?;
            if let Some(error) = &entry.error {
                writeln!(report, "  - Error: `{}`", error)?;
            }
            if let Some(data) = &entry.data {
                writeln!(report, "  - Data: `{}`", serde_json::Value::Object(data.clone()))?;
            }
        }
        writeln!(report)?;
    }

    let warnings: Vec<_> = entries.iter().filter(|e| e.level == LogLevel::Warn).collect();
    if !warnings.is_empty() {
        writeln!(report, "## Warnings")?;
        writeln!(report)?;
        for entry in warnings {
            writeln!(report, "- `{}` - {}", tag_of(entry), entry.message)?;
        }
        writeln!(report)?;
    }

    writeln!(report, "---")?;
    writeln!(report)?;

    for (tag, tag_entries) in &by_tag {
        writeln!(report, "## Tag: `{}`", tag)?;
        writeln!(report)?;
        writeln!(report, "<details>")?;
        writeln!(report, "<summary>{} entries</summary>", tag_entries.len())?;
        writeln!(report)?;
        writeln!(report, "```log")?;

        let shown = match options.max_per_tag {
            0 => tag_entries.len(),
            max => max.min(tag_entries.len()),
        };
        for entry in &tag_entries[..shown] {
            let ts = if options.full_timestamps {
                entry.timestamp.as_str()
            } else {
                entry.timestamp.split('T').nth(1).unwrap_or(&entry.timestamp)
            };
            writeln!(report, "{} {:<5} {}", ts, entry.level, entry.message)?;
        }
        if shown < tag_entries.len() {
            writeln!(report, "... ({} more entries truncated)", tag_entries.len() - shown)?;
        }

        writeln!(report, "```")?;
        writeln!(report)?;
        writeln!(report, "</details>")?;
        writeln!(report)?;
    }

    writeln!(report, "---")?;
    writeln!(report)?;
    writeln!(report, "*Generated from JSONL logs. Regenerate with: `logcast report`*")?;

    Ok(report)
}

fn tag_of(entry: &WireEntry) -> &str {
    entry.tag.as_deref().unwrap_or("untagged")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileSinkConfig;
    use crate::entry::LogEntry;
    use crate::sink::{FileSink, Sink};
    use tempfile::TempDir;

    fn write_entries(logs_dir: &Path, entries: &[(LogLevel, &str, &str)]) {
        let sink = FileSink::new(FileSinkConfig::new(logs_dir, "report"));
        sink.initialize().unwrap();
        for (level, tag, message) in entries {
            let mut entry = LogEntry::new(*level, *message);
            entry.tag = Some(tag.to_string());
            sink.write(&entry).unwrap();
        }
        sink.dispose().unwrap();
    }

    #[test]
    fn test_generate_report() {
        let temp = TempDir::new().unwrap();
        let logs_dir = temp.path().join("logs");
        write_entries(
            &logs_dir,
            &[
                (LogLevel::Info, "sync", "Connected"),
                (LogLevel::Warn, "sync", "Slow connection"),
                (LogLevel::Error, "storage", "Disk full"),
                (LogLevel::Trace, "storage", "hidden by default"),
            ],
        );

        let report = generate_report(&logs_dir, &ReportOptions::default()).unwrap();

        assert!(report.contains("# Log Report"));
        assert!(report.contains("## Statistics"));
        assert!(report.contains("| Total | 3 |"));
        assert!(report.contains("## Errors"));
        assert!(report.contains("Disk full"));
        assert!(report.contains("## Warnings"));
        assert!(report.contains("Slow connection"));
        assert!(report.contains("## Tag: `storage`"));
        assert!(report.contains("## Tag: `sync`"));
        assert!(!report.contains("hidden by default"));
    }

    #[test]
    fn test_empty_logs_dir() {
        let temp = TempDir::new().unwrap();
        let report = generate_report(temp.path(), &ReportOptions::default()).unwrap();
        assert!(report.contains("No log entries found."));
    }

    #[test]
    fn test_truncation_per_tag() {
        let temp = TempDir::new().unwrap();
        let logs_dir = temp.path().join("logs");
        let many: Vec<_> = (0..5).map(|_| (LogLevel::Info, "ui", "tap")).collect();
        write_entries(&logs_dir, &many);

        let options = ReportOptions {
            max_per_tag: 2,
            ..ReportOptions::default()
        };
        let report = generate_report(&logs_dir, &options).unwrap();
        assert!(report.contains("(3 more entries truncated)"));
    }

    #[test]
    fn test_write_report_creates_file() {
        let temp = TempDir::new().unwrap();
        let logs_dir = temp.path().join("logs");
        write_entries(&logs_dir, &[(LogLevel::Info, "app", "started")]);

        let output = temp.path().join("LOGS.md");
        write_report(&logs_dir, &output, &ReportOptions::default()).unwrap();
        assert!(fs::read_to_string(output).unwrap().contains("started"));
    }
}
