//! DownloadLog (C6): chronologically sorted on-disk record of harvested
//! items, with a duplicate index keyed by `(creation_time, prompt_prefix)`.

use crate::error::RuntimeError;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const PLACEHOLDER_ID: &str = "#999999999";
const SEPARATOR: &str = "========================================"; // 40 '='
const PROMPT_PREFIX_LEN: usize = 100;
pub const CANONICAL_FORMAT: &str = "%d %b %Y %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLogEntry {
    pub file_id: String,
    pub creation_time: String,
    pub prompt: String,
    pub download_timestamp: Option<String>,
    pub file_path: Option<String>,
}

impl DownloadLogEntry {
    pub fn duplicate_key(&self) -> (String, String) {
        duplicate_key(&self.creation_time, &self.prompt)
    }

    fn parsed_time(&self) -> Option<NaiveDateTime> {
        parse_datetime(&self.creation_time)
    }
}

fn duplicate_key(creation_time: &str, prompt: &str) -> (String, String) {
    let prefix: String = prompt.chars().take(PROMPT_PREFIX_LEN).collect();
    (creation_time.to_string(), prefix)
}

/// Accepts `DD MMM YYYY HH:MM:SS`, `YYYY-MM-DD HH:MM:SS`, `DD/MM/YYYY
/// HH:MM:SS`, `MM/DD/YYYY HH:MM:SS`, and date-only variants (midnight).
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let formats = [
        "%d %b %Y %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];
    for fmt in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    let date_only_formats = ["%d %b %Y", "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];
    for fmt in date_only_formats {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

pub fn format_canonical(dt: &NaiveDateTime) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

pub struct DownloadLog {
    path: PathBuf,
    entries: Vec<DownloadLogEntry>,
    duplicate_index: HashSet<(String, String)>,
}

impl DownloadLog {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let path = path.into();
        let entries = if path.exists() {
            Self::parse_file(&path)?
        } else {
            Vec::new()
        };
        let duplicate_index = entries.iter().map(|e| e.duplicate_key()).collect();
        Ok(Self {
            path,
            entries,
            duplicate_index,
        })
    }

    fn parse_file(path: &Path) -> Result<Vec<DownloadLogEntry>, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = content.lines().collect();
        let mut entries = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if lines[i].trim().is_empty() {
                i += 1;
                continue;
            }
            if i + 3 >= lines.len() || lines[i + 3].trim() != SEPARATOR {
                warn!("dropping malformed download-log record starting at line {}", i + 1);
                // advance to the next separator (or EOF) to resynchronize
                while i < lines.len() && lines[i].trim() != SEPARATOR {
                    i += 1;
                }
                i += 1;
                continue;
            }
            entries.push(DownloadLogEntry {
                file_id: lines[i].trim().to_string(),
                creation_time: lines[i + 1].trim().to_string(),
                prompt: lines[i + 2].trim().to_string(),
                download_timestamp: None,
                file_path: None,
            });
            i += 4;
        }
        Ok(entries)
    }

    pub fn is_duplicate(&self, creation_time: &str, prompt: &str) -> bool {
        self.duplicate_index.contains(&duplicate_key(creation_time, prompt))
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &DownloadLogEntry> {
        self.entries.iter()
    }

    pub fn head_entry(&self) -> Option<&DownloadLogEntry> {
        self.entries.first()
    }

    /// Binary-inserts `entry` into the descending-by-creation_time sorted
    /// list and rewrites the file atomically (temp file + rename). If the
    /// timestamp fails to parse the entry is appended at the head with a
    /// logged warning, matching the recovery policy for malformed dates.
    pub fn insert(&mut self, entry: DownloadLogEntry) -> Result<(), RuntimeError> {
        self.duplicate_index.insert(entry.duplicate_key());

        match entry.parsed_time() {
            Some(when) => {
                let pos = self
                    .entries
                    .binary_search_by(|existing| {
                        let existing_time = existing.parsed_time();
                        // Descending order: reverse the natural comparison.
                        match existing_time {
                            Some(t) => when.cmp(&t),
                            None => std::cmp::Ordering::Less,
                        }
                    })
                    .unwrap_or_else(|idx| idx);
                self.entries.insert(pos, entry);
            }
            None => {
                warn!(
                    "could not parse creation_time '{}'; appending at head",
                    entry.creation_time
                );
                self.entries.insert(0, entry);
            }
        }

        self.rewrite()
    }

    fn rewrite(&self) -> Result<(), RuntimeError> {
        let mut out = String::new();
        for entry in &self.entries {
            let sanitized_prompt = entry.prompt.replace('\n', " ").replace('\r', " ");
            out.push_str(&entry.file_id);
            out.push('\n');
            out.push_str(&entry.creation_time);
            out.push('\n');
            out.push_str(&sanitized_prompt);
            out.push('\n');
            out.push_str(SEPARATOR);
            out.push('\n');
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, out)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, time: &str, prompt: &str) -> DownloadLogEntry {
        DownloadLogEntry {
            file_id: id.to_string(),
            creation_time: time.to_string(),
            prompt: prompt.to_string(),
            download_timestamp: None,
            file_path: None,
        }
    }

    #[test]
    fn s4_chronological_insert_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut log = DownloadLog::load(&path).unwrap();

        log.insert(entry(PLACEHOLDER_ID, "03 Sep 2025 12:00:00", "A")).unwrap();
        log.insert(entry(PLACEHOLDER_ID, "03 Sep 2025 18:00:00", "B")).unwrap();
        log.insert(entry(PLACEHOLDER_ID, "03 Sep 2025 06:00:00", "C")).unwrap();

        let prompts: Vec<&str> = log.iter_all().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["B", "A", "C"]);
    }

    #[test]
    fn duplicate_key_depends_on_prefix_only() {
        let long_a = "x".repeat(150);
        let mut long_b = "x".repeat(99);
        long_b.push('Y');
        long_b.push_str(&"z".repeat(60));

        let key_a = duplicate_key("01 Jan 2025 00:00:00", &long_a);
        let key_b = duplicate_key("01 Jan 2025 00:00:00", &long_b);
        assert_ne!(key_a, key_b);

        let identical_prefix = format!("{}{}", "x".repeat(100), "tail-diff");
        let key_c = duplicate_key("01 Jan 2025 00:00:00", &identical_prefix);
        let key_d = duplicate_key("01 Jan 2025 00:00:00", &"x".repeat(100));
        assert_eq!(key_c, key_d);
    }

    #[test]
    fn malformed_record_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(
            &path,
            format!(
                "#000000001\n01 Jan 2025 00:00:00\nhello\n{sep}\nincomplete-record-without-separator\n",
                sep = SEPARATOR
            ),
        )
        .unwrap();
        let log = DownloadLog::load(&path).unwrap();
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn canonical_format_round_trips() {
        let dt = parse_datetime("2025-09-03 12:00:00").unwrap();
        assert_eq!(format_canonical(&dt), "03 Sep 2025 12:00:00");
    }

    #[test]
    fn date_only_defaults_to_midnight() {
        let dt = parse_datetime("03 Sep 2025").unwrap();
        assert_eq!(format_canonical(&dt), "03 Sep 2025 00:00:00");
    }
}
