//! Persisted CLI settings.
//!
//! A small JSON document whose `ignore_patterns` key holds newline-delimited
//! ignore patterns, one per line.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub ignore_patterns: String,
}

impl Settings {
    /// Load settings from `path`. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(format!("Failed to read settings {}: {}", path.display(), e)),
        };

        serde_json::from_str(&text)
            .map_err(|e| format!("Invalid settings file {}: {}", path.display(), e))
    }

    /// Write settings to `path`, replacing any existing document.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, json)
            .map_err(|e| format!("Failed to write settings {}: {}", path.display(), e))
    }

    /// Non-blank pattern lines, trimmed.
    pub fn patterns(&self) -> Vec<String> {
        self.ignore_patterns
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    }

    /// Append patterns not already present.
    ///
    /// # Returns
    /// Number of patterns added
    pub fn merge_patterns<S: AsRef<str>>(&mut self, extra: &[S]) -> usize {
        let mut lines = self.patterns();
        let before = lines.len();

        for pattern in extra {
            let pattern = pattern.as_ref().trim();
            if !pattern.is_empty() && !lines.iter().any(|existing| existing == pattern) {
                lines.push(pattern.to_string());
            }
        }

        let added = lines.len() - before;
        self.ignore_patterns = lines.join("\n");
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let settings = Settings::load(&temp_dir.path().join("settings.json"))
            .expect("Failed to load settings");
        assert_eq!(settings, Settings::default());
        assert!(settings.patterns().is_empty());
    }

    #[test]
    fn test_patterns_skip_blank_lines() {
        let settings = Settings {
            ignore_patterns: "  *.log \n\n__pycache__/\n   \n".to_string(),
        };
        assert_eq!(settings.patterns(), vec!["*.log", "__pycache__/"]);
    }

    #[test]
    fn test_load_document_without_key() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{}").expect("Failed to write settings");

        let settings = Settings::load(&path).expect("Failed to load settings");
        assert!(settings.ignore_patterns.is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{ not json").expect("Failed to write settings");

        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("settings.json");

        let mut settings = Settings::default();
        assert_eq!(settings.merge_patterns(&["*.tmp", "build/", "*.tmp"]), 2);
        settings.save(&path).expect("Failed to save settings");

        let raw = fs::read_to_string(&path).expect("Failed to read settings");
        assert!(raw.contains("\"ignore_patterns\""));

        let loaded = Settings::load(&path).expect("Failed to load settings");
        assert_eq!(loaded.patterns(), vec!["*.tmp", "build/"]);
    }
}
