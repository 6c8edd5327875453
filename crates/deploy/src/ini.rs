//! Line-preserving ini editor with upsert semantics.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{Error, Result};

/// An ini-style file held as its original lines.
///
/// Edits touch only the line for the key being set, so comments, ordering and
/// unrelated sections survive a rewrite untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IniFile {
    lines: Vec<String>,
}

impl IniFile {
    /// Creates an empty file.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Parses file content.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Loads a file from disk, treating a missing file as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(Error::Io("failed to read ini file", e)),
        }
    }

    /// Writes the file to disk, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn store(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_string())
            .await
            .map_err(|e| Error::Io("failed to write ini file", e))
    }

    /// Returns the value of `key` in `section`, if present.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let (start, end) = self.section_bounds(section)?;

        self.lines[start + 1..end].iter().find_map(|line| {
            let (k, v) = split_entry(line)?;
            (k == key).then_some(v)
        })
    }

    /// Sets `key` in `section`, overwriting an existing entry in place.
    ///
    /// New keys go after the last entry of their section; new sections are
    /// appended to the end of the file.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = format!("{key} = {value}");

        let Some((start, end)) = self.section_bounds(section) else {
            if self.lines.last().is_some_and(|line| !line.trim().is_empty()) {
                self.lines.push(String::new());
            }
            self.lines.push(format!("[{section}]"));
            self.lines.push(entry);
            return;
        };

        if let Some(index) = (start + 1..end)
            .find(|&i| split_entry(&self.lines[i]).is_some_and(|(k, _)| k == key))
        {
            self.lines[index] = entry;
            return;
        }

        let insert_at = (start + 1..end)
            .rev()
            .find(|&i| !self.lines[i].trim().is_empty())
            .map_or(start + 1, |i| i + 1);

        self.lines.insert(insert_at, entry);
    }

    // Header index and exclusive end index of a section's lines.
    fn section_bounds(&self, section: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|line| section_name(line) == Some(section))?;

        let end = self.lines[start + 1..]
            .iter()
            .position(|line| section_name(line).is_some())
            .map_or(self.lines.len(), |offset| start + 1 + offset);

        Some((start, end))
    }
}

impl fmt::Display for IniFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }

        Ok(())
    }
}

fn section_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }

    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_existing_key() {
        let mut ini = IniFile::parse("[api]\nauth_strategy = noauth2\n");

        ini.set("api", "auth_strategy", "keystone");

        assert_eq!(ini.to_string(), "[api]\nauth_strategy = keystone\n");
    }

    #[test]
    fn test_set_appends_to_section_before_next_section() {
        let mut ini = IniFile::parse("[a]\nx = 1\n\n[b]\ny = 2\n");

        ini.set("a", "z", "3");

        assert_eq!(ini.to_string(), "[a]\nx = 1\nz = 3\n\n[b]\ny = 2\n");
    }

    #[test]
    fn test_set_creates_missing_section() {
        let mut ini = IniFile::parse("# generated\n[a]\nx = 1\n");

        ini.set("keystone_authtoken", "auth_type", "password");

        assert_eq!(
            ini.to_string(),
            "# generated\n[a]\nx = 1\n\n[keystone_authtoken]\nauth_type = password\n"
        );
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut ini = IniFile::new();
        ini.set("DEFAULT", "debug", "True");
        let once = ini.to_string();

        ini.set("DEFAULT", "debug", "True");

        assert_eq!(ini.to_string(), once);
    }

    #[test]
    fn test_comments_are_not_keys() {
        let mut ini = IniFile::parse("[a]\n# x = commented\n");

        assert_eq!(ini.get("a", "x"), None);

        ini.set("a", "x", "1");

        assert_eq!(ini.to_string(), "[a]\n# x = commented\nx = 1\n");
        assert_eq!(ini.get("a", "x"), Some("1"));
    }

    #[test]
    fn test_same_key_in_other_section_untouched() {
        let mut ini = IniFile::parse("[a]\nk = 1\n[b]\nk = 2\n");

        ini.set("b", "k", "3");

        assert_eq!(ini.get("a", "k"), Some("1"));
        assert_eq!(ini.get("b", "k"), Some("3"));
    }
}
