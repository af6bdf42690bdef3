//! Sidecar transcripts: every generated question is appended, together with
//! the window it was asked about, to `<note>.log` next to the note.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::config::TRANSCRIPT_SUFFIX;
use crate::model::message::Message;

const ENTRY_SEPARATOR: &str = "\n\n\n===========================\n\n\n";

/// `notes/a.txt` -> `notes/a.txt.log`.
pub fn transcript_path(note: &Path) -> PathBuf {
    let mut name = OsString::from(note.as_os_str());
    name.push(TRANSCRIPT_SUFFIX);
    PathBuf::from(name)
}

/// Render one transcript entry.
pub fn render_entry(
    messages: &[Message],
    question: &str,
    model: &str,
    at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let mut out = String::from(ENTRY_SEPARATOR);
    out.push_str(&format!("# {} model={}\n", at.to_rfc3339(), model));
    out.push_str(&serde_json::to_string_pretty(messages)?);
    out.push('\n');
    out.push_str(question);
    out.push('\n');
    Ok(out)
}

/// Append an entry to the transcript of `note`, creating it if needed.
pub async fn append_entry(
    note: &Path,
    messages: &[Message],
    question: &str,
    model: &str,
) -> std::io::Result<PathBuf> {
    let path = transcript_path(note);
    let entry = render_entry(messages, question, model, Utc::now())?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transcript_path_appends_suffix() {
        assert_eq!(
            transcript_path(Path::new("/n/2023-06-01.txt")),
            PathBuf::from("/n/2023-06-01.txt.log")
        );
    }

    #[test]
    fn entry_contains_window_and_question() {
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let messages = vec![Message::system("sys"), Message::user("A: hi")];
        let entry = render_entry(&messages, "Why now?", "gpt-3.5-turbo", at).unwrap();
        assert!(entry.starts_with(ENTRY_SEPARATOR));
        assert!(entry.contains("# 2023-06-01T12:00:00+00:00 model=gpt-3.5-turbo\n"));
        assert!(entry.contains("\"content\": \"A: hi\""));
        assert!(entry.ends_with("Why now?\n"));
    }

    #[tokio::test]
    async fn append_accumulates_entries() {
        let dir = tempfile::tempdir().unwrap();
        let note = dir.path().join("n.txt");
        let messages = vec![Message::system("sys")];
        let log = append_entry(&note, &messages, "Q1", "m").await.unwrap();
        append_entry(&note, &messages, "Q2", "m").await.unwrap();
        let text = std::fs::read_to_string(log).unwrap();
        assert_eq!(text.matches(ENTRY_SEPARATOR).count(), 2);
        assert!(text.contains("Q1\n") && text.contains("Q2\n"));
    }
}
