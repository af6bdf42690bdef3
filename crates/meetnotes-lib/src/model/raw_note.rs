use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// UTF-8 byte-order mark some editors prepend to text files.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Bytes read from one note file at one point in time.
#[derive(Debug, Clone)]
pub struct RawNote {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub observed_at: DateTime<Utc>,
}

impl RawNote {
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
            observed_at: Utc::now(),
        }
    }

    /// Decode the content as UTF-8, dropping a leading byte-order mark.
    pub fn decode(&self) -> Result<&str, std::str::Utf8Error> {
        let bytes = self.content.strip_prefix(UTF8_BOM).unwrap_or(&self.content[..]);
        std::str::from_utf8(bytes)
    }
}
