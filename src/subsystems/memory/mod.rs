//! Transcript persistence — one JSON file, loaded at start, replaced at exit.
//!
//! ## On-disk format
//!
//! `ai_memory.json` in the working directory: a JSON array of message
//! objects, UTF-8, 4-space indentation, non-ASCII written verbatim, key order
//! preserved. Every save replaces the whole file (write to a sibling
//! `.tmp`, then rename), so a reader never sees a half-written array.

mod transcript;

pub use transcript::Transcript;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, info, warn};

use crate::error::AppError;

pub const MEMORY_FILENAME: &str = "ai_memory.json";

const INDENT: &[u8] = b"    ";

/// What a load found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file; the transcript was left as it was.
    Missing,
    /// The transcript was replaced with this many records.
    Loaded(usize),
    /// The file could not be parsed; the transcript was reset to empty.
    /// `backup` is where the unreadable file was moved, if that worked.
    Malformed { reason: String, backup: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `ai_memory.json` relative to the working directory.
    pub fn in_working_dir() -> Self {
        Self::new(MEMORY_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file into `transcript`.
    ///
    /// Missing file leaves `transcript` untouched. Malformed JSON, invalid
    /// UTF-8, or a top-level value that is not an array resets it to empty
    /// and is reported rather than returned as an error; the bad file is
    /// renamed to `<name>.bad` so the next save does not destroy it. Any
    /// other read failure is an error.
    pub fn load_into(&self, transcript: &mut Transcript) -> Result<LoadOutcome, AppError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no memory file");
                return Ok(LoadOutcome::Missing);
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Ok(self.malformed(transcript, e.to_string()));
            }
            Err(e) => {
                return Err(AppError::Memory(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Array(messages)) => {
                let count = messages.len();
                *transcript = Transcript::from_messages(messages);
                info!(path = %self.path.display(), count, "memory loaded");
                Ok(LoadOutcome::Loaded(count))
            }
            Ok(other) => {
                let found = json_kind(&other);
                Ok(self.malformed(transcript, format!("expected a JSON array, found {found}")))
            }
            Err(e) => Ok(self.malformed(transcript, e.to_string())),
        }
    }

    fn malformed(&self, transcript: &mut Transcript, reason: String) -> LoadOutcome {
        warn!(
            path = %self.path.display(),
            %reason,
            "memory file is malformed — starting with empty history"
        );
        transcript.clear();

        let backup = sibling(&self.path, ".bad");
        let backup = match fs::rename(&self.path, &backup) {
            Ok(()) => {
                info!(backup = %backup.display(), "unreadable memory file set aside");
                Some(backup)
            }
            Err(e) => {
                warn!(error = %e, "could not set aside unreadable memory file");
                None
            }
        };
        LoadOutcome::Malformed { reason, backup }
    }

    /// Overwrite the file with `transcript`.
    pub fn save(&self, transcript: &Transcript) -> Result<(), AppError> {
        let data = encode(transcript)?;

        let tmp = sibling(&self.path, ".tmp");

        fs::write(&tmp, data)
            .map_err(|e| AppError::Memory(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AppError::Memory(format!("cannot replace {}: {e}", self.path.display()))
        })?;

        info!(path = %self.path.display(), count = transcript.len(), "memory saved");
        Ok(())
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Pretty-print with 4-space indentation.
pub fn encode(transcript: &Transcript) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    transcript
        .serialize(&mut ser)
        .map_err(|e| AppError::Memory(format!("serialise transcript: {e}")))?;
    Ok(buf)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join(MEMORY_FILENAME));
        (dir, store)
    }

    fn sample() -> Transcript {
        Transcript::from_messages(vec![
            json!({"role": "user", "type": "message", "content": "Привет, мир"}),
            json!({"role": "assistant", "type": "code", "format": "python", "content": "print(1)"}),
            json!({"role": "computer", "type": "console", "format": "output", "content": "1"}),
        ])
    }

    #[test]
    fn missing_file_leaves_transcript_untouched() {
        let (_dir, store) = setup();
        let mut t = Transcript::new();
        t.push_message("user", "already here");

        assert_eq!(store.load_into(&mut t).unwrap(), LoadOutcome::Missing);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn load_reports_count_and_replaces() {
        let (_dir, store) = setup();
        fs::write(store.path(), r#"[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]"#).unwrap();

        let mut t = Transcript::new();
        t.push_message("user", "stale");
        assert_eq!(store.load_into(&mut t).unwrap(), LoadOutcome::Loaded(2));
        assert_eq!(t.messages()[1], json!({"role": "assistant", "content": "b"}));
    }

    #[test]
    fn save_uses_four_space_indent_and_keeps_unicode() {
        let (_dir, store) = setup();
        store.save(&sample()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("[\n    {\n        \"role\": \"user\""));
        assert!(text.contains("Привет, мир"));
        assert!(!text.contains("\\u"));
    }

    #[test]
    fn save_then_load_is_identity_including_key_order() {
        let (_dir, store) = setup();
        let original = r#"[
    {
        "type": "message",
        "role": "user",
        "content": "z before a",
        "extra": {"nested": [1, 2.5, null, true]}
    }
]"#;
        fs::write(store.path(), original).unwrap();

        let mut t = Transcript::new();
        store.load_into(&mut t).unwrap();
        store.save(&t).unwrap();

        let mut again = Transcript::new();
        store.load_into(&mut again).unwrap();
        assert_eq!(t, again);

        let text = fs::read_to_string(store.path()).unwrap();
        let type_pos = text.find("\"type\"").unwrap();
        let role_pos = text.find("\"role\"").unwrap();
        assert!(type_pos < role_pos, "key order must survive a save");
    }

    #[test]
    fn save_overwrites_instead_of_merging() {
        let (_dir, store) = setup();
        store.save(&sample()).unwrap();

        let mut second = Transcript::new();
        second.push_message("user", "only me");
        store.save(&second).unwrap();

        let mut loaded = Transcript::new();
        assert_eq!(store.load_into(&mut loaded).unwrap(), LoadOutcome::Loaded(1));
        assert_eq!(loaded, second);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let (dir, store) = setup();
        store.save(&sample()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![MEMORY_FILENAME.to_string()]);
    }

    #[test]
    fn malformed_json_resets_to_empty() {
        let (_dir, store) = setup();
        fs::write(store.path(), "[{\"role\": \"user\",").unwrap();

        let mut t = Transcript::new();
        t.push_message("user", "prior");
        let outcome = store.load_into(&mut t).unwrap();
        assert!(matches!(outcome, LoadOutcome::Malformed { .. }));
        assert!(t.is_empty());
    }

    #[test]
    fn malformed_file_is_kept_aside() {
        let (dir, store) = setup();
        let broken = "[{\"role\": \"user\", \"content\": \"months of history\"";
        fs::write(store.path(), broken).unwrap();

        let mut t = Transcript::new();
        let backup = match store.load_into(&mut t).unwrap() {
            LoadOutcome::Malformed { backup: Some(backup), .. } => backup,
            other => panic!("expected a backup, got {other:?}"),
        };
        assert_eq!(backup, dir.path().join("ai_memory.json.bad"));
        assert!(!store.path().exists());

        store.save(&t).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), broken);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "[]");
    }

    #[test]
    fn non_array_is_malformed() {
        let (_dir, store) = setup();
        fs::write(store.path(), r#"{"messages": []}"#).unwrap();

        let mut t = Transcript::new();
        match store.load_into(&mut t).unwrap() {
            LoadOutcome::Malformed { reason, .. } => assert!(reason.contains("an object")),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let (_dir, store) = setup();
        fs::write(store.path(), [b'[', 0xff, 0xfe, b']']).unwrap();

        let mut t = Transcript::new();
        assert!(matches!(store.load_into(&mut t).unwrap(), LoadOutcome::Malformed { .. }));
    }

    #[test]
    fn save_into_missing_dir_errors() {
        let store = MemoryStore::new("/nonexistent-dir/ai_memory.json");
        let err = store.save(&sample()).unwrap_err();
        assert!(err.to_string().contains("memory error"));
    }
}
