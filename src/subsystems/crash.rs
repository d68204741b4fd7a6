//! Crash reports and the append-only crash log (`error_log.txt`).
//!
//! Each crash appends a blank line, a `--- NEW CRASH ---` marker line, and
//! the rendered report: timestamp, error, panic location, cause chain, and
//! the backtrace taken where the failure was raised. Earlier content is never
//! rewritten.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;

use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::error::AppError;

pub const CRASH_LOG_FILENAME: &str = "error_log.txt";
pub const CRASH_MARKER: &str = "--- NEW CRASH ---";

// ── Panic capture ────────────────────────────────────────────────────────────

/// Where a panic was raised, recorded by the hook before unwinding starts.
#[derive(Debug)]
pub struct PanicSite {
    pub location: Option<String>,
    pub backtrace: Backtrace,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Wrap the current panic hook so every panic also records its site for
/// [`take_panic_site`]. The previous hook still runs. Installed once per
/// process.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let site = PanicSite {
                location: info.location().map(|l| l.to_string()),
                backtrace: Backtrace::force_capture(),
            };
            let _ = LAST_PANIC.try_with(|slot| *slot.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

/// The site of the most recent panic on this thread, if not yet taken.
pub fn take_panic_site() -> Option<PanicSite> {
    LAST_PANIC.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

// ── CrashReport ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CrashReport {
    timestamp: String,
    message: String,
    location: Option<String>,
    causes: Vec<String>,
    backtrace: Option<String>,
}

impl CrashReport {
    /// Report for `err`, with the stack captured where it was raised.
    /// `backtrace` is only populated when `RUST_BACKTRACE` /
    /// `RUST_LIB_BACKTRACE` enabled capture at that point.
    pub fn from_error(err: &(dyn Error + 'static), backtrace: &Backtrace) -> Self {
        let message = err.to_string();
        let mut causes = Vec::new();
        let mut last = message.clone();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            // `#[error("...: {0}")]` wrappers already include their source.
            if !last.contains(&text) {
                causes.push(text.clone());
            }
            last = text;
            source = cause.source();
        }
        Self::new(message, None, causes, render_backtrace(backtrace))
    }

    /// Report for a caught panic payload. `site` comes from
    /// [`take_panic_site`]; without it the report has no location or stack.
    pub fn from_panic(payload: &(dyn Any + Send), site: Option<PanicSite>) -> Self {
        let (location, backtrace) = match site {
            Some(site) => (site.location, render_backtrace(&site.backtrace)),
            None => (None, None),
        };
        Self::new(format!("panic: {}", panic_message(payload)), location, Vec::new(), backtrace)
    }

    fn new(
        message: String,
        location: Option<String>,
        causes: Vec<String>,
        backtrace: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message,
            location,
            causes,
            backtrace,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}\nError: {}\n", self.timestamp, self.message);
        if let Some(location) = &self.location {
            out.push_str(&format!("  at {location}\n"));
        }
        if !self.causes.is_empty() {
            out.push_str("\nCaused by:\n");
            for (i, cause) in self.causes.iter().enumerate() {
                out.push_str(&format!("    {i}: {cause}\n"));
            }
        }
        match &self.backtrace {
            Some(bt) => out.push_str(&format!("\nStack backtrace:\n{bt}\n")),
            None => out.push_str("\n(run with RUST_BACKTRACE=1 to capture a backtrace)\n"),
        }
        out
    }
}

fn render_backtrace(backtrace: &Backtrace) -> Option<String> {
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Best-effort text of a panic payload (`&str` or `String`).
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

// ── CrashLog ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CrashLog {
    path: PathBuf,
}

impl CrashLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `error_log.txt` relative to the working directory.
    pub fn in_working_dir() -> Self {
        Self::new(CRASH_LOG_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one crash block. Creates the file on first use.
    pub fn append(&self, report: &CrashReport) -> Result<(), AppError> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::CrashLog(format!("cannot open {}: {e}", self.path.display())))?;

        let block = format!("\n{CRASH_MARKER}\n{}", report.render());
        f.write_all(block.as_bytes())
            .map_err(|e| AppError::CrashLog(format!("write {}: {e}", self.path.display())))?;

        info!(path = %self.path.display(), "crash report appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderError;
    use crate::subsystems::session::SessionError;
    use tempfile::TempDir;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn report_lists_distinct_causes() {
        let err = Outer { inner: std::io::Error::other("disk on fire") };
        let report = CrashReport::from_error(&err, &Backtrace::disabled());
        let text = report.render();
        assert!(text.contains("Error: outer failure"));
        assert!(text.contains("Caused by:\n    0: disk on fire"));
        assert!(text.contains("RUST_BACKTRACE=1"));
    }

    #[test]
    fn captured_error_backtrace_is_rendered() {
        let err = Outer { inner: std::io::Error::other("x") };
        let report = CrashReport::from_error(&err, &Backtrace::force_capture());
        let text = report.render();
        assert!(text.contains("Stack backtrace:"));
        assert!(!text.contains("RUST_BACKTRACE=1"));
    }

    #[test]
    fn report_skips_causes_already_in_message() {
        let err = SessionError::from(ProviderError::Request("HTTP 401: no auth".into()));
        let report = CrashReport::from_error(&err, err.backtrace());
        assert!(report.message().contains("HTTP 401: no auth"));
        assert!(!report.render().contains("Caused by:"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "<non-string panic payload>");
        assert_eq!(CrashReport::from_panic(&"boom", None).message(), "panic: boom");
    }

    #[test]
    fn panic_hook_records_the_raising_line() {
        install_panic_hook();
        let _ = take_panic_site();

        let line = line!() + 1;
        let result: std::thread::Result<()> = std::panic::catch_unwind(|| panic!("kaboom"));
        let payload = result.unwrap_err();

        let report = CrashReport::from_panic(payload.as_ref(), take_panic_site());
        let expected = format!("{}:{line}:", file!());
        assert!(report.location().is_some_and(|l| l.starts_with(&expected)), "{:?}", report.location());

        let text = report.render();
        assert!(text.contains("Error: panic: kaboom"));
        assert!(text.contains(&format!("  at {expected}")));
        assert!(text.contains("Stack backtrace:"));
        assert!(take_panic_site().is_none());
    }

    #[test]
    fn append_accumulates_blocks() {
        let dir = TempDir::new().unwrap();
        let log = CrashLog::new(dir.path().join(CRASH_LOG_FILENAME));
        std::fs::write(log.path(), "previous content\n").unwrap();

        log.append(&CrashReport::from_panic(&"first", None)).unwrap();
        log.append(&CrashReport::from_panic(&"second", None)).unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("previous content\n"));
        assert_eq!(text.matches(CRASH_MARKER).count(), 2);
        assert!(text.contains(&format!("\n{CRASH_MARKER}\n")));
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }

    #[test]
    fn append_to_missing_dir_errors() {
        let log = CrashLog::new("/nonexistent-dir/error_log.txt");
        let err = log.append(&CrashReport::from_panic(&"x", None)).unwrap_err();
        assert!(matches!(err, AppError::CrashLog(_)));
    }
}
