//! Run wrapper — load memory, run the session, report crashes, save memory.
//!
//! ```text
//! idle → loading → running → done ──────┐
//!                          └→ crashed ──┴→ saving → exited
//! ```
//!
//! A session error or panic moves the run to *crashed*: the report is printed,
//! appended to the crash log, and the user must press Enter before the run
//! continues to *saving*. Saving is attempted whatever happened while
//! running. A load I/O failure or a save failure is returned to the caller.

use std::fmt;
use std::io::Write as _;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::subsystems::crash::{self, CrashLog, CrashReport};
use crate::subsystems::memory::{LoadOutcome, MemoryStore, Transcript};
use crate::subsystems::session::{ConsoleInput, Session};

const BANNER_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Running,
    Done,
    Crashed,
    Saving,
    Exited,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Loading => "loading",
            RunState::Running => "running",
            RunState::Done => "done",
            RunState::Crashed => "crashed",
            RunState::Saving => "saving",
            RunState::Exited => "exited",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Crashed,
}

/// What a finished run did.
#[derive(Debug)]
pub struct RunReport {
    pub load: LoadOutcome,
    pub outcome: RunOutcome,
    /// The transcript as it was saved.
    pub transcript: Transcript,
}

pub struct Supervisor {
    memory: MemoryStore,
    crash_log: CrashLog,
    ack: ConsoleInput,
    state: RunState,
}

impl Supervisor {
    /// `ack` is read once after a crash to wait for the user's Enter. Pass a
    /// clone of the session's input so typed-ahead lines are not lost.
    pub fn new(memory: MemoryStore, crash_log: CrashLog, ack: ConsoleInput) -> Self {
        Self { memory, crash_log, ack, state: RunState::Idle }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "run state");
        self.state = next;
    }

    pub async fn run<S: Session>(&mut self, session: &mut S) -> Result<RunReport, AppError> {
        let mut transcript = Transcript::new();

        self.transition(RunState::Loading);
        let load = self.memory.load_into(&mut transcript)?;
        match &load {
            LoadOutcome::Loaded(n) => println!("--- Context loaded ({n} messages) ---"),
            LoadOutcome::Malformed { reason, backup } => {
                println!(
                    "--- Could not parse {} ({reason}); starting with empty history ---",
                    self.memory.path().display()
                );
                if let Some(backup) = backup {
                    println!("--- The unreadable file was kept as {} ---", backup.display());
                }
            }
            LoadOutcome::Missing => {}
        }

        self.transition(RunState::Running);
        info!(session = session.name(), messages = transcript.len(), "session starting");
        println!("Bot started. Type a message...");

        crash::install_panic_hook();
        let _ = crash::take_panic_site();
        let result = AssertUnwindSafe(session.run(&mut transcript)).catch_unwind().await;
        let outcome = match result {
            Ok(Ok(())) => {
                self.transition(RunState::Done);
                RunOutcome::Completed
            }
            Ok(Err(e)) => {
                self.transition(RunState::Crashed);
                error!(error = %e, "session failed");
                self.report_crash(CrashReport::from_error(&e, e.backtrace())).await;
                RunOutcome::Crashed
            }
            Err(payload) => {
                self.transition(RunState::Crashed);
                let report = CrashReport::from_panic(payload.as_ref(), crash::take_panic_site());
                error!(error = %report.message(), "session panicked");
                self.report_crash(report).await;
                RunOutcome::Crashed
            }
        };

        self.transition(RunState::Saving);
        self.memory.save(&transcript)?;
        println!("--- Context saved to {} ---", self.memory.path().display());

        self.transition(RunState::Exited);
        Ok(RunReport { load, outcome, transcript })
    }

    async fn report_crash(&mut self, report: CrashReport) {
        let banner = "=".repeat(BANNER_WIDTH);
        println!("\n{banner}");
        println!("AN ERROR OCCURRED WHILE THE CHAT WAS RUNNING:");
        println!("{banner}");
        eprint!("{}", report.render());

        let logged = self.crash_log.append(&report);
        println!("{banner}");
        match logged {
            Ok(()) => println!("Error details saved to {}", self.crash_log.path().display()),
            Err(e) => {
                error!(error = %e, "could not write crash log");
                println!("Could not write the crash log: {e}");
            }
        }

        print!("Press Enter to close...");
        let _ = std::io::stdout().flush();
        if let Err(e) = self.ack.next_line().await {
            debug!(error = %e, "acknowledgement read failed");
        }
    }
}
