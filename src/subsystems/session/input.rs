//! Line input shared by the chat session and the crash acknowledgement.
//!
//! Blocking reads run on a dedicated OS thread that forwards lines over an
//! unbounded channel. Waiting on the channel is cancel-safe, so dropping a
//! pending [`ConsoleInput::next_line`] never leaves a read the runtime has to
//! wait for at shutdown. The thread is detached and dies with the process.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

type LineResult = io::Result<String>;

/// Cloneable handle to one line stream. Clones share the same stream, so a
/// line is delivered to exactly one reader.
#[derive(Debug, Clone)]
pub struct ConsoleInput {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<LineResult>>>,
    // Held only by `pending`, so the stream never reports end of input.
    _hold: Option<mpsc::UnboundedSender<LineResult>>,
}

impl ConsoleInput {
    fn from_receiver(
        rx: mpsc::UnboundedReceiver<LineResult>,
        hold: Option<mpsc::UnboundedSender<LineResult>>,
    ) -> Self {
        Self { rx: Arc::new(Mutex::new(rx)), _hold: hold }
    }

    /// Process stdin.
    pub fn stdin() -> io::Result<Self> {
        Self::spawn_reader("stdin-reader", io::BufReader::new(io::stdin()))
    }

    /// Read `reader` line by line on a new thread.
    pub fn spawn_reader<R>(name: &str, mut reader: R) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
            debug!("input reader finished");
        })?;
        Ok(Self::from_receiver(rx, None))
    }

    /// Fixed input; end of input after the last line.
    pub fn from_text(text: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for line in text.split_inclusive('\n') {
            let _ = tx.send(Ok(line.to_string()));
        }
        Self::from_receiver(rx, None)
    }

    /// Input that never yields a line and never ends.
    pub fn pending() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::from_receiver(rx, Some(tx))
    }

    /// Next line with its line ending removed, or `None` at end of input.
    pub async fn next_line(&self) -> io::Result<Option<String>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(Ok(line)) => {
                let trimmed = line.strip_suffix('\n').unwrap_or(&line);
                let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
                Ok(Some(trimmed.to_string()))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
