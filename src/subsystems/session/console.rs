//! Console chat session — reads lines from a [`ConsoleInput`], sends them to
//! the LLM, prints the reply.
//!
//! Runs until `/exit`, end of input, or the `shutdown` token is cancelled
//! (Ctrl-C). All three end the session normally so the transcript still gets
//! saved. A provider failure ends it with an error.

use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{LlmProvider, LlmUsage, providers};
use crate::subsystems::memory::Transcript;

use super::context::{estimate_total, fit_to_context};
use super::input::ConsoleInput;
use super::{Session, SessionError, SessionSettings};

const HELP: &str = "\
Commands:
  /help     show this help
  /reset    forget the whole conversation
  /undo     remove the last message you sent and its reply
  /tokens   show estimated context size and API token usage
  /exit     end the session (also /quit, Ctrl-D, Ctrl-C)
";

// ── ConsoleSession ───────────────────────────────────────────────────────────

pub struct ConsoleSession<W> {
    settings: SessionSettings,
    input: ConsoleInput,
    output: W,
    shutdown: CancellationToken,
    usage: LlmUsage,
}

impl ConsoleSession<Stdout> {
    /// Session writing to the process stdout.
    pub fn stdio(settings: SessionSettings, input: ConsoleInput, shutdown: CancellationToken) -> Self {
        Self::new(settings, input, tokio::io::stdout(), shutdown)
    }
}

enum Command {
    Exit,
    Reply(String),
}

impl<W: AsyncWrite + Unpin> ConsoleSession<W> {
    pub fn new(
        settings: SessionSettings,
        input: ConsoleInput,
        output: W,
        shutdown: CancellationToken,
    ) -> Self {
        Self { settings, input, output, shutdown, usage: LlmUsage::default() }
    }

    /// Consume the session and hand back its output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }

    fn header(&self, provider: &LlmProvider) -> String {
        let on_off = |b: bool| if b { "on" } else { "off" };
        format!(
            "─────────────────────────────────────────────\n \
             chatkeep console  (/help for commands, Ctrl-C to quit)\n \
             model: {}  auto-run: {}  offline: {}\n\
             ─────────────────────────────────────────────\n",
            provider.model(),
            on_off(self.settings.auto_run),
            on_off(self.settings.offline),
        )
    }

    fn handle_command(&self, line: &str, transcript: &mut Transcript) -> Command {
        let cmd = line.split_whitespace().next().unwrap_or_default();
        match cmd {
            "/exit" | "/quit" => Command::Exit,
            "/help" => Command::Reply(HELP.to_string()),
            "/reset" => {
                let n = transcript.len();
                transcript.clear();
                info!(removed = n, "transcript reset");
                Command::Reply(format!("Conversation reset ({n} messages removed).\n"))
            }
            "/undo" => {
                let n = transcript.undo();
                if n == 0 {
                    Command::Reply("Nothing to undo.\n".to_string())
                } else {
                    Command::Reply(format!("Removed the last {n} messages.\n"))
                }
            }
            "/tokens" => {
                let request = self.build_request(transcript);
                Command::Reply(format!(
                    "Context: ~{} tokens (window {}, reply budget {}).\nAPI usage this session: {} in / {} out.\n",
                    estimate_total(&request),
                    self.settings.llm.context_window,
                    self.settings.llm.max_tokens,
                    self.usage.input_tokens,
                    self.usage.output_tokens,
                ))
            }
            other => Command::Reply(format!("Unknown command {other}. Type /help for help.\n")),
        }
    }

    fn build_request(&self, transcript: &Transcript) -> Vec<crate::llm::ChatMessage> {
        fit_to_context(
            self.settings.llm.system_message.as_deref(),
            transcript.to_chat_messages(),
            self.settings.llm.context_window,
            self.settings.llm.max_tokens,
        )
    }
}

impl<W: AsyncWrite + Unpin> Session for ConsoleSession<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn run(&mut self, transcript: &mut Transcript) -> Result<(), SessionError> {
        let provider = providers::build(
            &self.settings.llm,
            self.settings.api_key.clone(),
            self.settings.offline,
        )?;

        if self.settings.api_key.is_none() && matches!(provider, LlmProvider::OpenAiCompatible(_)) {
            warn!("LLM_API_KEY is not set — requests are sent without credentials");
        }

        let header = self.header(&provider);
        self.write(&header).await?;

        loop {
            self.write("> ").await?;

            let line = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    self.write("\n").await?;
                    info!("console session interrupted");
                    break;
                }

                line = self.input.next_line() => line?,
            };

            let Some(line) = line else {
                self.write("\n").await?;
                info!("console input closed");
                break;
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if input.starts_with('/') {
                match self.handle_command(input, transcript) {
                    Command::Exit => break,
                    Command::Reply(text) => {
                        self.write(&text).await?;
                        continue;
                    }
                }
            }

            debug!(len = input.len(), "console received line");
            transcript.push_message("user", input);
            let request = self.build_request(transcript);

            let reply = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    self.write("\n[interrupted]\n").await?;
                    info!("console session interrupted while waiting for a reply");
                    break;
                }

                reply = provider.complete(&request) => reply?,
            };

            if let Some(usage) = reply.usage {
                self.usage.add(usage);
            }
            transcript.push_message("assistant", &reply.text);
            self.write(&format!("{}\n\n", reply.text)).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn settings() -> SessionSettings {
        SessionSettings::from_config(&Config::test_default())
    }

    async fn run_script(
        settings: SessionSettings,
        script: &'static str,
        transcript: &mut Transcript,
    ) -> (Result<(), SessionError>, String) {
        let mut session = ConsoleSession::new(
            settings,
            ConsoleInput::from_text(script),
            Vec::new(),
            CancellationToken::new(),
        );
        let result = session.run(transcript).await;
        let out = String::from_utf8(session.into_output()).unwrap();
        (result, out)
    }

    #[tokio::test]
    async fn chats_until_exit() {
        let mut t = Transcript::new();
        let (result, out) = run_script(settings(), "hello\n\n/exit\nnot read\n", &mut t).await;

        result.unwrap();
        assert!(out.contains("[echo] hello"));
        assert!(!out.contains("not read"));
        assert_eq!(
            t.messages(),
            &[
                json!({"role": "user", "type": "message", "content": "hello"}),
                json!({"role": "assistant", "type": "message", "content": "[echo] hello"}),
            ]
        );
    }

    #[tokio::test]
    async fn end_of_input_ends_normally() {
        let mut t = Transcript::new();
        let (result, _) = run_script(settings(), "one\ntwo", &mut t).await;
        result.unwrap();
        assert_eq!(t.len(), 4);
    }

    #[tokio::test]
    async fn continues_a_loaded_transcript() {
        let mut t = Transcript::new();
        t.push_message("user", "earlier");
        t.push_message("assistant", "[echo] earlier");

        let (result, _) = run_script(settings(), "later\n", &mut t).await;
        result.unwrap();
        assert_eq!(t.len(), 4);
        assert_eq!(t.messages()[0]["content"], "earlier");
    }

    #[tokio::test]
    async fn undo_and_reset_edit_the_transcript() {
        let mut t = Transcript::new();
        let (result, out) = run_script(settings(), "a\nb\n/undo\n/undo\n/undo\n", &mut t).await;
        result.unwrap();
        assert!(t.is_empty());
        assert!(out.contains("Nothing to undo."));

        let mut t = Transcript::new();
        t.push_message("user", "old");
        let (result, out) = run_script(settings(), "/reset\n", &mut t).await;
        result.unwrap();
        assert!(t.is_empty());
        assert!(out.contains("1 messages removed"));
    }

    #[tokio::test]
    async fn help_tokens_and_unknown_commands_reply_without_touching_transcript() {
        let mut t = Transcript::new();
        let (result, out) = run_script(settings(), "/help\n/tokens\n/frobnicate\n", &mut t).await;
        result.unwrap();
        assert!(t.is_empty());
        assert!(out.contains("/reset"));
        assert!(out.contains("Context: ~0 tokens"));
        assert!(out.contains("Unknown command /frobnicate"));
    }

    #[tokio::test]
    async fn unknown_provider_fails_the_session() {
        let mut s = settings();
        s.llm.provider = "nope".into();
        let mut t = Transcript::new();
        let (result, _) = run_script(s, "hi\n", &mut t).await;
        assert!(matches!(result, Err(SessionError::Provider { .. })));
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn offline_refuses_remote_endpoint() {
        let mut s = settings();
        s.llm.provider = "openai-compatible".into();
        s.llm.api_base = "https://openrouter.ai/api/v1".into();
        s.offline = true;
        let mut t = Transcript::new();
        let (result, _) = run_script(s, "hi\n", &mut t).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_keeps_the_user_message() {
        let mut s = settings();
        s.llm.provider = "openai-compatible".into();
        s.llm.api_base = "http://127.0.0.1:9/v1".into();
        let mut t = Transcript::new();
        let (result, _) = run_script(s, "are you there?\n", &mut t).await;
        assert!(matches!(result, Err(SessionError::Provider { .. })));
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0]["content"], "are you there?");
    }

    #[tokio::test]
    async fn cancelled_token_ends_session_cleanly() {
        let token = CancellationToken::new();
        token.cancel();
        let mut session =
            ConsoleSession::new(settings(), ConsoleInput::from_text("hello\n"), Vec::new(), token);
        let mut t = Transcript::new();
        session.run(&mut t).await.unwrap();
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn ctrl_c_at_a_blocked_prompt_ends_session() {
        let token = CancellationToken::new();
        let input = ConsoleInput::spawn_reader(
            "stalled",
            std::io::BufReader::new(crate::subsystems::session::input::tests::Stalled),
        )
        .unwrap();
        let mut session = ConsoleSession::new(settings(), input, Vec::new(), token.clone());

        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            token.cancel();
        });

        let mut t = Transcript::new();
        session.run(&mut t).await.unwrap();
        canceller.await.unwrap();
        assert!(t.is_empty());
        assert!(String::from_utf8(session.into_output()).unwrap().ends_with("> \n"));
    }
}
