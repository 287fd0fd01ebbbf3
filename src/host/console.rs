//! Line-based console host.
//!
//! Each input line is one chat message from a fixed user. Lines starting
//! with a known command go to the command handlers; anything else is treated
//! as a draw-tool call with the whole line as the prompt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{ImageRef, InboundMessage, Reply, ReplySink, Segment};
use crate::error::{PluginError, Result};
use crate::plugin::ImagePlugin;

/// Prints replies to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl ReplySink for StdoutSink {
    async fn send(&self, reply: Reply) -> Result<()> {
        let line = render(&reply);
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PluginError::Reply(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| PluginError::Reply(e.to_string()))
    }
}

pub fn render(reply: &Reply) -> String {
    match reply {
        Reply::Text(text) => format!("{}\n", text),
        Reply::Image(path) => format!("[image] {}\n", path.display()),
    }
}

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand<'a> {
    Generate(&'a str),
    Edit(&'a str),
    Clean,
    Stats,
    Draw(&'a str),
    Empty,
}

/// Classify one input line
pub fn parse_line(line: &str) -> ConsoleCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/aiimg" => ConsoleCommand::Generate(rest),
        "/aiedit" => ConsoleCommand::Edit(rest),
        "/aiimg_clean" => ConsoleCommand::Clean,
        "/aiimg_stats" => ConsoleCommand::Stats,
        _ => ConsoleCommand::Draw(line),
    }
}

/// Split `@path` tokens out of an edit line and attach them as images
///
/// `/aiedit @cat.jpg make it blue` becomes the prompt `make it blue` with
/// `cat.jpg` attached.
pub fn attach_images(message: InboundMessage, args: &str) -> (InboundMessage, String) {
    let mut message = message;
    let mut words = Vec::new();
    for token in args.split_whitespace() {
        match token.strip_prefix('@') {
            Some(path) if !path.is_empty() => {
                let image = if path.starts_with("http") {
                    ImageRef::from_url(path)
                } else {
                    ImageRef::from_file(path)
                };
                message = message.with_segment(Segment::Image(image));
            }
            _ => words.push(token),
        }
    }
    (message, words.join(" "))
}

/// Routes console lines to the plugin handlers
pub struct ConsoleHost {
    plugin: Arc<ImagePlugin>,
    sink: Arc<dyn ReplySink>,
    user_id: String,
    counter: AtomicU64,
}

impl ConsoleHost {
    pub fn new(plugin: Arc<ImagePlugin>, sink: Arc<dyn ReplySink>, user_id: impl Into<String>) -> Self {
        Self {
            plugin,
            sink,
            user_id: user_id.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_message(&self, text: &str) -> InboundMessage {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        InboundMessage::text(self.user_id.clone(), text).with_message_id(format!("console-{}", seq))
    }

    /// Handle one line and deliver every reply through the sink
    pub async fn handle_line(&self, line: &str) -> Result<()> {
        let replies = match parse_line(line) {
            ConsoleCommand::Empty => return Ok(()),
            ConsoleCommand::Generate(args) => {
                let message = self.next_message(line);
                self.plugin.cmd_aiimg(&message, args).await
            }
            ConsoleCommand::Edit(args) => {
                let (message, prompt) = attach_images(self.next_message(line), args);
                self.plugin
                    .cmd_aiedit(&message, &prompt, Arc::clone(&self.sink))
                    .await
            }
            ConsoleCommand::Clean => self.plugin.cmd_clean().await,
            ConsoleCommand::Stats => self.plugin.cmd_stats().await,
            ConsoleCommand::Draw(prompt) => {
                let message = self.next_message(line);
                let text = self
                    .plugin
                    .draw_tool(&message, prompt, true, self.sink.as_ref())
                    .await;
                tracing::info!(tool_result = %text, "Draw tool finished");
                Vec::new()
            }
        };

        for reply in replies {
            self.sink.send(reply).await?;
        }
        Ok(())
    }

    /// Read lines from stdin until EOF or ctrl-c
    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if let Err(e) = self.handle_line(&line).await {
                                tracing::error!(error = %e, "Failed to handle console line");
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, leaving console");
                    break;
                }
            }
        }
        Ok(())
    }
}
