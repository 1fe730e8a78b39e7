//! Console channel: chat with an author from a terminal.
//!
//! Used by `authorchat chat`. Lines typed on stdin become inbound
//! messages; replies are written to stdout.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use authorchat_core::channel::{Channel, InboundMessage, OutboundMessage};
use authorchat_core::error::ChannelError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Prints replies to a writer, stdout by default.
pub struct ConsoleChannel {
    out: Mutex<Box<dyn Write + Send>>,
    /// Label printed before each reply
    speaker: Option<String>,
}

impl ConsoleChannel {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            speaker: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Read stdin line by line as messages from `sender` to `recipient`.
    pub fn listen(
        sender: &str,
        recipient: &str,
    ) -> mpsc::Receiver<Result<InboundMessage, ChannelError>> {
        Self::listen_on(BufReader::new(tokio::io::stdin()), sender, recipient)
    }

    /// Like [`listen`](Self::listen) over any buffered reader.
    ///
    /// Blank lines are skipped; `exit`, `quit`, `/exit`, `/quit` and EOF
    /// end the stream.
    pub fn listen_on<R>(
        reader: R,
        sender: &str,
        recipient: &str,
    ) -> mpsc::Receiver<Result<InboundMessage, ChannelError>>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(32);
        let sender = sender.to_string();
        let recipient = recipient.to_string();

        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if matches!(line, "exit" | "quit" | "/exit" | "/quit") {
                            break;
                        }
                        let inbound = InboundMessage {
                            text: line.to_string(),
                            sender: sender.clone(),
                            recipient: recipient.clone(),
                        };
                        if tx.send(Ok(inbound)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        rx
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, ChannelError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let written = match &self.speaker {
            Some(speaker) => writeln!(out, "\n{speaker}: {}\n", message.text),
            None => writeln!(out, "{}", message.text),
        };
        written
            .and_then(|_| out.flush())
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "console".into(),
                reason: e.to_string(),
            })?;
        Ok(format!("console-{}", uuid::Uuid::new_v4()))
    }
}
