// Reply transports
//
// Design Decision: Steps only know the Transport trait, so the same
// conversation runs against stdout, a chat API or a test recorder.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chatflow::FlowSnapshot;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Something sent back to a user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Plain text
    Text { text: String },

    /// Text with a set of buttons; the user answers by pressing one
    Keyboard { text: String, buttons: Vec<String> },

    /// A document link
    Document { url: String },

    /// Flow state, `None` when the user has no flow
    Status { snapshot: Option<FlowSnapshot> },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text { text: text.into() }
    }

    pub fn keyboard<S: Into<String>>(
        text: impl Into<String>,
        buttons: impl IntoIterator<Item = S>,
    ) -> Self {
        Reply::Keyboard {
            text: text.into(),
            buttons: buttons.into_iter().map(Into::into).collect(),
        }
    }

    /// Text shown to the user, if this reply carries any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text { text } | Reply::Keyboard { text, .. } => Some(text),
            Reply::Document { .. } | Reply::Status { .. } => None,
        }
    }
}

/// Delivers replies to users
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one reply to `user`
    async fn send(&self, user: &str, reply: Reply) -> Result<()>;

    /// Send a plain text reply
    async fn send_text(&self, user: &str, text: &str) -> Result<()> {
        self.send(user, Reply::text(text)).await
    }
}

/// How replies are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }

    /// Render one reply as a single output record
    pub fn render(&self, user: &str, reply: &Reply) -> String {
        match self {
            OutputFormat::Json => serde_json::json!({ "user": user, "reply": reply }).to_string(),
            OutputFormat::Text => render_text(user, reply),
        }
    }
}

fn render_text(user: &str, reply: &Reply) -> String {
    let prefix = format!("[{}]", user);
    match reply {
        Reply::Text { text } => format!("{} {}", prefix, text),
        Reply::Keyboard { text, buttons } => {
            let buttons: Vec<String> = buttons.iter().map(|b| format!("#{}", b)).collect();
            format!("{} {}\n{} buttons: {}", prefix, text, prefix, buttons.join("  "))
        }
        Reply::Document { url } => format!("{} document: {}", prefix, url),
        Reply::Status { snapshot: None } => format!("{} no flow", prefix),
        Reply::Status {
            snapshot: Some(snapshot),
        } => {
            let mut lines = vec![
                field(&prefix, "Steps", &snapshot.actions_queued.to_string()),
                field(&prefix, "Events", &snapshot.events_queued.to_string()),
                field(&prefix, "Executing", &snapshot.executing.to_string()),
                field(&prefix, "Locked", &snapshot.locked.to_string()),
                field(&prefix, "Idle", &format!("{}ms", snapshot.idle_ms)),
            ];
            if let Some(error) = &snapshot.last_error {
                lines.push(field(&prefix, "Stalled", &error.to_string()));
            }
            lines.join("\n")
        }
    }
}

fn field(prefix: &str, label: &str, value: &str) -> String {
    format!("{} {:<11} {}", prefix, format!("{}:", label), value)
}

/// Transport writing every reply to an async writer, stdout by default
pub struct ConsoleTransport<W = tokio::io::Stdout> {
    format: OutputFormat,
    out: tokio::sync::Mutex<W>,
}

impl ConsoleTransport {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(tokio::io::stdout(), format)
    }
}

impl<W> ConsoleTransport<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            format,
            out: tokio::sync::Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> Transport for ConsoleTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, user: &str, reply: Reply) -> Result<()> {
        let mut record = self.format.render(user, &reply);
        record.push('\n');

        let mut out = self.out.lock().await;
        out.write_all(record.as_bytes())
            .await
            .context("Failed to write reply")?;
        out.flush().await.context("Failed to flush reply")?;
        Ok(())
    }
}

/// Transport keeping every reply in memory
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<Vec<(String, Reply)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every reply so far, in send order
    pub fn replies(&self) -> Vec<(String, Reply)> {
        self.replies.lock().clone()
    }

    /// Replies sent to `user`
    pub fn replies_for(&self, user: &str) -> Vec<Reply> {
        self.replies
            .lock()
            .iter()
            .filter(|(to, _)| to == user)
            .map(|(_, reply)| reply.clone())
            .collect()
    }

    /// Text of the replies sent to `user`
    pub fn texts_for(&self, user: &str) -> Vec<String> {
        self.replies_for(user)
            .iter()
            .filter_map(|reply| reply.as_text().map(str::to_string))
            .collect()
    }

    /// Most recent reply sent to `user`
    pub fn last_for(&self, user: &str) -> Option<Reply> {
        self.replies_for(user).pop()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, user: &str, reply: Reply) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("transport unavailable");
        }
        self.replies.lock().push((user.to_string(), reply));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text() {
        let format = OutputFormat::Text;

        assert_eq!(format.render("alice", &Reply::text("hi")), "[alice] hi");
        assert_eq!(
            format.render("alice", &Reply::Document { url: "http://x/1.png".into() }),
            "[alice] document: http://x/1.png"
        );
        assert_eq!(
            format.render("alice", &Reply::keyboard("Pick", ["png", "gif"])),
            "[alice] Pick\n[alice] buttons: #png  #gif"
        );
        assert_eq!(
            format.render("alice", &Reply::Status { snapshot: None }),
            "[alice] no flow"
        );
    }

    #[test]
    fn test_render_json() {
        let line = OutputFormat::Json.render("bob", &Reply::text("hello"));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["user"], "bob");
        assert_eq!(value["reply"]["type"], "text");
        assert_eq!(value["reply"]["text"], "hello");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[tokio::test]
    async fn test_console_transport_writes_lines() {
        let transport = ConsoleTransport::new(Vec::new(), OutputFormat::Text);

        transport.send_text("u1", "first").await.unwrap();
        transport.send_text("u2", "second").await.unwrap();

        let written = String::from_utf8(transport.into_inner()).unwrap();
        assert_eq!(written, "[u1] first\n[u2] second\n");
    }

    #[tokio::test]
    async fn test_recording_transport() {
        let transport = RecordingTransport::new();

        transport.send_text("u1", "a").await.unwrap();
        transport.send("u2", Reply::Document { url: "x".into() }).await.unwrap();
        transport.send_text("u1", "b").await.unwrap();

        assert_eq!(transport.texts_for("u1"), vec!["a", "b"]);
        assert_eq!(transport.replies().len(), 3);
        assert_eq!(
            transport.last_for("u2"),
            Some(Reply::Document { url: "x".into() })
        );

        transport.set_failing(true);
        assert!(transport.send_text("u1", "c").await.is_err());
        assert_eq!(transport.texts_for("u1").len(), 2);
    }
}
