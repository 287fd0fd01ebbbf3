//! Host bot framework contract.
//!
//! The plugin core only sees the types and traits in this module. A host
//! adapter turns its own message events into [`InboundMessage`] values and
//! implements [`ReplySink`] (and optionally [`UrlDownloader`]) on top of its
//! messaging API. `console` is the adapter shipped with the CLI.

pub mod console;

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

/// Image attached to a message, as the host describes it
///
/// Hosts fill whichever fields they know; resolution tries them in the order
/// local file, inline base64, remote URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRef {
    /// Local path or platform cache file name
    pub file: Option<String>,
    /// Remote URL
    pub url: Option<String>,
    /// Inline base64 payload, optionally prefixed with `base64://`
    pub base64: Option<String>,
}

impl ImageRef {
    pub fn from_file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn from_base64(data: impl Into<String>) -> Self {
        Self {
            base64: Some(data.into()),
            ..Default::default()
        }
    }
}

/// One element of a message chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    Image(ImageRef),
    /// Quoted message the trigger replies to
    Reply(Vec<Segment>),
}

/// A message event delivered by the host
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub sender_id: String,
    /// Platform message id; `None` when the host does not provide one
    pub message_id: Option<String>,
    /// Plain text of the message
    pub text: String,
    pub chain: Vec<Segment>,
}

impl InboundMessage {
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            sender_id: sender_id.into(),
            message_id: None,
            chain: vec![Segment::Plain(text.clone())],
            text,
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.chain.push(segment);
        self
    }

    /// Image references in resolution order: quoted images first, then the
    /// images attached to the message itself
    pub fn image_refs(&self) -> Vec<&ImageRef> {
        let quoted = self.chain.iter().filter_map(|seg| match seg {
            Segment::Reply(inner) => Some(inner.iter().filter_map(|s| match s {
                Segment::Image(img) => Some(img),
                _ => None,
            })),
            _ => None,
        });
        let attached = self.chain.iter().filter_map(|seg| match seg {
            Segment::Image(img) => Some(img),
            _ => None,
        });
        quoted.flatten().chain(attached).collect()
    }
}

/// Something the plugin sends back to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Image(PathBuf),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

/// Delivers replies to the conversation a trigger came from
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;
}

/// Host-provided download helper
///
/// Returns the local path of the downloaded file, or `None` when the host
/// could not fetch it.
#[async_trait]
pub trait UrlDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Option<PathBuf>;
}

/// Sink that keeps every reply in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    replies: Mutex<Vec<Reply>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.lock().is_empty()
    }
}

#[async_trait]
impl ReplySink for MemorySink {
    async fn send(&self, reply: Reply) -> Result<()> {
        self.replies.lock().push(reply);
        Ok(())
    }
}
