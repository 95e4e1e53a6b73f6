//! File-backed mailbox channel
//!
//! Every message lives in `<root>/<recipient>/inbox/<message_id>.json`
//! until the receiver acknowledges it. Broadcasts go to the `all` mailbox
//! and are visible to every recipient. Recipients and ids are used as path
//! components verbatim, so anything outside `[A-Za-z0-9._-]` is refused
//! rather than rewritten into a name another agent might own.

use crate::base::{Channel, ChannelError, Result};
use agent_relay_core::bus::{DeliveryResult, Message, BROADCAST_RECIPIENT};
use agent_relay_core::config::{expand_home, DurableConfig};
use agent_relay_core::utils::safe_filename;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Name of the per-recipient directory holding undelivered messages
pub const INBOX_DIR: &str = "inbox";

const MESSAGE_EXT: &str = "json";

/// Durable mailbox channel
///
/// Delivery is at-least-once: `receive_messages` leaves files in place and
/// the same message is returned again until [`DurableChannel::acknowledge`]
/// removes it.
#[derive(Debug, Clone)]
pub struct DurableChannel {
    id: String,
    root: PathBuf,
}

impl DurableChannel {
    /// Create a channel storing mailboxes under `root`
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    /// Create a channel from durable configuration, expanding `~`
    pub fn from_config(id: impl Into<String>, config: &DurableConfig) -> Result<Self> {
        if config.root.trim().is_empty() {
            return Err(ChannelError::InvalidConfig(
                "durable root must not be empty".to_string(),
            ));
        }
        Ok(Self::new(id, expand_home(&config.root)))
    }

    /// Mailbox root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Inbox directory for a recipient
    pub fn inbox_dir(&self, recipient: &str) -> Result<PathBuf> {
        let recipient = path_component("recipient", recipient)?;
        Ok(self.root.join(recipient).join(INBOX_DIR))
    }

    fn message_path(&self, recipient: &str, message_id: &str) -> Result<PathBuf> {
        let message_id = path_component("message id", message_id)?;
        Ok(self
            .inbox_dir(recipient)?
            .join(format!("{}.{}", message_id, MESSAGE_EXT)))
    }

    /// Write a message into its recipient's inbox
    ///
    /// The file is written under a temporary name and renamed into place,
    /// so readers never observe a partial message.
    pub async fn store(&self, message: &Message) -> Result<PathBuf> {
        let path = self.message_path(&message.recipient, &message.id)?;
        let dir = self.inbox_dir(&message.recipient)?;
        tokio::fs::create_dir_all(&dir).await?;

        let json = message
            .to_json()
            .map_err(|e| ChannelError::Serialization(e.to_string()))?;

        let tmp_path = dir.join(format!(".{}.tmp", message.id));

        tokio::fs::write(&tmp_path, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!("Stored message {} at {}", message.id, path.display());
        Ok(path)
    }

    /// Load every readable message addressed to a single mailbox
    async fn load_mailbox(&self, mailbox: &str) -> Result<Vec<Message>> {
        let dir = self.inbox_dir(mailbox)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut messages = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MESSAGE_EXT) {
                continue;
            }

            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable message file {}: {}", path.display(), e);
                    continue;
                }
            };

            match Message::from_json(&raw) {
                Ok(message) if message.recipient == mailbox => messages.push(message),
                Ok(message) => {
                    warn!(
                        "Skipping message {} for {} found in mailbox {}",
                        message.id, message.recipient, mailbox
                    );
                }
                Err(e) => {
                    warn!("Skipping malformed message file {}: {}", path.display(), e);
                }
            }
        }

        Ok(messages)
    }

    /// All stored messages for a recipient, broadcasts included, oldest first
    pub async fn load(&self, recipient: &str) -> Result<Vec<Message>> {
        let mut messages = self.load_mailbox(recipient).await?;
        if recipient != BROADCAST_RECIPIENT {
            messages.extend(self.load_mailbox(BROADCAST_RECIPIENT).await?);
        }

        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    /// Remove a processed message from its mailbox
    ///
    /// Returns `false` when the file was already gone.
    pub async fn acknowledge(&self, message: &Message) -> Result<bool> {
        let path = self.message_path(&message.recipient, &message.id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Acknowledged message {}", message.id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of message files waiting in a recipient's own inbox
    pub async fn pending(&self, recipient: &str) -> Result<usize> {
        Ok(self.load_mailbox(recipient).await?.len())
    }
}

/// Accept `name` only if it is already a safe, unambiguous path component
fn path_component<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    if safe_filename(name) == name {
        Ok(name)
    } else {
        Err(ChannelError::InvalidName(format!(
            "{} '{}' must only contain [A-Za-z0-9._-] and not be dots only",
            kind, name
        )))
    }
}

#[async_trait]
impl Channel for DurableChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, message: &Message) -> DeliveryResult {
        let start = Instant::now();
        match self.store(message).await {
            Ok(_) => DeliveryResult::delivered(&message.id, start.elapsed()),
            Err(e) => {
                error!("Channel {} failed to store message {}: {}", self.id, message.id, e);
                DeliveryResult::failed(&message.id, e.to_string(), start.elapsed())
            }
        }
    }

    async fn receive_messages(&self, recipient: &str) -> Vec<Message> {
        match self.load(recipient).await {
            Ok(messages) => messages,
            Err(e) => {
                error!("Channel {} failed to read mailbox {}: {}", self.id, recipient, e);
                Vec::new()
            }
        }
    }
}
