//! Message envelope and delivery result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Recipient wildcard used for broadcast delivery
pub const BROADCAST_RECIPIENT: &str = "all";

/// Suffix appended to a message id when it is cloned for broadcast
pub const BROADCAST_ID_SUFFIX: &str = "_broadcast";

/// Kind of message carried by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Point-to-point message
    Direct,
    /// Message addressed to every agent
    Broadcast,
    /// Progress report on a work item
    TaskUpdate,
    /// Agent status report
    Status,
    /// Error report
    Error,
    /// Coordination signal between agents
    Coordination,
}

impl MessageType {
    /// Stable lowercase name, identical to the wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Direct => "direct",
            MessageType::Broadcast => "broadcast",
            MessageType::TaskUpdate => "task_update",
            MessageType::Status => "status",
            MessageType::Error => "error",
            MessageType::Coordination => "coordination",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority, ordered `Low < Normal < High < Critical`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// All priorities from lowest to highest
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Tier index, 0 for `Low` up to 3 for `Critical`
    pub fn index(&self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Stable lowercase name, identical to the wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message envelope exchanged between agents
///
/// Field order and names match the durable wire format, so the struct
/// serializes directly to a mailbox file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    #[serde(rename = "message_id")]
    pub id: String,
    /// Sending agent
    pub sender: String,
    /// Receiving agent, or `"all"` for broadcasts
    pub recipient: String,
    /// Message kind
    pub message_type: MessageType,
    /// Delivery priority
    pub priority: Priority,
    /// Opaque payload
    #[serde(rename = "content")]
    pub payload: serde_json::Value,
    /// Ordered metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Tag of the transport the message was created for
    #[serde(rename = "protocol", default)]
    pub channel_tag: String,
}

impl Message {
    /// Create a new message with a fresh id and normal priority
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            recipient: recipient.into(),
            message_type,
            priority: Priority::Normal,
            payload,
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
            channel_tag: String::new(),
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add metadata to the message
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the channel tag
    pub fn with_channel_tag(mut self, tag: impl Into<String>) -> Self {
        self.channel_tag = tag.into();
        self
    }

    /// Whether the message is addressed to every agent
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST_RECIPIENT
    }

    /// Whether the message should be delivered to `recipient`
    pub fn is_for(&self, recipient: &str) -> bool {
        self.recipient == recipient || self.is_broadcast()
    }

    /// Clone this message for broadcast delivery
    pub fn to_broadcast(&self) -> Self {
        Self {
            id: format!("{}{}", self.id, BROADCAST_ID_SUFFIX),
            recipient: BROADCAST_RECIPIENT.to_string(),
            ..self.clone()
        }
    }

    /// Create a reply addressed back to the sender
    pub fn reply(&self, payload: serde_json::Value) -> Self {
        Self::new(
            self.recipient.clone(),
            self.sender.clone(),
            self.message_type,
            payload,
        )
        .with_priority(self.priority)
        .with_channel_tag(self.channel_tag.clone())
        .with_metadata("in_reply_to", self.id.clone())
    }

    /// Deserialize the payload as a specific type
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> crate::Result<T> {
        T::deserialize(self.payload.clone()).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize message payload: {}", e))
        })
    }

    /// Encode to the durable wire format
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from the durable wire format
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Outcome of a single send attempt
///
/// Failures are reported through this value rather than as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub message_id: String,
    pub error: Option<String>,
    pub delivery_time: Duration,
}

impl DeliveryResult {
    /// A successful delivery
    pub fn delivered(message_id: impl Into<String>, delivery_time: Duration) -> Self {
        Self {
            success: true,
            message_id: message_id.into(),
            error: None,
            delivery_time,
        }
    }

    /// A failed delivery
    pub fn failed(
        message_id: impl Into<String>,
        error: impl Into<String>,
        delivery_time: Duration,
    ) -> Self {
        Self {
            success: false,
            message_id: message_id.into(),
            error: Some(error.into()),
            delivery_time,
        }
    }
}
