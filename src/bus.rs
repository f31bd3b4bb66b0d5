//! Publish/subscribe transport shared by miners and the balance service
//!
//! Three topics carry JSON-encoded [`BusMessage`] envelopes:
//! - `miner-notify`: block announcements and chain requests between miners
//! - `setup-notify`: chain snapshots answering a bootstrapping miner
//! - `client-notify`: client transactions, client chain queries and
//!   new-block notifications for the balance service
//!
//! [`LocalBus`] keeps everything in-process; [`ws::WsBus`] talks to a
//! `relay-hub` over WebSocket. Both deliver a publisher's own messages back
//! to it when it is subscribed to the same topic.

pub mod ws;

use crate::blockchain::Block;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;

/// Per-topic buffer for in-process channels.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    MinerNotify,
    SetupNotify,
    ClientNotify,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::MinerNotify, Topic::SetupNotify, Topic::ClientNotify];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MinerNotify => "miner-notify",
            Topic::SetupNotify => "setup-notify",
            Topic::ClientNotify => "client-notify",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for everything sent over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusMessage {
    RequestChain,
    NewBlock(Block),
    NewTransaction(Transaction),
    ChainSnapshot(Vec<Block>),
}

impl BusMessage {
    pub fn to_json(&self) -> Result<String, ChainError> {
        serde_json::to_string(self).map_err(|e| ChainError::BusError(e.to_string()))
    }

    pub fn from_json(payload: &str) -> Result<Self, ChainError> {
        serde_json::from_str(payload).map_err(|e| ChainError::BusError(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BusMessage::RequestChain => "RequestChain",
            BusMessage::NewBlock(_) => "NewBlock",
            BusMessage::NewTransaction(_) => "NewTransaction",
            BusMessage::ChainSnapshot(_) => "ChainSnapshot",
        }
    }
}

/// Abstract broadcast transport, injected into the miner and the balance service.
pub trait MessageBus: Send + Sync {
    fn publish(&self, topic: Topic, payload: String) -> Result<(), ChainError>;

    fn subscribe(&self, topic: Topic) -> Result<broadcast::Receiver<String>, ChainError>;

    fn publish_message(&self, topic: Topic, message: &BusMessage) -> Result<(), ChainError> {
        self.publish(topic, message.to_json()?)
    }
}

/// In-process bus backed by one `tokio::sync::broadcast` channel per topic.
#[derive(Debug, Clone)]
pub struct LocalBus {
    channels: HashMap<Topic, broadcast::Sender<String>>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let channels = Topic::ALL
            .iter()
            .map(|topic| (*topic, broadcast::channel(capacity).0))
            .collect();
        LocalBus { channels }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels
            .get(&topic)
            .map_or(0, |sender| sender.receiver_count())
    }

    fn sender(&self, topic: Topic) -> Result<&broadcast::Sender<String>, ChainError> {
        self.channels
            .get(&topic)
            .ok_or_else(|| ChainError::BusError(format!("unknown topic {}", topic)))
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        LocalBus::new(DEFAULT_BUS_CAPACITY)
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, topic: Topic, payload: String) -> Result<(), ChainError> {
        // Publishing with nobody listening is not an error.
        let _ = self.sender(topic)?.send(payload);
        Ok(())
    }

    fn subscribe(&self, topic: Topic) -> Result<broadcast::Receiver<String>, ChainError> {
        Ok(self.sender(topic)?.subscribe())
    }
}
