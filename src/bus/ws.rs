//! WebSocket hub and client for running miners and the balance service as
//! separate processes.
//!
//! Every frame is a JSON [`Frame`]. Clients send `subscribe` and `publish`
//! frames; the hub forwards each publish to every connection subscribed to
//! the topic, the publisher included.

use crate::bus::{LocalBus, MessageBus, Topic};
use crate::error::ChainError;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Frame {
    Subscribe { topic: Topic },
    Publish { topic: Topic, payload: String },
}

/// Accepts connections on `listener` until the task is dropped.
pub async fn run_hub(listener: TcpListener) -> Result<(), ChainError> {
    run_hub_on(listener, LocalBus::default()).await
}

/// Like [`run_hub`], relaying through the given in-process bus.
pub async fn run_hub_on(listener: TcpListener, hub: LocalBus) -> Result<(), ChainError> {
    info!(addr = ?listener.local_addr().ok(), "bus hub listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(hub, stream, peer).await {
                debug!(%peer, error = %e, "hub connection ended");
            }
        });
    }
}

async fn serve_connection(
    hub: LocalBus,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ChainError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| ChainError::BusError(format!("handshake with {} failed: {}", peer, e)))?;
    let (mut sink, mut source) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    info!(%peer, "bus client connected");

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders = HashMap::new();
    let result = loop {
        let text = match source.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break Ok(()),
            Some(Ok(_)) => continue,
        };
        match serde_json::from_str::<Frame>(&text) {
            Ok(Frame::Publish { topic, payload }) => {
                if let Err(e) = hub.publish(topic, payload) {
                    break Err(e);
                }
            }
            Ok(Frame::Subscribe { topic }) => {
                if let Entry::Vacant(slot) = forwarders.entry(topic) {
                    match hub.subscribe(topic) {
                        Ok(rx) => {
                            slot.insert(forward_topic(rx, topic, out_tx.clone()));
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
            Err(e) => debug!(%peer, error = %e, "discarding malformed frame"),
        }
    };

    for forwarder in forwarders.into_values() {
        forwarder.abort();
    }
    writer.abort();
    info!(%peer, "bus client disconnected");
    result
}

fn forward_topic(
    mut rx: broadcast::Receiver<String>,
    topic: Topic,
    out: mpsc::UnboundedSender<Frame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(payload) => {
                    if out.send(Frame::Publish { topic, payload }).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(%topic, skipped = n, "hub subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// [`MessageBus`] that relays through a `relay-hub`.
pub struct WsBus {
    outgoing: mpsc::UnboundedSender<Frame>,
    inbound: LocalBus,
    subscribed: Mutex<HashSet<Topic>>,
}

impl WsBus {
    pub async fn connect(url: &str) -> Result<Self, ChainError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ChainError::BusError(format!("failed to connect to {}: {}", url, e)))?;
        let (mut sink, mut source) = ws.split();
        let (outgoing, mut out_rx) = mpsc::unbounded_channel::<Frame>();
        let inbound = LocalBus::default();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let Ok(text) = serde_json::to_string(&frame) else {
                    continue;
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    warn!("bus hub connection lost while sending");
                    break;
                }
            }
        });

        let local = inbound.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                        Ok(Frame::Publish { topic, payload }) => {
                            let _ = local.publish(topic, payload);
                        }
                        Ok(Frame::Subscribe { .. }) => {}
                        Err(e) => debug!(error = %e, "discarding malformed frame from hub"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            warn!("bus hub connection closed");
        });

        info!(%url, "connected to bus hub");
        Ok(WsBus {
            outgoing,
            inbound,
            subscribed: Mutex::new(HashSet::new()),
        })
    }
}

impl MessageBus for WsBus {
    fn publish(&self, topic: Topic, payload: String) -> Result<(), ChainError> {
        self.outgoing
            .send(Frame::Publish { topic, payload })
            .map_err(|_| ChainError::BusError("hub connection closed".to_string()))
    }

    fn subscribe(&self, topic: Topic) -> Result<broadcast::Receiver<String>, ChainError> {
        let receiver = self.inbound.subscribe(topic)?;
        let mut subscribed = self
            .subscribed
            .lock()
            .map_err(|_| ChainError::BusError("Mutex poisoned".to_string()))?;
        if subscribed.insert(topic) {
            self.outgoing
                .send(Frame::Subscribe { topic })
                .map_err(|_| ChainError::BusError("hub connection closed".to_string()))?;
        }
        Ok(receiver)
    }
}
