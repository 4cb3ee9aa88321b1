// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The only crossing point between the engine and a synchronous UI.
//!
//! ```text
//!            try_send (never blocks)
//!   UI ─────────── Command ───────────▶ Engine actor
//!   ▲                                      │
//!   │ drain(hooks), once per tick          │ emit (awaits capacity)
//!   └──────────── EngineEvent ◀────────────┘
//! ```
//!
//! Both directions are bounded. A full event queue slows the engine down
//! instead of dropping updates; a full command queue is reported to the
//! caller as [`BridgeError::Full`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::attributes::AttributeSet;
use crate::client::session::SessionState;
use crate::error::{BridgeError, ErrorKind, UaError, UaResult};
use crate::subscription::{ItemRef, MonitoredItem};
use crate::types::{NodeId, NodeRef};
use crate::value::DataValue;

// =============================================================================
// Commands
// =============================================================================

/// Requests from the UI to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Connect using the named profile.
    Connect {
        /// Profile name.
        profile: String,
    },
    /// Close the session.
    Disconnect,
    /// Load the children of a node.
    Expand {
        /// Node to expand.
        node: NodeRef,
    },
    /// Load the attributes of a node, superseding the previous selection.
    Select {
        /// Node to show.
        node: NodeRef,
    },
    /// Start monitoring a node's value.
    Subscribe {
        /// Node to watch.
        node: NodeRef,
    },
    /// Stop monitoring an item.
    Unsubscribe {
        /// Item to remove.
        item: ItemRef,
    },
    /// Disconnect and stop the engine.
    Shutdown,
}

impl Command {
    /// Returns the command name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect => "disconnect",
            Self::Expand { .. } => "expand",
            Self::Select { .. } => "select",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Shutdown => "shutdown",
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Why the engine left the connected state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum DisconnectReason {
    /// The UI asked for it.
    Requested,
    /// The connection dropped and the single reconnect attempt failed.
    ReconnectFailed {
        /// Cause of the failed attempt.
        message: String,
    },
    /// The engine is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "disconnected"),
            Self::ReconnectFailed { message } => write!(f, "connection lost: {message}"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Notifications from the engine to the UI.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The session state machine moved.
    StateChanged {
        /// Previous state.
        old: SessionState,
        /// New state.
        new: SessionState,
    },
    /// A session is active.
    Connected {
        /// Profile in use.
        profile: String,
    },
    /// No session any more.
    Disconnected(DisconnectReason),
    /// Children of an expanded node.
    ChildrenLoaded {
        /// Expanded node.
        node: NodeId,
        /// Children in server order.
        children: Vec<NodeRef>,
    },
    /// Attributes of the selected node.
    AttributesLoaded {
        /// Selected node.
        node: NodeId,
        /// Decoded attributes.
        attributes: Box<AttributeSet>,
    },
    /// A monitored item was created (or already existed).
    Subscribed(Box<MonitoredItem>),
    /// A monitored item is gone.
    Unsubscribed {
        /// The item.
        item: ItemRef,
    },
    /// A new value for a monitored item.
    ValueChanged {
        /// The item.
        item: ItemRef,
        /// The value.
        value: DataValue,
        /// Source timestamp, falling back to the server timestamp.
        timestamp: Option<DateTime<Utc>>,
    },
    /// An operation failed.
    Error {
        /// Failure category.
        kind: ErrorKind,
        /// Operation, target and cause.
        message: String,
    },
}

impl EngineEvent {
    /// Builds an error event for `operation` on an optional `target`.
    pub fn error(operation: &str, target: Option<&NodeId>, error: &UaError) -> Self {
        let message = match target {
            Some(node) => format!("{operation} {node}: {error}"),
            None => format!("{operation}: {error}"),
        };
        Self::Error {
            kind: error.kind(),
            message,
        }
    }
}

// =============================================================================
// BridgeHooks
// =============================================================================

/// UI callbacks invoked by [`UiBridge::drain`].
///
/// Every method has an empty default, so a UI only implements what it shows.
#[allow(unused_variables)]
pub trait BridgeHooks {
    /// A session is active.
    fn on_connected(&mut self, profile: &str) {}

    /// The session is gone.
    fn on_disconnected(&mut self, reason: &DisconnectReason) {}

    /// Children of `node` are available.
    fn on_children_loaded(&mut self, node: &NodeId, children: &[NodeRef]) {}

    /// Attributes of `node` are available.
    fn on_attributes_loaded(&mut self, node: &NodeId, attributes: &AttributeSet) {}

    /// A monitored item has a new value.
    fn on_value_changed(&mut self, item: ItemRef, value: &DataValue, timestamp: Option<DateTime<Utc>>) {}

    /// An operation failed.
    fn on_error(&mut self, kind: ErrorKind, message: &str) {}

    /// The session state changed.
    fn on_state_changed(&mut self, old: SessionState, new: SessionState) {}

    /// A monitored item was created.
    fn on_subscribed(&mut self, item: &MonitoredItem) {}

    /// A monitored item was removed.
    fn on_unsubscribed(&mut self, item: ItemRef) {}
}

fn dispatch<H: BridgeHooks + ?Sized>(hooks: &mut H, event: EngineEvent) {
    match event {
        EngineEvent::StateChanged { old, new } => hooks.on_state_changed(old, new),
        EngineEvent::Connected { profile } => hooks.on_connected(&profile),
        EngineEvent::Disconnected(reason) => hooks.on_disconnected(&reason),
        EngineEvent::ChildrenLoaded { node, children } => hooks.on_children_loaded(&node, &children),
        EngineEvent::AttributesLoaded { node, attributes } => {
            hooks.on_attributes_loaded(&node, &attributes)
        }
        EngineEvent::Subscribed(item) => hooks.on_subscribed(&item),
        EngineEvent::Unsubscribed { item } => hooks.on_unsubscribed(item),
        EngineEvent::ValueChanged {
            item,
            value,
            timestamp,
        } => hooks.on_value_changed(item, &value, timestamp),
        EngineEvent::Error { kind, message } => hooks.on_error(kind, &message),
    }
}

// =============================================================================
// UiBridge
// =============================================================================

/// The UI's end of the bridge.
#[derive(Debug)]
pub struct UiBridge {
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<EngineEvent>,
    command_capacity: usize,
    max_events_per_tick: usize,
}

impl UiBridge {
    /// Queues a connect.
    pub fn connect(&self, profile: impl Into<String>) -> UaResult<()> {
        self.send(Command::Connect {
            profile: profile.into(),
        })
    }

    /// Queues a disconnect.
    pub fn disconnect(&self) -> UaResult<()> {
        self.send(Command::Disconnect)
    }

    /// Queues an expand.
    pub fn expand(&self, node: NodeRef) -> UaResult<()> {
        self.send(Command::Expand { node })
    }

    /// Queues a selection.
    pub fn select(&self, node: NodeRef) -> UaResult<()> {
        self.send(Command::Select { node })
    }

    /// Queues a subscribe.
    pub fn subscribe(&self, node: NodeRef) -> UaResult<()> {
        self.send(Command::Subscribe { node })
    }

    /// Queues an unsubscribe.
    pub fn unsubscribe(&self, item: ItemRef) -> UaResult<()> {
        self.send(Command::Unsubscribe { item })
    }

    /// Queues a shutdown.
    pub fn shutdown(&self) -> UaResult<()> {
        self.send(Command::Shutdown)
    }

    /// Queues `command` without blocking.
    pub fn send(&self, command: Command) -> UaResult<()> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(command) => {
                tracing::warn!(command = command.name(), "Command queue full");
                UaError::Bridge(BridgeError::Full {
                    capacity: self.command_capacity,
                })
            }
            TrySendError::Closed(_) => UaError::Bridge(BridgeError::Closed),
        })
    }

    /// Dispatches up to `max_events_per_tick` pending events to `hooks`.
    ///
    /// Never waits. Returns the number of events dispatched.
    pub fn drain<H: BridgeHooks + ?Sized>(&mut self, hooks: &mut H) -> usize {
        let mut dispatched = 0;
        while dispatched < self.max_events_per_tick {
            match self.events.try_recv() {
                Ok(event) => {
                    dispatch(hooks, event);
                    dispatched += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        dispatched
    }

    /// Waits for the next event. For hosts without a tick loop.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Returns `true` once the engine has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

// =============================================================================
// Engine side
// =============================================================================

/// The engine's end of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<EngineEvent>,
}

impl EventSender {
    /// Sends `event`, waiting for capacity.
    ///
    /// Returns `false` once the UI side is gone.
    pub async fn emit(&self, event: EngineEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }
}

/// Creates both ends of a bridge.
pub fn channel(
    command_capacity: usize,
    event_capacity: usize,
    max_events_per_tick: usize,
) -> (UiBridge, mpsc::Receiver<Command>, EventSender) {
    let (command_tx, command_rx) = mpsc::channel(command_capacity);
    let (event_tx, event_rx) = mpsc::channel(event_capacity);
    let bridge = UiBridge {
        commands: command_tx,
        events: event_rx,
        command_capacity,
        max_events_per_tick,
    };
    (bridge, command_rx, EventSender { sender: event_tx })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::UaValue;

    #[derive(Default)]
    struct Recorder {
        values: Vec<(ItemRef, String)>,
        errors: Vec<(ErrorKind, String)>,
        connected: Vec<String>,
    }

    impl BridgeHooks for Recorder {
        fn on_connected(&mut self, profile: &str) {
            self.connected.push(profile.to_string());
        }

        fn on_value_changed(&mut self, item: ItemRef, value: &DataValue, _timestamp: Option<DateTime<Utc>>) {
            let rendered = value
                .value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            self.values.push((item, rendered));
        }

        fn on_error(&mut self, kind: ErrorKind, message: &str) {
            self.errors.push((kind, message.to_string()));
        }
    }

    fn value_event(item: u32, value: i32) -> EngineEvent {
        EngineEvent::ValueChanged {
            item: ItemRef(item),
            value: DataValue::new(UaValue::Int32(value)),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_drain_respects_tick_budget() {
        let (mut bridge, _commands, events) = channel(4, 16, 3);
        for i in 0..5 {
            assert!(events.emit(value_event(1, i)).await);
        }

        let mut recorder = Recorder::default();
        assert_eq!(bridge.drain(&mut recorder), 3);
        assert_eq!(bridge.drain(&mut recorder), 2);
        assert_eq!(bridge.drain(&mut recorder), 0);

        let rendered: Vec<&str> = recorder.values.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(rendered, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_full_command_queue() {
        let (bridge, _commands, _events) = channel(1, 4, 8);
        bridge.connect("local").unwrap();

        let err = bridge.disconnect().unwrap_err();
        assert!(matches!(err, UaError::Bridge(BridgeError::Full { capacity: 1 })));
    }

    #[tokio::test]
    async fn test_closed_engine() {
        let (bridge, commands, _events) = channel(4, 4, 8);
        drop(commands);

        assert!(bridge.is_closed());
        let err = bridge.shutdown().unwrap_err();
        assert!(matches!(err, UaError::Bridge(BridgeError::Closed)));
    }

    #[tokio::test]
    async fn test_error_event_message() {
        let (mut bridge, _commands, events) = channel(4, 4, 8);
        let node = NodeId::numeric(2, 10);
        let err = UaError::transport_lost("socket closed");
        events.emit(EngineEvent::error("browse", Some(&node), &err)).await;
        events
            .emit(EngineEvent::Connected {
                profile: "local".into(),
            })
            .await;

        let mut recorder = Recorder::default();
        bridge.drain(&mut recorder);

        assert_eq!(recorder.errors.len(), 1);
        assert_eq!(recorder.errors[0].0, ErrorKind::TransportLost);
        assert!(recorder.errors[0].1.starts_with("browse ns=2;i=10:"));
        assert_eq!(recorder.connected, vec!["local".to_string()]);
    }
}
