// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! On-demand attribute reads for a single node.
//!
//! [`read_attributes`] issues one batched Read for [`ATTRIBUTE_SET`] and
//! decodes every slot into a display string. A bad status on one attribute
//! only marks that slot [`AttributeValue::Unavailable`]; the rest of the set
//! is still usable.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::session::Session;
use crate::client::transport::{ReadValueId, UaTransport};
use crate::error::{ProtocolError, ReadError, UaError, UaResult};
use crate::types::{AttributeId, NodeClass, NodeId, NodeRef, StatusCode};
use crate::value::{access_level_names, display_data_type, display_value, DataValue, UaValue};

/// Attributes fetched for every node, in request order.
pub const ATTRIBUTE_SET: [AttributeId; 11] = [
    AttributeId::NodeId,
    AttributeId::NodeClass,
    AttributeId::BrowseName,
    AttributeId::DisplayName,
    AttributeId::Description,
    AttributeId::DataType,
    AttributeId::Value,
    AttributeId::AccessLevel,
    AttributeId::UserAccessLevel,
    AttributeId::Executable,
    AttributeId::UserExecutable,
];

/// Placeholder shown for an applicable attribute the server did not return.
pub const UNAVAILABLE: &str = "<unavailable>";

// =============================================================================
// AttributeSource
// =============================================================================

/// Source of batched attribute reads.
#[async_trait]
pub trait AttributeSource: Send + Sync {
    /// Reads the given attributes; one result per operation, in order.
    async fn read_values(&self, nodes: &[ReadValueId]) -> UaResult<Vec<DataValue>>;
}

#[async_trait]
impl<T: UaTransport> AttributeSource for Session<T> {
    async fn read_values(&self, nodes: &[ReadValueId]) -> UaResult<Vec<DataValue>> {
        self.read(nodes).await
    }
}

// =============================================================================
// AttributeValue
// =============================================================================

/// A successfully decoded attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedAttribute {
    /// The raw value.
    pub raw: UaValue,
    /// Display rendering.
    pub display: String,
    /// Status returned with the value (good or uncertain).
    pub status: StatusCode,
    /// Source timestamp, if any.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp, if any.
    pub server_timestamp: Option<DateTime<Utc>>,
}

/// One attribute slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AttributeValue {
    /// Read and decoded.
    Available(DecodedAttribute),
    /// The server returned a bad status for this slot.
    Unavailable {
        /// Status returned for the slot.
        status: StatusCode,
    },
}

impl AttributeValue {
    /// Returns the display string, or `None` when unavailable.
    pub fn display(&self) -> Option<&str> {
        match self {
            Self::Available(decoded) => Some(&decoded.display),
            Self::Unavailable { .. } => None,
        }
    }

    /// Returns the raw value, or `None` when unavailable.
    pub fn raw(&self) -> Option<&UaValue> {
        match self {
            Self::Available(decoded) => Some(&decoded.raw),
            Self::Unavailable { .. } => None,
        }
    }

    /// Returns `true` for [`AttributeValue::Unavailable`].
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

// =============================================================================
// AttributeSet
// =============================================================================

/// Decoded attributes of one node, replaced wholesale on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeSet {
    /// The node the set belongs to.
    pub node: NodeRef,
    /// Slot per attribute in [`ATTRIBUTE_SET`].
    pub values: BTreeMap<AttributeId, AttributeValue>,
    /// When the read completed.
    pub retrieved_at: DateTime<Utc>,
}

impl AttributeSet {
    /// Returns the slot for `attribute`.
    pub fn get(&self, attribute: AttributeId) -> Option<&AttributeValue> {
        self.values.get(&attribute)
    }

    /// Returns the display string for `attribute` if it was read.
    pub fn display(&self, attribute: AttributeId) -> Option<&str> {
        self.get(attribute).and_then(AttributeValue::display)
    }

    /// Returns `true` if `attribute` came back with a bad status.
    pub fn is_unavailable(&self, attribute: AttributeId) -> bool {
        self.get(attribute).is_some_and(AttributeValue::is_unavailable)
    }

    /// Returns the node class as read, falling back to the browsed class.
    pub fn node_class(&self) -> NodeClass {
        self.get(AttributeId::NodeClass)
            .and_then(AttributeValue::raw)
            .and_then(UaValue::as_u32)
            .and_then(NodeClass::from_value)
            .unwrap_or(self.node.node_class)
    }

    /// Returns the DataType node id, if read.
    pub fn data_type(&self) -> Option<&NodeId> {
        self.get(AttributeId::DataType)
            .and_then(AttributeValue::raw)
            .and_then(UaValue::as_node_id)
    }

    /// Returns `(attribute, value)` rows for display.
    ///
    /// Every class gets NodeId, NodeClass, BrowseName and DisplayName.
    /// Variables add DataType, Value and AccessLevel, plus Description when
    /// the server has one. Methods add Executable and UserExecutable.
    pub fn display_rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = Vec::with_capacity(8);
        for attribute in [
            AttributeId::NodeId,
            AttributeId::NodeClass,
            AttributeId::BrowseName,
            AttributeId::DisplayName,
        ] {
            rows.push((attribute.name(), self.row_value(attribute)));
        }

        match self.node_class() {
            NodeClass::Variable => {
                for attribute in [
                    AttributeId::DataType,
                    AttributeId::Value,
                    AttributeId::AccessLevel,
                ] {
                    rows.push((attribute.name(), self.row_value(attribute)));
                }
                if let Some(description) = self.display(AttributeId::Description) {
                    if !description.is_empty() {
                        rows.push((AttributeId::Description.name(), description.to_string()));
                    }
                }
            }
            NodeClass::Method => {
                for attribute in [AttributeId::Executable, AttributeId::UserExecutable] {
                    rows.push((attribute.name(), self.row_value(attribute)));
                }
            }
            _ => {}
        }

        rows
    }

    fn row_value(&self, attribute: AttributeId) -> String {
        match self.display(attribute) {
            Some(display) => display.to_string(),
            None => UNAVAILABLE.to_string(),
        }
    }
}

// =============================================================================
// read_attributes
// =============================================================================

/// Reads and decodes [`ATTRIBUTE_SET`] for `node`.
///
/// # Errors
///
/// - [`ReadError`] when the read as a whole fails
/// - [`ProtocolError::ResultCountMismatch`] when the server returns the wrong
///   number of results
pub async fn read_attributes<S>(source: &S, node: &NodeRef) -> UaResult<AttributeSet>
where
    S: AttributeSource + ?Sized,
{
    let requests: Vec<ReadValueId> = ATTRIBUTE_SET
        .iter()
        .map(|attribute| ReadValueId::new(node.node_id.clone(), *attribute))
        .collect();

    let results = source
        .read_values(&requests)
        .await
        .map_err(|e| read_failure(&node.node_id, e))?;

    if results.len() != ATTRIBUTE_SET.len() {
        return Err(ProtocolError::result_count("Read", ATTRIBUTE_SET.len(), results.len()).into());
    }

    let data_type = results[ATTRIBUTE_SET_DATA_TYPE]
        .status
        .is_good()
        .then(|| results[ATTRIBUTE_SET_DATA_TYPE].value.as_ref())
        .flatten()
        .and_then(UaValue::as_node_id)
        .cloned();

    let mut values = BTreeMap::new();
    let mut unavailable = 0usize;
    for (attribute, result) in ATTRIBUTE_SET.iter().zip(results) {
        let slot = decode(*attribute, result, data_type.as_ref());
        if slot.is_unavailable() {
            unavailable += 1;
        }
        values.insert(*attribute, slot);
    }

    tracing::debug!(
        node = %node.node_id,
        unavailable,
        "Attributes read"
    );

    Ok(AttributeSet {
        node: node.clone(),
        values,
        retrieved_at: Utc::now(),
    })
}

const ATTRIBUTE_SET_DATA_TYPE: usize = 5;

fn read_failure(node_id: &NodeId, error: UaError) -> UaError {
    match error {
        UaError::Read(e) => UaError::Read(e),
        other => UaError::read(ReadError::Failed {
            node_id: node_id.to_string(),
            message: other.to_string(),
            status: other.status_code(),
        }),
    }
}

fn decode(attribute: AttributeId, result: DataValue, data_type: Option<&NodeId>) -> AttributeValue {
    if result.status.is_bad() {
        return AttributeValue::Unavailable {
            status: result.status,
        };
    }

    let raw = result.value.unwrap_or(UaValue::Null);
    let display = match attribute {
        AttributeId::NodeClass => raw
            .as_u32()
            .and_then(NodeClass::from_value)
            .map(|class| class.name().to_string())
            .unwrap_or_else(|| raw.to_string()),
        AttributeId::AccessLevel | AttributeId::UserAccessLevel => match raw.as_u32() {
            Some(mask) => access_level_names(mask),
            None => raw.to_string(),
        },
        AttributeId::DataType => display_data_type(&raw),
        AttributeId::Value => display_value(&raw, data_type),
        _ => raw.to_string(),
    };

    AttributeValue::Available(DecodedAttribute {
        raw,
        display,
        status: result.status,
        source_timestamp: result.source_timestamp,
        server_timestamp: result.server_timestamp,
    })
}

// =============================================================================
// Tests
// =============================================================================
