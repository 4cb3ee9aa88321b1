// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Decoded OPC UA values and their display rendering.
//!
//! Every value read from a server or delivered by a subscription is decoded
//! into a [`UaValue`], which renders to a single display string. Rendering is
//! aware of a few attribute semantics: builtin data type ids resolve to type
//! names, access level masks to flag names, and values of well-known
//! enumerations to their variant names.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{LocalizedText, NodeId, QualifiedName, StatusCode};

// =============================================================================
// UaValue
// =============================================================================

/// A decoded variant value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UaValue {
    /// Empty variant.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 8-bit signed integer.
    SByte(i8),
    /// 8-bit unsigned integer.
    Byte(u8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit unsigned integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// GUID.
    Guid(Uuid),
    /// Raw bytes.
    ByteString(Vec<u8>),
    /// Node id.
    NodeId(NodeId),
    /// Status code.
    StatusCode(StatusCode),
    /// Qualified name.
    QualifiedName(QualifiedName),
    /// Localized text.
    LocalizedText(LocalizedText),
    /// Structured value.
    ExtensionObject {
        /// Encoding or data type id.
        type_id: NodeId,
        /// Body, opaque or decoded.
        body: ExtensionBody,
    },
    /// One-dimensional array.
    Array(Vec<UaValue>),
}

/// Body of an extension object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionBody {
    /// No body.
    None,
    /// Binary-encoded body the engine could not decode.
    Binary(Vec<u8>),
    /// XML-encoded body.
    Xml(String),
    /// Decoded fields in declaration order.
    Decoded(Vec<(String, UaValue)>),
}

impl UaValue {
    /// Returns the builtin type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::Guid(_) => "Guid",
            Self::ByteString(_) => "ByteString",
            Self::NodeId(_) => "NodeId",
            Self::StatusCode(_) => "StatusCode",
            Self::QualifiedName(_) => "QualifiedName",
            Self::LocalizedText(_) => "LocalizedText",
            Self::ExtensionObject { .. } => "ExtensionObject",
            Self::Array(_) => "Array",
        }
    }

    /// Returns the value as an unsigned integer if it is integral and non-negative.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::Byte(v) => Some(v as u32),
            Self::UInt16(v) => Some(v as u32),
            Self::UInt32(v) => Some(v),
            Self::SByte(v) => u32::try_from(v).ok(),
            Self::Int16(v) => u32::try_from(v).ok(),
            Self::Int32(v) => u32::try_from(v).ok(),
            Self::Int64(v) => u32::try_from(v).ok(),
            Self::UInt64(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the value as a node id.
    pub fn as_node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeId(id) => Some(id),
            _ => None,
        }
    }

    /// Returns `true` for [`UaValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for UaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::DateTime(v) => f.write_str(&format_timestamp(v)),
            Self::Guid(v) => write!(f, "{v}"),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::NodeId(v) => write!(f, "{v}"),
            Self::StatusCode(v) => write!(f, "{v}"),
            Self::QualifiedName(v) => write!(f, "{v}"),
            Self::LocalizedText(v) => write!(f, "{v}"),
            Self::ExtensionObject { type_id, body } => match body {
                ExtensionBody::None => write!(f, "ExtensionObject({type_id})"),
                ExtensionBody::Binary(bytes) => {
                    write!(f, "ExtensionObject({type_id}, {} bytes)", bytes.len())
                }
                ExtensionBody::Xml(xml) => {
                    write!(f, "ExtensionObject({type_id}, {} chars xml)", xml.len())
                }
                ExtensionBody::Decoded(fields) => {
                    write!(f, "{{")?;
                    for (i, (name, value)) in fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{name}: {value}")?;
                    }
                    write!(f, "}}")
                }
            },
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Formats a timestamp the way the data view shows it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// DataValue
// =============================================================================

/// A value with its status and timestamps, as returned by reads and
/// data change notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// The value, absent when the server sent none.
    pub value: Option<UaValue>,
    /// Status of the value.
    pub status: StatusCode,
    /// Timestamp assigned by the data source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Timestamp assigned by the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value without timestamps.
    pub fn new(value: UaValue) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Creates a value-less result with a status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Sets both timestamps.
    pub fn with_timestamps(mut self, ts: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(ts);
        self.server_timestamp = Some(ts);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Returns the quality derived from the status.
    pub fn quality(&self) -> Quality {
        Quality::from(self.status)
    }
}

/// Coarse value quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Good.
    Good,
    /// Uncertain.
    Uncertain,
    /// Bad.
    Bad,
}

impl From<StatusCode> for Quality {
    fn from(status: StatusCode) -> Self {
        if status.is_bad() {
            Self::Bad
        } else if status.is_uncertain() {
            Self::Uncertain
        } else {
            Self::Good
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Good => "Good",
            Self::Uncertain => "Uncertain",
            Self::Bad => "Bad",
        })
    }
}

// =============================================================================
// Semantic rendering
// =============================================================================

/// Returns the builtin type name for a standard data type id.
pub fn builtin_type_name(id: u32) -> Option<&'static str> {
    Some(match id {
        1 => "Boolean",
        2 => "SByte",
        3 => "Byte",
        4 => "Int16",
        5 => "UInt16",
        6 => "Int32",
        7 => "UInt32",
        8 => "Int64",
        9 => "UInt64",
        10 => "Float",
        11 => "Double",
        12 => "String",
        13 => "DateTime",
        14 => "Guid",
        15 => "ByteString",
        16 => "XmlElement",
        17 => "NodeId",
        18 => "ExpandedNodeId",
        19 => "StatusCode",
        20 => "QualifiedName",
        21 => "LocalizedText",
        22 => "Structure",
        23 => "DataValue",
        24 => "BaseDataType",
        25 => "DiagnosticInfo",
        26 => "Number",
        27 => "Integer",
        28 => "UInteger",
        29 => "Enumeration",
        290 => "Duration",
        294 => "UtcTime",
        295 => "LocaleId",
        _ => return None,
    })
}

/// Standard enumerations whose values render as variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownEnum {
    /// ServerState (i=852).
    ServerState,
    /// NodeClass (i=257).
    NodeClass,
    /// MessageSecurityMode (i=302).
    MessageSecurityMode,
    /// RedundancySupport (i=851).
    RedundancySupport,
}

impl KnownEnum {
    /// Looks up the enumeration for a data type node id.
    pub fn from_data_type(data_type: &NodeId) -> Option<Self> {
        match data_type.as_standard_numeric()? {
            852 => Some(Self::ServerState),
            257 => Some(Self::NodeClass),
            302 => Some(Self::MessageSecurityMode),
            851 => Some(Self::RedundancySupport),
            _ => None,
        }
    }

    /// Returns the variant name for an enumeration value.
    pub fn variant(&self, value: u32) -> Option<&'static str> {
        let table: &[&'static str] = match self {
            Self::ServerState => &[
                "Running",
                "Failed",
                "NoConfiguration",
                "Suspended",
                "Shutdown",
                "Test",
                "CommunicationFault",
                "Unknown",
            ],
            Self::MessageSecurityMode => &["Invalid", "None", "Sign", "SignAndEncrypt"],
            Self::RedundancySupport => &[
                "None",
                "Cold",
                "Warm",
                "Hot",
                "Transparent",
                "HotAndMirrored",
            ],
            Self::NodeClass => {
                return crate::types::NodeClass::from_value(value).map(|c| c.name());
            }
        };
        table.get(value as usize).copied()
    }
}

/// Renders an access level mask as flag names.
pub fn access_level_names(mask: u32) -> String {
    const FLAGS: [(u32, &str); 7] = [
        (0x01, "CurrentRead"),
        (0x02, "CurrentWrite"),
        (0x04, "HistoryRead"),
        (0x08, "HistoryWrite"),
        (0x10, "SemanticChange"),
        (0x20, "StatusWrite"),
        (0x40, "TimestampWrite"),
    ];

    let names: Vec<&str> = FLAGS
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| *name)
        .collect();

    if names.is_empty() {
        "None".to_string()
    } else {
        names.join(" | ")
    }
}

/// Renders a Value attribute given the node's DataType, if known.
///
/// Integers whose data type is a well-known enumeration render as
/// `Name (n)`; everything else uses the value's own display.
pub fn display_value(value: &UaValue, data_type: Option<&NodeId>) -> String {
    let known = data_type.and_then(KnownEnum::from_data_type);
    match (known, value) {
        (Some(_), UaValue::Array(items)) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| display_value(item, data_type))
                .collect();
            format!("[{}]", rendered.join(", "))
        }
        (Some(e), v) => match v.as_u32().and_then(|n| e.variant(n).map(|name| (name, n))) {
            Some((name, n)) => format!("{name} ({n})"),
            None => v.to_string(),
        },
        (None, v) => v.to_string(),
    }
}

/// Renders a DataType attribute value as a builtin type name where known.
pub fn display_data_type(value: &UaValue) -> String {
    match value.as_node_id() {
        Some(id) => match id.as_standard_numeric().and_then(builtin_type_name) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        },
        None => value.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scalar_display() {
        assert_eq!(UaValue::Boolean(true).to_string(), "true");
        assert_eq!(UaValue::Double(21.5).to_string(), "21.5");
        assert_eq!(UaValue::ByteString(vec![0; 12]).to_string(), "<12 bytes>");
        assert_eq!(UaValue::Null.to_string(), "null");
        assert_eq!(
            UaValue::Array(vec![UaValue::Int32(1), UaValue::Int32(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_datetime_display() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(UaValue::DateTime(ts).to_string(), "2024-03-01T12:30:00.000Z");
    }

    #[test]
    fn test_extension_object_display() {
        let opaque = UaValue::ExtensionObject {
            type_id: NodeId::numeric(2, 5001),
            body: ExtensionBody::Binary(vec![0; 40]),
        };
        assert_eq!(opaque.to_string(), "ExtensionObject(ns=2;i=5001, 40 bytes)");

        let decoded = UaValue::ExtensionObject {
            type_id: NodeId::numeric(0, 864),
            body: ExtensionBody::Decoded(vec![
                ("ProductName".into(), UaValue::String("Demo".into())),
                ("BuildNumber".into(), UaValue::UInt32(7)),
            ]),
        };
        assert_eq!(decoded.to_string(), "{ProductName: Demo, BuildNumber: 7}");
    }

    #[test]
    fn test_known_enum_rendering() {
        let server_state = NodeId::numeric(0, 852);
        assert_eq!(
            display_value(&UaValue::Int32(0), Some(&server_state)),
            "Running (0)"
        );
        assert_eq!(
            display_value(&UaValue::Int32(42), Some(&server_state)),
            "42"
        );

        let mode = NodeId::numeric(0, 302);
        assert_eq!(
            display_value(&UaValue::Int32(3), Some(&mode)),
            "SignAndEncrypt (3)"
        );

        let node_class = NodeId::numeric(0, 257);
        assert_eq!(
            display_value(&UaValue::Int32(2), Some(&node_class)),
            "Variable (2)"
        );
    }

    #[test]
    fn test_unknown_data_type_falls_back() {
        let custom = NodeId::numeric(3, 852);
        assert_eq!(display_value(&UaValue::Int32(0), Some(&custom)), "0");
        assert_eq!(display_value(&UaValue::Int32(0), None), "0");
    }

    #[test]
    fn test_access_level_names() {
        assert_eq!(access_level_names(0), "None");
        assert_eq!(access_level_names(0x01), "CurrentRead");
        assert_eq!(access_level_names(0x03), "CurrentRead | CurrentWrite");
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(
            display_data_type(&UaValue::NodeId(NodeId::numeric(0, 11))),
            "Double"
        );
        assert_eq!(
            display_data_type(&UaValue::NodeId(NodeId::numeric(2, 3001))),
            "ns=2;i=3001"
        );
    }

    #[test]
    fn test_quality_from_status() {
        assert_eq!(Quality::from(StatusCode::GOOD), Quality::Good);
        assert_eq!(Quality::from(StatusCode::UNCERTAIN), Quality::Uncertain);
        assert_eq!(Quality::from(StatusCode::BAD_TIMEOUT), Quality::Bad);
    }
}
