// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core OPC UA identifiers and enumerations used across the engine.
//!
//! - **NodeId**: the four identifier kinds with the standard string syntax
//! - **StatusCode**: status words with severity predicates and symbolic names
//! - **NodeClass / AttributeId**: the protocol enumerations the engine reads
//! - **SecurityPolicy / SecurityMode**: channel security selection
//! - **NodeRef**: the immutable node summary shown in the tree
//!
//! # Examples
//!
//! ```
//! use uaview_engine::types::NodeId;
//!
//! let node: NodeId = "ns=2;s=Boiler.Temperature".parse().unwrap();
//! assert_eq!(node.namespace_index, 2);
//! assert_eq!(node.to_string(), "ns=2;s=Boiler.Temperature");
//! assert_eq!(NodeId::ROOT_FOLDER.to_string(), "i=84");
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier.
///
/// Serialized in the standard string form (`ns=2;s=Tag`), which is also
/// what [`fmt::Display`] produces. Namespace 0 omits the `ns=` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The identifier within the namespace.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node id.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node id.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// RootFolder (i=84), the browse origin.
    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);

    /// Objects folder (i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);

    /// Types folder (i=86).
    pub const TYPES_FOLDER: NodeId = NodeId::numeric(0, 86);

    /// Views folder (i=87).
    pub const VIEWS_FOLDER: NodeId = NodeId::numeric(0, 87);

    /// Server object (i=2253).
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);

    /// Server_ServerStatus_CurrentTime (i=2258), polled by the keep-alive.
    pub const SERVER_CURRENT_TIME: NodeId = NodeId::numeric(0, 2258);

    /// HierarchicalReferences (i=33), the browse reference filter.
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);

    /// Returns the numeric value for numeric identifiers.
    #[inline]
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the numeric value when this is a standard-namespace numeric id.
    ///
    /// Builtin data types and well-known enumerations are identified this way.
    #[inline]
    pub fn as_standard_numeric(&self) -> Option<u32> {
        if self.namespace_index == 0 {
            self.as_numeric()
        } else {
            None
        }
    }

    /// Returns `true` for the null node id (ns=0;i=0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::numeric(0, 0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index != 0 {
            write!(f, "ns={};", self.namespace_index)?;
        }
        write!(f, "{}", self.identifier)
    }
}

impl FromStr for NodeId {
    type Err = ConfigError;

    /// Parses `ns=<idx>;<kind>=<value>` or `<kind>=<value>` where kind is
    /// one of `i`, `s`, `g` or `b` (base64).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &str| ConfigError::invalid_node_id(input, reason);

        let (namespace_index, rest) = match input.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace"))?;
                let ns = ns
                    .parse::<u16>()
                    .map_err(|_| invalid("namespace index is not a u16"))?;
                (ns, rest)
            }
            None => (0, input),
        };

        let (kind, value) = rest
            .split_once('=')
            .ok_or_else(|| invalid("expected i=, s=, g= or b="))?;

        let identifier = match kind {
            "i" => NodeIdentifier::Numeric(
                value
                    .parse()
                    .map_err(|_| invalid("numeric identifier is not a u32"))?,
            ),
            "s" => NodeIdentifier::String(value.to_string()),
            "g" => NodeIdentifier::Guid(
                Uuid::parse_str(value).map_err(|e| invalid(&format!("invalid GUID: {e}")))?,
            ),
            "b" => NodeIdentifier::Opaque(
                BASE64
                    .decode(value)
                    .map_err(|e| invalid(&format!("invalid base64: {e}")))?,
            ),
            _ => return Err(invalid("expected i=, s=, g= or b=")),
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

impl TryFrom<String> for NodeId {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_string()
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The four identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque byte string identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={v}"),
            Self::String(v) => write!(f, "s={v}"),
            Self::Guid(v) => write!(f, "g={v}"),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
///
/// The top two bits carry severity: `00` good, `01` uncertain, `10` bad.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

macro_rules! status_codes {
    ($($konst:ident = $value:literal => $name:literal,)*) => {
        impl StatusCode {
            $(
                #[doc = concat!("`", $name, "`")]
                pub const $konst: StatusCode = StatusCode($value);
            )*

            /// Returns the symbolic name for known codes.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 & 0xFFFF_0000 {
                    $($value => Some($name),)*
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    GOOD = 0x0000_0000 => "Good",
    UNCERTAIN = 0x4000_0000 => "Uncertain",
    BAD = 0x8000_0000 => "Bad",
    BAD_UNEXPECTED_ERROR = 0x8001_0000 => "BadUnexpectedError",
    BAD_INTERNAL_ERROR = 0x8002_0000 => "BadInternalError",
    BAD_COMMUNICATION_ERROR = 0x8005_0000 => "BadCommunicationError",
    BAD_TIMEOUT = 0x800A_0000 => "BadTimeout",
    BAD_SERVICE_UNSUPPORTED = 0x800B_0000 => "BadServiceUnsupported",
    BAD_SHUTDOWN = 0x800C_0000 => "BadShutdown",
    BAD_SERVER_NOT_CONNECTED = 0x800D_0000 => "BadServerNotConnected",
    BAD_SECURITY_CHECKS_FAILED = 0x8013_0000 => "BadSecurityChecksFailed",
    BAD_USER_ACCESS_DENIED = 0x801F_0000 => "BadUserAccessDenied",
    BAD_IDENTITY_TOKEN_INVALID = 0x8020_0000 => "BadIdentityTokenInvalid",
    BAD_IDENTITY_TOKEN_REJECTED = 0x8021_0000 => "BadIdentityTokenRejected",
    BAD_SESSION_ID_INVALID = 0x8025_0000 => "BadSessionIdInvalid",
    BAD_SESSION_CLOSED = 0x8026_0000 => "BadSessionClosed",
    BAD_SUBSCRIPTION_ID_INVALID = 0x8028_0000 => "BadSubscriptionIdInvalid",
    BAD_NODE_ID_UNKNOWN = 0x8034_0000 => "BadNodeIdUnknown",
    BAD_ATTRIBUTE_ID_INVALID = 0x8035_0000 => "BadAttributeIdInvalid",
    BAD_NOT_READABLE = 0x803A_0000 => "BadNotReadable",
    BAD_NOT_SUPPORTED = 0x803D_0000 => "BadNotSupported",
    BAD_MONITORED_ITEM_ID_INVALID = 0x8042_0000 => "BadMonitoredItemIdInvalid",
    BAD_CONTINUATION_POINT_INVALID = 0x804A_0000 => "BadContinuationPointInvalid",
    BAD_NO_CONTINUATION_POINTS = 0x804B_0000 => "BadNoContinuationPoints",
    BAD_TOO_MANY_SUBSCRIPTIONS = 0x8077_0000 => "BadTooManySubscriptions",
    BAD_NO_SUBSCRIPTION = 0x8079_0000 => "BadNoSubscription",
    BAD_NOT_CONNECTED = 0x808A_0000 => "BadNotConnected",
    BAD_CONNECTION_CLOSED = 0x80AE_0000 => "BadConnectionClosed",
    BAD_TOO_MANY_MONITORED_ITEMS = 0x80DB_0000 => "BadTooManyMonitoredItems",
}

impl StatusCode {
    /// Returns `true` for good codes.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for uncertain codes.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` for bad codes.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the raw code.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) if self.0 & 0xFFFF_0000 == self.0 => f.write_str(name),
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode({self})")
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Node class not specified.
    #[default]
    Unspecified,
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Unspecified => 0,
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from the OPC UA value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Returns the protocol enumeration name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Object => "Object",
            Self::Variable => "Variable",
            Self::Method => "Method",
            Self::ObjectType => "ObjectType",
            Self::VariableType => "VariableType",
            Self::ReferenceType => "ReferenceType",
            Self::DataType => "DataType",
            Self::View => "View",
        }
    }

    /// Returns `true` if nodes of this class carry a monitorable Value.
    pub const fn is_monitorable(&self) -> bool {
        matches!(self, Self::Variable | Self::VariableType)
    }

    /// Returns `true` if the class is known, so it can rule out monitoring.
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unspecified)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// AttributeId
// =============================================================================

/// OPC UA attribute ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// NodeId.
    NodeId,
    /// NodeClass.
    NodeClass,
    /// BrowseName.
    BrowseName,
    /// DisplayName.
    DisplayName,
    /// Description.
    Description,
    /// WriteMask.
    WriteMask,
    /// UserWriteMask.
    UserWriteMask,
    /// IsAbstract.
    IsAbstract,
    /// Symmetric.
    Symmetric,
    /// InverseName.
    InverseName,
    /// ContainsNoLoops.
    ContainsNoLoops,
    /// EventNotifier.
    EventNotifier,
    /// Value.
    #[default]
    Value,
    /// DataType.
    DataType,
    /// ValueRank.
    ValueRank,
    /// ArrayDimensions.
    ArrayDimensions,
    /// AccessLevel.
    AccessLevel,
    /// UserAccessLevel.
    UserAccessLevel,
    /// MinimumSamplingInterval.
    MinimumSamplingInterval,
    /// Historizing.
    Historizing,
    /// Executable.
    Executable,
    /// UserExecutable.
    UserExecutable,
}

const ATTRIBUTES: [(AttributeId, &str); 22] = [
    (AttributeId::NodeId, "NodeId"),
    (AttributeId::NodeClass, "NodeClass"),
    (AttributeId::BrowseName, "BrowseName"),
    (AttributeId::DisplayName, "DisplayName"),
    (AttributeId::Description, "Description"),
    (AttributeId::WriteMask, "WriteMask"),
    (AttributeId::UserWriteMask, "UserWriteMask"),
    (AttributeId::IsAbstract, "IsAbstract"),
    (AttributeId::Symmetric, "Symmetric"),
    (AttributeId::InverseName, "InverseName"),
    (AttributeId::ContainsNoLoops, "ContainsNoLoops"),
    (AttributeId::EventNotifier, "EventNotifier"),
    (AttributeId::Value, "Value"),
    (AttributeId::DataType, "DataType"),
    (AttributeId::ValueRank, "ValueRank"),
    (AttributeId::ArrayDimensions, "ArrayDimensions"),
    (AttributeId::AccessLevel, "AccessLevel"),
    (AttributeId::UserAccessLevel, "UserAccessLevel"),
    (AttributeId::MinimumSamplingInterval, "MinimumSamplingInterval"),
    (AttributeId::Historizing, "Historizing"),
    (AttributeId::Executable, "Executable"),
    (AttributeId::UserExecutable, "UserExecutable"),
];

impl AttributeId {
    /// Returns the OPC UA numeric value (1-based, in declaration order).
    pub const fn value(&self) -> u32 {
        *self as u32 + 1
    }

    /// Creates from the OPC UA numeric value.
    pub fn from_value(value: u32) -> Option<Self> {
        let index = value.checked_sub(1)? as usize;
        ATTRIBUTES.get(index).map(|(id, _)| *id)
    }

    /// Returns the attribute name.
    pub fn name(&self) -> &'static str {
        ATTRIBUTES[*self as usize].1
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// SecurityMode
// =============================================================================

/// Message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecurityMode {
    /// Messages are neither signed nor encrypted.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }

    /// Returns `true` if messages are at least signed.
    #[inline]
    pub const fn is_secure(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "none" => Ok(Self::None),
            "sign" => Ok(Self::Sign),
            "signandencrypt" => Ok(Self::SignAndEncrypt),
            _ => Err(ConfigError::invalid_security(format!(
                "unknown security mode '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for SecurityMode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecurityMode> for String {
    fn from(value: SecurityMode) -> Self {
        value.name().to_string()
    }
}

// =============================================================================
// SecurityPolicy
// =============================================================================

/// Channel security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecurityPolicy {
    /// No security.
    #[default]
    None,
    /// Basic256 (deprecated).
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128_Sha256_RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256_Sha256_RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic256 => "Basic256",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }

    /// Creates from a policy URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let fragment = uri.rsplit_once('#').map(|(_, f)| f)?;
        fragment.parse().ok()
    }

    /// Returns `true` if the policy needs certificates.
    #[inline]
    pub const fn is_secure(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('#') {
            return Self::from_uri(s).ok_or_else(|| {
                ConfigError::invalid_security(format!("unknown security policy URI '{s}'"))
            });
        }
        match normalize(s).as_str() {
            "none" => Ok(Self::None),
            "basic256" => Ok(Self::Basic256),
            "basic256sha256" => Ok(Self::Basic256Sha256),
            "aes128sha256rsaoaep" => Ok(Self::Aes128Sha256RsaOaep),
            "aes256sha256rsapss" => Ok(Self::Aes256Sha256RsaPss),
            _ => Err(ConfigError::invalid_security(format!(
                "unknown security policy '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for SecurityPolicy {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecurityPolicy> for String {
    fn from(value: SecurityPolicy) -> Self {
        value.name().to_string()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', '_', ' '], "")
}

// =============================================================================
// Names and text
// =============================================================================

/// Namespace-qualified browse name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

/// Text with an optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale such as `en-US`, empty when unspecified.
    pub locale: String,
    /// Text.
    pub text: String,
}

impl LocalizedText {
    /// Creates text without a locale.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            locale: String::new(),
            text: text.into(),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// =============================================================================
// NodeRef
// =============================================================================

/// Immutable summary of a node as shown in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Node id.
    pub node_id: NodeId,
    /// Node class.
    pub node_class: NodeClass,
    /// Display name.
    pub display_name: String,
    /// Browse name.
    pub browse_name: QualifiedName,
}

impl NodeRef {
    /// Creates a node reference.
    pub fn new(
        node_id: NodeId,
        node_class: NodeClass,
        display_name: impl Into<String>,
        browse_name: QualifiedName,
    ) -> Self {
        Self {
            node_id,
            node_class,
            display_name: display_name.into(),
            browse_name,
        }
    }

    /// Creates a reference known only by id, with an unspecified class.
    pub fn from_id(node_id: NodeId) -> Self {
        let display_name = node_id.to_string();
        Self {
            browse_name: QualifiedName::new(0, display_name.clone()),
            node_id,
            node_class: NodeClass::Unspecified,
            display_name,
        }
    }

    /// The RootFolder, seeded into every fresh cache.
    pub fn root() -> Self {
        Self::new(
            NodeId::ROOT_FOLDER,
            NodeClass::Object,
            "Root",
            QualifiedName::new(0, "Root"),
        )
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.node_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
