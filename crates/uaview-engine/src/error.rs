// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the uaView engine.
//!
//! Every failure the engine can surface is a [`UaError`]. The variants mirror
//! the operation that failed so the presentation layer can show a precise
//! message and let the user retry.
//!
//! # Error Categories
//!
//! ```text
//! UaError
//! ├── Connection      - Endpoint discovery, secure channel, handshake
//! ├── Authentication  - Rejected identity tokens
//! ├── Browse          - Address space browsing
//! ├── Read            - Attribute reads
//! ├── Subscription    - Subscriptions and monitored items
//! ├── Protocol        - Malformed or unexpected server responses
//! ├── TransportLost   - Mid-session connection loss
//! ├── Configuration   - Profiles and engine settings
//! └── Bridge          - Presentation channel failures
//! ```
//!
//! # Examples
//!
//! ```
//! use uaview_engine::error::{ConnectionError, ErrorKind, UaError};
//!
//! let error = UaError::connection(ConnectionError::refused("opc.tcp://localhost:4840"));
//! assert_eq!(error.kind(), ErrorKind::Connection);
//! assert_eq!(error.error_code().to_string(), "UA-0101");
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::types::{NodeClass, StatusCode};

/// Result alias used throughout the engine.
pub type UaResult<T> = Result<T, UaError>;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum UaError {
    /// Connection establishment errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Session activation was rejected.
    #[error("{0}")]
    Authentication(#[from] AuthenticationError),

    /// Browse failures.
    #[error("{0}")]
    Browse(#[from] BrowseError),

    /// Attribute read failures.
    #[error("{0}")]
    Read(#[from] ReadError),

    /// Subscription and monitored item failures.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Malformed or unexpected server response.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// The transport went away while a session was active.
    #[error("Transport lost: {reason}")]
    TransportLost {
        /// Why the transport was lost.
        reason: String,
    },

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigError),

    /// Presentation bridge errors.
    #[error("{0}")]
    Bridge(#[from] BridgeError),
}

impl UaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates an authentication error.
    #[inline]
    pub fn authentication(error: AuthenticationError) -> Self {
        Self::Authentication(error)
    }

    /// Creates a browse error.
    #[inline]
    pub fn browse(error: BrowseError) -> Self {
        Self::Browse(error)
    }

    /// Creates a read error.
    #[inline]
    pub fn read(error: ReadError) -> Self {
        Self::Read(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a transport lost error.
    pub fn transport_lost(reason: impl Into<String>) -> Self {
        Self::TransportLost {
            reason: reason.into(),
        }
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns the coarse error kind reported to the presentation layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Browse(_) => ErrorKind::Browse,
            Self::Read(_) => ErrorKind::Read,
            Self::Subscription(_) => ErrorKind::Subscription,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::TransportLost { .. } => ErrorKind::TransportLost,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Bridge(_) => ErrorKind::Bridge,
        }
    }

    /// Returns `true` if this error is a cancellation rather than a failure.
    ///
    /// Cancelled operations are discarded silently instead of being
    /// surfaced to the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Browse(BrowseError::Cancelled { .. }))
    }

    /// Returns `true` if a manual retry of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Authentication(_) => false,
            Self::Browse(e) => e.is_retryable(),
            Self::Read(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Protocol(_) => false,
            Self::TransportLost { .. } => true,
            Self::Configuration(_) => false,
            Self::Bridge(e) => matches!(e, BridgeError::Full { .. }),
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Authentication(_) => ErrorSeverity::Error,
            Self::Browse(e) => e.severity(),
            Self::Read(e) => e.severity(),
            Self::Subscription(e) => e.severity(),
            Self::Protocol(_) => ErrorSeverity::Error,
            Self::TransportLost { .. } => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Bridge(_) => ErrorSeverity::Warning,
        }
    }

    /// Returns the structured error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Authentication(e) => e.error_code(),
            Self::Browse(e) => e.error_code(),
            Self::Read(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::TransportLost { .. } => ErrorCode::new(7, 1),
            Self::Configuration(e) => e.error_code(),
            Self::Bridge(e) => e.error_code(),
        }
    }

    /// Returns the OPC UA status code behind this error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Authentication(AuthenticationError::Rejected { status, .. }) => Some(*status),
            Self::Browse(BrowseError::Failed { status, .. }) => *status,
            Self::Read(ReadError::Failed { status, .. }) => *status,
            Self::Subscription(SubscriptionError::CreationFailed { status, .. })
            | Self::Subscription(SubscriptionError::MonitoredItemRejected { status, .. }) => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                kind = %self.kind(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                kind = %self.kind(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                kind = %self.kind(),
                context = context,
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ErrorKind
// =============================================================================

/// Coarse error classification passed to `on_error` hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection establishment failed.
    Connection,
    /// Credentials were rejected.
    Authentication,
    /// Browsing failed.
    Browse,
    /// Reading attributes failed.
    Read,
    /// Subscribing or unsubscribing failed.
    Subscription,
    /// The server sent something unexpected.
    Protocol,
    /// The connection was lost mid-session.
    TransportLost,
    /// A profile or setting is invalid.
    Configuration,
    /// The presentation channel is unusable.
    Bridge,
}

impl ErrorKind {
    /// Returns the string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Authentication => "authentication",
            Self::Browse => "browse",
            Self::Read => "read",
            Self::Subscription => "subscription",
            Self::Protocol => "protocol",
            Self::TransportLost => "transport_lost",
            Self::Configuration => "configuration",
            Self::Bridge => "bridge",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Errors raised while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server refused or could not be reached.
    #[error("Connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
    },

    /// Endpoint discovery failed.
    #[error("Endpoint discovery failed for '{endpoint}': {reason}")]
    EndpointNotFound {
        /// Target endpoint.
        endpoint: String,
        /// Failure reason.
        reason: String,
    },

    /// No server endpoint matched the requested security settings.
    #[error("No endpoint matches security policy '{policy}' with mode '{mode}'")]
    NoSuitableEndpoint {
        /// Requested security policy.
        policy: String,
        /// Requested security mode.
        mode: String,
    },

    /// Secure channel or session handshake failed.
    #[error("Handshake with '{endpoint}' failed: {message}")]
    Handshake {
        /// Target endpoint.
        endpoint: String,
        /// Failure description.
        message: String,
        /// Status code returned by the stack, if any.
        status: Option<StatusCode>,
    },

    /// The connection attempt timed out.
    #[error("Connection to '{endpoint}' timed out after {duration:?}")]
    TimedOut {
        /// Target endpoint.
        endpoint: String,
        /// Elapsed time.
        duration: Duration,
    },

    /// `connect` was called while a session exists.
    #[error("Cannot connect while session is {state}")]
    AlreadyConnected {
        /// Current session state name.
        state: String,
    },

    /// No session is active.
    #[error("Not connected to an OPC UA server")]
    NotConnected,
}

impl ConnectionError {
    /// Creates a refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
        }
    }

    /// Creates an endpoint discovery error.
    pub fn endpoint_not_found(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no suitable endpoint error.
    pub fn no_suitable_endpoint(policy: impl fmt::Display, mode: impl fmt::Display) -> Self {
        Self::NoSuitableEndpoint {
            policy: policy.to_string(),
            mode: mode.to_string(),
        }
    }

    /// Creates a handshake error carrying a status code.
    pub fn handshake_status(endpoint: impl Into<String>, status: StatusCode) -> Self {
        Self::Handshake {
            endpoint: endpoint.into(),
            message: status.to_string(),
            status: Some(status),
        }
    }

    /// Creates a timeout error.
    pub fn timed_out(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::TimedOut {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates an already connected error.
    pub fn already_connected(state: impl fmt::Display) -> Self {
        Self::AlreadyConnected {
            state: state.to_string(),
        }
    }

    /// Returns `true` if a manual retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Refused { .. } | Self::TimedOut { .. } | Self::Handshake { .. }
        )
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected | Self::AlreadyConnected { .. } => ErrorSeverity::Warning,
            Self::TimedOut { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(1, 1),
            Self::EndpointNotFound { .. } => ErrorCode::new(1, 2),
            Self::NoSuitableEndpoint { .. } => ErrorCode::new(1, 3),
            Self::Handshake { .. } => ErrorCode::new(1, 4),
            Self::TimedOut { .. } => ErrorCode::new(1, 5),
            Self::AlreadyConnected { .. } => ErrorCode::new(1, 6),
            Self::NotConnected => ErrorCode::new(1, 7),
        }
    }
}

// =============================================================================
// AuthenticationError
// =============================================================================

/// Errors raised when the server rejects the session identity.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The identity token was rejected.
    #[error("Authentication rejected for {}: {status}", user.as_deref().unwrap_or("anonymous"))]
    Rejected {
        /// User name, `None` for anonymous.
        user: Option<String>,
        /// Rejection status.
        status: StatusCode,
    },

    /// The server does not offer the requested token type.
    #[error("Server does not accept {token_type} identity tokens")]
    UnsupportedToken {
        /// Requested token type.
        token_type: String,
    },
}

impl AuthenticationError {
    /// Creates a rejected error.
    pub fn rejected(user: Option<&str>, status: StatusCode) -> Self {
        Self::Rejected {
            user: user.map(str::to_string),
            status,
        }
    }

    /// Creates an unsupported token error.
    pub fn unsupported_token(token_type: impl Into<String>) -> Self {
        Self::UnsupportedToken {
            token_type: token_type.into(),
        }
    }

    /// Returns `true` if `status` means the identity itself was refused.
    pub fn is_rejection_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::BAD_USER_ACCESS_DENIED
                | StatusCode::BAD_IDENTITY_TOKEN_INVALID
                | StatusCode::BAD_IDENTITY_TOKEN_REJECTED
        )
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Rejected { .. } => ErrorCode::new(2, 1),
            Self::UnsupportedToken { .. } => ErrorCode::new(2, 2),
        }
    }
}

// =============================================================================
// BrowseError
// =============================================================================

/// Errors raised while browsing the address space.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// The browse service failed.
    #[error("Browse of '{node_id}' failed: {message}")]
    Failed {
        /// Node being browsed.
        node_id: String,
        /// Failure description.
        message: String,
        /// Status code, if the server returned one.
        status: Option<StatusCode>,
    },

    /// The result arrived after the cache was reset.
    #[error("Browse of '{node_id}' was cancelled")]
    Cancelled {
        /// Node being browsed.
        node_id: String,
    },
}

impl BrowseError {
    /// Creates a failed browse error from a bad status.
    pub fn bad_status(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::Failed {
            node_id: node_id.to_string(),
            message: status.to_string(),
            status: Some(status),
        }
    }

    /// Creates a cancelled error.
    pub fn cancelled(node_id: impl fmt::Display) -> Self {
        Self::Cancelled {
            node_id: node_id.to_string(),
        }
    }

    /// Returns `true` if a manual retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { status, .. } => !matches!(
                status,
                Some(StatusCode::BAD_NODE_ID_UNKNOWN) | Some(StatusCode::BAD_USER_ACCESS_DENIED)
            ),
            Self::Cancelled { .. } => true,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Failed { .. } => ErrorSeverity::Warning,
            Self::Cancelled { .. } => ErrorSeverity::Info,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Failed { .. } => ErrorCode::new(3, 1),
            Self::Cancelled { .. } => ErrorCode::new(3, 2),
        }
    }
}

// =============================================================================
// ReadError
// =============================================================================

/// Errors raised while reading node attributes.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The read service failed as a whole.
    #[error("Read of '{node_id}' failed: {message}")]
    Failed {
        /// Node being read.
        node_id: String,
        /// Failure description.
        message: String,
        /// Status code, if the server returned one.
        status: Option<StatusCode>,
    },
}

impl ReadError {
    /// Creates a failed read error from a bad status.
    pub fn bad_status(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::Failed {
            node_id: node_id.to_string(),
            message: status.to_string(),
            status: Some(status),
        }
    }

    /// Returns `true` if a manual retry may succeed.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Failed { .. } => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Failed { .. } => ErrorCode::new(4, 1),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The server refused to create the subscription.
    #[error("Subscription creation failed: {status}")]
    CreationFailed {
        /// Status returned by the server.
        status: StatusCode,
        /// Additional context.
        message: String,
    },

    /// The server refused a monitored item.
    #[error("Monitored item for '{node_id}' rejected: {status}")]
    MonitoredItemRejected {
        /// Node that was requested.
        node_id: String,
        /// Status returned by the server.
        status: StatusCode,
    },

    /// The node class has no monitorable value.
    #[error("Node '{node_id}' ({node_class}) has no monitorable value")]
    NotMonitorable {
        /// Node that was requested.
        node_id: String,
        /// Its node class.
        node_class: NodeClass,
    },

    /// Recreating items after a reconnect left some behind.
    #[error("Restored subscription but {failed} of {total} monitored items were rejected")]
    RestoreIncomplete {
        /// Items the server rejected.
        failed: usize,
        /// Items that were requested.
        total: usize,
    },
}

impl SubscriptionError {
    /// Creates a creation failed error.
    pub fn creation_failed(status: StatusCode, message: impl Into<String>) -> Self {
        Self::CreationFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a monitored item rejected error.
    pub fn item_rejected(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::MonitoredItemRejected {
            node_id: node_id.to_string(),
            status,
        }
    }

    /// Creates a not monitorable error.
    pub fn not_monitorable(node_id: impl fmt::Display, node_class: NodeClass) -> Self {
        Self::NotMonitorable {
            node_id: node_id.to_string(),
            node_class,
        }
    }

    /// Returns `true` if a manual retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CreationFailed { status, .. } | Self::MonitoredItemRejected { status, .. } => {
                !matches!(
                    *status,
                    StatusCode::BAD_NODE_ID_UNKNOWN | StatusCode::BAD_ATTRIBUTE_ID_INVALID
                )
            }
            Self::NotMonitorable { .. } => false,
            Self::RestoreIncomplete { .. } => true,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotMonitorable { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(5, 1),
            Self::MonitoredItemRejected { .. } => ErrorCode::new(5, 2),
            Self::NotMonitorable { .. } => ErrorCode::new(5, 3),
            Self::RestoreIncomplete { .. } => ErrorCode::new(5, 4),
        }
    }
}

// =============================================================================
// ProtocolError
// =============================================================================

/// Malformed or unexpected responses from the server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A service returned a different number of results than requested.
    #[error("{service} returned {actual} results for {expected} requests")]
    ResultCountMismatch {
        /// Service name.
        service: &'static str,
        /// Number of operations sent.
        expected: usize,
        /// Number of results received.
        actual: usize,
    },

    /// A response could not be interpreted.
    #[error("Unexpected {service} response: {message}")]
    UnexpectedResponse {
        /// Service name.
        service: &'static str,
        /// What was wrong.
        message: String,
    },
}

impl ProtocolError {
    /// Creates a result count mismatch error.
    pub fn result_count(service: &'static str, expected: usize, actual: usize) -> Self {
        Self::ResultCountMismatch {
            service,
            expected,
            actual,
        }
    }

    /// Creates an unexpected response error.
    pub fn unexpected(service: &'static str, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            service,
            message: message.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ResultCountMismatch { .. } => ErrorCode::new(6, 1),
            Self::UnexpectedResponse { .. } => ErrorCode::new(6, 2),
        }
    }
}

// =============================================================================
// ConfigError
// =============================================================================

/// Profile and settings errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The profile document could not be parsed.
    #[error("Failed to parse server profiles: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// No profile with that name exists.
    #[error("Server profile '{name}' not found")]
    ProfileNotFound {
        /// Requested profile name.
        name: String,
    },

    /// A required field is missing or empty.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// The endpoint URL is malformed.
    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint {
        /// The URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Security mode and policy do not agree.
    #[error("Invalid security configuration: {message}")]
    InvalidSecurity {
        /// Description.
        message: String,
    },

    /// A value is out of range.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Description.
        message: String,
    },

    /// A node id string could not be parsed.
    #[error("Invalid node id '{input}': {reason}")]
    InvalidNodeId {
        /// The input string.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a profile not found error.
    pub fn profile_not_found(name: impl Into<String>) -> Self {
        Self::ProfileNotFound { name: name.into() }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid security error.
    pub fn invalid_security(message: impl Into<String>) -> Self {
        Self::InvalidSecurity {
            message: message.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } => ErrorCode::new(8, 1),
            Self::ProfileNotFound { .. } => ErrorCode::new(8, 2),
            Self::MissingField { .. } => ErrorCode::new(8, 3),
            Self::InvalidEndpoint { .. } => ErrorCode::new(8, 4),
            Self::InvalidSecurity { .. } => ErrorCode::new(8, 5),
            Self::InvalidValue { .. } => ErrorCode::new(8, 6),
            Self::InvalidNodeId { .. } => ErrorCode::new(8, 7),
        }
    }
}

// =============================================================================
// BridgeError
// =============================================================================

/// Errors on the channel between the UI and the engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine is no longer running.
    #[error("Engine is not running")]
    Closed,

    /// The command queue is full.
    #[error("Command queue is full (capacity {capacity})")]
    Full {
        /// Queue capacity.
        capacity: usize,
    },
}

impl BridgeError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Closed => ErrorCode::new(9, 1),
            Self::Full { .. } => ErrorCode::new(9, 2),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `UA-XXYY` where XX is the category and YY the specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Authentication
/// - 3: Browse
/// - 4: Read
/// - 5: Subscription
/// - 6: Protocol
/// - 7: Transport lost
/// - 8: Configuration
/// - 9: Bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let cases = vec![
            (UaError::not_connected(), ErrorKind::Connection),
            (
                UaError::authentication(AuthenticationError::rejected(
                    Some("operator"),
                    StatusCode::BAD_USER_ACCESS_DENIED,
                )),
                ErrorKind::Authentication,
            ),
            (
                UaError::authentication(AuthenticationError::unsupported_token("UserName")),
                ErrorKind::Authentication,
            ),
            (
                UaError::browse(BrowseError::bad_status("i=85", StatusCode::BAD_TIMEOUT)),
                ErrorKind::Browse,
            ),
            (
                UaError::read(ReadError::bad_status("i=85", StatusCode::BAD_TIMEOUT)),
                ErrorKind::Read,
            ),
            (
                UaError::protocol(ProtocolError::result_count("Read", 3, 2)),
                ErrorKind::Protocol,
            ),
            (UaError::transport_lost("socket closed"), ErrorKind::TransportLost),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }

    #[test]
    fn test_error_code_format() {
        let error = UaError::connection(ConnectionError::refused("opc.tcp://localhost:4840"));
        assert_eq!(error.error_code().to_string(), "UA-0101");
        assert_eq!(error.error_code().as_u16(), 0x0101);

        let error = UaError::transport_lost("keep-alive");
        assert_eq!(error.error_code().to_string(), "UA-0701");
    }

    #[test]
    fn test_authentication_message() {
        let error = AuthenticationError::rejected(None, StatusCode::BAD_IDENTITY_TOKEN_REJECTED);
        assert!(error.to_string().contains("anonymous"));
        assert!(error.to_string().contains("BadIdentityTokenRejected"));

        assert!(AuthenticationError::is_rejection_status(StatusCode::BAD_USER_ACCESS_DENIED));
        assert!(!AuthenticationError::is_rejection_status(StatusCode::BAD_TIMEOUT));
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(UaError::browse(BrowseError::cancelled("i=85")).is_cancelled());
        assert!(!UaError::read(ReadError::bad_status("i=85", StatusCode::BAD_TIMEOUT)).is_cancelled());
        assert!(!UaError::browse(BrowseError::bad_status("i=85", StatusCode::BAD_TIMEOUT))
            .is_cancelled());
    }

    #[test]
    fn test_retryable() {
        assert!(UaError::transport_lost("x").is_retryable());
        assert!(!UaError::configuration(ConfigError::profile_not_found("plant")).is_retryable());
        assert!(!UaError::subscription(SubscriptionError::not_monitorable(
            "i=85",
            NodeClass::Object
        ))
        .is_retryable());
    }

    #[test]
    fn test_status_code_accessor() {
        let error = UaError::subscription(SubscriptionError::item_rejected(
            "ns=2;s=Tag",
            StatusCode::BAD_TOO_MANY_MONITORED_ITEMS,
        ));
        assert_eq!(error.status_code(), Some(StatusCode::BAD_TOO_MANY_MONITORED_ITEMS));
        assert_eq!(UaError::not_connected().status_code(), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), Level::ERROR);
    }
}
