// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Wire transport backed by the `opcua` crate.
//!
//! The `opcua` 0.12 client API is synchronous, so every service call runs on
//! the blocking pool. Data changes arrive on the crate's session thread and
//! are forwarded to the engine's [`TransportEventSink`]; the crate reports no
//! publish sequence number through its callback, so one is synthesized per
//! subscription in delivery order.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uaview_engine::client::OpcUaClientTransport;
//! use uaview_engine::engine::Engine;
//!
//! let transport = Arc::new(OpcUaClientTransport::new());
//! let (bridge, handle) = Engine::spawn(transport, profiles, settings)?;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::{
    AttributeService, BrowseDescription, BrowseDescriptionResultMask, BrowseDirection, Client,
    ClientBuilder, ConnectionStatusCallback, DataChangeCallback, MonitoredItemCreateRequest,
    MonitoredItemService, MonitoringMode, MonitoringParameters, ReferenceTypeId, Session,
    SessionCommand, SubscriptionService, TimestampsToReturn, ViewService,
};
use opcua::sync::RwLock as OpcUaRwLock;
use opcua::types::UserTokenType;

use super::transport::{
    ActivatedSession, CreatedSubscription, IdentityToken, ItemNotification, MonitoredItemRequest,
    MonitoredItemResult, Notification, ReadValueId, ReferenceDescription, SubscriptionRequest,
    TransportEvent, TransportEventSink, UaTransport,
};
use crate::config::{EngineSettings, ServerProfile};
use crate::error::{
    AuthenticationError, BrowseError, ConnectionError, ProtocolError, ReadError,
    SubscriptionError, UaError, UaResult,
};
use crate::types::{LocalizedText, NodeClass, NodeId, NodeIdentifier, QualifiedName, StatusCode};
use crate::value::{DataValue, ExtensionBody, UaValue};

type SharedSession = Arc<OpcUaRwLock<Session>>;

/// The open connection.
struct Connection {
    session: SharedSession,
    endpoint_url: String,
    user: Option<String>,
    revised_timeout: Duration,
    events: TransportEventSink,
    stop: Option<tokio::sync::oneshot::Sender<SessionCommand>>,
    // Keeps the client configuration alive for the lifetime of the session.
    _client: Client,
}

// =============================================================================
// OpcUaClientTransport
// =============================================================================

/// [`UaTransport`] over the OPC UA binary protocol.
#[derive(Default)]
pub struct OpcUaClientTransport {
    connection: Mutex<Option<Connection>>,
}

impl OpcUaClientTransport {
    /// Creates a transport with no open connection.
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> UaResult<SharedSession> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| Arc::clone(&c.session))
            .ok_or_else(UaError::not_connected)
    }

    fn event_sink(&self) -> UaResult<TransportEventSink> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.events.clone())
            .ok_or_else(UaError::not_connected)
    }

    /// Runs a synchronous session call on the blocking pool.
    async fn blocking<F, R>(&self, f: F) -> UaResult<Result<R, StatusCode>>
    where
        F: FnOnce(&Session) -> Result<R, opcua::types::StatusCode> + Send + 'static,
        R: Send + 'static,
    {
        let session = self.session()?;
        tokio::task::spawn_blocking(move || {
            let session = session.read();
            f(&session).map_err(convert_status)
        })
        .await
        .map_err(|e| UaError::transport_lost(format!("service task failed: {e}")))
    }
}

#[async_trait]
impl UaTransport for OpcUaClientTransport {
    async fn open_secure_channel(
        &self,
        profile: &ServerProfile,
        settings: &EngineSettings,
        events: TransportEventSink,
    ) -> UaResult<()> {
        let profile = profile.clone();
        let settings = settings.clone();
        let lost_sink = events.clone();

        let (client, (session, endpoint_url, user, revised_timeout)) =
            tokio::task::spawn_blocking(move || connect_channel(&profile, &settings, lost_sink))
                .await
                .map_err(|e| UaError::transport_lost(format!("connect task failed: {e}")))??;

        let previous = self.connection.lock().replace(Connection {
            session,
            endpoint_url,
            user,
            revised_timeout,
            events,
            stop: None,
            _client: client,
        });
        if let Some(previous) = previous {
            stop_connection(previous);
        }
        Ok(())
    }

    async fn activate_session(&self, identity: &IdentityToken) -> UaResult<ActivatedSession> {
        let (session, endpoint, user, revised_timeout) = {
            let guard = self.connection.lock();
            let connection = guard.as_ref().ok_or_else(UaError::not_connected)?;
            (
                Arc::clone(&connection.session),
                connection.endpoint_url.clone(),
                connection.user.clone(),
                connection.revised_timeout,
            )
        };
        if identity.user() != user.as_deref() {
            warn!(
                channel_user = user.as_deref().unwrap_or("anonymous"),
                requested_user = identity.user().unwrap_or("anonymous"),
                "Identity differs from the one the channel was opened with"
            );
        }

        let task_session = Arc::clone(&session);
        let session_id = tokio::task::spawn_blocking(move || {
            let mut session = task_session.write();
            let session_id = session.create_session()?;
            session.activate_session()?;
            Ok::<_, opcua::types::StatusCode>(session_id)
        })
        .await
        .map_err(|e| UaError::transport_lost(format!("activate task failed: {e}")))?
        .map_err(|status| {
            let status = convert_status(status);
            if AuthenticationError::is_rejection_status(status) {
                UaError::authentication(AuthenticationError::rejected(user.as_deref(), status))
            } else {
                UaError::connection(ConnectionError::handshake_status(&endpoint, status))
            }
        })?;

        let stop = Session::run_async(Arc::clone(&session));
        if let Some(connection) = self.connection.lock().as_mut() {
            connection.stop = Some(stop);
        }

        let session_id = from_opcua_node_id(&session_id);
        info!(endpoint = %endpoint, session_id = %session_id, "Session activated");
        Ok(ActivatedSession {
            auth_token: session_id.clone(),
            session_id,
            revised_timeout,
        })
    }

    async fn close(&self) -> UaResult<()> {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            tokio::task::spawn_blocking(move || stop_connection(connection))
                .await
                .map_err(|e| UaError::transport_lost(format!("close task failed: {e}")))?;
        }
        Ok(())
    }

    async fn browse(&self, node_id: &NodeId) -> UaResult<Vec<ReferenceDescription>> {
        let description = BrowseDescription {
            node_id: to_opcua_node_id(node_id),
            browse_direction: BrowseDirection::Forward,
            reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: BrowseDescriptionResultMask::all().bits(),
        };

        trace!(node_id = %node_id, "Browsing");
        let result = self
            .blocking(move |session| {
                let mut references = Vec::new();
                let mut results = session.browse(&[description])?.unwrap_or_default();
                loop {
                    let Some(result) = results.pop() else {
                        break;
                    };
                    if result.status_code.is_bad() {
                        return Err(result.status_code);
                    }
                    references.extend(result.references.unwrap_or_default());
                    if result.continuation_point.is_null() {
                        break;
                    }
                    results = session
                        .browse_next(false, &[result.continuation_point])?
                        .unwrap_or_default();
                }
                Ok(references)
            })
            .await?
            .map_err(|status| lost_or(status, || BrowseError::bad_status(node_id, status).into()))?;

        Ok(result.iter().map(from_opcua_reference).collect())
    }

    async fn read(&self, nodes: &[ReadValueId]) -> UaResult<Vec<DataValue>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let target = nodes[0].node_id.clone();
        let requests: Vec<opcua::types::ReadValueId> = nodes
            .iter()
            .map(|n| opcua::types::ReadValueId {
                node_id: to_opcua_node_id(&n.node_id),
                attribute_id: n.attribute_id.value(),
                index_range: opcua::types::UAString::null(),
                data_encoding: opcua::types::QualifiedName::null(),
            })
            .collect();

        trace!(count = nodes.len(), "Reading attributes");
        let values = self
            .blocking(move |session| session.read(&requests, TimestampsToReturn::Both, 0.0))
            .await?
            .map_err(|status| lost_or(status, || ReadError::bad_status(&target, status).into()))?;

        Ok(values.iter().map(from_opcua_data_value).collect())
    }

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> UaResult<CreatedSubscription> {
        let events = self.event_sink()?;
        let subscription_id = Arc::new(AtomicU32::new(0));
        let sequence = Arc::new(AtomicU32::new(0));
        let callback_id = Arc::clone(&subscription_id);

        let callback = DataChangeCallback::new(move |items| {
            let notification = Notification {
                subscription_id: callback_id.load(Ordering::Acquire),
                sequence_number: sequence.fetch_add(1, Ordering::AcqRel).wrapping_add(1),
                items: items
                    .iter()
                    .map(|item| ItemNotification {
                        client_handle: item.client_handle(),
                        value: from_opcua_data_value(item.last_value()),
                    })
                    .collect(),
                received_at: Utc::now(),
            };
            if events.send(TransportEvent::DataChange(notification)).is_err() {
                trace!("Data change dropped, engine gone");
            }
        });

        let interval = request.publishing_interval;
        let lifetime = request.lifetime_count;
        let keepalive = request.keepalive_count;
        let max_notifications = request.max_notifications_per_publish;
        let priority = request.priority;
        let id = self
            .blocking(move |session| {
                session.create_subscription(
                    interval.as_secs_f64() * 1000.0,
                    lifetime,
                    keepalive,
                    max_notifications,
                    priority,
                    true,
                    callback,
                )
            })
            .await?
            .map_err(|status| {
                lost_or(status, || {
                    SubscriptionError::creation_failed(status, "CreateSubscription").into()
                })
            })?;

        subscription_id.store(id, Ordering::Release);
        debug!(subscription_id = id, "Subscription created on server");
        Ok(CreatedSubscription {
            subscription_id: id,
            revised_publishing_interval: interval,
        })
    }

    async fn delete_subscription(&self, subscription_id: u32) -> UaResult<()> {
        let status = self
            .blocking(move |session| session.delete_subscription(subscription_id))
            .await?
            .map_err(|status| lost_or(status, || protocol_status("DeleteSubscription", status)))?;
        let status = convert_status(status);
        if status.is_bad() {
            return Err(protocol_status("DeleteSubscription", status));
        }
        Ok(())
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        items: &[MonitoredItemRequest],
    ) -> UaResult<Vec<MonitoredItemResult>> {
        let requests: Vec<MonitoredItemCreateRequest> = items
            .iter()
            .map(|item| MonitoredItemCreateRequest {
                item_to_monitor: opcua::types::ReadValueId {
                    node_id: to_opcua_node_id(&item.node_id),
                    attribute_id: item.attribute_id.value(),
                    index_range: opcua::types::UAString::null(),
                    data_encoding: opcua::types::QualifiedName::null(),
                },
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    client_handle: item.client_handle,
                    sampling_interval: item.sampling_interval.as_secs_f64() * 1000.0,
                    filter: opcua::types::ExtensionObject::null(),
                    queue_size: item.queue_size,
                    discard_oldest: item.discard_oldest,
                },
            })
            .collect();

        let results = self
            .blocking(move |session| {
                session.create_monitored_items(subscription_id, TimestampsToReturn::Both, &requests)
            })
            .await?
            .map_err(|status| {
                lost_or(status, || {
                    SubscriptionError::creation_failed(status, "CreateMonitoredItems").into()
                })
            })?;

        Ok(results
            .iter()
            .map(|r| MonitoredItemResult {
                status: convert_status(r.status_code),
                monitored_item_id: r.monitored_item_id,
                revised_sampling_interval: Duration::from_secs_f64(
                    r.revised_sampling_interval.max(0.0) / 1000.0,
                ),
            })
            .collect())
    }

    async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        monitored_item_ids: &[u32],
    ) -> UaResult<Vec<StatusCode>> {
        let ids = monitored_item_ids.to_vec();
        let statuses = self
            .blocking(move |session| session.delete_monitored_items(subscription_id, &ids))
            .await?
            .map_err(|status| {
                lost_or(status, || protocol_status("DeleteMonitoredItems", status))
            })?;
        Ok(statuses.into_iter().map(convert_status).collect())
    }

    fn name(&self) -> &str {
        "opcua-0.12"
    }
}

// =============================================================================
// Connection Helpers
// =============================================================================

type ChannelParts = (SharedSession, String, Option<String>, Duration);

/// `true` when the endpoint lists a token policy for `identity`. Endpoints
/// that list none are tried anyway.
fn token_offered(offered: Option<&[UserTokenType]>, identity: &IdentityToken) -> bool {
    let wanted = match identity {
        IdentityToken::Anonymous => UserTokenType::Anonymous,
        IdentityToken::UserName { .. } => UserTokenType::UserName,
    };
    offered.map_or(true, |types| types.is_empty() || types.contains(&wanted))
}

fn connect_channel(
    profile: &ServerProfile,
    settings: &EngineSettings,
    lost_sink: TransportEventSink,
) -> UaResult<(Client, ChannelParts)> {
    let url = profile.endpoint_url.as_str();
    let mut client = ClientBuilder::new()
        .application_name(settings.application_name.as_str())
        .application_uri(settings.application_uri.as_str())
        .product_uri(settings.product_uri.as_str())
        .pki_dir(settings.pki_dir.clone())
        .create_sample_keypair(profile.is_secure())
        .trust_server_certs(settings.trust_server_certs)
        .session_retry_limit(0)
        .session_timeout(settings.session_timeout.as_millis().min(u32::MAX as u128) as u32)
        .client()
        .ok_or_else(|| ConnectionError::endpoint_not_found(url, "invalid client configuration"))?;

    let endpoints = client
        .get_server_endpoints_from_url(url)
        .map_err(|status| {
            let status = convert_status(status);
            if status == StatusCode::BAD_TIMEOUT || status == StatusCode::BAD_COMMUNICATION_ERROR {
                UaError::connection(ConnectionError::refused(url))
            } else {
                UaError::connection(ConnectionError::endpoint_not_found(url, status.to_string()))
            }
        })?;

    let endpoint = endpoints
        .into_iter()
        .find(|e| {
            e.security_policy_uri.as_ref() == profile.security_policy.uri()
                && security_mode_matches(e.security_mode, profile)
        })
        .ok_or_else(|| {
            ConnectionError::no_suitable_endpoint(profile.security_policy, profile.security_mode)
        })?;

    let identity = profile.identity();
    let offered: Option<Vec<UserTokenType>> = endpoint
        .user_identity_tokens
        .as_ref()
        .map(|policies| policies.iter().map(|p| p.token_type).collect());
    if !token_offered(offered.as_deref(), &identity) {
        return Err(AuthenticationError::unsupported_token(identity.token_type()).into());
    }

    let opcua_identity = match &identity {
        IdentityToken::Anonymous => opcua::client::prelude::IdentityToken::Anonymous,
        IdentityToken::UserName { user, password } => {
            opcua::client::prelude::IdentityToken::UserName(user.clone(), password.clone())
        }
    };

    let session = client
        .new_session_from_endpoint(endpoint, opcua_identity)
        .map_err(|status| ConnectionError::handshake_status(url, convert_status(status)))?;

    {
        let mut guard = session.write();
        guard.set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
            if !connected
                && lost_sink
                    .send(TransportEvent::ConnectionLost {
                        reason: "server connection closed".to_string(),
                    })
                    .is_err()
            {
                trace!("Connection loss after engine shutdown");
            }
        }));
        guard
            .connect()
            .map_err(|status| ConnectionError::handshake_status(url, convert_status(status)))?;
    }

    info!(
        endpoint = url,
        security_policy = %profile.security_policy,
        security_mode = %profile.security_mode,
        "Secure channel open"
    );
    Ok((
        client,
        (
            session,
            profile.endpoint_url.clone(),
            identity.user().map(str::to_string),
            settings.session_timeout,
        ),
    ))
}

fn security_mode_matches(mode: opcua::types::MessageSecurityMode, profile: &ServerProfile) -> bool {
    use crate::types::SecurityMode;
    use opcua::types::MessageSecurityMode;

    matches!(
        (mode, profile.security_mode),
        (MessageSecurityMode::None, SecurityMode::None)
            | (MessageSecurityMode::Sign, SecurityMode::Sign)
            | (MessageSecurityMode::SignAndEncrypt, SecurityMode::SignAndEncrypt)
    )
}

fn stop_connection(mut connection: Connection) {
    if let Some(stop) = connection.stop.take() {
        if stop.send(SessionCommand::Stop).is_err() {
            trace!("Session loop already stopped");
        }
    }
    connection.session.read().disconnect();
    debug!(endpoint = %connection.endpoint_url, "Connection closed");
}

/// Statuses meaning the connection itself is gone.
fn is_connection_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_NOT_CONNECTED
            | StatusCode::BAD_CONNECTION_CLOSED
            | StatusCode::BAD_SERVER_NOT_CONNECTED
            | StatusCode::BAD_COMMUNICATION_ERROR
            | StatusCode::BAD_SESSION_CLOSED
            | StatusCode::BAD_SESSION_ID_INVALID
            | StatusCode::BAD_SHUTDOWN
    )
}

fn lost_or(status: StatusCode, otherwise: impl FnOnce() -> UaError) -> UaError {
    if is_connection_status(status) {
        UaError::transport_lost(status.to_string())
    } else {
        otherwise()
    }
}

fn protocol_status(service: &'static str, status: StatusCode) -> UaError {
    UaError::protocol(ProtocolError::unexpected(service, status.to_string()))
}

// =============================================================================
// Conversions
// =============================================================================

fn convert_status(status: opcua::types::StatusCode) -> StatusCode {
    StatusCode(status.bits())
}

fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => opcua::types::NodeId::new(ns, opcua::types::Guid::from(*v)),
        NodeIdentifier::Opaque(v) => {
            opcua::types::NodeId::new(ns, opcua::types::ByteString::from(v.as_slice()))
        }
    }
}

fn from_opcua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
    let ns = node_id.namespace;
    match &node_id.identifier {
        opcua::types::Identifier::Numeric(v) => NodeId::numeric(ns, *v),
        opcua::types::Identifier::String(v) => NodeId::string(ns, v.as_ref()),
        opcua::types::Identifier::Guid(v) => {
            NodeId::guid(ns, uuid::Uuid::from_bytes(*v.as_bytes()))
        }
        opcua::types::Identifier::ByteString(v) => {
            NodeId::opaque(ns, v.value.clone().unwrap_or_default())
        }
    }
}

fn from_opcua_reference(r: &opcua::types::ReferenceDescription) -> ReferenceDescription {
    let type_definition = from_opcua_node_id(&r.type_definition.node_id);
    ReferenceDescription {
        node_id: from_opcua_node_id(&r.node_id.node_id),
        browse_name: QualifiedName::new(r.browse_name.namespace_index, r.browse_name.name.as_ref()),
        display_name: LocalizedText {
            locale: r.display_name.locale.as_ref().to_string(),
            text: r.display_name.text.as_ref().to_string(),
        },
        node_class: NodeClass::from_value(r.node_class as u32).unwrap_or_default(),
        reference_type: from_opcua_node_id(&r.reference_type_id),
        type_definition: (!type_definition.is_null()).then_some(type_definition),
        is_forward: r.is_forward,
    }
}

fn from_opcua_data_value(value: &opcua::types::DataValue) -> DataValue {
    DataValue {
        value: value.value.as_ref().map(from_opcua_variant),
        status: value.status.map(convert_status).unwrap_or(StatusCode::GOOD),
        source_timestamp: value.source_timestamp.map(|t| t.as_chrono()),
        server_timestamp: value.server_timestamp.map(|t| t.as_chrono()),
    }
}

fn from_opcua_variant(variant: &opcua::types::Variant) -> UaValue {
    use opcua::types::{ExtensionObjectEncoding, Variant};

    match variant {
        Variant::Empty => UaValue::Null,
        Variant::Boolean(v) => UaValue::Boolean(*v),
        Variant::SByte(v) => UaValue::SByte(*v),
        Variant::Byte(v) => UaValue::Byte(*v),
        Variant::Int16(v) => UaValue::Int16(*v),
        Variant::UInt16(v) => UaValue::UInt16(*v),
        Variant::Int32(v) => UaValue::Int32(*v),
        Variant::UInt32(v) => UaValue::UInt32(*v),
        Variant::Int64(v) => UaValue::Int64(*v),
        Variant::UInt64(v) => UaValue::UInt64(*v),
        Variant::Float(v) => UaValue::Float(*v),
        Variant::Double(v) => UaValue::Double(*v),
        Variant::String(v) => UaValue::String(v.as_ref().to_string()),
        Variant::DateTime(v) => UaValue::DateTime(v.as_chrono()),
        Variant::Guid(v) => UaValue::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        Variant::ByteString(v) => UaValue::ByteString(v.value.clone().unwrap_or_default()),
        Variant::StatusCode(v) => UaValue::StatusCode(convert_status(*v)),
        Variant::NodeId(v) => UaValue::NodeId(from_opcua_node_id(v)),
        Variant::ExpandedNodeId(v) => UaValue::NodeId(from_opcua_node_id(&v.node_id)),
        Variant::QualifiedName(v) => {
            UaValue::QualifiedName(QualifiedName::new(v.namespace_index, v.name.as_ref()))
        }
        Variant::LocalizedText(v) => UaValue::LocalizedText(LocalizedText {
            locale: v.locale.as_ref().to_string(),
            text: v.text.as_ref().to_string(),
        }),
        Variant::ExtensionObject(v) => UaValue::ExtensionObject {
            type_id: from_opcua_node_id(&v.node_id),
            body: match &v.body {
                ExtensionObjectEncoding::None => ExtensionBody::None,
                ExtensionObjectEncoding::ByteString(bytes) => {
                    ExtensionBody::Binary(bytes.value.clone().unwrap_or_default())
                }
                ExtensionObjectEncoding::XmlElement(xml) => {
                    ExtensionBody::Xml(xml.as_ref().to_string())
                }
            },
        },
        Variant::Array(array) => {
            UaValue::Array(array.values.iter().map(from_opcua_variant).collect())
        }
        other => UaValue::String(format!("{other:?}")),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        for node in [
            NodeId::numeric(2, 1001),
            NodeId::string(2, "Line1.Temperature"),
            NodeId::ROOT_FOLDER,
        ] {
            assert_eq!(from_opcua_node_id(&to_opcua_node_id(&node)), node);
        }
    }

    #[test]
    fn test_token_policy_matching() {
        let user = IdentityToken::UserName {
            user: "maint".into(),
            password: "x".into(),
        };
        let anonymous_only = [UserTokenType::Anonymous];

        assert!(token_offered(Some(&anonymous_only), &IdentityToken::Anonymous));
        assert!(!token_offered(Some(&anonymous_only), &user));
        assert!(token_offered(
            Some(&[UserTokenType::Anonymous, UserTokenType::UserName]),
            &user
        ));
        assert!(token_offered(None, &user));
    }

    #[test]
    fn test_variant_conversion() {
        use opcua::types::Variant;

        assert_eq!(from_opcua_variant(&Variant::Empty), UaValue::Null);
        assert_eq!(from_opcua_variant(&Variant::Double(21.5)), UaValue::Double(21.5));
        assert_eq!(
            from_opcua_variant(&Variant::from("running")),
            UaValue::String("running".into())
        );
    }

    #[test]
    fn test_connection_statuses_map_to_transport_lost() {
        let err = lost_or(StatusCode::BAD_CONNECTION_CLOSED, || {
            BrowseError::bad_status("i=85", StatusCode::BAD_CONNECTION_CLOSED).into()
        });
        assert!(matches!(err, UaError::TransportLost { .. }));

        let err = lost_or(StatusCode::BAD_NODE_ID_UNKNOWN, || {
            BrowseError::bad_status("i=85", StatusCode::BAD_NODE_ID_UNKNOWN).into()
        });
        assert!(matches!(err, UaError::Browse(_)));
    }
}
