// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server profiles and engine settings.
//!
//! Profiles come from the settings file as a JSON object mapping a profile
//! name to its connection parameters:
//!
//! ```json
//! {
//!   "plant-a": {
//!     "endpoint_url": "opc.tcp://10.0.0.5:4840",
//!     "security_policy": "Basic256Sha256",
//!     "security_mode": "SignAndEncrypt",
//!     "user_name": "operator",
//!     "password": "secret"
//!   }
//! }
//! ```
//!
//! Locating and reading the file is the caller's job; this module only parses
//! and validates. [`EngineSettings`] carries everything else the engine needs,
//! with defaults matching the uaView client.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::transport::IdentityToken;
use crate::error::{ConfigError, UaError, UaResult};
use crate::types::{SecurityMode, SecurityPolicy};

const ENDPOINT_SCHEME: &str = "opc.tcp://";

// =============================================================================
// ServerProfile
// =============================================================================

/// Connection parameters for one named server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    /// Profile name, taken from the key in the profile map.
    #[serde(skip)]
    pub name: String,

    /// Endpoint URL (`opc.tcp://host:port[/path]`).
    pub endpoint_url: String,

    /// Channel security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// User name; empty or absent selects anonymous login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Password for `user_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ServerProfile {
    /// Creates an anonymous, unsecured profile.
    pub fn new(name: impl Into<String>, endpoint_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint_url: endpoint_url.into(),
            security_policy: SecurityPolicy::None,
            security_mode: SecurityMode::None,
            user_name: None,
            password: None,
        }
    }

    /// Sets security policy and mode.
    pub fn with_security(mut self, policy: SecurityPolicy, mode: SecurityMode) -> Self {
        self.security_policy = policy;
        self.security_mode = mode;
        self
    }

    /// Sets user credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user_name = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Returns the identity token for session activation.
    pub fn identity(&self) -> IdentityToken {
        match self.user_name.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => IdentityToken::UserName {
                user: user.to_string(),
                password: self.password.clone().unwrap_or_default(),
            },
            _ => IdentityToken::Anonymous,
        }
    }

    /// Returns `true` if the channel is signed or encrypted.
    pub fn is_secure(&self) -> bool {
        self.security_mode.is_secure()
    }

    /// Validates the profile.
    pub fn validate(&self) -> UaResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing_field("name").into());
        }
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::missing_field(format!("{}.endpoint_url", self.name)).into());
        }

        let host = self
            .endpoint_url
            .strip_prefix(ENDPOINT_SCHEME)
            .ok_or_else(|| {
                ConfigError::invalid_endpoint(&self.endpoint_url, "scheme must be opc.tcp://")
            })?;
        if host.is_empty() || host.starts_with(['/', ':']) {
            return Err(ConfigError::invalid_endpoint(&self.endpoint_url, "missing host").into());
        }

        match (self.security_policy.is_secure(), self.security_mode.is_secure()) {
            (false, true) => Err(ConfigError::invalid_security(format!(
                "security mode {} requires a security policy",
                self.security_mode
            ))
            .into()),
            (true, false) => Err(ConfigError::invalid_security(format!(
                "security policy {} requires mode Sign or SignAndEncrypt",
                self.security_policy
            ))
            .into()),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("name", &self.name)
            .field("endpoint_url", &self.endpoint_url)
            .field("security_policy", &self.security_policy)
            .field("security_mode", &self.security_mode)
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

// =============================================================================
// ProfileSet
// =============================================================================

/// Named server profiles in file order.
#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: Vec<ServerProfile>,
}

impl ProfileSet {
    /// Parses profiles from a JSON document.
    pub fn from_json_str(json: &str) -> UaResult<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Builds profiles from an already parsed JSON object.
    ///
    /// Every profile is validated; the first invalid one fails the whole set.
    pub fn from_value(value: serde_json::Value) -> UaResult<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(ConfigError::parse("server profiles must be a JSON object").into());
        };

        let mut profiles = Vec::with_capacity(map.len());
        for (name, entry) in map {
            let mut profile: ServerProfile = serde_json::from_value(entry)
                .map_err(|e| ConfigError::parse(format!("profile '{name}': {e}")))?;
            profile.name = name;
            profile.validate()?;
            profiles.push(profile);
        }

        tracing::debug!(count = profiles.len(), "Loaded server profiles");
        Ok(Self { profiles })
    }

    /// Creates a set from already built profiles.
    pub fn from_profiles(profiles: impl IntoIterator<Item = ServerProfile>) -> UaResult<Self> {
        let profiles: Vec<_> = profiles.into_iter().collect();
        for profile in &profiles {
            profile.validate()?;
        }
        Ok(Self { profiles })
    }

    /// Looks up a profile by name.
    pub fn get(&self, name: &str) -> UaResult<&ServerProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| UaError::configuration(ConfigError::profile_not_found(name)))
    }

    /// Returns profile names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    /// Returns the number of profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` if there are no profiles.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// =============================================================================
// EngineSettings
// =============================================================================

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Client application name.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Client application URI.
    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// Client product URI.
    #[serde(default = "default_product_uri")]
    pub product_uri: String,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Interval between keep-alive probes.
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Consecutive keep-alive failures that trigger a reconnect.
    #[serde(default = "default_keepalive_failure_threshold")]
    pub keepalive_failure_threshold: u32,

    /// Subscription parameters.
    #[serde(default)]
    pub subscription: SubscriptionSettings,

    /// Monitored item parameters.
    #[serde(default)]
    pub monitored_item: MonitoredItemSettings,

    /// Capacity of the engine to UI event channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Capacity of the UI to engine command channel.
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,

    /// Upper bound of events dispatched per UI tick.
    #[serde(default = "default_max_events_per_tick")]
    pub max_events_per_tick: usize,

    /// PKI directory for secure channels.
    #[serde(default = "default_pki_dir")]
    pub pki_dir: PathBuf,

    /// Trust server certificates without a prior trust decision.
    #[serde(default)]
    pub trust_server_certs: bool,
}

fn default_application_name() -> String {
    "uaview_client".to_string()
}

fn default_application_uri() -> String {
    "urn:uaview:client:1".to_string()
}

fn default_product_uri() -> String {
    "urn:uaview:opcclient".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_keepalive_failure_threshold() -> u32 {
    3
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_command_channel_capacity() -> usize {
    64
}

fn default_max_events_per_tick() -> usize {
    128
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("pki")
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            application_uri: default_application_uri(),
            product_uri: default_product_uri(),
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
            keepalive_interval: default_keepalive_interval(),
            keepalive_failure_threshold: default_keepalive_failure_threshold(),
            subscription: SubscriptionSettings::default(),
            monitored_item: MonitoredItemSettings::default(),
            event_channel_capacity: default_event_channel_capacity(),
            command_channel_capacity: default_command_channel_capacity(),
            max_events_per_tick: default_max_events_per_tick(),
            pki_dir: default_pki_dir(),
            trust_server_certs: false,
        }
    }
}

impl EngineSettings {
    /// Returns a builder.
    pub fn builder() -> EngineSettingsBuilder {
        EngineSettingsBuilder::default()
    }

    /// Parses settings from JSON, filling defaults.
    pub fn from_json_str(json: &str) -> UaResult<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    pub fn validate(&self) -> UaResult<()> {
        if self.application_uri.trim().is_empty() {
            return Err(ConfigError::missing_field("application_uri").into());
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid_value("request_timeout", "must be positive").into());
        }
        if self.keepalive_interval.is_zero() {
            return Err(
                ConfigError::invalid_value("keepalive_interval", "must be positive").into(),
            );
        }
        if self.keepalive_failure_threshold == 0 {
            return Err(ConfigError::invalid_value(
                "keepalive_failure_threshold",
                "must be at least 1",
            )
            .into());
        }
        if self.event_channel_capacity == 0 || self.command_channel_capacity == 0 {
            return Err(
                ConfigError::invalid_value("channel_capacity", "must be at least 1").into(),
            );
        }
        if self.max_events_per_tick == 0 {
            return Err(
                ConfigError::invalid_value("max_events_per_tick", "must be at least 1").into(),
            );
        }
        self.subscription.validate()?;
        Ok(())
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Parameters for the server-side subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Requested publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Lifetime count.
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,

    /// Max notifications per publish (0 = unlimited).
    #[serde(default)]
    pub max_notifications_per_publish: u32,

    /// Priority.
    #[serde(default)]
    pub priority: u8,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_lifetime_count() -> u32 {
    60
}

fn default_keepalive_count() -> u32 {
    10
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: 0,
            priority: 0,
        }
    }
}

impl SubscriptionSettings {
    fn validate(&self) -> UaResult<()> {
        if self.publishing_interval.is_zero() {
            return Err(ConfigError::invalid_value(
                "subscription.publishing_interval",
                "must be positive",
            )
            .into());
        }
        // The protocol requires lifetime >= 3 * keep-alive.
        if self.lifetime_count < self.keepalive_count.saturating_mul(3) {
            return Err(ConfigError::invalid_value(
                "subscription.lifetime_count",
                "must be at least three times keepalive_count",
            )
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// MonitoredItemSettings
// =============================================================================

/// Parameters applied to every monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemSettings {
    /// Requested sampling interval.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Discard oldest value when the queue is full.
    #[serde(default = "default_discard_oldest")]
    pub discard_oldest: bool,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_queue_size() -> u32 {
    10
}

fn default_discard_oldest() -> bool {
    true
}

impl Default for MonitoredItemSettings {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
            discard_oldest: default_discard_oldest(),
        }
    }
}

// =============================================================================
// EngineSettingsBuilder
// =============================================================================

/// Builder for [`EngineSettings`].
#[derive(Debug, Default)]
pub struct EngineSettingsBuilder {
    settings: EngineSettings,
}

impl EngineSettingsBuilder {
    /// Sets the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.settings.session_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.settings.keepalive_interval = interval;
        self
    }

    /// Sets the keep-alive failure threshold.
    pub fn keepalive_failure_threshold(mut self, threshold: u32) -> Self {
        self.settings.keepalive_failure_threshold = threshold;
        self
    }

    /// Sets the publishing interval.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.settings.subscription.publishing_interval = interval;
        self
    }

    /// Sets the sampling interval.
    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.settings.monitored_item.sampling_interval = interval;
        self
    }

    /// Sets the event channel capacity.
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.settings.event_channel_capacity = capacity;
        self
    }

    /// Sets the command channel capacity.
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.settings.command_channel_capacity = capacity;
        self
    }

    /// Sets the per-tick event budget.
    pub fn max_events_per_tick(mut self, max: usize) -> Self {
        self.settings.max_events_per_tick = max;
        self
    }

    /// Sets the PKI directory.
    pub fn pki_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.pki_dir = dir.into();
        self
    }

    /// Trusts server certificates automatically.
    pub fn trust_server_certs(mut self, trust: bool) -> Self {
        self.settings.trust_server_certs = trust;
        self
    }

    /// Builds and validates the settings.
    pub fn build(self) -> UaResult<EngineSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
