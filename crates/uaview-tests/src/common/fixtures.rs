// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built address spaces, profiles and settings.

use std::sync::Arc;
use std::time::Duration;

use uaview_engine::{AttributeId, EngineSettings, EngineSettingsBuilder, NodeId, ProfileSet, StatusCode, UaValue};

use super::mocks::{MockNode, MockServer};

// =============================================================================
// Node Fixtures
// =============================================================================

/// Well-known node ids of the plant address space.
pub struct NodeFixtures;

impl NodeFixtures {
    /// `Objects/Plant` folder.
    pub fn plant() -> NodeId {
        NodeId::string(2, "Plant")
    }

    /// `Objects/Plant/Line1` object.
    pub fn line1() -> NodeId {
        NodeId::string(2, "Plant.Line1")
    }

    /// `Line1/Temperature`, Double.
    pub fn temperature() -> NodeId {
        NodeId::string(2, "Plant.Line1.Temperature")
    }

    /// `Line1/Pressure`, Double.
    pub fn pressure() -> NodeId {
        NodeId::string(2, "Plant.Line1.Pressure")
    }

    /// `Line1/State`, Int32 typed as ServerState.
    pub fn state() -> NodeId {
        NodeId::string(2, "Plant.Line1.State")
    }

    /// `Line1/Counter`, UInt32 whose Value reads back `BadNotReadable`.
    pub fn counter() -> NodeId {
        NodeId::string(2, "Plant.Line1.Counter")
    }

    /// `Line1/Reset` method.
    pub fn reset() -> NodeId {
        NodeId::string(2, "Plant.Line1.Reset")
    }
}

// =============================================================================
// Address Space Fixtures
// =============================================================================

/// Fixture providing mock servers.
pub struct ServerFixtures;

impl ServerFixtures {
    /// A server with the standard folders and a small plant model.
    ///
    /// ```text
    /// Root
    /// ├── Objects
    /// │   ├── Server
    /// │   │   └── CurrentTime
    /// │   └── Plant
    /// │       └── Line1
    /// │           ├── Temperature
    /// │           ├── Pressure
    /// │           ├── State
    /// │           ├── Counter
    /// │           └── Reset
    /// ├── Types
    /// └── Views
    /// ```
    pub fn plant() -> Arc<MockServer> {
        let server = MockServer::new();
        let root = NodeId::ROOT_FOLDER;

        server.add_node(Some(&root), MockNode::object(NodeId::OBJECTS_FOLDER, "Objects"));
        server.add_node(Some(&root), MockNode::object(NodeId::TYPES_FOLDER, "Types"));
        server.add_node(Some(&root), MockNode::object(NodeId::VIEWS_FOLDER, "Views"));

        server.add_node(
            Some(&NodeId::OBJECTS_FOLDER),
            MockNode::object(NodeId::SERVER, "Server"),
        );
        server.add_node(
            Some(&NodeId::SERVER),
            MockNode::variable(
                NodeId::SERVER_CURRENT_TIME,
                "CurrentTime",
                NodeId::numeric(0, 294),
                UaValue::Null,
            ),
        );

        server.add_node(
            Some(&NodeId::OBJECTS_FOLDER),
            MockNode::object(NodeFixtures::plant(), "Plant"),
        );
        server.add_node(
            Some(&NodeFixtures::plant()),
            MockNode::object(NodeFixtures::line1(), "Line1"),
        );

        let line1 = NodeFixtures::line1();
        server.add_node(
            Some(&line1),
            MockNode::variable(
                NodeFixtures::temperature(),
                "Temperature",
                NodeId::numeric(0, 11),
                UaValue::Double(21.5),
            )
            .with_description("Process temperature in degC"),
        );
        server.add_node(
            Some(&line1),
            MockNode::variable(
                NodeFixtures::pressure(),
                "Pressure",
                NodeId::numeric(0, 11),
                UaValue::Double(1.2),
            )
            .with_access_level(0x03),
        );
        server.add_node(
            Some(&line1),
            MockNode::variable(
                NodeFixtures::state(),
                "State",
                NodeId::numeric(0, 852),
                UaValue::Int32(0),
            ),
        );
        server.add_node(
            Some(&line1),
            MockNode::variable(
                NodeFixtures::counter(),
                "Counter",
                NodeId::numeric(0, 7),
                UaValue::UInt32(42),
            )
            .with_bad_attribute(AttributeId::Value, StatusCode::BAD_NOT_READABLE),
        );
        server.add_node(Some(&line1), MockNode::method(NodeFixtures::reset(), "Reset"));

        Arc::new(server)
    }
}

// =============================================================================
// Profile Fixtures
// =============================================================================

/// Fixture providing server profiles.
pub struct ProfileFixtures;

impl ProfileFixtures {
    /// Anonymous profile without security.
    pub const LOCAL: &'static str = "local";

    /// Encrypted profile with user name login.
    pub const SECURE: &'static str = "secure";

    /// A second anonymous profile.
    pub const BACKUP: &'static str = "backup";

    /// User name of the secure profile.
    pub const USER: &'static str = "operator";

    /// Password of the secure profile.
    pub const PASSWORD: &'static str = "s3cret";

    /// The three standard profiles, parsed from JSON.
    pub fn profiles() -> ProfileSet {
        let json = serde_json::json!({
            "local": {
                "endpoint_url": "opc.tcp://localhost:4840"
            },
            "secure": {
                "endpoint_url": "opc.tcp://plc.example:4840/ua",
                "security_policy": "Basic256Sha256",
                "security_mode": "SignAndEncrypt",
                "user_name": Self::USER,
                "password": Self::PASSWORD
            },
            "backup": {
                "endpoint_url": "opc.tcp://backup.example:4840"
            }
        });
        match ProfileSet::from_value(json) {
            Ok(profiles) => profiles,
            Err(e) => panic!("fixture profiles are invalid: {e}"),
        }
    }
}

// =============================================================================
// Settings Fixtures
// =============================================================================

/// Fixture providing engine settings.
pub struct SettingsFixtures;

impl SettingsFixtures {
    /// Settings whose keep-alive never fires during a test.
    pub fn quiet() -> EngineSettings {
        Self::build(
            EngineSettings::builder()
                .keepalive_interval(Duration::from_secs(3600))
                .request_timeout(Duration::from_secs(2)),
        )
    }

    /// Fast keep-alive for loss detection under paused time.
    pub fn fast_keepalive() -> EngineSettings {
        Self::build(
            EngineSettings::builder()
                .keepalive_interval(Duration::from_secs(1))
                .keepalive_failure_threshold(3)
                .request_timeout(Duration::from_secs(2)),
        )
    }

    /// A small per-tick budget for bridge tests.
    pub fn small_tick(max_events_per_tick: usize) -> EngineSettings {
        Self::build(
            EngineSettings::builder()
                .keepalive_interval(Duration::from_secs(3600))
                .max_events_per_tick(max_events_per_tick),
        )
    }

    fn build(builder: EngineSettingsBuilder) -> EngineSettings {
        match builder.build() {
            Ok(settings) => settings,
            Err(e) => panic!("fixture settings are invalid: {e}"),
        }
    }
}
