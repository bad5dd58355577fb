//! Role policies.
//!
//! Both roles share the [`Negotiator`](crate::negotiator::Negotiator); they
//! differ in the data they feed it ([`RoleProfile`]) and in their loop shape.
//! The [`Initiator`] negotiates once and then idles until the link drops.
//! The [`Reflector`] answers every connection, re-arming after each one.

mod initiator;
mod reflector;

pub use initiator::Initiator;
pub use reflector::Reflector;

use serde::{Deserialize, Serialize};

use crate::protocol::{
    CreateConfigParams, CreateContext, DefaultSettings, DisconnectReason, ProcedureParams, Role,
    SecurityLevel, SessionSummary,
};

/// Per-role negotiation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    /// Local role
    pub role: Role,
    /// Configuration id reused for every session
    pub config_id: u8,
    /// Link security requested after connect
    pub security_level: SecurityLevel,
    /// Default ranging settings
    pub default_settings: DefaultSettings,
    /// Configuration to create; `None` when the peer creates it
    pub config: Option<CreateConfigParams>,
    /// Where the configuration is written
    pub create_context: CreateContext,
    /// Procedure parameters
    pub procedure: ProcedureParams,
}

impl RoleProfile {
    /// Initiator: PBR configuration, short and frequent procedures
    pub fn initiator(config_id: u8) -> Self {
        Self {
            role: Role::Initiator,
            config_id,
            security_level: SecurityLevel::L2,
            default_settings: DefaultSettings::for_role(Role::Initiator),
            config: Some(CreateConfigParams::pbr_initiator(config_id)),
            create_context: CreateContext::LocalAndRemote,
            procedure: ProcedureParams::initiator(config_id),
        }
    }

    /// Reflector: configuration comes from the peer, wider timing bounds
    pub fn reflector(config_id: u8) -> Self {
        Self {
            role: Role::Reflector,
            config_id,
            security_level: SecurityLevel::L2,
            default_settings: DefaultSettings::for_role(Role::Reflector),
            config: None,
            create_context: CreateContext::LocalAndRemote,
            procedure: ProcedureParams::reflector(config_id),
        }
    }

    /// Profile for `role`
    pub fn for_role(role: Role, config_id: u8) -> Self {
        match role {
            Role::Initiator => Self::initiator(config_id),
            Role::Reflector => Self::reflector(config_id),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone)]
pub struct SessionEnd {
    /// Final session snapshot
    pub summary: SessionSummary,
    /// Why the link went down
    pub reason: DisconnectReason,
}
