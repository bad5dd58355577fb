//! Channel Sounding session negotiation protocol.
//!
//! Value types exchanged with the controller, the per-session state machine
//! and the event interface the gateways report through.
//!
//! # Negotiation Flow
//!
//! ```text
//! Initiator                                   Reflector
//!    |                                            |
//!    |<============ link established ===========>|
//!    |-------- security elevation (L2) --------->|
//!    |-------- capability exchange ------------->|
//!    |-------- create config (PBR) ------------->|  config complete on both sides
//!    |-------- CS security enable -------------->|
//!    |  set procedure params      set procedure params
//!    |-------- procedure enable ---------------->|
//!    |                                            |
//!    |<======= subevent results (both sides) ====>|
//! ```
//!
//! ## State Machine
//!
//! | State                | Reached when                        |
//! |----------------------|-------------------------------------|
//! | `Connected`          | Link established                    |
//! | `Securing`           | Security elevation requested        |
//! | `Secured`            | Security changed successfully       |
//! | `CapabilityExchange` | Remote capabilities received        |
//! | `ConfigCreation`     | Configuration created               |
//! | `SecurityEnable`     | CS security enabled                 |
//! | `ProcedureParamsSet` | Procedure parameters accepted       |
//! | `ProcedureEnabled`   | Procedures running                  |
//! | `Terminated`         | Link lost (from any state)          |
//!
//! Every directive step starts only from its precondition state and only
//! when no other request is outstanding. A failed completion leaves the state
//! where it was; nothing is retried.

mod capabilities;
mod config;
mod event;
mod procedure;
mod session;
mod types;

pub use capabilities::{AntennaSelection, CapabilitySnapshot, DefaultSettings, MAX_TX_POWER_DBM};
pub use config::{
    Ch3cShape, ChannelMap, ChannelSelection, ConfigRecord, CreateConfigParams, CreateContext,
    MainMode, RttType, SyncPhy, CHANNEL_MAP_LEN, MAX_CHANNEL,
};
pub use event::{Completion, CompletionPayload, RangingEvents};
pub use procedure::{
    ProcedureEnableRecord, ProcedureParams, ProcedurePhy, ProcedureState, SnrControl,
    ToneAntennaConfig, TX_POWER_DELTA_NO_PREFERENCE,
};
pub use session::{Session, SessionState, SessionSummary, Step, StepOutcome};
pub use types::{DisconnectReason, HciStatus, LinkHandle, LinkId, Role, SecurityLevel};

/// Configuration id used by both roles
pub const CS_CONFIG_ID: u8 = 0;
