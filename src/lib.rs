//! # CS Ranging - Channel Sounding Session Negotiation
//!
//! Negotiates and drives a Channel Sounding (CS) ranging session between two
//! peers over an established link, in the two asymmetric roles, and renders
//! the subevent results the controller streams once procedures run.
//!
//! ## Features
//!
//! - **Strict negotiation**: one outstanding request at a time, forward-only
//!   session state, link loss wins over any pending step
//! - **Role policies as data**: Initiator and Reflector share one negotiator
//! - **Lossless telemetry**: fixed header order, 16-byte hex-dump lines
//! - **Recovery**: in-process reset or process exit after link loss
//! - **Simulated controller**: scripted scenarios for the binaries and tests
//!
//! ## Architecture
//!
//! ```text
//!   role (Initiator | Reflector)
//!        │ RoleProfile
//!        v
//!   negotiator::Negotiator ──requests──> gateway::{Link,Security,Ranging}Gateway
//!        ^                                        │
//!        │ CompletionSlots                        │ (controller context)
//!        │                                        v
//!   negotiator::EventDispatcher <──── protocol::RangingEvents
//!        │
//!        └── subevent results ──> telemetry::Reporter
//! ```
//!
//! ## Negotiation Steps
//!
//! | Step              | From                 | To                   | Completion |
//! |-------------------|----------------------|----------------------|------------|
//! | Security          | `Connected`          | `Secured`            | yes        |
//! | Capabilities      | `Secured`            | `CapabilityExchange` | yes        |
//! | Config            | `CapabilityExchange` | `ConfigCreation`     | yes        |
//! | SecurityEnable    | `ConfigCreation`     | `SecurityEnable`     | yes        |
//! | ProcedureParams   | `SecurityEnable`     | `ProcedureParamsSet` | no         |
//! | ProcedureEnable   | `ProcedureParamsSet` | `ProcedureEnabled`   | yes        |
//!
//! Link loss moves a session to `Terminated` from any state.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cs_ranging::{completion_channel, Initiator, InProcessRestart, Reporter, RoleProfile};
//! use cs_ranging::sim::{SimController, SimScript};
//! use cs_ranging::protocol::Role;
//!
//! let (events, slots) = completion_channel(Arc::new(Reporter::new()));
//! let sim = Arc::new(SimController::new(Role::Initiator, SimScript::default(), Arc::new(events)));
//! let mut initiator = Initiator::new(
//!     RoleProfile::initiator(0),
//!     sim,
//!     slots,
//!     Arc::new(InProcessRestart::new()),
//! );
//! let end = initiator.run().await?;
//! println!("session ended: {}", end.reason);
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Value types, session state machine, event interface
//! - [`gateway`]: Request traits of the external collaborators
//! - [`negotiator`]: Completion slots and the step driver
//! - [`role`]: Initiator and Reflector policies
//! - [`host`]: Restart actions and the session supervisor
//! - [`telemetry`]: Subevent rendering and log parsing
//! - [`sim`]: Scripted controller
//! - [`config`]: Configuration management
//! - [`logging`]: Tracing setup
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod error;
pub mod gateway;
pub mod host;
pub mod logging;
pub mod negotiator;
pub mod protocol;
pub mod role;
pub mod sim;
pub mod telemetry;

// Re-exports for convenience
pub use config::Config;
pub use error::{CsError, Result};
pub use gateway::{Gateway, GatewayError, LinkGateway, RangingGateway, SecurityGateway};
pub use host::{InProcessRestart, ProcessRestart, RecoveryMode, RestartAction, Supervisor};
pub use negotiator::{completion_channel, CompletionSlots, EventDispatcher, Negotiator};
pub use protocol::{RangingEvents, Role, Session, SessionState, Step};
pub use role::{Initiator, Reflector, RoleProfile, SessionEnd};
pub use telemetry::{Reporter, SubeventReport, SubeventResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
