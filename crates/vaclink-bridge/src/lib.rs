//! `vaclink-bridge` – the connection/protocol/state-reconciliation engine.
//!
//! Maintains one long-lived connection per configured device to the local
//! TCP proxy, demultiplexes inbound packets by origin, merges telemetry into
//! a canonical device-state map, and serializes outbound commands.
//!
//! # Modules
//!
//! - [`state`] – single-writer device-state store with copy-on-read
//!   snapshots and connectivity flags.
//! - [`bus`] – broadcast change-notification hub observers subscribe to.
//! - [`supervisor`] – the reconnecting read loop, expressed as an explicit
//!   state machine ([`supervisor::LinkState`]).
//! - [`command`] – outbound envelope building and frame-atomic writes.
//! - [`bootstrap`] – the fixed data-request sequence fired when the robot
//!   becomes reachable.
//! - [`commands`] – named command codes and payload builders for the robot's
//!   known capabilities.
//!
//! [`VacBridge`] ties these together behind the narrow surface external
//! entity glue consumes.

pub mod bootstrap;
pub mod bridge;
pub mod bus;
pub mod command;
pub mod commands;
pub mod state;
pub mod supervisor;

pub use bridge::VacBridge;
pub use bus::{EventBus, Subscription};
pub use command::CommandSender;
pub use commands::{Command, FanSpeed};
pub use state::StateStore;
pub use supervisor::{Dialer, LinkState, TcpDialer, RETRY_DELAY};
