//! Rust library for controlling Lutron motorized shades over the telnet
//! integration protocol
//!
//! This library provides an async API for driving shade groups on a Lutron
//! processor and exposing their state as a window-covering capability. It
//! supports:
//!
//! - Plaintext login handshake on the telnet integration port
//! - One shared connection per credential tuple, multiplexed across shades
//! - Command serialization against the processor's one-at-a-time model
//! - Position and tilt control with angle-unit conversion
//! - Real-time state update subscriptions for a host adapter
//! - Unconditional reconnect with queued commands preserved
//!
//! # Quick Start
//!
//! ```no_run
//! use lutron_shades::{ConnectionRegistry, ShadeConfig, ShadeController, ShadeUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new();
//!
//!     let config: ShadeConfig = serde_json::from_str(
//!         r#"{
//!             "name": "Living Room Blinds",
//!             "host": "192.168.1.50",
//!             "username": "lutron",
//!             "password": "integration",
//!             "integration_id": 3,
//!             "shade_type": "venetian blinds"
//!         }"#,
//!     )?;
//!
//!     let shade = ShadeController::from_config(&config, &registry);
//!
//!     // Drive the shade
//!     shade.set_target_position(75)?;
//!     shade.set_target_tilt_angle(45)?;
//!
//!     // Push state changes to the host adapter
//!     let mut updates = shade.subscribe_updates();
//!     while let Ok(update) = updates.recv().await {
//!         match update {
//!             ShadeUpdate::CurrentPosition(pos) => println!("position: {pos}"),
//!             other => println!("update: {other:?}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Registry**: one [`Connection`] per credential tuple, owned by the
//!   application root
//! - **Connection**: telnet session, login handshake, busy/FIFO command
//!   gating, reconnect supervisor, event routing by integration id
//! - **ShadeController**: per-group state machine and command issuance
//! - **Protocol**: line codec for prompts, status reports, and commands
//! - **Tilt**: conversion between the device 0-100 scale and degrees

mod connection;
mod error;
mod protocol;
mod registry;
mod shade;
mod subscription;
pub mod tilt;
mod types;

// Public exports
pub use connection::{Connection, ConnectionOptions};
pub use error::{Result, ShadeError};
pub use protocol::{Command, EventKind, ServerMessage, StatusEvent};
pub use registry::ConnectionRegistry;
pub use shade::{ShadeController, ShadeState};
pub use subscription::{EventReceiver, ShadeUpdate, UpdateReceiver};
pub use types::{ConnectionConfig, PositionState, ShadeConfig, ShadeKind, DEFAULT_PORT};
