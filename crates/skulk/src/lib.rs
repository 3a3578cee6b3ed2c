//! # Skulk
//!
//! Room session server for a social-deduction game.
//!
//! Clients connect over WebSocket and exchange JSON frames tagged by
//! `"type"`. Each connection gets a gateway task that decodes inbound
//! frames and drains an outbound queue; everything else (connections,
//! rooms, phases, timers) lives in one orchestrator actor from
//! [`skulk_room`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skulk::prelude::*;
//!
//! # async fn start() -> Result<(), SkulkError> {
//! let server = SkulkServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .settings(RoomSettings::default())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
pub mod logging;
mod server;

pub use error::SkulkError;
pub use server::{DEFAULT_HANDSHAKE_TIMEOUT, SkulkServer, SkulkServerBuilder};

/// The types most callers need.
pub mod prelude {
    pub use skulk_protocol::{
        Address, ClientMessage, ErrorCode, Location, Phase, RoomId, ServerMessage,
    };
    pub use skulk_room::{OrchestratorHandle, RoomSettings, RoomSnapshot};

    pub use crate::{SkulkError, SkulkServer, SkulkServerBuilder};
}
