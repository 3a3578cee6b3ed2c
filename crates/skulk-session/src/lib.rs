//! Connection tracking for Skulk.
//!
//! This crate owns everything the server knows about a live link:
//!
//! 1. **Records** - who is on the other end ([`Session`]): optional identity,
//!    display name, current room, and whether they play or watch.
//! 2. **Identity index** - resolving an address to the connection that
//!    currently speaks for it.
//! 3. **Delivery** - pushing events into per-connection outbound queues,
//!    best effort.
//!
//! ```text
//! Room orchestrator (above)  ← resolves members to connections
//!     ↕
//! Session layer (this crate) ← records + outbound queues
//!     ↕
//! Gateway writer tasks       ← drain queues onto the transport
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Outbound, Session};
