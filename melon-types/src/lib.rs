//! Shared data model for the Melon API: the wire structs, the closed
//! enums behind reactions and notifications, and the request and
//! response bodies exchanged with the server.

pub mod enums;
pub mod models;

pub use enums::*;
pub use models::*;
