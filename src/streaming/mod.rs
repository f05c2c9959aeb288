//! Operator connection: framing, messages, session handling and the listener

pub mod messages;
pub mod server;
pub mod session;
pub mod wire;

pub use messages::{ImageMessage, InboundMessage, OutboundMessage};
pub use server::RelayServer;
pub use session::{Session, SessionContext, SessionSender, SessionSlot};
