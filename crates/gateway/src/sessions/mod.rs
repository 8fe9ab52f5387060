//! Live client sessions: the registry, the per-connection protocol loop and
//! the notification dispatcher.

pub mod notify;
pub mod registry;
pub mod ws;

pub use notify::Notifier;
pub use registry::{ConnectionHandle, Session, SessionInfo, SessionRegistry, SessionSink};
