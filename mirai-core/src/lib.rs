// ABOUTME: Session lifecycle and event dispatch engine for mirai bots
// ABOUTME: Polls a gateway on a worker thread and routes events to registered handlers

pub mod config;
pub mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod poller;
pub mod session;
pub mod worker;

pub use config::{CacheOptions, ConnectionParams, HandlerFailurePolicy, PollOptions, SessionConfig};
pub use dispatch::{DispatchTable, Handler, HandlerBuilder, Predicate, Registration};
pub use error::SessionError;
pub use event::EventRecord;
pub use session::{Session, SessionInfo};

// Re-export gateway types handlers work with
pub use mirai_gateway::{GatewayClient, MessageOrEvent};
