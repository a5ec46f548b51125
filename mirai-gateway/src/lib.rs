// ABOUTME: Gateway client abstraction for the mirai bot API.
// ABOUTME: Provides the GatewayClient trait, payload types, an HTTP transport and a mock.

pub mod http;
pub mod mock;
pub mod traits;
pub mod types;

pub use http::HttpGateway;
pub use traits::GatewayClient;
pub use types::{
    AuthResponse, Friend, Group, MessageItemType, MessageOrEvent, Permission, TypeTag,
};
