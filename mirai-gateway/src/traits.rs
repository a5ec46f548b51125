// ABOUTME: GatewayClient trait that every transport implements.
// ABOUTME: Covers login, roster queries, message fetch, replies and session teardown.

use crate::types::{AuthResponse, Friend, Group, MessageOrEvent};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Contract the session engine consumes from a gateway transport.
///
/// Implementations do the network work and report failures loudly; the
/// session engine never retries on their behalf.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &'static str;

    /// Exchange the auth key for a session key
    async fn authenticate(&self, auth_key: &str) -> Result<AuthResponse>;

    /// Bind a session key to a bot account
    async fn verify(&self, session_key: &str, account_id: i64) -> Result<()>;

    /// Groups the bot account has joined
    async fn list_groups(&self, session_key: &str) -> Result<Vec<Group>>;

    /// Friends of the bot account
    async fn list_friends(&self, session_key: &str) -> Result<Vec<Friend>>;

    /// Fetch up to `count` pending items, oldest first
    async fn fetch_messages(&self, session_key: &str, count: usize) -> Result<Vec<MessageOrEvent>>;

    /// Send a message chain to a friend, returning the message id
    async fn send_friend_message(&self, session_key: &str, target: i64, chain: Value)
        -> Result<i64>;

    /// Send a message chain to a group, returning the message id
    async fn send_group_message(&self, session_key: &str, target: i64, chain: Value)
        -> Result<i64>;

    /// Release the session key
    async fn release(&self, session_key: &str, account_id: i64) -> Result<()>;
}
