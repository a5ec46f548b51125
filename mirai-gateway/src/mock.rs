// ABOUTME: Mock gateway for testing - serves scripted batches and records every call.
// ABOUTME: Allows deterministic session tests without a running mirai instance.
//!
//! # Example
//!
//! ```no_run
//! use mirai_gateway::mock::{group_message, MockGateway};
//! use mirai_gateway::GatewayClient;
//!
//! # async fn example() {
//! let mock = MockGateway::new()
//!     .with_batch(vec![group_message(1, 100, "hello")])
//!     .with_batch(vec![]);
//!
//! let items = mock.fetch_messages("mock-session", 10).await.unwrap();
//! assert_eq!(items.len(), 1);
//! assert_eq!(mock.fetch_count(), 1);
//! # }
//! ```

use crate::traits::GatewayClient;
use crate::types::{AuthResponse, Friend, Group, MessageOrEvent, MessageItemType, TypeTag};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A call observed by the mock, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Authenticate { auth_key: String },
    Verify { session_key: String, account_id: i64 },
    ListGroups,
    ListFriends,
    Fetch { count: usize },
    SendFriend { target: i64, chain: Value },
    SendGroup { target: i64, chain: Value },
    Release { session_key: String, account_id: i64 },
}

struct MockState {
    auth: AuthResponse,
    groups: Vec<Group>,
    friends: Vec<Friend>,
    batches: VecDeque<Vec<MessageOrEvent>>,
    fetch_errors: VecDeque<String>,
    release_error: Option<String>,
    next_message_id: i64,
    calls: Vec<MockCall>,
}

/// Scripted in-memory gateway.
///
/// Clones share state, so a test can keep one copy for inspection while the
/// session owns another.
#[derive(Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    /// Create a mock that accepts any auth key with session key `mock-session`
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                auth: AuthResponse::success("mock-session"),
                groups: Vec::new(),
                friends: Vec::new(),
                batches: VecDeque::new(),
                fetch_errors: VecDeque::new(),
                release_error: None,
                next_message_id: 1,
                calls: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Respond to authenticate with the given shape
    pub fn with_auth(self, auth: AuthResponse) -> Self {
        self.lock().auth = auth;
        self
    }

    pub fn with_groups(self, groups: Vec<Group>) -> Self {
        self.lock().groups = groups;
        self
    }

    pub fn with_friends(self, friends: Vec<Friend>) -> Self {
        self.lock().friends = friends;
        self
    }

    /// Queue a batch for a future fetch
    pub fn with_batch(self, items: Vec<MessageOrEvent>) -> Self {
        self.push_batch(items);
        self
    }

    /// Make the next fetch fail with `message`
    pub fn with_fetch_error(self, message: &str) -> Self {
        self.lock().fetch_errors.push_back(message.to_string());
        self
    }

    /// Make every release fail with `message`
    pub fn with_release_error(self, message: &str) -> Self {
        self.lock().release_error = Some(message.to_string());
        self
    }

    /// Queue a batch while the mock is already in use
    pub fn push_batch(&self, items: Vec<MessageOrEvent>) {
        self.lock().batches.push_back(items);
    }

    /// Every call seen so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.count_calls(|call| matches!(call, MockCall::Fetch { .. }))
    }

    pub fn release_count(&self) -> usize {
        self.count_calls(|call| matches!(call, MockCall::Release { .. }))
    }

    /// Number of batches not yet served
    pub fn pending_batches(&self) -> usize {
        self.lock().batches.len()
    }

    fn count_calls(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: MockCall) {
        self.lock().calls.push(call);
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn authenticate(&self, auth_key: &str) -> Result<AuthResponse> {
        self.record(MockCall::Authenticate {
            auth_key: auth_key.to_string(),
        });
        Ok(self.lock().auth.clone())
    }

    async fn verify(&self, session_key: &str, account_id: i64) -> Result<()> {
        self.record(MockCall::Verify {
            session_key: session_key.to_string(),
            account_id,
        });
        Ok(())
    }

    async fn list_groups(&self, _session_key: &str) -> Result<Vec<Group>> {
        self.record(MockCall::ListGroups);
        Ok(self.lock().groups.clone())
    }

    async fn list_friends(&self, _session_key: &str) -> Result<Vec<Friend>> {
        self.record(MockCall::ListFriends);
        Ok(self.lock().friends.clone())
    }

    async fn fetch_messages(&self, _session_key: &str, count: usize) -> Result<Vec<MessageOrEvent>> {
        let mut state = self.lock();
        state.calls.push(MockCall::Fetch { count });

        if let Some(message) = state.fetch_errors.pop_front() {
            return Err(anyhow!(message));
        }

        let Some(mut batch) = state.batches.pop_front() else {
            return Ok(Vec::new());
        };

        // A real gateway never returns more than asked for; keep the rest queued
        if batch.len() > count {
            let rest = batch.split_off(count);
            state.batches.push_front(rest);
        }
        Ok(batch)
    }

    async fn send_friend_message(
        &self,
        _session_key: &str,
        target: i64,
        chain: Value,
    ) -> Result<i64> {
        let mut state = self.lock();
        state.calls.push(MockCall::SendFriend { target, chain });
        let message_id = state.next_message_id;
        state.next_message_id += 1;
        Ok(message_id)
    }

    async fn send_group_message(
        &self,
        _session_key: &str,
        target: i64,
        chain: Value,
    ) -> Result<i64> {
        let mut state = self.lock();
        state.calls.push(MockCall::SendGroup { target, chain });
        let message_id = state.next_message_id;
        state.next_message_id += 1;
        Ok(message_id)
    }

    async fn release(&self, session_key: &str, account_id: i64) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::Release {
            session_key: session_key.to_string(),
            account_id,
        });
        match &state.release_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

/// Build a group message item with a single plain-text segment
pub fn group_message(sender: i64, group: i64, text: &str) -> MessageOrEvent {
    MessageOrEvent::new(
        TypeTag::Message(MessageItemType::GroupMessage),
        json!({
            "type": "GroupMessage",
            "messageChain": [{"type": "Plain", "text": text}],
            "sender": {"id": sender, "group": {"id": group}}
        }),
    )
}

/// Build a friend message item with a single plain-text segment
pub fn friend_message(sender: i64, text: &str) -> MessageOrEvent {
    MessageOrEvent::new(
        TypeTag::Message(MessageItemType::FriendMessage),
        json!({
            "type": "FriendMessage",
            "messageChain": [{"type": "Plain", "text": text}],
            "sender": {"id": sender}
        }),
    )
}

/// Build a non-message event item with the raw type `name`
pub fn event(name: &str) -> MessageOrEvent {
    MessageOrEvent::new(TypeTag::Event(name.to_string()), json!({ "type": name }))
}
