// ABOUTME: EventRecord - the normalized unit passed from the poller to the dispatcher.
// ABOUTME: The dispatch name is resolved once from the item's type tag.

use mirai_gateway::MessageOrEvent;

/// One inbound item ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Dispatch key (e.g. "GroupMessage", "MemberJoinEvent")
    pub name: String,
    /// The item as fetched
    pub body: MessageOrEvent,
}

impl EventRecord {
    pub fn new(name: impl Into<String>, body: MessageOrEvent) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl From<MessageOrEvent> for EventRecord {
    fn from(body: MessageOrEvent) -> Self {
        Self {
            name: body.tag.name().to_string(),
            body,
        }
    }
}
