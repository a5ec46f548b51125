// ABOUTME: Built-in bot behaviour - logs selected events and optionally echoes messages back.
// ABOUTME: Registers its handlers on a Session's dispatch table according to [bot] config.

use crate::config::BotConfig;
use anyhow::{Context, Result};
use mirai_core::{GatewayClient, MessageOrEvent, Session, SessionInfo};
use mirai_gateway::{MessageItemType, TypeTag};
use serde_json::Value;
use std::sync::Arc;

/// Chain segments that describe the original message rather than its content
const NON_CONTENT_SEGMENTS: &[&str] = &["Source", "Quote"];

/// Register the configured handlers on `session`
pub fn register(session: &Session, bot: &BotConfig) {
    for name in &bot.log_events {
        session.on(name).handle(log_event);
    }

    if bot.echo {
        let own_id = session.account_id();
        for kind in [MessageItemType::FriendMessage, MessageItemType::GroupMessage] {
            session
                .on(kind.as_str())
                .when(move |body| body.sender_id() != Some(own_id))
                .handle(echo);
        }
    }

    tracing::info!(
        log_events = bot.log_events.len(),
        echo = bot.echo,
        "Bot handlers registered"
    );
}

async fn log_event(
    body: MessageOrEvent,
    _session: Arc<SessionInfo>,
    _gateway: Arc<dyn GatewayClient>,
) -> Result<()> {
    tracing::info!(
        event = %body.tag.name(),
        sender = ?body.sender_id(),
        group = ?body.group_id(),
        text = %plain_text(&body),
        "Received"
    );
    Ok(())
}

async fn echo(
    body: MessageOrEvent,
    session: Arc<SessionInfo>,
    gateway: Arc<dyn GatewayClient>,
) -> Result<()> {
    let Some(chain) = echo_chain(&body) else {
        return Ok(());
    };

    let message_id = match body.tag {
        TypeTag::Message(MessageItemType::GroupMessage) => {
            let group = body.group_id().context("group message without sender.group.id")?;
            gateway
                .send_group_message(&session.session_key, group, chain)
                .await?
        }
        _ => {
            let sender = body.sender_id().context("message without sender.id")?;
            gateway
                .send_friend_message(&session.session_key, sender, chain)
                .await?
        }
    };

    tracing::debug!(message_id, event = %body.tag.name(), "Echo sent");
    Ok(())
}

/// The content segments of a message chain, or `None` if nothing is left to send
pub fn echo_chain(body: &MessageOrEvent) -> Option<Value> {
    let segments = body.message_chain()?.as_array()?;
    let content: Vec<Value> = segments
        .iter()
        .filter(|segment| {
            let kind = segment.get("type").and_then(Value::as_str).unwrap_or_default();
            !NON_CONTENT_SEGMENTS.contains(&kind)
        })
        .cloned()
        .collect();

    if content.is_empty() {
        None
    } else {
        Some(Value::Array(content))
    }
}

/// Concatenated text of the chain's `Plain` segments
pub fn plain_text(body: &MessageOrEvent) -> String {
    body.message_chain()
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter(|s| s.get("type").and_then(Value::as_str) == Some("Plain"))
                .filter_map(|s| s.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirai_gateway::mock::{event, group_message};
    use serde_json::json;

    #[test]
    fn test_echo_chain_drops_source_segment() {
        let body = MessageOrEvent::new(
            TypeTag::Message(MessageItemType::FriendMessage),
            json!({
                "type": "FriendMessage",
                "messageChain": [
                    {"type": "Source", "id": 1, "time": 0},
                    {"type": "Plain", "text": "hi"}
                ],
                "sender": {"id": 5}
            }),
        );
        assert_eq!(
            echo_chain(&body),
            Some(json!([{"type": "Plain", "text": "hi"}]))
        );
    }

    #[test]
    fn test_echo_chain_none_without_content() {
        assert_eq!(echo_chain(&event("NudgeEvent")), None);
    }

    #[test]
    fn test_plain_text_joins_segments() {
        assert_eq!(plain_text(&group_message(1, 2, "hello")), "hello");
        assert_eq!(plain_text(&event("NudgeEvent")), "");
    }
}
