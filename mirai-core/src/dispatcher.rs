// ABOUTME: Dispatcher loop - drains the event queue and runs matching handlers in order.
// ABOUTME: Waits with a timeout so shutdown is noticed even when the queue is idle.

use crate::config::HandlerFailurePolicy;
use crate::dispatch::DispatchTable;
use crate::error::{Result, SessionError};
use crate::event::EventRecord;
use crate::session::SessionInfo;
use mirai_gateway::GatewayClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs registered handlers for each queued EventRecord
pub struct Dispatcher {
    table: DispatchTable,
    session: Arc<SessionInfo>,
    gateway: Arc<dyn GatewayClient>,
    queue_timeout: Duration,
    policy: HandlerFailurePolicy,
}

impl Dispatcher {
    pub fn new(
        table: DispatchTable,
        session: Arc<SessionInfo>,
        gateway: Arc<dyn GatewayClient>,
        queue_timeout: Duration,
        policy: HandlerFailurePolicy,
    ) -> Self {
        Self {
            table,
            session,
            gateway,
            queue_timeout,
            policy,
        }
    }

    /// Run every matching handler for `record`, one after another.
    ///
    /// Returns how many handlers were invoked. Records nobody registered for
    /// are dropped without error.
    pub async fn dispatch(&self, record: EventRecord) -> Result<usize> {
        let registrations = self.table.handlers_for(&record.name);
        if registrations.is_empty() {
            tracing::trace!(event = %record.name, "No handlers registered, dropping");
            return Ok(0);
        }

        let mut invoked = 0;
        for registration in registrations {
            if !registration.matches(&record.body) {
                continue;
            }
            invoked += 1;

            let outcome = (registration.handler)(
                record.body.clone(),
                Arc::clone(&self.session),
                Arc::clone(&self.gateway),
            )
            .await;

            if let Err(e) = outcome {
                match self.policy {
                    HandlerFailurePolicy::Isolate => {
                        tracing::error!(event = %record.name, error = %e, "Handler failed");
                    }
                    HandlerFailurePolicy::Abort => {
                        return Err(SessionError::Handler {
                            event: record.name,
                            source: e,
                        });
                    }
                }
            }
        }

        Ok(invoked)
    }

    /// Dispatch until `cancel` fires or the queue closes
    pub async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<EventRecord>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::debug!(
            timeout_ms = self.queue_timeout.as_millis() as u64,
            "Dispatcher started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = tokio::time::timeout(self.queue_timeout, queue.recv()) => next,
            };

            match next {
                // Idle: go round again so cancellation is re-checked
                Err(_) => continue,
                Ok(None) => {
                    tracing::debug!("Event queue closed");
                    break;
                }
                Ok(Some(record)) => {
                    self.dispatch(record).await?;
                }
            }
        }

        tracing::debug!("Dispatcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use mirai_gateway::mock::{event, friend_message, group_message, MockGateway};
    use std::sync::Mutex;

    fn session_info() -> Arc<SessionInfo> {
        Arc::new(SessionInfo {
            base_url: "http://localhost:8080".to_string(),
            account_id: 42,
            session_key: "key".to_string(),
            groups: Vec::new(),
            friends: Vec::new(),
        })
    }

    fn dispatcher(table: &DispatchTable, policy: HandlerFailurePolicy) -> Dispatcher {
        Dispatcher::new(
            table.clone(),
            session_info(),
            Arc::new(MockGateway::new()),
            Duration::from_secs(2),
            policy,
        )
    }

    /// Register a handler that appends `label` to `log` when it runs
    fn record_into(
        table: &DispatchTable,
        event: &str,
        label: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) {
        let log = Arc::clone(log);
        table.on(event).handle(move |_, _, _| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(label);
                Ok(())
            }
        });
    }

    #[tokio::test]
    async fn test_unpredicated_handler_fires_for_every_record() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        record_into(&table, "GroupMessage", "group", &log);
        let dispatcher = dispatcher(&table, HandlerFailurePolicy::Isolate);

        for i in 0..3 {
            let invoked = dispatcher
                .dispatch(group_message(i, 1, "x").into())
                .await
                .unwrap();
            assert_eq!(invoked, 1);
        }
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_predicate_gates_handler() {
        let table = DispatchTable::new();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        table
            .on("FriendMessage")
            .when(|body| body.sender_id() == Some(7))
            .handle(move |body, _, _| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(body.sender_id());
                    Ok(())
                }
            });
        let dispatcher = dispatcher(&table, HandlerFailurePolicy::Isolate);

        assert_eq!(dispatcher.dispatch(friend_message(7, "a").into()).await.unwrap(), 1);
        assert_eq!(dispatcher.dispatch(friend_message(8, "b").into()).await.unwrap(), 0);
        assert_eq!(*hits.lock().unwrap(), vec![Some(7)]);
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        record_into(&table, "GroupMessage", "first", &log);
        record_into(&table, "GroupMessage", "second", &log);
        record_into(&table, "GroupMessage", "third", &log);

        dispatcher(&table, HandlerFailurePolicy::Isolate)
            .dispatch(group_message(1, 1, "x").into())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_unregistered_event_is_noop() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        record_into(&table, "GroupMessage", "group", &log);

        let invoked = dispatcher(&table, HandlerFailurePolicy::Abort)
            .dispatch(event("BotOfflineEventActive").into())
            .await
            .unwrap();

        assert_eq!(invoked, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_isolate_policy_continues_after_failure() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        table
            .on("GroupMessage")
            .handle(|_, _, _| async { Err(anyhow!("handler exploded")) });
        record_into(&table, "GroupMessage", "after", &log);

        let invoked = dispatcher(&table, HandlerFailurePolicy::Isolate)
            .dispatch(group_message(1, 1, "x").into())
            .await
            .unwrap();

        assert_eq!(invoked, 2);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_abort_policy_surfaces_failure() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        table
            .on("GroupMessage")
            .handle(|_, _, _| async { Err(anyhow!("handler exploded")) });
        record_into(&table, "GroupMessage", "after", &log);

        let err = dispatcher(&table, HandlerFailurePolicy::Abort)
            .dispatch(group_message(1, 1, "x").into())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Handler { ref event, .. } if event == "GroupMessage"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_receives_session_and_gateway() {
        let table = DispatchTable::new();
        let mock = MockGateway::new();
        table.on("FriendMessage").handle(|body, session, gateway| async move {
            let sender = body.sender_id().unwrap_or_default();
            gateway
                .send_friend_message(&session.session_key, sender, serde_json::json!([]))
                .await
                .map(|_| ())
        });
        let dispatcher = Dispatcher::new(
            table,
            session_info(),
            Arc::new(mock.clone()),
            Duration::from_secs(2),
            HandlerFailurePolicy::Abort,
        );

        dispatcher.dispatch(friend_message(5, "ping").into()).await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![mirai_gateway::mock::MockCall::SendFriend {
                target: 5,
                chain: serde_json::json!([])
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_on_cancel_while_idle() {
        let table = DispatchTable::new();
        let (_tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            dispatcher(&table, HandlerFailurePolicy::Isolate).run(rx, cancel.clone()),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_exits_when_queue_closes() {
        let table = DispatchTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        record_into(&table, "GroupMessage", "seen", &log);
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(EventRecord::from(group_message(1, 1, "x"))).unwrap();
        tx.send(EventRecord::from(group_message(2, 1, "y"))).unwrap();
        drop(tx);

        dispatcher(&table, HandlerFailurePolicy::Isolate)
            .run(rx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
