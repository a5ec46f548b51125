// ABOUTME: Session controller - owns auth state, roster caches, handlers and the event worker.
// ABOUTME: Drives the enable -> begin_worker -> stop_worker -> close lifecycle against a gateway.

use crate::config::SessionConfig;
use crate::dispatch::{DispatchTable, Handler, HandlerBuilder, Predicate};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SessionError};
use crate::poller::Poller;
use crate::worker::Worker;
use futures::future::BoxFuture;
use mirai_gateway::{AuthResponse, Friend, GatewayClient, Group, HttpGateway};
use std::sync::Arc;

/// Read-only view of an enabled session, handed to every handler
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub base_url: String,
    pub account_id: i64,
    pub session_key: String,
    pub groups: Vec<Group>,
    pub friends: Vec<Friend>,
}

impl SessionInfo {
    pub fn group(&self, id: i64) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn friend(&self, id: i64) -> Option<&Friend> {
        self.friends.iter().find(|f| f.id == id)
    }
}

/// Interpret an auth response: code 0 carries the key in `msg` (older
/// gateways) or `session`, code 1 means the auth key was refused.
///
/// A non-empty `msg` takes precedence over `session`.
pub fn resolve_session_key(response: &AuthResponse) -> Result<String> {
    match response.code {
        Some(0) => non_empty(&response.msg)
            .or_else(|| non_empty(&response.session))
            .map(str::to_string)
            .ok_or_else(|| SessionError::Protocol("auth succeeded without a session key".into())),
        Some(1) => Err(SessionError::Auth("invalid auth key".into())),
        Some(code) => Err(SessionError::Protocol(format!(
            "unknown auth response code {}",
            code
        ))),
        None => Err(SessionError::Protocol("auth response has no code".into())),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// One bot account's session against a mirai gateway
pub struct Session {
    config: SessionConfig,
    gateway: Arc<dyn GatewayClient>,
    session_key: Option<String>,
    enabled: bool,
    cached_groups: Vec<Group>,
    cached_friends: Vec<Friend>,
    table: DispatchTable,
    worker: Option<Worker>,
}

impl Session {
    /// Create a disabled session using `gateway` as transport
    pub fn new(config: SessionConfig, gateway: Arc<dyn GatewayClient>) -> Result<Self> {
        config.polling.validate()?;
        Ok(Self {
            config,
            gateway,
            session_key: None,
            enabled: false,
            cached_groups: Vec::new(),
            cached_friends: Vec::new(),
            table: DispatchTable::new(),
            worker: None,
        })
    }

    /// Create a disabled session talking HTTP to `config.base_url`
    pub fn connect_http(config: SessionConfig) -> Result<Self> {
        let gateway = HttpGateway::new(&config.base_url)?;
        Self::new(config, Arc::new(gateway))
    }

    /// Create a disabled session from a `mirai://` URL
    pub fn from_url(url: &str, gateway: Arc<dyn GatewayClient>) -> Result<Self> {
        Self::new(SessionConfig::from_url(url)?, gateway)
    }

    /// Construct and enable in one step
    pub async fn start(config: SessionConfig, gateway: Arc<dyn GatewayClient>) -> Result<Self> {
        let mut session = Self::new(config, gateway)?;
        session.enable().await?;
        Ok(session)
    }

    /// Authenticate, verify and load the configured roster caches
    pub async fn enable(&mut self) -> Result<&mut Self> {
        if self.enabled {
            tracing::debug!(account_id = self.config.account_id, "Session already enabled");
            return Ok(self);
        }

        let response = self.gateway.authenticate(&self.config.auth_key).await?;
        let session_key = resolve_session_key(&response)?;
        self.gateway
            .verify(&session_key, self.config.account_id)
            .await?;

        if let Err(e) = self.load_caches(&session_key).await {
            // The key is verified at this point; don't leave it dangling on the gateway
            if let Err(release_err) = self
                .gateway
                .release(&session_key, self.config.account_id)
                .await
            {
                tracing::warn!(error = %release_err, "Failed to release session after cache error");
            }
            return Err(e);
        }

        self.session_key = Some(session_key);
        self.enabled = true;

        tracing::info!(
            account_id = self.config.account_id,
            gateway = self.gateway.name(),
            groups = self.cached_groups.len(),
            friends = self.cached_friends.len(),
            "Session enabled"
        );
        Ok(self)
    }

    async fn load_caches(&mut self, session_key: &str) -> Result<()> {
        if self.config.cache.groups {
            self.cached_groups = self.gateway.list_groups(session_key).await?;
        }
        if self.config.cache.friends {
            self.cached_friends = self.gateway.list_friends(session_key).await?;
        }
        Ok(())
    }

    /// Start polling and dispatching on a dedicated worker thread
    pub fn begin_worker(&mut self) -> Result<()> {
        let info = self.info().ok_or(SessionError::NotConnected)?;
        if self.worker.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let polling = &self.config.polling;
        let poller = Poller::new(
            Arc::clone(&self.gateway),
            info.session_key.clone(),
            polling.count,
            polling.interval(),
        );
        let dispatcher = Dispatcher::new(
            self.table.clone(),
            Arc::new(info),
            Arc::clone(&self.gateway),
            polling.queue_timeout(),
            polling.failure_policy(),
        );

        self.worker = Some(Worker::spawn(poller, dispatcher)?);
        Ok(())
    }

    /// Resolve once the running worker exits on its own or is stopped.
    ///
    /// Its outcome stays available to `stop_worker` and `close`.
    pub async fn worker_finished(&self) -> Result<()> {
        let worker = self.worker.as_ref().ok_or(SessionError::NotRunning)?;
        worker.finished().await;
        Ok(())
    }

    /// Stop the worker without releasing the gateway session
    pub async fn stop_worker(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(SessionError::NotRunning)?;
        worker.stop().await
    }

    /// Stop the worker (if any), release the gateway session and disable.
    ///
    /// With `ignore_errors`, closing a disabled session is a no-op and worker
    /// or release failures are only logged.
    pub async fn close(&mut self, ignore_errors: bool) -> Result<()> {
        if !self.enabled {
            return if ignore_errors {
                Ok(())
            } else {
                Err(SessionError::NotConnected)
            };
        }

        let mut failure: Option<SessionError> = None;

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.stop().await {
                failure = Some(e);
            }
        }

        if let Some(session_key) = self.session_key.take() {
            if let Err(e) = self
                .gateway
                .release(&session_key, self.config.account_id)
                .await
            {
                failure.get_or_insert(SessionError::Gateway(e));
            }
        }

        self.enabled = false;
        tracing::info!(account_id = self.config.account_id, "Session closed");

        match failure {
            Some(e) if ignore_errors => {
                tracing::warn!(error = %e, "Ignoring error while closing session");
                Ok(())
            }
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run `body` with this session, then always close it.
    ///
    /// If the returned future is dropped early, `Drop` still stops the
    /// worker and then releases the gateway session.
    pub async fn scope<T, E, F>(mut self, body: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut Session) -> BoxFuture<'a, std::result::Result<T, E>>,
    {
        let outcome = body(&mut self).await;
        if let Err(e) = self.close(true).await {
            tracing::warn!(error = %e, "Failed to close session at end of scope");
        }
        outcome
    }

    /// Start a fluent handler registration: `session.on("GroupMessage").handle(...)`
    pub fn on(&self, event: &str) -> HandlerBuilder<'_> {
        self.table.on(event)
    }

    /// Append a handler for `event`, optionally gated by `predicate`
    pub fn register_handler(&self, event: &str, predicate: Option<Predicate>, handler: Handler) {
        self.table.register(event, predicate, handler);
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.table
    }

    /// Snapshot handed to handlers; `None` until enabled
    pub fn info(&self) -> Option<SessionInfo> {
        if !self.enabled {
            return None;
        }
        let session_key = self.session_key.clone()?;
        Some(SessionInfo {
            base_url: self.config.base_url.clone(),
            account_id: self.config.account_id,
            session_key,
            groups: self.cached_groups.clone(),
            friends: self.cached_friends.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a worker exists and has not exited
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn account_id(&self) -> i64 {
        self.config.account_id
    }

    pub fn cached_groups(&self) -> &[Group] {
        &self.cached_groups
    }

    pub fn cached_friends(&self) -> &[Friend] {
        &self.cached_friends
    }

    pub fn gateway(&self) -> Arc<dyn GatewayClient> {
        Arc::clone(&self.gateway)
    }
}

/// Dropping an enabled session stops its worker and then releases the
/// gateway session on the current runtime. Outside a runtime the worker is
/// only cancelled and its thread is left to exit on its own.
impl Drop for Session {
    fn drop(&mut self) {
        let worker = self.worker.take();
        let session_key = if self.enabled {
            self.session_key.take()
        } else {
            None
        };
        if worker.is_none() && session_key.is_none() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // Dropping the worker handle cancels it
            drop(worker);
            if session_key.is_some() {
                tracing::warn!(
                    account_id = self.config.account_id,
                    "Session dropped outside a runtime; gateway session not released"
                );
            }
            return;
        };

        let gateway = Arc::clone(&self.gateway);
        let account_id = self.config.account_id;
        handle.spawn(async move {
            // The key must outlive every in-flight fetch
            if let Some(worker) = worker {
                if let Err(e) = worker.stop().await {
                    tracing::warn!(error = %e, "Worker of dropped session ended with an error");
                }
            }
            if let Some(session_key) = session_key {
                if let Err(e) = gateway.release(&session_key, account_id).await {
                    tracing::warn!(error = %e, "Failed to release dropped session");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(code: Option<i64>, session: Option<&str>, msg: Option<&str>) -> AuthResponse {
        AuthResponse {
            code,
            session: session.map(str::to_string),
            msg: msg.map(str::to_string),
        }
    }

    #[test]
    fn test_session_key_from_session_field() {
        let key = resolve_session_key(&auth(Some(0), Some("abc"), None)).unwrap();
        assert_eq!(key, "abc");
    }

    #[test]
    fn test_session_key_from_msg_field() {
        let key = resolve_session_key(&auth(Some(0), None, Some("abc"))).unwrap();
        assert_eq!(key, "abc");
    }

    #[test]
    fn test_msg_field_wins_over_session() {
        let key = resolve_session_key(&auth(Some(0), Some("sess"), Some("legacy"))).unwrap();
        assert_eq!(key, "legacy");
    }

    #[test]
    fn test_empty_msg_falls_back_to_session() {
        let key = resolve_session_key(&auth(Some(0), Some("sess"), Some(""))).unwrap();
        assert_eq!(key, "sess");
    }

    #[test]
    fn test_invalid_key_is_auth_error() {
        let err = resolve_session_key(&auth(Some(1), None, None)).unwrap_err();
        assert!(matches!(err, SessionError::Auth(_)));
    }

    #[test]
    fn test_empty_response_is_protocol_error() {
        let err = resolve_session_key(&AuthResponse::default()).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[test]
    fn test_success_without_key_is_protocol_error() {
        let err = resolve_session_key(&auth(Some(0), Some(""), None)).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[test]
    fn test_unknown_code_is_protocol_error() {
        let err = resolve_session_key(&auth(Some(5), Some("abc"), None)).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
