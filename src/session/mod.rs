//! DDP sessions.
//!
//! A [`Session`] owns one supervised connection to a DDP server together
//! with the local document cache and the call registry it feeds. Handles are
//! cheap to clone; the connection shuts down when the last handle is dropped
//! or [`Session::close`] is called.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cache::{Collection, CollectionStore, SnapshotError, SnapshotSource, SnapshotStats, parse_snapshot},
    message::DdpMessage,
    registry::{CallRegistry, MethodCall, Subscription},
    transport::WsUrl,
};

mod auth;
mod builder;
mod config;
mod dispatch;
mod error;
mod state;
mod supervisor;

pub use auth::{LOGIN_METHOD, LOGOUT_METHOD, LoginResult, resume_params};
pub use builder::SessionBuilder;
pub use config::{BackoffConfig, BackoffPolicy, HeartbeatConfig, SessionConfig};
pub use dispatch::Dispatcher;
pub use error::SessionError;
pub use state::{ConnectionState, SessionEvent};

const EVENT_CAPACITY: usize = 64;

/// State shared between session handles and the supervisor task.
pub(crate) struct Shared {
    config: SessionConfig,
    url: WsUrl,
    collections: Arc<CollectionStore>,
    registry: Arc<CallRegistry>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<SessionEvent>,
    session_id: Mutex<Option<String>>,
    resume_token: Mutex<Option<String>>,
    shutdown: CancellationToken,
}

impl Shared {
    fn new(
        config: SessionConfig,
        url: WsUrl,
        outbound: mpsc::UnboundedSender<DdpMessage>,
    ) -> Self {
        let registry = Arc::new(CallRegistry::new(outbound, config.call_timeout));
        let resume_token = Mutex::new(config.resume_token.clone());
        Self {
            config,
            url,
            collections: Arc::new(CollectionStore::new()),
            registry,
            state: watch::Sender::new(ConnectionState::Disconnected),
            events: broadcast::Sender::new(EVENT_CAPACITY),
            session_id: Mutex::new(None),
            resume_token,
            shutdown: CancellationToken::new(),
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.collections), Arc::clone(&self.registry))
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "connection state changed");
            *state = next;
            true
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("no session event listeners");
        }
    }

    fn set_session_id(&self, id: String) {
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_resume_token(&self, token: Option<String>) {
        *self.resume_token.lock().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn resume_token(&self) -> Option<String> {
        self.resume_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_closed(&self) -> bool { self.shutdown.is_cancelled() }
}

struct SessionInner {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) { self.shared.shutdown.cancel(); }
}

/// A connected DDP client.
///
/// # Examples
///
/// ```no_run
/// use ddpwire::session::Session;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::connect("ws://localhost:3000/websocket").await?;
/// let todos = session.collection("todos");
/// session.subscribe("todos", Vec::new())?.ready().await?;
/// println!("{} todos", todos.len());
///
/// let echoed = session.call("echo", vec![json!("hi")])?.result().await?;
/// assert_eq!(echoed, json!("hi"));
/// session.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.shared().url.to_string())
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start configuring a session.
    #[must_use]
    pub fn builder() -> SessionBuilder { SessionBuilder::new() }

    /// Connect with default settings.
    ///
    /// # Errors
    ///
    /// See [`SessionBuilder::connect`].
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        Self::builder().connect(url).await
    }

    fn from_parts(shared: Arc<Shared>, supervisor: JoinHandle<()>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                shared,
                supervisor: Mutex::new(Some(supervisor)),
            }),
        }
    }

    fn shared(&self) -> &Shared { &self.inner.shared }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.shared().is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Call a server method.
    ///
    /// The call is queued immediately; while disconnected it is held until
    /// the next handshake completes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`Session::close`].
    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<MethodCall, SessionError> {
        self.ensure_open()?;
        let registry = &self.shared().registry;
        let (call, message) = registry.register_method(method, params);
        registry.enqueue(message);
        Ok(call)
    }

    /// Subscribe to a publication.
    ///
    /// Subscribing again with the same name and parameters while the first
    /// request is pending returns a handle to the same subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`Session::close`].
    pub fn subscribe(&self, name: &str, params: Vec<Value>) -> Result<Subscription, SessionError> {
        self.ensure_open()?;
        let registry = &self.shared().registry;
        let (subscription, message) = registry.register_subscription(name, params);
        if let Some(message) = message {
            registry.enqueue(message);
        }
        Ok(subscription)
    }

    /// Declare and return the collection called `name`.
    #[must_use]
    pub fn collection(&self, name: &str) -> Arc<Collection> { self.shared().collections.declare(name) }

    /// Look up a collection without declaring it.
    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.shared().collections.get(name)
    }

    /// Every collection of this session.
    #[must_use]
    pub fn collections(&self) -> &CollectionStore { &self.shared().collections }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { *self.shared().state.borrow() }

    /// Watch connection state changes.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> { self.shared().state.subscribe() }

    /// Receive lifecycle events from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> { self.shared().events.subscribe() }

    /// Server-assigned id of the current or last connection.
    #[must_use]
    pub fn session_id(&self) -> Option<String> { self.shared().session_id() }

    /// Log in with a resume token.
    ///
    /// The token is stored at once and replayed on every reconnect. A
    /// successful result replaces it with the token the server returns; a
    /// rejection discards it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`Session::close`].
    pub fn login_with_token(&self, token: &str) -> Result<MethodCall, SessionError> {
        self.ensure_open()?;
        self.shared().set_resume_token(Some(token.to_owned()));
        let call = self.call(LOGIN_METHOD, resume_params(token))?;
        auth::watch_login(&self.inner.shared, call.clone());
        Ok(call)
    }

    /// Log out and forget the stored token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`Session::close`].
    pub fn logout(&self) -> Result<MethodCall, SessionError> {
        self.ensure_open()?;
        self.shared().set_resume_token(None);
        self.call(LOGOUT_METHOD, Vec::new())
    }

    /// The stored resume token.
    #[must_use]
    pub fn resume_token(&self) -> Option<String> { self.shared().resume_token() }

    /// Fetch a snapshot of `name` from `source` and merge it into the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when fetching or parsing fails; the cache
    /// is left untouched in that case.
    pub async fn load_snapshot(
        &self,
        name: &str,
        source: &dyn SnapshotSource,
    ) -> Result<SnapshotStats, SnapshotError> {
        let text = source.fetch(name).await?;
        let docs = parse_snapshot(&text)?;
        Ok(self.collection(name).merge_snapshot(docs))
    }

    /// Whether [`Session::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared().is_closed() }

    /// Close the connection and stop the supervisor.
    ///
    /// Pending calls fail with a session-closed error and subscriptions stop.
    /// Further operations return [`SessionError::Closed`].
    pub async fn close(&self) {
        self.shared().shutdown.cancel();
        let handle = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            debug!(error = %err, "session supervisor ended abnormally");
        }
    }
}
