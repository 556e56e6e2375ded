//! The connection supervisor.
//!
//! One task per session owns the transport. It performs the DDP handshake,
//! runs the serial dispatch loop, sends heartbeats and queued messages, and
//! reconnects with back-off when the transport is lost.

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{mpsc, oneshot},
    time::{Instant, Interval, MissedTickBehavior, interval_at, sleep, timeout},
};
use tracing::{debug, info, warn};

use super::{
    ConnectionState,
    SessionError,
    SessionEvent,
    Shared,
    auth::{self, LOGIN_METHOD},
};
use crate::{
    frame::{CloseCode, CloseFrame},
    message::{DdpMessage, Inbound},
    message_assembler::DataMessage,
    metrics::{self, Direction},
    registry::CallRegistry,
    transport::{Transport, TransportError, TransportReader, TransportSender},
};

/// Reports the outcome of the first connect to the caller.
pub(crate) type ReadySignal = oneshot::Sender<Result<(), SessionError>>;

struct Link {
    reader: TransportReader,
    sender: TransportSender,
}

struct Established {
    link: Link,
    session: String,
    version: String,
}

enum HandshakeReply {
    Connected(String),
    Failed(String),
}

enum Exit {
    Shutdown,
    Lost(String),
}

struct Heartbeat {
    ticker: Interval,
    deadline: Duration,
}

/// Drive a session until it is closed.
///
/// A failed first connect is reported through `ready` and ends the task;
/// later failures are retried with back-off.
pub(crate) async fn run(
    shared: Arc<Shared>,
    mut outbound: mpsc::UnboundedReceiver<DdpMessage>,
    ready: ReadySignal,
) {
    let mut ready = Some(ready);
    let mut carry = Vec::new();
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        shared.set_state(ConnectionState::Connecting);
        let established = select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            result = establish(&shared) => result,
        };

        match established {
            Ok(Established {
                mut link,
                session,
                version,
            }) => {
                if let Err(err) = resume(&shared, &link.sender, &mut outbound, &mut carry).await {
                    warn!(error = %err, "connection lost while restoring session state");
                    shared.set_state(ConnectionState::Disconnected);
                } else {
                    attempt = 0;
                    shared.set_session_id(session.clone());
                    shared.set_state(ConnectionState::Connected);
                    metrics::inc_connections();
                    info!(session = %session, version = %version, "connected");
                    shared.emit(if connected_before {
                        SessionEvent::Reconnected { session }
                    } else {
                        SessionEvent::Connected { session }
                    });
                    connected_before = true;
                    if let Some(tx) = ready.take()
                        && tx.send(Ok(())).is_err()
                    {
                        debug!("connect caller went away");
                    }

                    let exit = pump(&shared, &mut link, &mut outbound, &mut carry).await;
                    metrics::dec_connections();
                    match exit {
                        Exit::Shutdown => {
                            if let Err(err) = link.sender.close(CloseCode::NORMAL, "").await {
                                debug!(error = %err, "close frame not sent");
                            }
                            break;
                        }
                        Exit::Lost(reason) => {
                            warn!(reason = %reason, "connection lost");
                            shared.set_state(ConnectionState::Disconnected);
                            shared.emit(SessionEvent::Disconnected { reason });
                        }
                    }
                }
            }
            Err(err) => {
                metrics::inc_errors(err.error_type());
                shared.set_state(match err {
                    SessionError::ConnectTimeout(_) => ConnectionState::TimedOut,
                    _ => ConnectionState::Disconnected,
                });
                if let Some(tx) = ready.take() {
                    warn!(error = %err, "connect failed");
                    if tx.send(Err(err)).is_err() {
                        debug!("connect caller went away");
                    }
                    break;
                }
                warn!(attempt, error = %err, "reconnect attempt failed");
            }
        }

        let delay = shared.config.backoff.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        metrics::inc_reconnects();
        info!(attempt, delay = ?delay, "reconnecting");
        select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            () = sleep(delay) => {}
        }
    }

    shared.registry.abandon_all();
    shared.state.send_if_modified(|state| {
        if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
            *state = ConnectionState::Disconnected;
            true
        } else {
            false
        }
    });
    debug!("session supervisor stopped");
}

async fn establish(shared: &Shared) -> Result<Established, SessionError> {
    let limit = shared.config.connect_timeout;
    match timeout(limit, negotiate(shared)).await {
        Ok(Err(SessionError::Transport(TransportError::HandshakeTimeout(_)))) | Err(_) => {
            Err(SessionError::ConnectTimeout(limit))
        }
        Ok(result) => result,
    }
}

async fn open(shared: &Shared) -> Result<Link, SessionError> {
    let transport = Transport::connect(&shared.url, &shared.config.transport).await?;
    let (reader, sender) = transport.split();
    debug!(url = %shared.url, "transport open");
    Ok(Link { reader, sender })
}

/// Send `connect` and follow `failed` replies to a version both sides
/// accept. Each server-proposed version is tried once.
async fn negotiate(shared: &Shared) -> Result<Established, SessionError> {
    let config = &shared.config;
    let mut version = config.preferred_version().to_owned();
    let mut tried: Vec<String> = Vec::new();
    let mut reusable: Option<Link> = None;

    loop {
        let reused = reusable.is_some();
        let mut link = match reusable.take() {
            Some(link) => link,
            None => open(shared).await?,
        };
        if !tried.contains(&version) {
            tried.push(version.clone());
        }
        let mut support = config.protocol_versions.clone();
        if !support.contains(&version) {
            support.push(version.clone());
        }
        let connect = DdpMessage::connect(&version, &support);

        let reply = match send(&link.sender, &connect).await {
            Ok(()) => await_reply(&mut link).await,
            Err(err) => Err(err),
        };
        match reply {
            Ok(HandshakeReply::Connected(session)) => {
                return Ok(Established {
                    link,
                    session,
                    version,
                });
            }
            Ok(HandshakeReply::Failed(proposed)) => {
                if tried.contains(&proposed) {
                    return Err(SessionError::VersionMismatch { proposed, tried });
                }
                info!(proposed = %proposed, rejected = %version, "server requested another protocol version");
                version = proposed;
                reusable = Some(link);
            }
            Err(err) if reused => {
                debug!(error = %err, "transport closed after version negotiation; reopening");
            }
            Err(err) => return Err(err),
        }
    }
}

async fn await_reply(link: &mut Link) -> Result<HandshakeReply, SessionError> {
    loop {
        let message = match link.reader.next_message().await {
            Ok(Some(message)) => message,
            Ok(None) | Err(TransportError::StreamClosed) => return Err(SessionError::NotConnected),
            Err(err) => return Err(err.into()),
        };
        let DataMessage::Text(text) = message else {
            debug!("binary message during handshake ignored");
            continue;
        };
        metrics::inc_messages(Direction::Inbound);
        match Inbound::decode(&text) {
            Ok(Inbound::Message(DdpMessage::Connected { session })) => {
                return Ok(HandshakeReply::Connected(session));
            }
            Ok(Inbound::Message(DdpMessage::Failed { version })) => {
                return Ok(HandshakeReply::Failed(version));
            }
            Ok(Inbound::Message(DdpMessage::Ping { id })) => {
                send(&link.sender, &DdpMessage::Pong { id }).await?;
            }
            Ok(Inbound::ServerId(id)) => debug!(server_id = %id, "server greeting"),
            Ok(other) => debug!(message = ?other, "message before handshake ignored"),
            Err(err) => warn!(error = %err, "malformed message during handshake dropped"),
        }
    }
}

/// Restore session state on a fresh connection: replay the resume login,
/// reissue subscriptions, then flush method calls queued while offline.
async fn resume(
    shared: &Arc<Shared>,
    sender: &TransportSender,
    outbound: &mut mpsc::UnboundedReceiver<DdpMessage>,
    carry: &mut Vec<DdpMessage>,
) -> Result<(), SessionError> {
    let mut queued = std::mem::take(carry);
    while let Ok(message) = outbound.try_recv() {
        match message {
            DdpMessage::Method { .. } => queued.push(message),
            stale => debug!(msg = stale.kind(), "dropping message queued while disconnected"),
        }
    }

    let restored = async {
        if let Some(token) = shared.resume_token() {
            let (call, login) = shared
                .registry
                .register_method(LOGIN_METHOD, auth::resume_params(&token));
            send(sender, &login).await?;
            auth::watch_login(shared, call);
        }
        shared.registry.settle_answered();
        shared.collections.set_all_ready(false);
        for sub in shared.registry.resubscribe_all() {
            send(sender, &sub).await?;
        }
        while let Some(method) = queued.first() {
            send(sender, method).await?;
            queued.remove(0);
        }
        Ok::<_, SessionError>(())
    }
    .await;
    carry.extend(queued);
    restored
}

/// Whether `message` is a `sub` whose id no longer belongs to an active
/// subscription, because resubscription reissued it or it was stopped.
pub(super) fn superseded(registry: &CallRegistry, message: &DdpMessage) -> bool {
    matches!(message, DdpMessage::Sub { id, .. } if !registry.has_subscription(id))
}

async fn tick(heartbeat: Option<&mut Heartbeat>) {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// The serial dispatch loop for one connection.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn pump(
    shared: &Shared,
    link: &mut Link,
    outbound: &mut mpsc::UnboundedReceiver<DdpMessage>,
    carry: &mut Vec<DdpMessage>,
) -> Exit {
    let dispatcher = shared.dispatcher();
    let mut heartbeat = shared.config.heartbeat.map(|config| {
        let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Heartbeat {
            ticker,
            deadline: config.deadline(),
        }
    });
    let mut last_seen = Instant::now();

    loop {
        select! {
            biased;
            () = shared.shutdown.cancelled() => return Exit::Shutdown,
            inbound = link.reader.next_message() => {
                last_seen = Instant::now();
                match inbound {
                    Ok(Some(DataMessage::Text(text))) => {
                        metrics::inc_messages(Direction::Inbound);
                        if let Some(reply) = dispatcher.handle_text(&text)
                            && let Err(err) = send(&link.sender, &reply).await
                        {
                            return Exit::Lost(err.to_string());
                        }
                    }
                    Ok(Some(DataMessage::Binary(payload))) => {
                        debug!(len = payload.len(), "binary message ignored");
                    }
                    Ok(None) => return Exit::Lost(describe_close(link.reader.close_frame())),
                    Err(err) => {
                        metrics::inc_errors(err.error_type());
                        return Exit::Lost(err.to_string());
                    }
                }
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    return Exit::Shutdown;
                };
                if superseded(&shared.registry, &message) {
                    debug!(msg = message.kind(), "skipping sub for an inactive subscription id");
                } else if let Err(err) = send(&link.sender, &message).await {
                    if matches!(message, DdpMessage::Method { .. }) {
                        carry.push(message);
                    }
                    return Exit::Lost(err.to_string());
                }
            }
            () = tick(heartbeat.as_mut()) => {
                let deadline = heartbeat.as_ref().map_or(Duration::MAX, |hb| hb.deadline);
                if last_seen.elapsed() >= deadline {
                    metrics::inc_errors("heartbeat");
                    return Exit::Lost(format!("no traffic from server for {deadline:?}"));
                }
                if let Err(err) = send(&link.sender, &DdpMessage::Ping { id: None }).await {
                    return Exit::Lost(err.to_string());
                }
            }
        }
    }
}

fn describe_close(frame: Option<CloseFrame>) -> String {
    match frame {
        Some(frame) if frame.reason.is_empty() => {
            format!("server closed the connection ({})", frame.code)
        }
        Some(frame) => format!(
            "server closed the connection ({}: {})",
            frame.code, frame.reason
        ),
        None => "server closed the connection".to_owned(),
    }
}

async fn send(sender: &TransportSender, message: &DdpMessage) -> Result<(), SessionError> {
    let text = message.encode()?;
    sender.send_text(text).await?;
    metrics::inc_messages(Direction::Outbound);
    debug!(msg = message.kind(), "sent");
    Ok(())
}
