// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The session process: owns the UDP listeners, the client whitelist and
//! the inactivity timer; tells the supervisor exactly one thing, ever.

use futures::{SinkExt, StreamExt};
use keepalive_common::sandbox::{self, Promises};
use keepalive_common::Endpoint;
use keepalive_ipc::{IpcError, SessionChannel, SessionMsg};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error("supervisor sent a listener record after the set was locked")]
    ListenerAfterLock,
    #[error("supervisor sent a client record after the set was locked")]
    ClientAfterLock,
    #[error("supervisor sent a record only the session may send")]
    BogusRecord,
    #[error("bind {addr}: {source}")]
    Bind {
        addr: Endpoint,
        #[source]
        source: io::Error,
    },
    #[error("recvfrom: {0}")]
    Recv(#[source] io::Error),
    #[error("sandbox: {0}")]
    Sandbox(#[source] io::Error),
    #[error("signal handler: {0}")]
    Signal(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Accepting configuration records; listeners are bound but not polled.
    Config,
    /// Listener set locked and polled; config records are violations.
    Listen,
}

/// What the event loop must do after a record was dispatched.
#[derive(Debug)]
enum Action {
    None,
    /// Bind a UDP socket and hold it unpolled until the lock.
    Bind(Endpoint),
    /// Tighten the sandbox and start polling the listener set.
    Lock,
    /// (Re)arm the inactivity timer.
    Arm(Duration),
}

/// Protocol and whitelist state, separated from the sockets and the timer
/// so record dispatch stays a pure transition.
struct Session {
    state: SessionState,
    clients: Vec<Endpoint>,
    timeout: Duration,
    /// The timer fires at most once per session lifetime.
    fired: bool,
}

impl Session {
    fn new() -> Self {
        Session {
            state: SessionState::Config,
            clients: Vec::new(),
            timeout: Duration::ZERO,
            fired: false,
        }
    }

    fn is_listening(&self) -> bool {
        self.state == SessionState::Listen
    }

    /// A datagram authorizes a timer reset iff its source address matches a
    /// whitelist entry, address bits only.
    fn authorized(&self, src: SocketAddr) -> bool {
        let src = Endpoint::new(src);
        self.clients.iter().any(|client| client.host_eq(&src))
    }

    fn dispatch(&mut self, msg: SessionMsg) -> Result<Action, SessionError> {
        match msg {
            SessionMsg::Client { addr } => {
                if self.is_listening() {
                    return Err(SessionError::ClientAfterLock);
                }
                self.clients.push(addr);
                Ok(Action::None)
            }
            SessionMsg::Listener { addr } => {
                if self.is_listening() {
                    return Err(SessionError::ListenerAfterLock);
                }
                Ok(Action::Bind(addr))
            }
            SessionMsg::ListenerDone => {
                self.state = SessionState::Listen;
                Ok(Action::Lock)
            }
            SessionMsg::Timeout { seconds } => {
                self.timeout = Duration::from_secs(seconds);
                if self.fired {
                    Ok(Action::None)
                } else {
                    Ok(Action::Arm(self.timeout))
                }
            }
            SessionMsg::Timer => Err(SessionError::BogusRecord),
        }
    }
}

fn bind_listener(addr: Endpoint) -> Result<UdpSocket, SessionError> {
    let wrap = |source| SessionError::Bind { addr, source };
    let sock = std::net::UdpSocket::bind(addr.addr()).map_err(wrap)?;
    sock.set_nonblocking(true).map_err(wrap)?;
    UdpSocket::from_std(sock).map_err(wrap)
}

/// Wait for one datagram on any listener. The payload is read and
/// discarded; only the source address matters. Pends forever while the
/// listener set is empty or unlocked.
async fn recv_any(listeners: &[UdpSocket], armed: bool) -> io::Result<SocketAddr> {
    if !armed || listeners.is_empty() {
        return std::future::pending().await;
    }
    let recvs: Vec<_> = listeners
        .iter()
        .map(|sock| {
            Box::pin(async move {
                let mut buf = [0u8; 1];
                sock.recv_from(&mut buf).await.map(|(_, src)| src)
            })
        })
        .collect();
    let (result, _, _) = futures::future::select_all(recvs).await;
    result
}

/// Pends forever while no timer is armed.
async fn timer_expired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

/// The session event loop.
///
/// Returns `Ok` when interrupted or when the supervisor closes the channel
/// in an orderly way, `Err` on protocol violations and I/O failures. After
/// the timer fires the loop keeps serving (and discarding) datagrams until
/// the supervisor reacts; it never exits on its own initiative.
pub async fn run<T>(channel: SessionChannel<T>) -> Result<(), SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = channel.split();
    let mut session = Session::new();
    let mut listeners: Vec<UdpSocket> = Vec::new();
    let mut timer: Option<Pin<Box<Sleep>>> = None;

    let mut sigint = signal(SignalKind::interrupt()).map_err(SessionError::Signal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(SessionError::Signal)?;

    loop {
        tokio::select! {
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            record = stream.next() => match record {
                // Orderly close: the supervisor is tearing us down.
                None => break,
                Some(Ok(msg)) => match session.dispatch(msg)? {
                    Action::None => {}
                    Action::Bind(addr) => listeners.push(bind_listener(addr)?),
                    Action::Lock => {
                        sandbox::pledge(Promises::Stdio).map_err(SessionError::Sandbox)?;
                        debug!(listeners = listeners.len(), "listener set locked");
                    }
                    Action::Arm(period) => match timer.as_mut() {
                        Some(pending) => pending.as_mut().reset(Instant::now() + period),
                        None => timer = Some(Box::pin(sleep(period))),
                    },
                },
                Some(Err(e)) => return Err(e.into()),
            },
            src = recv_any(&listeners, session.is_listening()) => {
                let src = src.map_err(SessionError::Recv)?;
                if session.authorized(src) {
                    if let Some(pending) = timer.as_mut() {
                        pending.as_mut().reset(Instant::now() + session.timeout);
                    }
                    // No pending timer: it already fired and the supervisor
                    // is on its way; drop the datagram.
                }
            },
            _ = timer_expired(&mut timer) => {
                timer = None;
                session.fired = true;
                warn!("no authorized liveness for {:?}, notifying supervisor", session.timeout);
                sink.send(SessionMsg::Timer).await?;
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_session() -> Session {
        let mut session = Session::new();
        assert!(matches!(
            session
                .dispatch(SessionMsg::Listener {
                    addr: "127.0.0.1:9000".parse().unwrap(),
                })
                .unwrap(),
            Action::Bind(_)
        ));
        session
            .dispatch(SessionMsg::Client {
                addr: "10.0.0.1".parse().unwrap(),
            })
            .unwrap();
        assert!(matches!(
            session.dispatch(SessionMsg::ListenerDone).unwrap(),
            Action::Lock
        ));
        session
    }

    #[test]
    fn config_records_are_violations_after_the_lock() {
        let mut session = configured_session();

        let err = session
            .dispatch(SessionMsg::Listener {
                addr: "127.0.0.1:9001".parse().unwrap(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::ListenerAfterLock));

        let err = session
            .dispatch(SessionMsg::Client {
                addr: "10.0.0.2".parse().unwrap(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::ClientAfterLock));
    }

    #[test]
    fn timeout_is_legal_in_either_state() {
        let mut session = Session::new();
        assert!(matches!(
            session.dispatch(SessionMsg::Timeout { seconds: 3 }).unwrap(),
            Action::Arm(period) if period == Duration::from_secs(3)
        ));

        let mut session = configured_session();
        assert!(matches!(
            session.dispatch(SessionMsg::Timeout { seconds: 5 }).unwrap(),
            Action::Arm(period) if period == Duration::from_secs(5)
        ));
    }

    #[test]
    fn timer_record_from_the_supervisor_is_a_violation() {
        let mut session = Session::new();
        assert!(matches!(
            session.dispatch(SessionMsg::Timer).unwrap_err(),
            SessionError::BogusRecord
        ));
    }

    #[test]
    fn no_rearm_after_the_timer_fired() {
        let mut session = configured_session();
        session.fired = true;
        assert!(matches!(
            session.dispatch(SessionMsg::Timeout { seconds: 3 }).unwrap(),
            Action::None
        ));
    }

    #[test]
    fn authorization_is_by_address_bits_only() {
        let session = configured_session();
        assert!(session.authorized("10.0.0.1:55555".parse().unwrap()));
        assert!(session.authorized("10.0.0.1:55556".parse().unwrap()));
        assert!(!session.authorized("10.0.0.2:55555".parse().unwrap()));
        assert!(!session.authorized("[::ffff:10.0.0.1]:55555".parse().unwrap()));
    }

    #[test]
    fn repeated_listener_done_is_idempotent() {
        let mut session = configured_session();
        assert!(matches!(
            session.dispatch(SessionMsg::ListenerDone).unwrap(),
            Action::Lock
        ));
        assert!(session.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_once_and_only_once() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let mut sup = keepalive_ipc::channel(sup_io);
        let task = tokio::spawn(run(keepalive_ipc::channel(ses_io)));

        sup.send(SessionMsg::ListenerDone).await.unwrap();
        sup.send(SessionMsg::Timeout { seconds: 300 }).await.unwrap();

        assert_eq!(sup.next().await.unwrap().unwrap(), SessionMsg::Timer);

        // A second fire would arrive instantly under the paused clock; the
        // channel must instead stay silent until we close our end.
        let silent = tokio::time::timeout(Duration::from_secs(3600), sup.next()).await;
        assert!(silent.is_err());

        drop(sup);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_record_rearms_a_pending_timer() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let mut sup = keepalive_ipc::channel(sup_io);
        let task = tokio::spawn(run(keepalive_ipc::channel(ses_io)));

        sup.send(SessionMsg::ListenerDone).await.unwrap();
        sup.send(SessionMsg::Timeout { seconds: 300 }).await.unwrap();
        sup.send(SessionMsg::Timeout { seconds: 600 }).await.unwrap();

        let started = Instant::now();
        assert_eq!(sup.next().await.unwrap().unwrap(), SessionMsg::Timer);
        assert!(started.elapsed() >= Duration::from_secs(600));

        drop(sup);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn listener_after_lock_kills_the_session() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let mut sup = keepalive_ipc::channel(sup_io);
        let task = tokio::spawn(run(keepalive_ipc::channel(ses_io)));

        sup.send(SessionMsg::ListenerDone).await.unwrap();
        sup.send(SessionMsg::Listener {
            addr: "127.0.0.1:0".parse().unwrap(),
        })
        .await
        .unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(SessionError::ListenerAfterLock)
        ));
        // The session dropped its end without sending anything.
        assert!(sup.next().await.is_none());
    }

    #[tokio::test]
    async fn orderly_close_is_a_clean_exit() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let sup = keepalive_ipc::channel(sup_io);
        let task = tokio::spawn(run(keepalive_ipc::channel(ses_io)));

        drop(sup);
        task.await.unwrap().unwrap();
    }
}
