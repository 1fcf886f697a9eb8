// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The supervisor's half of the channel: push the configuration, then wait
//! for the one record the session may send, the timer expiry.

use crate::config::Config;
use futures::{SinkExt, StreamExt};
use keepalive_ipc::{IpcError, SessionChannel, SessionMsg};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error("session sent an unexpected record")]
    BogusRecord,
    #[error("session closed the channel unexpectedly")]
    ChannelClosed,
    #[error("signal handler: {0}")]
    Signal(#[source] io::Error),
}

/// Push the configuration and dispatch events until something breaks the
/// loop. `Ok(true)` means the session reported an expired inactivity timer
/// and shutdown is authorized; `Ok(false)` is a clean interrupt. Any channel
/// irregularity is an error and never authorizes shutdown.
pub async fn run<T>(channel: SessionChannel<T>, config: &Config) -> Result<bool, SupervisorError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = channel.split();

    // Enqueued here, drained by the flush branch below. Listeners must all
    // be bound before ListenerDone locks the set; the timeout goes last so
    // the timer only starts once the session is fully configured.
    for listener in &config.listeners {
        sink.feed(SessionMsg::Listener { addr: *listener }).await?;
    }
    for client in &config.clients {
        sink.feed(SessionMsg::Client { addr: *client }).await?;
    }
    sink.feed(SessionMsg::ListenerDone).await?;
    sink.feed(SessionMsg::Timeout {
        seconds: config.timeout.as_secs(),
    })
    .await?;

    let mut sigint = signal(SignalKind::interrupt()).map_err(SupervisorError::Signal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(SupervisorError::Signal)?;
    let mut sigchld = signal(SignalKind::child()).map_err(SupervisorError::Signal)?;

    let mut flushed = false;
    loop {
        tokio::select! {
            _ = sigint.recv() => return Ok(false),
            _ = sigterm.recv() => return Ok(false),
            _ = sigchld.recv() => {
                // The loop ends when the channel does; teardown reaps.
                debug!("session process changed state");
            }
            flush = sink.flush(), if !flushed => {
                flush?;
                flushed = true;
                debug!("configuration pushed to session");
            }
            record = stream.next() => match record {
                None => {
                    warn!("session closed the channel");
                    return Err(SupervisorError::ChannelClosed);
                }
                Some(Ok(SessionMsg::Timer)) => return Ok(true),
                Some(Ok(record)) => {
                    warn!(?record, "session sent a record it has no business sending");
                    return Err(SupervisorError::BogusRecord);
                }
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepalive_common::Endpoint;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            listeners: vec!["0.0.0.0:9000".parse().unwrap()],
            clients: vec![
                "10.0.0.1".parse().unwrap(),
                "2001:db8::1".parse().unwrap(),
            ],
            timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn configuration_is_pushed_in_order() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let config = test_config();
        let expected_listener: Endpoint = "0.0.0.0:9000".parse().unwrap();

        let task = tokio::spawn(async move { run(keepalive_ipc::channel(sup_io), &config).await });

        let mut session = keepalive_ipc::channel(ses_io);
        assert_eq!(
            session.next().await.unwrap().unwrap(),
            SessionMsg::Listener {
                addr: expected_listener
            }
        );
        assert_eq!(
            session.next().await.unwrap().unwrap(),
            SessionMsg::Client {
                addr: "10.0.0.1".parse().unwrap()
            }
        );
        assert_eq!(
            session.next().await.unwrap().unwrap(),
            SessionMsg::Client {
                addr: "2001:db8::1".parse().unwrap()
            }
        );
        assert_eq!(
            session.next().await.unwrap().unwrap(),
            SessionMsg::ListenerDone
        );
        assert_eq!(
            session.next().await.unwrap().unwrap(),
            SessionMsg::Timeout { seconds: 3 }
        );

        session.send(SessionMsg::Timer).await.unwrap();
        assert!(task.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn timer_record_authorizes_shutdown() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let config = test_config();
        let task = tokio::spawn(async move { run(keepalive_ipc::channel(sup_io), &config).await });

        let mut session = keepalive_ipc::channel(ses_io);
        session.send(SessionMsg::Timer).await.unwrap();

        assert!(task.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn any_other_record_is_an_error() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let config = test_config();
        let task = tokio::spawn(async move { run(keepalive_ipc::channel(sup_io), &config).await });

        let mut session = keepalive_ipc::channel(ses_io);
        session.send(SessionMsg::ListenerDone).await.unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(SupervisorError::BogusRecord)
        ));
    }

    #[tokio::test]
    async fn vanishing_session_never_authorizes_shutdown() {
        let (sup_io, ses_io) = tokio::io::duplex(1024);
        let config = test_config();
        let task = tokio::spawn(async move { run(keepalive_ipc::channel(sup_io), &config).await });

        let mut session = keepalive_ipc::channel(ses_io);
        // Drain the configuration, then die without a word.
        for _ in 0..5 {
            session.next().await.unwrap().unwrap();
        }
        drop(session);

        assert!(matches!(
            task.await.unwrap(),
            Err(SupervisorError::ChannelClosed)
        ));
    }
}
