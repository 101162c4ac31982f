//! `uprelay serve`: run the relay and accept downstream WebSocket clients.
//!
//! Every accepted socket becomes a channel-backed subscriber. A per-socket
//! writer task drains the channel with a send timeout, so one stalled
//! client costs only its own queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uprelay_core::{ChannelSubscriber, ConnectionState, Relay};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::error::CliError;

/// Messages buffered per subscriber before new ones are dropped for it.
const SUBSCRIBER_QUEUE: usize = 256;
const HEALTH_INTERVAL: Duration = Duration::from_secs(60);

pub async fn handle(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut config = uprelay_config::load_config(global.config.as_deref())?;
    if let Some(url) = args.upstream {
        config.upstream.url = url;
    }
    if let Some(addr) = args.listen {
        config.listen.addr = addr;
    }

    let addr = config.listen_addr()?;
    let relay_config = config.to_relay_config()?;
    let send_timeout = relay_config.subscriber_send_timeout;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind { addr, source })?;
    let relay = Relay::new(relay_config);
    relay.start().await?;
    info!(%addr, "accepting subscribers");

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut health = tokio::time::interval(HEALTH_INTERVAL);
    health.tick().await;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "cannot listen for Ctrl-C, shutting down");
                }
                break;
            }
            _ = health.tick() => log_health(&relay),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_subscriber(
                        relay.clone(),
                        stream,
                        peer,
                        send_timeout,
                        cancel.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }

    info!("shutting down");
    relay.shutdown().await;
    cancel.cancel();
    Ok(())
}

fn log_health(relay: &Relay) {
    let health = relay.health();
    if health.state == ConnectionState::Failed {
        warn!(
            subscribers = health.subscriber_count,
            "upstream retries exhausted, relay is not connected"
        );
    } else {
        info!(
            connected = health.connected,
            upstream_connected = health.upstream_connected,
            subscribers = health.subscriber_count,
            reconnect_attempts = health.reconnect_attempts,
            "health"
        );
    }
}

/// Attach one downstream socket and pump envelopes into it.
///
/// Subscribers are read-only: inbound text is ignored, inbound close or
/// error detaches.
async fn serve_subscriber(
    relay: Relay,
    stream: TcpStream,
    peer: SocketAddr,
    send_timeout: Duration,
    cancel: CancellationToken,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let (subscriber, mut outbound) = ChannelSubscriber::new(SUBSCRIBER_QUEUE);
    let id = relay.attach(Arc::new(subscriber));
    debug!(%peer, subscriber = %id, "websocket subscriber connected");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = outbound.recv() => {
                let Some(text) = next else {
                    // Detached by the hub.
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(%peer, error = %e, "close frame not delivered");
                    }
                    break;
                };
                match tokio::time::timeout(send_timeout, sink.send(Message::text(text.to_string()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        relay.on_error(id, &e);
                        break;
                    }
                    Err(_) => {
                        relay.on_error(id, &"send timed out");
                        break;
                    }
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    relay.on_close(id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    relay.on_error(id, &e);
                    break;
                }
            },
        }
    }
    debug!(%peer, subscriber = %id, "websocket subscriber finished");
}
