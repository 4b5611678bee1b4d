use super::{FeedRoute, FeedSubscription, LiveFeed};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live feed over WebSocket: one connection per subscribed game channel.
pub struct WsLiveFeed {
    ws_url: String,
    reconnect_delay: Duration,
    teardown_timeout: Duration,
}

impl WsLiveFeed {
    pub fn new(ws_url: &str, reconnect_delay: Duration, teardown_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            reconnect_delay,
            teardown_timeout,
        }
    }
}

#[async_trait]
impl LiveFeed for WsLiveFeed {
    async fn subscribe(&self, channel: &str, route: FeedRoute) -> Result<Box<dyn FeedSubscription>> {
        let stream = connect(&self.ws_url, channel).await?;
        tracing::debug!(channel, game_id = %route.game_id, "live feed connected");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = Worker {
            ws_url: self.ws_url.clone(),
            channel: channel.to_string(),
            route,
            reconnect_delay: self.reconnect_delay,
        };
        let handle = tokio::spawn(worker.run(stream, shutdown_rx));

        Ok(Box::new(WsSubscription {
            channel: channel.to_string(),
            shutdown: Some(shutdown_tx),
            handle,
            teardown_timeout: self.teardown_timeout,
        }))
    }
}

pub struct WsSubscription {
    channel: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    teardown_timeout: Duration,
}

#[async_trait]
impl FeedSubscription for WsSubscription {
    async fn unsubscribe(mut self: Box<Self>) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(self.teardown_timeout, &mut self.handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!(e).context(format!("feed worker for {} failed", self.channel))),
            Err(_) => {
                self.handle.abort();
                anyhow::bail!("teardown of {} timed out, worker aborted", self.channel)
            }
        }
    }
}

enum Exit {
    Shutdown,
    Closed,
    ConsumerGone,
}

struct Worker {
    ws_url: String,
    channel: String,
    route: FeedRoute,
    reconnect_delay: Duration,
}

impl Worker {
    /// Forward frames until shut down; reconnect on disconnect.
    async fn run(self, mut stream: WsStream, mut shutdown: oneshot::Receiver<()>) {
        loop {
            match self.listen(&mut stream, &mut shutdown).await {
                Ok(Exit::Shutdown) => {
                    tracing::debug!(channel = %self.channel, "live feed unsubscribed");
                    return;
                }
                Ok(Exit::ConsumerGone) => {
                    tracing::debug!(channel = %self.channel, "event consumer gone, closing feed");
                    let _ = stream.close(None).await;
                    return;
                }
                Ok(Exit::Closed) => {
                    tracing::warn!(channel = %self.channel, "live feed closed, reconnecting...");
                }
                Err(e) => {
                    tracing::error!(
                        channel = %self.channel,
                        "live feed error: {:#}, reconnecting in {}s...",
                        e,
                        self.reconnect_delay.as_secs()
                    );
                }
            }

            loop {
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(self.reconnect_delay) => {}
                }
                match connect(&self.ws_url, &self.channel).await {
                    Ok(s) => {
                        stream = s;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(channel = %self.channel, "live feed reconnect failed: {:#}", e);
                    }
                }
            }
        }
    }

    async fn listen(&self, stream: &mut WsStream, shutdown: &mut oneshot::Receiver<()>) -> Result<Exit> {
        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    let unsub = serde_json::json!({
                        "cmd": "unsubscribe",
                        "channel": self.channel,
                    });
                    let _ = stream.send(Message::Text(unsub.to_string())).await;
                    let _ = stream.close(None).await;
                    return Ok(Exit::Shutdown);
                }
                msg = stream.next() => {
                    let Some(msg) = msg else { return Ok(Exit::Closed) };
                    match msg.context("WS read error")? {
                        Message::Text(text) => {
                            if !self.route.deliver(text).await {
                                return Ok(Exit::ConsumerGone);
                            }
                        }
                        Message::Ping(data) => {
                            stream.send(Message::Pong(data)).await?;
                        }
                        Message::Close(_) => {
                            tracing::debug!(channel = %self.channel, "live feed received close frame");
                            return Ok(Exit::Closed);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

async fn connect(ws_url: &str, channel: &str) -> Result<WsStream> {
    let (mut stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .with_context(|| format!("WS connection to {} failed", ws_url))?;

    let sub = serde_json::json!({
        "cmd": "subscribe",
        "channel": channel,
    });
    stream
        .send(Message::Text(sub.to_string()))
        .await
        .context("WS subscribe failed")?;
    Ok(stream)
}
