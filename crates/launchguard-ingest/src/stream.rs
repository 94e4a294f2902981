use crate::filter::launch_from_notification;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use launchguard_core::constants::CREATE_INSTRUCTION_LOG;
use launchguard_core::types::LaunchEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Configuration for the program-log subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Primary RPC WebSocket URL
    #[serde(default = "default_primary_url")]
    pub primary_url: String,
    /// Failover URLs, tried in order after the primary
    #[serde(default)]
    pub backup_urls: Vec<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Delay after every URL in the rotation has failed
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// Log line that marks a token-creation instruction
    #[serde(default = "default_create_marker")]
    pub create_marker: String,
}

fn default_primary_url() -> String {
    "wss://api.mainnet-beta.solana.com/".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_commitment() -> String {
    "processed".to_string()
}

fn default_create_marker() -> String {
    CREATE_INSTRUCTION_LOG.to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            primary_url: default_primary_url(),
            backup_urls: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            commitment: default_commitment(),
            create_marker: default_create_marker(),
        }
    }
}

/// JSON-RPC request for Solana WebSocket subscriptions
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// JSON-RPC response from Solana WebSocket
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// WebSocket notification from Solana RPC
#[derive(Debug, Deserialize)]
pub struct WebSocketNotification {
    pub method: String,
    pub params: WebSocketNotificationParams,
}

#[derive(Debug, Deserialize)]
pub struct WebSocketNotificationParams {
    pub subscription: u64,
    pub result: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StreamStats {
    pub state: ConnectionState,
    pub current_url: String,
    pub connection_attempts: u32,
    pub successful_connections: u32,
    pub notifications_received: u64,
    pub launches_detected: u64,
    pub last_message_time: Option<Instant>,
}

/// What one inbound frame turned out to be.
#[derive(Debug, PartialEq)]
pub enum InboundMessage {
    SubscriptionConfirmed { request_id: u64, subscription_id: u64 },
    RpcError { code: i32, message: String },
    Launch(LaunchEvent),
    /// A logs notification that was not a successful creation
    Ignored,
    Unrecognized,
}

/// Subscribes to the target program's logs and forwards detected launches.
pub struct LogSubscriptionClient {
    config: StreamConfig,
    program_id: String,
    launch_sender: mpsc::UnboundedSender<LaunchEvent>,
    request_id: AtomicU64,
    stats: Arc<RwLock<StreamStats>>,
}

impl std::fmt::Debug for LogSubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSubscriptionClient")
            .field("config", &self.config)
            .field("program_id", &self.program_id)
            .finish_non_exhaustive()
    }
}

impl LogSubscriptionClient {
    /// Creates the client and the receiver its launch events arrive on.
    #[instrument(skip(config, program_id), fields(primary_url = %config.primary_url))]
    pub fn new(
        config: StreamConfig,
        program_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<LaunchEvent>) {
        let program_id = program_id.into();
        info!(program = %program_id, "Initializing log subscription client");

        let (launch_sender, launch_receiver) = mpsc::unbounded_channel();
        let stats = StreamStats {
            state: ConnectionState::Disconnected,
            current_url: config.primary_url.clone(),
            connection_attempts: 0,
            successful_connections: 0,
            notifications_received: 0,
            launches_detected: 0,
            last_message_time: None,
        };

        let client = Self {
            config,
            program_id,
            launch_sender,
            request_id: AtomicU64::new(1),
            stats: Arc::new(RwLock::new(stats)),
        };
        (client, launch_receiver)
    }

    /// Connection loop with failover. Returns only once the launch receiver
    /// has been dropped.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!("📡 Starting log subscription loop");

        let urls: Vec<String> = std::iter::once(self.config.primary_url.clone())
            .chain(self.config.backup_urls.iter().cloned())
            .collect();
        let mut url_index = 0usize;

        while !self.launch_sender.is_closed() {
            let url = &urls[url_index % urls.len()];
            {
                let mut stats = self.stats.write().await;
                stats.state = ConnectionState::Connecting;
                stats.current_url = url.clone();
                stats.connection_attempts += 1;
            }

            match self.connect_and_handle(url).await {
                Ok(()) => {
                    debug!(url = %url, "Log subscription closed");
                    if !self.launch_sender.is_closed() {
                        // A server that accepts and closes straight away must
                        // not turn this into a busy loop.
                        sleep(Duration::from_millis(self.config.reconnect_delay_ms)).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, url = %url, "Log subscription connection failed");
                    self.stats.write().await.state = ConnectionState::Failed;

                    url_index += 1;
                    if url_index % urls.len() == 0 {
                        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
                        warn!(?delay, "All URLs failed, waiting before retrying");
                        sleep(delay).await;
                    }
                }
            }

            self.stats.write().await.state = ConnectionState::Reconnecting;
        }

        info!("Launch receiver dropped, stopping log subscription");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn connect_and_handle(&self, url: &str) -> Result<()> {
        info!("Connecting to RPC WebSocket: {}", url);

        let parsed_url = Url::parse(url).context("Failed to parse WebSocket URL")?;
        let (ws_stream, response) = timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            connect_async(parsed_url),
        )
        .await
        .context("Connection timeout")?
        .context("Failed to connect to WebSocket")?;

        info!("✅ Connected to {} (HTTP {})", url, response.status());
        {
            let mut stats = self.stats.write().await;
            stats.state = ConnectionState::Connected;
            stats.successful_connections += 1;
            stats.last_message_time = Some(Instant::now());
        }

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let subscribe = logs_subscribe_request(request_id, &self.program_id, &self.config.commitment);
        let message = serde_json::to_string(&subscribe)
            .context("Failed to serialize logsSubscribe request")?;
        ws_sender
            .send(Message::Text(message))
            .await
            .context("Failed to send logsSubscribe request")?;
        info!(program = %self.program_id, request_id, "📡 Sent logsSubscribe request");

        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(e) = ws_sender.send(Message::Ping(Vec::new())).await {
                        warn!(error = %e, "Heartbeat ping failed");
                        break;
                    }
                    self.log_stats().await;
                }
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(&text).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(close_frame))) => {
                            info!("WebSocket closed: {:?}", close_frame);
                            break;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!("Received unexpected binary message: {} bytes", data.len());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket receive error");
                            break;
                        }
                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns false when the consumer is gone and the connection should close.
    async fn handle_text(&self, text: &str) -> bool {
        {
            let mut stats = self.stats.write().await;
            stats.last_message_time = Some(Instant::now());
        }

        match classify_message(text, &self.config.create_marker) {
            InboundMessage::SubscriptionConfirmed {
                request_id,
                subscription_id,
            } => {
                info!(request_id, subscription_id, "Subscription confirmed");
            }
            InboundMessage::RpcError { code, message } => {
                error!(code, message = %message, "JSON-RPC error from subscription");
            }
            InboundMessage::Launch(event) => {
                {
                    let mut stats = self.stats.write().await;
                    stats.notifications_received += 1;
                    stats.launches_detected += 1;
                }
                info!(
                    signature = %event.creation_tx_id,
                    slot = event.slot,
                    "🚀 Launch detected"
                );
                if self.launch_sender.send(event).is_err() {
                    return false;
                }
            }
            InboundMessage::Ignored => {
                self.stats.write().await.notifications_received += 1;
            }
            InboundMessage::Unrecognized => {
                debug!(message = %text, "Unrecognized WebSocket message");
            }
        }
        true
    }

    pub async fn get_stats(&self) -> StreamStats {
        self.stats.read().await.clone()
    }

    async fn log_stats(&self) {
        let stats = self.get_stats().await;
        let idle_secs = stats
            .last_message_time
            .map(|at| at.elapsed().as_secs())
            .unwrap_or_default();
        info!(
            state = ?stats.state,
            url = %stats.current_url,
            connection_attempts = stats.connection_attempts,
            successful_connections = stats.successful_connections,
            notifications = stats.notifications_received,
            launches = stats.launches_detected,
            idle_secs,
            "💓 Log subscription heartbeat"
        );
    }
}

pub fn logs_subscribe_request(id: u64, program_id: &str, commitment: &str) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id,
        method: "logsSubscribe".to_string(),
        params: serde_json::json!([
            { "mentions": [program_id] },
            { "commitment": commitment }
        ]),
    }
}

/// Parses one text frame. Responses carry an `id`; notifications a `method`.
pub fn classify_message(text: &str, create_marker: &str) -> InboundMessage {
    if let Ok(notification) = serde_json::from_str::<WebSocketNotification>(text) {
        if notification.method != "logsNotification" {
            return InboundMessage::Unrecognized;
        }
        return match launch_from_notification(&notification.params.result, create_marker) {
            Some(event) => InboundMessage::Launch(event),
            None => InboundMessage::Ignored,
        };
    }

    if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(text) {
        if let Some(error) = response.error {
            return InboundMessage::RpcError {
                code: error.code,
                message: error.message,
            };
        }
        if let (Some(request_id), Some(result)) = (response.id, response.result) {
            if let Some(subscription_id) = result.as_u64() {
                return InboundMessage::SubscriptionConfirmed {
                    request_id,
                    subscription_id,
                };
            }
        }
    }

    InboundMessage::Unrecognized
}
