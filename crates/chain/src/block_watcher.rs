//! Monotonic new-block stream with a three-strategy ladder.
//!
//! Strategies are attempted in order and degrade on fatal setup failure:
//!
//! 1. WebSocket `eth_subscribe("newHeads")` with keep-alive and staleness
//!    checks. Once a connection has been established the watcher stays on
//!    WebSocket forever, re-sweeping the endpoint list on failure.
//! 2. HTTP block filter (`eth_newBlockFilter` / `eth_getFilterChanges`).
//! 3. Plain `eth_blockNumber` polling with exponential backoff.
//!
//! Whatever the strategy, block numbers are dispatched through a single
//! atomic high-water mark: consumers never observe a number less than or
//! equal to one already delivered.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::rpc::{parse_auth_header, RpcClient};

/// Subscription ack must arrive within this window.
const SUBSCRIBE_ACK_TIMEOUT: Duration = Duration::from_secs(5);
/// Application-level keep-alive cadence.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(300);
/// Connection-health check cadence.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(120);
/// A connection with no head for this long is stale.
const STALE_AFTER: Duration = Duration::from_secs(600);
/// Pause between endpoints after a connection failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
/// Pause after a full endpoint sweep fails.
const SWEEP_FAILURE_DELAY: Duration = Duration::from_secs(10);
/// Request id used for keep-alive probes.
const KEEPALIVE_ID: u64 = 999;

/// Filter / polling cadences, in milliseconds.
const FILTER_HOT_MS: u64 = 10;
const FILTER_IDLE_MS: u64 = 20;
const FILTER_ERROR_MS: u64 = 40;
const POLL_MIN_MS: u64 = 10;
const POLL_MAX_MS: u64 = 80;

/// Why a strategy loop returned.
enum Outcome {
    /// Fatal setup failure; fall through to the next strategy.
    Degrade,
    /// The running flag was cleared.
    Stopped,
}

pub struct BlockWatcher {
    rpc: Arc<RpcClient>,
    ws_urls: Vec<String>,
    ws_auth_header: Option<String>,
    running: Arc<AtomicBool>,
    last_block: AtomicU64,
}

impl BlockWatcher {
    pub fn new(rpc: Arc<RpcClient>, ws_urls: Vec<String>, ws_auth_header: Option<String>) -> Self {
        Self {
            rpc,
            ws_urls,
            ws_auth_header,
            running: Arc::new(AtomicBool::new(false)),
            last_block: AtomicU64::new(0),
        }
    }

    /// Spawn the watcher task. Block numbers arrive on the returned channel,
    /// strictly increasing, until `stop` is called.
    pub fn start(self: Arc<Self>) -> (mpsc::UnboundedReceiver<u64>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.running.store(true, Ordering::SeqCst);
        let watcher = self.clone();
        let handle = tokio::spawn(async move {
            watcher.run(tx).await;
            info!("block watcher exited");
        });
        (rx, handle)
    }

    /// Cooperative stop; outstanding network calls time out on their own.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Dispatch through the high-water mark; true when the number advanced
    /// and was delivered.
    fn dispatch(&self, tx: &mpsc::UnboundedSender<u64>, block: u64) -> bool {
        let prev = self.last_block.fetch_max(block, Ordering::AcqRel);
        if block > prev {
            let _ = tx.send(block);
            true
        } else {
            false
        }
    }

    async fn run(&self, tx: mpsc::UnboundedSender<u64>) {
        match self.run_ws(&tx).await {
            Outcome::Stopped => return,
            Outcome::Degrade => warn!("WebSocket unavailable, degrading to HTTP block filter"),
        }
        match self.run_filter(&tx).await {
            Outcome::Stopped => return,
            Outcome::Degrade => warn!("block filter unavailable, degrading to polling"),
        }
        self.run_polling(&tx).await;
    }

    // --- strategy 1: WebSocket subscription --------------------------------

    async fn run_ws(&self, tx: &mpsc::UnboundedSender<u64>) -> Outcome {
        if self.ws_urls.is_empty() {
            info!("no WebSocket endpoints configured");
            return Outcome::Degrade;
        }

        let mut ever_connected = false;
        loop {
            let mut connected_this_sweep = false;
            for url in &self.ws_urls {
                if !self.is_running() {
                    return Outcome::Stopped;
                }
                match self.ws_session(url, tx).await {
                    Ok(()) => {
                        // Session ran and ended (stale or dropped).
                        ever_connected = true;
                        connected_this_sweep = true;
                        if !self.is_running() {
                            return Outcome::Stopped;
                        }
                        warn!(url, "WebSocket session ended, reconnecting");
                        sleep(RECONNECT_DELAY).await;
                    }
                    Err(e) => {
                        warn!(url, error = %e, "WebSocket connect failed");
                        sleep(RECONNECT_DELAY).await;
                    }
                }
            }
            if !self.is_running() {
                return Outcome::Stopped;
            }
            if !connected_this_sweep {
                if !ever_connected {
                    // Nothing reachable on the first sweep: fatal setup.
                    return Outcome::Degrade;
                }
                warn!("all WebSocket endpoints failed, retrying in 10s");
                sleep(SWEEP_FAILURE_DELAY).await;
            }
        }
    }

    /// One connect / subscribe / read session. Ok(()) means the session was
    /// established and later ended; Err means it never came up.
    async fn ws_session(
        &self,
        url: &str,
        tx: &mpsc::UnboundedSender<u64>,
    ) -> anyhow::Result<()> {
        let mut request = url.into_client_request()?;
        if let Some(raw) = &self.ws_auth_header {
            let (name, value) = parse_auth_header(raw);
            request.headers_mut().insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(&value)?,
            );
        }

        let (stream, _) = connect_async(request).await?;
        let (mut write, mut read) = stream.split();
        info!(url, "WebSocket connected");

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newHeads"],
        });
        write.send(Message::Text(subscribe.to_string())).await?;

        // Wait for the subscription id.
        let ack = timeout(SUBSCRIBE_ACK_TIMEOUT, async {
            while let Some(msg) = read.next().await {
                if let Ok(Message::Text(text)) = msg {
                    if is_subscription_ack(&text) {
                        return true;
                    }
                }
            }
            false
        })
        .await;
        match ack {
            Ok(true) => info!(url, "newHeads subscription confirmed"),
            _ => anyhow::bail!("subscription not confirmed within 5s"),
        }

        let mut keepalive = interval(KEEPALIVE_INTERVAL);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.tick().await; // immediate first tick
        let mut health = interval(HEALTH_CHECK_INTERVAL);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        health.tick().await;
        let mut last_head = Instant::now();

        while self.is_running() {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if is_keepalive_reply(&text) {
                                debug!("keep-alive reply");
                                continue;
                            }
                            if let Some(block) = parse_head_number(&text) {
                                last_head = Instant::now();
                                if self.dispatch(tx, block) {
                                    debug!(block, "new head via WebSocket");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("WebSocket closed by peer");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket read error");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = keepalive.tick() => {
                    let probe = json!({
                        "jsonrpc": "2.0",
                        "id": KEEPALIVE_ID,
                        "method": "eth_blockNumber",
                        "params": [],
                    });
                    if write.send(Message::Text(probe.to_string())).await.is_err() {
                        warn!("keep-alive send failed");
                        return Ok(());
                    }
                }
                _ = health.tick() => {
                    if last_head.elapsed() > STALE_AFTER {
                        warn!("no heads for 10+ minutes, connection stale");
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    // --- strategy 2: HTTP block filter -------------------------------------

    async fn run_filter(&self, tx: &mpsc::UnboundedSender<u64>) -> Outcome {
        let filter_id = match self.rpc.new_block_filter().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "eth_newBlockFilter failed");
                return Outcome::Degrade;
            }
        };
        info!(filter_id, "block filter installed");

        let mut sleep_ms = FILTER_HOT_MS;
        while self.is_running() {
            match self.rpc.filter_changes(&filter_id).await {
                Ok(changes) if !changes.is_empty() => {
                    // Hashes only tell us blocks advanced; fetch the number.
                    if let Ok(block) = self.rpc.block_number().await {
                        if self.dispatch(tx, block) {
                            debug!(block, "new head via block filter");
                        }
                    }
                    sleep_ms = FILTER_HOT_MS;
                }
                Ok(_) => sleep_ms = FILTER_IDLE_MS,
                Err(e) => {
                    debug!(error = %e, "filter poll error");
                    sleep_ms = FILTER_ERROR_MS;
                }
            }
            sleep(Duration::from_millis(sleep_ms)).await;
        }

        self.rpc.uninstall_filter(&filter_id).await;
        Outcome::Stopped
    }

    // --- strategy 3: polling -----------------------------------------------

    async fn run_polling(&self, tx: &mpsc::UnboundedSender<u64>) {
        info!("polling eth_blockNumber");
        let mut backoff_ms = POLL_MIN_MS;
        while self.is_running() {
            match self.rpc.block_number().await {
                Ok(block) => {
                    backoff_ms = POLL_MIN_MS;
                    if self.dispatch(tx, block) {
                        debug!(block, "new head via polling");
                    }
                }
                Err(e) => {
                    debug!(error = %e, "poll error");
                    backoff_ms = next_backoff(backoff_ms);
                }
            }
            sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
}

/// Exponential backoff step, capped.
fn next_backoff(current_ms: u64) -> u64 {
    (current_ms * 2).min(POLL_MAX_MS)
}

/// A reply to our subscribe request: carries our id and a `result`.
fn is_subscription_ack(text: &str) -> bool {
    let Ok(v) = serde_json::from_str::<Value>(text) else {
        return false;
    };
    v.get("id").and_then(Value::as_u64) == Some(1) && v.get("result").is_some()
}

/// A reply to the keep-alive probe.
fn is_keepalive_reply(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_u64))
        == Some(KEEPALIVE_ID)
}

/// Extract the block number from a `newHeads` notification.
fn parse_head_number(text: &str) -> Option<u64> {
    let v: Value = serde_json::from_str(text).ok()?;
    let number = v.get("params")?.get("result")?.get("number")?.as_str()?;
    u64::from_str_radix(number.strip_prefix("0x").unwrap_or(number), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher() -> Arc<BlockWatcher> {
        let rpc = Arc::new(RpcClient::new("http://localhost:1", None, None).unwrap());
        Arc::new(BlockWatcher::new(rpc, vec![], None))
    }

    #[test]
    fn dispatch_is_strictly_monotonic() {
        let w = watcher();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(w.dispatch(&tx, 100));
        assert!(!w.dispatch(&tx, 100));
        assert!(!w.dispatch(&tx, 99));
        assert!(w.dispatch(&tx, 103));

        assert_eq!(rx.try_recv().unwrap(), 100);
        assert_eq!(rx.try_recv().unwrap(), 103);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_backoff(10), 20);
        assert_eq!(next_backoff(20), 40);
        assert_eq!(next_backoff(40), 80);
        assert_eq!(next_backoff(80), 80);
    }

    #[test]
    fn parses_new_head_notification() {
        let msg = r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{"number":"0x3b9aca1f","hash":"0x00"}}}"#;
        assert_eq!(parse_head_number(msg), Some(0x3b9aca1f));
        assert_eq!(parse_head_number("{}"), None);
        assert_eq!(parse_head_number("not json"), None);
    }

    #[test]
    fn recognizes_subscription_ack_and_keepalive() {
        assert!(is_subscription_ack(
            r#"{"jsonrpc":"2.0","id":1,"result":"0x9cd0"}"#
        ));
        assert!(!is_subscription_ack(
            r#"{"jsonrpc":"2.0","id":2,"result":"0x9cd0"}"#
        ));
        assert!(is_keepalive_reply(
            r#"{"jsonrpc":"2.0","id":999,"result":"0x10"}"#
        ));
        assert!(!is_keepalive_reply(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#));
    }
}
