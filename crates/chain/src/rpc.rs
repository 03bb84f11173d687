//! Single-host JSON-RPC client over HTTP POST.
//!
//! One public endpoint for reads and submission, plus an optional second
//! endpoint used for "private" transaction submission. Both receive the same
//! JSON-RPC payloads; no relay envelope is assumed. Auth is a single
//! configurable header ("Name: Value" form, or a bare value sent as
//! `Authorization`).

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Closed set of failure kinds for JSON-RPC interaction.
///
/// Reads downgrade gracefully on `Rpc`/`Parse` (callers map to zero/default);
/// submissions abort on any kind.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("http status {0}")]
    Status(u16),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("parse: {0}")]
    Parse(String),
}

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client bound to one public endpoint and an optional private
/// submission endpoint.
pub struct RpcClient {
    http: reqwest::Client,
    public_url: String,
    private_url: Option<String>,
    headers: HeaderMap,
}

impl RpcClient {
    /// Build a client. `auth_header` accepts `"X-Api-Key: abc"` or a bare
    /// value, which is sent as `Authorization`.
    pub fn new(
        public_url: impl Into<String>,
        private_url: Option<String>,
        auth_header: Option<&str>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(10))
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(raw) = auth_header {
            let (name, value) = parse_auth_header(raw);
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(&value)?,
            );
        }

        Ok(Self {
            http,
            public_url: public_url.into(),
            private_url,
            headers,
        })
    }

    /// The public endpoint URL (for telemetry).
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Whether a dedicated private submission endpoint is configured.
    pub fn has_private_endpoint(&self) -> bool {
        self.private_url.is_some()
    }

    async fn post(&self, url: &str, payload: &Value) -> RpcResult<Value> {
        let resp = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(payload)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }
        Ok(resp.json::<Value>().await?)
    }

    /// Issue one request against the public endpoint and unwrap `result`.
    pub async fn request(&self, method: &str, params: Value) -> RpcResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let body = self.post(&self.public_url, &payload).await?;
        let resp: RpcResponse =
            serde_json::from_value(body).map_err(|e| RpcError::Parse(e.to_string()))?;
        if let Some(err) = resp.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        resp.result
            .ok_or_else(|| RpcError::Parse("missing result".into()))
    }

    /// Issue a batch of `eth_call`s in one HTTP round trip. Responses are
    /// correlated by the numeric `id` (the call's index); a missing or failed
    /// entry yields `None` at that index.
    pub async fn batch_eth_call(&self, calls: &[(Address, Bytes)]) -> RpcResult<Vec<Option<Bytes>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let payload: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(i, (to, data))| {
                json!({
                    "jsonrpc": "2.0",
                    "id": i,
                    "method": "eth_call",
                    "params": [{"to": to, "data": data}, "latest"],
                })
            })
            .collect();
        let body = self.post(&self.public_url, &Value::Array(payload)).await?;
        let entries: Vec<RpcResponse> =
            serde_json::from_value(body).map_err(|e| RpcError::Parse(e.to_string()))?;

        let mut out: Vec<Option<Bytes>> = vec![None; calls.len()];
        for entry in entries {
            let Some(idx) = entry.id.as_ref().and_then(value_as_index) else {
                continue;
            };
            if idx >= out.len() {
                continue;
            }
            out[idx] = entry
                .result
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Bytes>().ok());
        }
        Ok(out)
    }

    /// `eth_call` against `to` at the given block tag (default `"latest"`).
    pub async fn eth_call(
        &self,
        to: Address,
        data: Bytes,
        block: Option<&str>,
    ) -> RpcResult<Bytes> {
        let tag = block.unwrap_or("latest");
        let result = self
            .request("eth_call", json!([{"to": to, "data": data}, tag]))
            .await?;
        result
            .as_str()
            .ok_or_else(|| RpcError::Parse("eth_call result not a string".into()))?
            .parse::<Bytes>()
            .map_err(|e| RpcError::Parse(e.to_string()))
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> RpcResult<u64> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&result)
    }

    /// `baseFeePerGas` of the latest block, if the chain reports one.
    pub async fn latest_base_fee(&self) -> RpcResult<Option<u128>> {
        let result = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        Ok(result
            .get("baseFeePerGas")
            .and_then(|v| parse_hex_u128(v).ok()))
    }

    /// `eth_maxPriorityFeePerGas`.
    pub async fn max_priority_fee_per_gas(&self) -> RpcResult<u128> {
        let result = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
        parse_hex_u128(&result)
    }

    /// `eth_getTransactionCount` at the given tag (`"pending"` for nonces).
    pub async fn transaction_count(&self, address: Address, tag: &str) -> RpcResult<u64> {
        let result = self
            .request("eth_getTransactionCount", json!([address, tag]))
            .await?;
        parse_hex_u64(&result)
    }

    /// `eth_getTransactionReceipt`; `None` until the transaction is mined.
    pub async fn transaction_receipt(&self, tx_hash: B256) -> RpcResult<Option<Value>> {
        let result = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    /// Submit a signed raw transaction. When `private` is set and a private
    /// endpoint is configured, the identical payload goes there instead.
    pub async fn send_raw_transaction(&self, raw_hex: &str, private: bool) -> RpcResult<B256> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendRawTransaction",
            "params": [raw_hex],
        });
        let url = match (&self.private_url, private) {
            (Some(url), true) => url.as_str(),
            _ => self.public_url.as_str(),
        };
        let body = self.post(url, &payload).await?;
        let resp: RpcResponse =
            serde_json::from_value(body).map_err(|e| RpcError::Parse(e.to_string()))?;
        if let Some(err) = resp.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        resp.result
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Parse("missing tx hash".into()))?
            .parse::<B256>()
            .map_err(|e| RpcError::Parse(e.to_string()))
    }

    /// `eth_newBlockFilter`; returns the filter id.
    pub async fn new_block_filter(&self) -> RpcResult<String> {
        let result = self.request("eth_newBlockFilter", json!([])).await?;
        result
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| RpcError::Parse("filter id not a string".into()))
    }

    /// `eth_getFilterChanges`; returns the raw change array.
    pub async fn filter_changes(&self, filter_id: &str) -> RpcResult<Vec<Value>> {
        let result = self
            .request("eth_getFilterChanges", json!([filter_id]))
            .await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| RpcError::Parse("filter changes not an array".into()))
    }

    /// `eth_uninstallFilter`. Best effort; failures are logged only.
    pub async fn uninstall_filter(&self, filter_id: &str) {
        match self.request("eth_uninstallFilter", json!([filter_id])).await {
            Ok(_) => debug!(filter_id, "block filter uninstalled"),
            Err(e) => warn!(filter_id, error = %e, "failed to uninstall block filter"),
        }
    }
}

/// Split an auth header setting into (name, value). A value without a colon
/// is sent as a bare `Authorization` header.
pub(crate) fn parse_auth_header(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            (name.trim().to_string(), value.trim().to_string())
        }
        _ => ("Authorization".to_string(), raw.trim().to_string()),
    }
}

fn value_as_index(v: &Value) -> Option<usize> {
    if let Some(n) = v.as_u64() {
        return Some(n as usize);
    }
    v.as_str().and_then(|s| s.parse().ok())
}

/// Parse a `"0x..."` JSON value as u64.
pub fn parse_hex_u64(v: &Value) -> RpcResult<u64> {
    let s = v
        .as_str()
        .ok_or_else(|| RpcError::Parse("expected hex string".into()))?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16).map_err(|e| RpcError::Parse(e.to_string()))
}

/// Parse a `"0x..."` JSON value as u128.
pub fn parse_hex_u128(v: &Value) -> RpcResult<u128> {
    let s = v
        .as_str()
        .ok_or_else(|| RpcError::Parse("expected hex string".into()))?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(stripped, 16).map_err(|e| RpcError::Parse(e.to_string()))
}

/// Parse a `"0x..."` JSON value as U256.
pub fn parse_hex_u256(v: &Value) -> RpcResult<U256> {
    let s = v
        .as_str()
        .ok_or_else(|| RpcError::Parse("expected hex string".into()))?;
    U256::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16)
        .map_err(|e| RpcError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_header_named() {
        let (name, value) = parse_auth_header("x-api-key: secret");
        assert_eq!(name, "x-api-key");
        assert_eq!(value, "secret");
    }

    #[test]
    fn auth_header_bare_value() {
        let (name, value) = parse_auth_header("Bearer abc123");
        assert_eq!(name, "Authorization");
        assert_eq!(value, "Bearer abc123");
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_u64(&json!("0x10")).unwrap(), 16);
        assert_eq!(parse_hex_u64(&json!("ff")).unwrap(), 255);
        assert_eq!(
            parse_hex_u128(&json!("0x6fc23ac00")).unwrap(),
            30_000_000_000
        );
        assert_eq!(
            parse_hex_u256(&json!("0xde0b6b3a7640000")).unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(parse_hex_u64(&json!(null)).is_err());
        assert!(parse_hex_u64(&json!("0xzz")).is_err());
    }

    #[test]
    fn batch_ids_correlate_by_index() {
        assert_eq!(value_as_index(&json!(3)), Some(3));
        assert_eq!(value_as_index(&json!("7")), Some(7));
        assert_eq!(value_as_index(&json!("x")), None);
    }
}
