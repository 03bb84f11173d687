//! Structured-event and CSV sinks.
//!
//! Each sink owns a queue drained by one writer task. Producers never block
//! beyond the channel push; a single producer's records are written in the
//! order it emitted them. The event sink batches for ~80 ms; the CSV sink
//! flushes every 5 s or 100 records, whichever comes first.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, warn};

/// Event batch flush cadence.
const EVENT_FLUSH_INTERVAL: Duration = Duration::from_millis(80);
/// Event batch size that forces a flush ahead of the timer.
const EVENT_BATCH_LIMIT: usize = 64;
/// CSV flush cadence and record limit.
const CSV_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const CSV_BATCH_LIMIT: usize = 100;

/// Milliseconds since the epoch, the `ts_ms` of every event.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// CSV timestamp, UTC with millisecond precision.
fn csv_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string()
}

// --- structured events -----------------------------------------------------

/// Handle to the newline-delimited JSON event sink. Every record carries
/// `event` and `ts_ms`; `emit` stamps `ts_ms` when the caller left it out.
#[derive(Clone)]
pub struct EventLog {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl EventLog {
    /// Spawn the writer task appending to `path`.
    pub fn spawn(path: impl AsRef<Path>) -> (Self, JoinHandle<()>) {
        let path = path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            run_line_writer(path, rx, EVENT_FLUSH_INTERVAL, EVENT_BATCH_LIMIT).await;
        });
        (Self { tx: Some(tx) }, handle)
    }

    /// A sink that drops everything; for tests and dry harnesses.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue one event. Never blocks.
    pub fn emit(&self, mut event: Value) {
        let Some(tx) = &self.tx else { return };
        if let Some(map) = event.as_object_mut() {
            map.entry("ts_ms").or_insert_with(|| json!(now_ms()));
        }
        let _ = tx.send(event.to_string());
    }
}

// --- CSV archive -----------------------------------------------------------

/// One row of the liquidation archive (21 columns with the timestamp).
#[derive(Debug, Clone, Default)]
pub struct LiquidationRecord {
    pub tx_hash: String,
    pub user: String,
    pub debt_asset: String,
    pub collateral_asset: String,
    pub debt_amount: f64,
    pub collateral_amount: f64,
    pub debt_usd: f64,
    pub collateral_usd: f64,
    pub liquidation_premium: f64,
    pub gas_cost_wei: u128,
    pub gas_cost_usd: f64,
    pub profit_usdc: f64,
    pub profit_eur: f64,
    pub status: String,
    pub chain_id: u64,
    pub executor_address: String,
    pub gas_strategy: String,
    pub mev_mode: String,
    pub rpc_endpoint: String,
    pub dry_run: bool,
}

pub const CSV_HEADER: &str = "Timestamp,TX_Hash,User_Address,Debt_Asset,Collateral_Asset,\
Debt_Amount,Collateral_Amount,Debt_Amount_USD,Collateral_Amount_USD,\
Liquidation_Premium,Gas_Cost_Wei,Gas_Cost_USD,Profit_USDC,Profit_EUR,\
Execution_Status,Chain_ID,Executor_Address,Gas_Strategy,MEV_Protection,\
RPC_Endpoint,Dry_Run";

impl LiquidationRecord {
    fn to_row(&self, timestamp: &str) -> String {
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",{:.18},{:.18},{:.2},{:.2},{:.2},{},{:.2},{:.2},{:.2},\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",{}",
            timestamp,
            self.tx_hash,
            self.user,
            self.debt_asset,
            self.collateral_asset,
            self.debt_amount,
            self.collateral_amount,
            self.debt_usd,
            self.collateral_usd,
            self.liquidation_premium,
            self.gas_cost_wei,
            self.gas_cost_usd,
            self.profit_usdc,
            self.profit_eur,
            self.status,
            self.chain_id,
            self.executor_address,
            self.gas_strategy,
            self.mev_mode,
            self.rpc_endpoint,
            self.dry_run,
        )
    }
}

/// Handle to the append-only CSV archive.
#[derive(Clone)]
pub struct CsvLog {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl CsvLog {
    /// Spawn the writer. The header is written up front when the file is new
    /// or its first line is not our header.
    pub fn spawn(path: impl AsRef<Path>) -> (Self, JoinHandle<()>) {
        let path = path.as_ref().to_path_buf();
        if needs_header(&path) {
            if let Err(e) = append_line_sync(&path, CSV_HEADER) {
                error!(path = %path.display(), error = %e, "cannot write CSV header");
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            run_line_writer(path, rx, CSV_FLUSH_INTERVAL, CSV_BATCH_LIMIT).await;
        });
        (Self { tx: Some(tx) }, handle)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue one record, stamped now. Never blocks.
    pub fn write(&self, record: &LiquidationRecord) {
        let Some(tx) = &self.tx else { return };
        let _ = tx.send(record.to_row(&csv_timestamp()));
    }
}

fn needs_header(path: &Path) -> bool {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let first = content.lines().next().unwrap_or("");
            !(first.contains("Timestamp") && first.contains("TX_Hash"))
        }
        Err(_) => true,
    }
}

fn append_line_sync(path: &Path, line: &str) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

/// Shared writer loop: buffer lines, flush on the timer, the batch limit, or
/// channel close. Coalesces but never reorders.
async fn run_line_writer(
    path: std::path::PathBuf,
    mut rx: mpsc::UnboundedReceiver<String>,
    flush_interval: Duration,
    batch_limit: usize,
) {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await;
    let mut file = match file {
        Ok(f) => f,
        Err(e) => {
            error!(path = %path.display(), error = %e, "log sink unavailable");
            // Drain so producers never observe a closed channel mid-run.
            while rx.recv().await.is_some() {}
            return;
        }
    };

    let mut ticker = interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buffer: Vec<String> = Vec::with_capacity(batch_limit);

    loop {
        tokio::select! {
            line = rx.recv() => {
                match line {
                    Some(line) => {
                        buffer.push(line);
                        if buffer.len() >= batch_limit {
                            flush(&mut file, &mut buffer).await;
                        }
                    }
                    None => {
                        flush(&mut file, &mut buffer).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&mut file, &mut buffer).await;
            }
        }
    }
}

async fn flush(file: &mut tokio::fs::File, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let mut chunk = String::with_capacity(buffer.iter().map(|l| l.len() + 1).sum());
    for line in buffer.drain(..) {
        chunk.push_str(&line);
        chunk.push('\n');
    }
    if let Err(e) = file.write_all(chunk.as_bytes()).await {
        warn!(error = %e, "log flush failed");
    }
    let _ = file.flush().await;
}

// --- notifier boundary -----------------------------------------------------

/// Human-facing notifier. The core only hands it rate-limited summaries; the
/// concrete transport lives outside.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
    fn record_attempt(&self, completed: bool, profit_usd: f64);
}

/// Default notifier: counts nothing, says nothing.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
    fn record_attempt(&self, _completed: bool, _profit_usd: f64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_row_has_twenty_one_columns() {
        let record = LiquidationRecord {
            tx_hash: "0xabc".into(),
            user: "0xuser".into(),
            status: "SUCCESS".into(),
            chain_id: 137,
            ..Default::default()
        };
        let row = record.to_row("2026-08-02 12:00:00.000 UTC");
        // Quoted fields contain no commas, so a plain split is a fair count.
        assert_eq!(row.split(',').count(), 21);
        assert!(row.contains("\"SUCCESS\""));
        assert!(row.ends_with("false"));
    }

    #[test]
    fn header_matches_column_count() {
        assert_eq!(CSV_HEADER.split(',').count(), 21);
    }

    #[test]
    fn header_detection() {
        let dir = std::env::temp_dir();
        let missing = dir.join("flashliq_test_missing.csv");
        let _ = std::fs::remove_file(&missing);
        assert!(needs_header(&missing));

        let with_header = dir.join("flashliq_test_with_header.csv");
        std::fs::write(&with_header, format!("{CSV_HEADER}\nrow\n")).unwrap();
        assert!(!needs_header(&with_header));

        let headerless = dir.join("flashliq_test_headerless.csv");
        std::fs::write(&headerless, "some,other,data\n").unwrap();
        assert!(needs_header(&headerless));

        let _ = std::fs::remove_file(&with_header);
        let _ = std::fs::remove_file(&headerless);
    }

    #[tokio::test]
    async fn events_are_written_in_order_with_ts_ms() {
        let path = std::env::temp_dir().join("flashliq_test_events.jsonl");
        let _ = std::fs::remove_file(&path);

        let (log, handle) = EventLog::spawn(&path);
        log.emit(json!({"event": "first"}));
        log.emit(json!({"event": "second", "ts_ms": 42}));
        drop(log);
        handle.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "first");
        assert!(lines[0]["ts_ms"].is_i64());
        assert_eq!(lines[1]["ts_ms"], 42);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn disabled_sinks_swallow_everything() {
        EventLog::disabled().emit(json!({"event": "x"}));
        CsvLog::disabled().write(&LiquidationRecord::default());
    }
}
