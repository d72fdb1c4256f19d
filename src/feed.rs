//! JSON-lines tick adapter: one `{"instrument","bid","ask","ts_ms"}` object
//! per line, forwarded to the ingestion task over a bounded channel.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Result;
use crate::types::Tick;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub forwarded: u64,
    pub malformed: u64,
}

/// Reads until EOF or until the receiver goes away. A full channel applies
/// backpressure to the reader rather than dropping ticks.
pub async fn forward_lines<R>(reader: R, tx: mpsc::Sender<Tick>) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;
        let tick: Tick = match serde_json::from_str(line) {
            Ok(t) => t,
            Err(e) => {
                stats.malformed += 1;
                warn!("Malformed feed line {}: {e}", stats.lines);
                continue;
            }
        };
        if tx.send(tick).await.is_err() {
            warn!("Ingestion task gone, stopping feed");
            break;
        }
        stats.forwarded += 1;
    }
    Ok(stats)
}

/// Feed from the process's stdin.
pub async fn forward_stdin(tx: mpsc::Sender<Tick>) -> Result<FeedStats> {
    forward_lines(tokio::io::BufReader::new(tokio::io::stdin()), tx).await
}
