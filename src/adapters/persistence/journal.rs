//! Action Journal - Append-only JSONL Action Records
//!
//! One file per market at `journal/{chainId}-{orderBook}.jsonl`. Each
//! line is a self-contained [`ActionRecord`]; lines that fail to parse
//! (for example a line cut short by a crash) are skipped on read, and
//! the next append starts on a fresh line so a torn tail never swallows
//! the record written after it.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{instrument, warn};

use crate::ports::checkpoint::{ActionRecord, MarketKey};

/// Append-only JSONL action journal.
pub struct ActionJournal {
    /// `{data_dir}/journal`.
    journal_dir: PathBuf,
}

impl ActionJournal {
    /// Create a journal rooted at `data_dir`.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let journal_dir = data_dir.as_ref().join("journal");
        fs::create_dir_all(&journal_dir)
            .await
            .context("Failed to create journal directory")?;
        Ok(Self { journal_dir })
    }

    pub fn journal_path(&self, key: &MarketKey) -> PathBuf {
        self.journal_dir.join(format!("{}.jsonl", key.file_stem()))
    }

    /// Append one record to the market's journal.
    #[instrument(skip(self, record), fields(kind = %record.kind, trader = %record.trader))]
    pub async fn append(&self, record: &ActionRecord) -> Result<()> {
        let key = MarketKey::new(record.chain_id, &record.order_book);
        let path = self.journal_path(&key);

        let mut line = serde_json::to_string(record).context("Failed to serialize action record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open journal file")?;

        if ends_with_torn_line(&mut file).await? {
            warn!(file = %path.display(), "Journal ends with a partial line, starting a new one");
            line.insert(0, '\n');
        }

        file.write_all(line.as_bytes())
            .await
            .context("Failed to write action record")?;
        file.flush().await.context("Failed to flush journal")?;

        Ok(())
    }

    /// The last `limit` well-formed records, oldest first.
    pub async fn read_last(&self, key: &MarketKey, limit: usize) -> Result<Vec<ActionRecord>> {
        let path = self.journal_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read journal file"),
        };

        let mut records: Vec<ActionRecord> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping malformed journal line");
                    None
                }
            })
            .collect();

        if records.len() > limit {
            records.drain(..records.len() - limit);
        }
        Ok(records)
    }
}

/// True if the file is non-empty and its last byte is not a newline.
async fn ends_with_torn_line(file: &mut fs::File) -> Result<bool> {
    let len = file.metadata().await.context("Failed to stat journal")?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))
        .await
        .context("Failed to seek journal")?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)
        .await
        .context("Failed to read journal tail")?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::ActionKind;
    use chrono::Utc;

    fn record(n: u64) -> ActionRecord {
        ActionRecord {
            timestamp: Utc::now(),
            run_id: "run".into(),
            chain_id: 5,
            order_book: "0xbook".into(),
            market_id: "0xmarket".into(),
            trader: "0xaaa".into(),
            kind: ActionKind::CancelOne,
            params: serde_json::json!({ "order_id": n }),
            tx_hash: Some(format!("0x{n:02x}")),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_read_last_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ActionJournal::new(dir.path()).await.unwrap();
        let key = MarketKey::new(5, "0xbook");

        for n in 0..3 {
            journal.append(&record(n)).await.unwrap();
        }
        // Simulate a torn final write.
        let path = journal.journal_path(&key);
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"timestamp\":").await.unwrap();
        file.flush().await.unwrap();

        let all = journal.read_last(&key, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let last_two = journal.read_last(&key, 2).await.unwrap();
        assert_eq!(last_two[0].params["order_id"], 1);
        assert_eq!(last_two[1].params["order_id"], 2);
    }

    #[tokio::test]
    async fn test_append_after_torn_line_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ActionJournal::new(dir.path()).await.unwrap();
        let key = MarketKey::new(5, "0xbook");

        journal.append(&record(1)).await.unwrap();
        let path = journal.journal_path(&key);
        let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"timestamp\":").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        journal.append(&record(2)).await.unwrap();
        journal.append(&record(3)).await.unwrap();

        let hashes: Vec<_> = journal
            .read_last(&key, 10)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.tx_hash)
            .collect();
        assert_eq!(hashes, vec!["0x01", "0x02", "0x03"]);
    }

    #[tokio::test]
    async fn test_missing_journal_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ActionJournal::new(dir.path()).await.unwrap();
        let records = journal.read_last(&MarketKey::new(1, "0xnone"), 5).await.unwrap();
        assert!(records.is_empty());
    }
}
