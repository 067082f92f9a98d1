use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use msgtrack_parser::{Record, Tally};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::database::{Database, RecordRejected};
use super::json::{BoxedWrite, JsonWriter};
use crate::config::{OutputConfig, OutputKind};

/// Placeholder period when periodic stats are disabled; the tick branch is
/// never polled in that case.
const IDLE_STATS_PERIOD: Duration = Duration::from_secs(3600);

pub enum Output {
    Json(JsonWriter<BoxedWrite>),
    Database(Database),
}

impl Output {
    pub async fn open(config: &OutputConfig) -> Result<Self> {
        match config.kind {
            OutputKind::Json => {
                let writer =
                    JsonWriter::open(config.path.as_deref(), config.include_unknown)
                        .await?;
                Ok(Self::Json(writer))
            }
            OutputKind::Database => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("output.database_url is required for database output")?;
                let db = Database::connect(url)
                    .await
                    .context("failed to connect database")?;
                db.ensure_schema().await?;
                Ok(Self::Database(db))
            }
        }
    }

    async fn write(
        &mut self,
        record: &Record
    ) -> Result<bool> {
        match self {
            Self::Json(writer) => writer.write(record).await,
            Self::Database(db) => db.insert(record).await,
        }
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Json(writer) => writer.flush().await,
            Self::Database(_) => Ok(()),
        }
    }
}

/// What the writer did with the records it received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub received: Tally,
    pub written: u64,
    pub skipped: u64,
}

impl fmt::Display for WriterStats {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        write!(
            f,
            "written={}, skipped={}, {}",
            self.written, self.skipped, self.received
        )
    }
}

/// Drains the record queue into `output` until every sender is gone.
///
/// Records are written in arrival order. Output is flushed whenever the
/// queue runs empty, so a live source shows up promptly. A record the
/// database rejects is skipped with a warning; any other output error stops
/// the writer, and the source notices when its queue closes.
///
/// On shutdown the queue is closed and whatever is already in it is still
/// written, so a source stuck in a blocking read cannot hold the writer open.
pub async fn run_writer(
    mut output: Output,
    mut records_rx: mpsc::Receiver<Record>,
    stats_interval: Option<Duration>,
    shutdown: CancellationToken
) -> Result<WriterStats> {
    let period = stats_interval.unwrap_or(IDLE_STATS_PERIOD);
    let mut stats_tick = interval_at(Instant::now() + period, period);
    let mut stats = WriterStats::default();
    let mut draining = false;

    loop {
        tokio::select! {
            maybe_record = records_rx.recv() => {
                let Some(record) = maybe_record else {
                    break;
                };

                stats.received.add(record.kind());
                match output.write(&record).await {
                    Ok(true) => stats.written += 1,
                    Ok(false) => stats.skipped += 1,
                    Err(err) => match err.downcast_ref::<RecordRejected>() {
                        Some(rejected) => {
                            stats.skipped += 1;
                            warn!(
                                "record skipped: kind={}, queue_id={}, reason={rejected}",
                                record.kind(),
                                record.queue_id().unwrap_or("-")
                            );
                        }
                        None => {
                            return Err(err.context(format!(
                                "failed to write record: kind={}, queue_id={}",
                                record.kind(),
                                record.queue_id().unwrap_or("-")
                            )));
                        }
                    },
                }

                if records_rx.is_empty() {
                    output.flush().await?;
                }
            }
            _ = shutdown.cancelled(), if !draining => {
                draining = true;
                records_rx.close();
                debug!("writer draining on shutdown: queued={}", records_rx.len());
            }
            _ = stats_tick.tick(), if stats_interval.is_some() => {
                info!("ingest stats: {stats}");
            }
        }
    }

    output.flush().await?;
    debug!("writer drained: {stats}");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use msgtrack_parser::{Classifier, RecordKind};

    use super::*;

    const FIXTURE: &str = include_str!("../../../../tests/maillog/sample.log");

    #[tokio::test]
    async fn writes_json_lines_in_arrival_order() {
        let path = std::env::temp_dir()
            .join(format!("msgtrack-writer-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let config = OutputConfig {
            kind: OutputKind::Json,
            path: Some(path.clone()),
            include_unknown: false,
            database_url: None,
        };
        let output = Output::open(&config).await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        let writer =
            tokio::spawn(run_writer(output, rx, None, CancellationToken::new()));

        let classifier = Classifier::new(2009);
        for line in FIXTURE.lines() {
            tx.send(classifier.classify(line)).await.unwrap();
        }
        drop(tx);

        let stats = writer.await.unwrap().unwrap();
        assert_eq!(stats.received.total(), 11);
        assert_eq!(stats.received.unknown(), 2);
        assert_eq!(stats.written, 9);
        assert_eq!(stats.skipped, 2);

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let kinds: Vec<String> = written
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["kind"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            kinds,
            [
                RecordKind::Client,
                RecordKind::Client,
                RecordKind::MessageId,
                RecordKind::From,
                RecordKind::Sent,
                RecordKind::Sent,
                RecordKind::Sent,
                RecordKind::HostFail,
                RecordKind::Reject,
            ]
            .map(|kind| kind.to_string())
        );
    }

    #[tokio::test]
    async fn rejected_records_are_skipped_not_fatal() {
        let output = Output::Database(Database::unconnected().unwrap());
        let (tx, rx) = mpsc::channel(4);
        let writer =
            tokio::spawn(run_writer(output, rx, None, CancellationToken::new()));

        let long_recipient = format!("{}@example.com", "a".repeat(250));
        let line = format!(
            "Sep 27 00:00:48 smtpserver <info> postfix/lmtp[8963]: 3674F146F: to=<{long_recipient}>, relay=local, delay=0.18, delays=0.11/0/0/0.06, dsn=2.1.5, status=sent (250 2.1.5 Ok)"
        );
        let classifier = Classifier::new(2009);
        tx.send(classifier.classify(&line)).await.unwrap();
        tx.send(classifier.classify("garbage")).await.unwrap();
        drop(tx);

        let stats = writer.await.unwrap().unwrap();
        assert_eq!(stats.received.get(RecordKind::Sent), 1);
        assert_eq!(stats.received.total(), 2);
        assert_eq!(stats.written, 0);
        assert_eq!(stats.skipped, 2);
    }

    #[tokio::test]
    async fn shutdown_drains_queue_while_sender_is_alive() {
        let path = std::env::temp_dir()
            .join(format!("msgtrack-writer-drain-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let config = OutputConfig {
            kind: OutputKind::Json,
            path: Some(path.clone()),
            include_unknown: true,
            database_url: None,
        };
        let output = Output::open(&config).await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        let classifier = Classifier::new(2009);
        for line in FIXTURE.lines().take(3) {
            tx.send(classifier.classify(line)).await.unwrap();
        }
        shutdown.cancel();

        let stats = tokio::time::timeout(
            Duration::from_secs(5),
            run_writer(output, rx, None, shutdown),
        )
        .await
        .expect("writer should stop on shutdown")
        .unwrap();

        assert_eq!(stats.written, 3);
        assert!(tx.is_closed());

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(written.lines().count(), 3);
    }

    #[test]
    fn stats_display_includes_tally() {
        let mut stats = WriterStats { written: 1, skipped: 1, ..WriterStats::default() };
        stats.received.add(RecordKind::Sent);
        stats.received.add(RecordKind::Unknown);

        assert_eq!(
            stats.to_string(),
            "written=1, skipped=1, total=2, client=0, message_id=0, from=0, sent=1, host_fail=0, reject=0, unknown=1"
        );
    }
}
