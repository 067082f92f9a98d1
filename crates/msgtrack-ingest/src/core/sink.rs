use anyhow::{Result, bail};
use msgtrack_parser::{Record, RecordSink, UnknownRecord};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    /// Waits for queue space. Only valid outside the async runtime.
    Blocking,
    /// Drops the record with a warning when the queue is full.
    DropWhenFull,
}

/// Forwards dispatched records to the writer task.
#[derive(Debug)]
pub struct ChannelSink {
    records_tx: mpsc::Sender<Record>,
    mode: SendMode,
    dropped: u64,
}

impl ChannelSink {
    /// For sources running on a blocking thread, where backpressure is fine.
    pub fn blocking(records_tx: mpsc::Sender<Record>) -> Self {
        Self { records_tx, mode: SendMode::Blocking, dropped: 0 }
    }

    /// For sources that must never stall their receive loop.
    pub fn lossy(records_tx: mpsc::Sender<Record>) -> Self {
        Self { records_tx, mode: SendMode::DropWhenFull, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn send(
        &mut self,
        record: Record
    ) -> Result<()> {
        match self.mode {
            SendMode::Blocking => {
                if self.records_tx.blocking_send(record).is_err() {
                    bail!("record queue closed: writer stopped");
                }
            }
            SendMode::DropWhenFull => match self.records_tx.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(record)) => {
                    self.dropped += 1;
                    warn!(
                        "record queue is full, dropping record: kind={}, queue_id={}, dropped={}",
                        record.kind(),
                        record.queue_id().unwrap_or("-"),
                        self.dropped
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    bail!("record queue closed: writer stopped");
                }
            },
        }
        Ok(())
    }
}

impl RecordSink for ChannelSink {
    type Error = anyhow::Error;

    fn record(
        &mut self,
        record: Record
    ) -> Result<()> {
        self.send(record)
    }

    fn unknown(
        &mut self,
        record: UnknownRecord
    ) -> Result<()> {
        self.send(Record::Unknown(record))
    }
}
