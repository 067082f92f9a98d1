use std::path::Path;

use anyhow::{Context, Result};
use msgtrack_parser::Record;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

pub type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes one JSON object per record, newline separated.
pub struct JsonWriter<W> {
    out: BufWriter<W>,
    include_unknown: bool,
    line: Vec<u8>,
}

impl JsonWriter<BoxedWrite> {
    /// Appends to `path`, creating it if needed, or writes to stdout.
    pub async fn open(
        path: Option<&Path>,
        include_unknown: bool
    ) -> Result<Self> {
        let out: BoxedWrite = match path {
            Some(path) => Box::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?,
            ),
            None => Box::new(tokio::io::stdout()),
        };
        Ok(Self::new(out, include_unknown))
    }
}

impl<W: AsyncWrite + Unpin> JsonWriter<W> {
    pub fn new(
        out: W,
        include_unknown: bool
    ) -> Self {
        Self { out: BufWriter::new(out), include_unknown, line: Vec::with_capacity(512) }
    }

    /// Returns `false` when the record was skipped.
    pub async fn write(
        &mut self,
        record: &Record
    ) -> Result<bool> {
        if matches!(record, Record::Unknown(_)) && !self.include_unknown {
            return Ok(false);
        }

        self.line.clear();
        serde_json::to_writer(&mut self.line, record)
            .context("failed to encode record as json")?;
        self.line.push(b'\n');
        self.out
            .write_all(&self.line)
            .await
            .context("failed to write json record")?;
        Ok(true)
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.out.flush().await.context("failed to flush json output")
    }
}

#[cfg(test)]
mod tests {
    use msgtrack_parser::Classifier;
    use serde_json::{Value, json};

    use super::*;

    const FROM_LINE: &str = "Sep 27 00:30:23 smtpserver <info> postfix/qmgr[15879]: 46B7918E1: from=<ppepe@example.com>, size=16324, nrcpt=1 (queue active)";
    const SENT_LINE: &str = "Sep 27 00:31:02 smtpserver <info> postfix/local[9011]: 46B7918E1: to=<root@smtpserver.example.com>, orig_to=<postmaster@example.com>, relay=local, delay=0.05, delays=0.01/0/0/0.04, dsn=2.0.0, status=sent (delivered to mailbox)";

    async fn render(
        lines: &[&str],
        include_unknown: bool
    ) -> Vec<Value> {
        let classifier = Classifier::new(2009);
        let mut writer = JsonWriter::new(Vec::new(), include_unknown);
        for line in lines {
            writer.write(&classifier.classify(line)).await.unwrap();
        }
        writer.flush().await.unwrap();

        String::from_utf8(writer.out.into_inner())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_flat_tagged_objects() {
        let values = render(&[FROM_LINE], false).await;

        assert_eq!(
            values,
            vec![json!({
                "kind": "from",
                "date": "2009-09-27",
                "time": "00:30:23",
                "hostname": "smtpserver",
                "process": "postfix",
                "service": "qmgr",
                "pid": 15879,
                "queue_id": "46B7918E1",
                "sender": "ppepe@example.com",
                "size": 16324,
                "nrcpt": 1
            })]
        );
    }

    #[tokio::test]
    async fn relay_and_delays_are_nested() {
        let values = render(&[SENT_LINE], false).await;

        assert_eq!(values[0]["relay"], json!({ "type": "transport", "name": "local" }));
        assert_eq!(
            values[0]["delays"],
            json!({
                "before_queue": 0.01,
                "in_queue": 0.0,
                "connect": 0.0,
                "transmit": 0.04
            })
        );
        assert_eq!(values[0]["orig_to"], "postmaster@example.com");
        assert_eq!(values[0]["conn_use"], Value::Null);
    }

    #[tokio::test]
    async fn unknown_records_are_opt_in() {
        assert_eq!(render(&["foo bar baz", FROM_LINE], false).await.len(), 1);

        let values = render(&["foo bar baz"], true).await;
        assert_eq!(
            values,
            vec![json!({
                "kind": "unknown",
                "raw_text": "foo bar baz",
                "reason": { "code": "prefix_mismatch" }
            })]
        );
    }
}
