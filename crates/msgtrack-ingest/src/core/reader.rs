use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use msgtrack_parser::{Classifier, Dispatcher, Record, RecordSink, Tally};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::sink::ChannelSink;

/// Reads a maillog file (or stdin) to the end on its own thread.
///
/// Lines are classified in file order and handed to the writer through a
/// bounded queue, so a slow output slows the reader down instead of losing
/// records. Stops early when `shutdown` is cancelled.
///
/// A read from stdin can block indefinitely (`tail -F | msgtrack-ingest`),
/// so for stdin shutdown returns at once and leaves the thread to die with
/// the process. Its tally is lost in that case.
pub async fn run_file_reader(
    path: Option<PathBuf>,
    classifier: Classifier,
    records_tx: mpsc::Sender<Record>,
    shutdown: CancellationToken
) -> Result<Tally> {
    let is_stdin = path.is_none();
    let (done_tx, done_rx) = oneshot::channel();
    let reader_shutdown = shutdown.clone();

    thread::Builder::new()
        .name("msgtrack-reader".to_string())
        .spawn(move || {
            let result = read_source(path, classifier, records_tx, &reader_shutdown);
            let _ = done_tx.send(result);
        })
        .context("failed to spawn file reader thread")?;

    tokio::select! {
        done = done_rx => done.context("file reader thread exited without a result")?,
        _ = shutdown.cancelled(), if is_stdin => {
            info!("stdin reader abandoned on shutdown");
            Ok(Tally::default())
        }
    }
}

fn read_source(
    path: Option<PathBuf>,
    classifier: Classifier,
    records_tx: mpsc::Sender<Record>,
    shutdown: &CancellationToken
) -> Result<Tally> {
    let input: Box<dyn BufRead> = match &path {
        Some(path) => Box::new(open(path)?),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };
    let source = path
        .as_deref()
        .map_or_else(|| "stdin".to_string(), |path| path.display().to_string());
    info!("file reader started: source={source}, year={}", classifier.year());

    let mut dispatcher =
        Dispatcher::new(classifier, ChannelSink::blocking(records_tx));
    let lines = dispatch_lines(input, &mut dispatcher, shutdown)?;

    info!(
        "file reader finished: source={source}, lines={lines}, {}",
        dispatcher.tally()
    );
    Ok(*dispatcher.tally())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

/// Dispatches every line of `input` and returns how many were read.
///
/// Invalid UTF-8 is replaced rather than rejected; such lines simply fail
/// to classify.
pub(crate) fn dispatch_lines<R, S>(
    mut input: R,
    dispatcher: &mut Dispatcher<S>,
    shutdown: &CancellationToken
) -> Result<u64>
where
    R: BufRead,
    S: RecordSink,
    anyhow::Error: From<S::Error>,
{
    let mut buf = Vec::with_capacity(512);
    let mut line_no = 0_u64;

    loop {
        if shutdown.is_cancelled() {
            info!("file reader stopping: lines={line_no}");
            break;
        }

        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("failed to read line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = String::from_utf8_lossy(&buf);
        if let Err(err) = dispatcher.dispatch(&line) {
            // The writer closes the queue on shutdown.
            if shutdown.is_cancelled() {
                info!("file reader stopping: lines={line_no}");
                break;
            }
            return Err(anyhow::Error::from(err))
                .with_context(|| format!("failed to forward line {line_no}"));
        }
    }

    Ok(line_no)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use msgtrack_parser::RecordKind;

    use super::*;

    const FIXTURE: &str = include_str!("../../../../tests/maillog/sample.log");

    #[test]
    fn forwards_fixture_in_file_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut dispatcher =
            Dispatcher::new(Classifier::new(2009), ChannelSink::blocking(tx));

        let lines = dispatch_lines(
            Cursor::new(FIXTURE),
            &mut dispatcher,
            &CancellationToken::new(),
        )
        .unwrap();
        drop(dispatcher);

        let mut kinds = Vec::new();
        while let Ok(record) = rx.try_recv() {
            kinds.push(record.kind());
        }

        assert_eq!(lines, 11);
        assert_eq!(kinds.len(), 11);
        assert_eq!(kinds.first(), Some(&RecordKind::Client));
        assert_eq!(kinds[8], RecordKind::Reject);
        assert_eq!(kinds.last(), Some(&RecordKind::Unknown));
    }

    #[test]
    fn last_line_without_newline_is_read() {
        let mut dispatcher = Dispatcher::new(Classifier::new(2009), Vec::new());
        let input = "first line\r\nsecond line";

        let lines = dispatch_lines(
            Cursor::new(input),
            &mut dispatcher,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(lines, 2);
        let raw: Vec<String> = dispatcher
            .sink()
            .iter()
            .filter_map(|record| match record {
                Record::Unknown(unknown) => Some(unknown.raw_text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(raw, vec!["first line", "second line"]);
    }

    #[test]
    fn invalid_utf8_becomes_unknown() {
        let mut dispatcher = Dispatcher::new(Classifier::new(2009), Vec::new());
        let input: &[u8] = b"Sep 27 \xff\xfe broken\n";

        dispatch_lines(input, &mut dispatcher, &CancellationToken::new()).unwrap();

        assert_eq!(dispatcher.tally().unknown(), 1);
    }

    #[test]
    fn cancelled_token_stops_before_reading() {
        let mut dispatcher = Dispatcher::new(Classifier::new(2009), Vec::new());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let lines =
            dispatch_lines(Cursor::new(FIXTURE), &mut dispatcher, &shutdown).unwrap();

        assert_eq!(lines, 0);
        assert!(dispatcher.sink().is_empty());
    }

    #[test]
    fn closed_queue_during_shutdown_is_not_an_error() {
        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let mut dispatcher =
            Dispatcher::new(Classifier::new(2009), ChannelSink::blocking(tx));

        let shutdown = CancellationToken::new();
        let err = dispatch_lines(Cursor::new(FIXTURE), &mut dispatcher, &shutdown)
            .unwrap_err();
        assert!(err.to_string().contains("failed to forward line 1"));

        let reader =
            CancelOnRead { shutdown: shutdown.clone(), inner: Cursor::new(FIXTURE) };
        let lines = dispatch_lines(reader, &mut dispatcher, &shutdown).unwrap();
        assert_eq!(lines, 1);
    }

    /// Cancels `shutdown` as soon as the first line has been read.
    struct CancelOnRead {
        shutdown: CancellationToken,
        inner: Cursor<&'static str>,
    }

    impl io::Read for CancelOnRead {
        fn read(
            &mut self,
            buf: &mut [u8]
        ) -> io::Result<usize> {
            io::Read::read(&mut self.inner, buf)
        }
    }

    impl BufRead for CancelOnRead {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.inner.fill_buf()
        }

        fn consume(
            &mut self,
            amt: usize
        ) {
            self.inner.consume(amt);
            self.shutdown.cancel();
        }
    }

    #[tokio::test]
    async fn stdin_reader_returns_on_shutdown() {
        let (tx, _rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let tally = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_file_reader(None, Classifier::new(2009), tx, shutdown),
        )
        .await
        .expect("stdin reader should not block shutdown");

        assert!(tally.is_ok());
    }

    #[tokio::test]
    async fn reports_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let result = run_file_reader(
            Some(PathBuf::from("/nonexistent/msgtrack/maillog")),
            Classifier::new(2009),
            tx,
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
    }
}
