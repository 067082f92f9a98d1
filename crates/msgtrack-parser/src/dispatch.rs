use std::convert::Infallible;
use std::fmt;

use tracing::debug;

use crate::classifier::Classifier;
use crate::record::{Record, RecordKind, UnknownRecord};

/// Destination for classified lines.
///
/// Recognized records and unknown lines arrive through separate methods so a
/// sink can route or drop unknowns without matching on the record kind.
pub trait RecordSink {
    type Error;

    fn record(
        &mut self,
        record: Record
    ) -> Result<(), Self::Error>;

    fn unknown(
        &mut self,
        record: UnknownRecord
    ) -> Result<(), Self::Error>;
}

/// Collects everything, unknown lines included, in arrival order.
impl RecordSink for Vec<Record> {
    type Error = Infallible;

    fn record(
        &mut self,
        record: Record
    ) -> Result<(), Self::Error> {
        self.push(record);
        Ok(())
    }

    fn unknown(
        &mut self,
        record: UnknownRecord
    ) -> Result<(), Self::Error> {
        self.push(Record::Unknown(record));
        Ok(())
    }
}

/// Per-kind line counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    counts: [u64; 7],
}

impl Tally {
    pub fn add(
        &mut self,
        kind: RecordKind
    ) {
        self.counts[kind.index()] += 1;
    }

    pub fn get(
        &self,
        kind: RecordKind
    ) -> u64 {
        self.counts[kind.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn unknown(&self) -> u64 {
        self.get(RecordKind::Unknown)
    }

    pub fn merge(
        &mut self,
        other: &Tally
    ) {
        for (count, extra) in self.counts.iter_mut().zip(other.counts) {
            *count += extra;
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        write!(f, "total={}", self.total())?;
        for kind in RecordKind::ALL {
            write!(f, ", {}={}", kind, self.get(kind))?;
        }
        Ok(())
    }
}

/// Feeds lines through a [`Classifier`] into a [`RecordSink`], one at a
/// time and in input order.
pub struct Dispatcher<S> {
    classifier: Classifier,
    sink: S,
    tally: Tally,
}

impl<S: RecordSink> Dispatcher<S> {
    pub fn new(
        classifier: Classifier,
        sink: S
    ) -> Self {
        Self { classifier, sink, tally: Tally::default() }
    }

    /// Classifies one line and hands the result to the sink. A trailing line
    /// terminator is ignored. Only sink errors are returned; unrecognized
    /// lines are delivered as unknown records.
    pub fn dispatch(
        &mut self,
        line: &str
    ) -> Result<RecordKind, S::Error> {
        let line = line.trim_end_matches(['\r', '\n']);
        let record = self.classifier.classify(line);
        let kind = record.kind();
        self.tally.add(kind);

        match record {
            Record::Unknown(unknown) => {
                debug!(
                    "unrecognized line: reason={}, line={:?}",
                    unknown.reason.code(),
                    unknown.raw_text
                );
                self.sink.unknown(unknown)?;
            }
            record => self.sink.record(record)?,
        }

        Ok(kind)
    }

    /// Dispatches each of `lines`, stopping at the first sink error.
    pub fn dispatch_all<'a, I>(
        &mut self,
        lines: I
    ) -> Result<(), S::Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for line in lines {
            self.dispatch(line)?;
        }
        Ok(())
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
