//! Postfix maillog classification.
//!
//! A [`Classifier`] turns single syslog lines into typed [`Record`]s. Lines
//! that fit none of the known shapes come back as [`Record::Unknown`], so
//! classification never fails. [`Dispatcher`] drives a classifier over a
//! stream of lines and forwards the results to a [`RecordSink`].

mod classifier;
mod dispatch;
mod error;
mod grammar;
mod normalize;
mod prefix;
mod record;

pub use classifier::Classifier;
pub use dispatch::{Dispatcher, RecordSink, Tally};
pub use error::ClassifyError;
pub use record::{
    ClientRecord, Delays, FromRecord, Header, HostFailRecord, MessageIdRecord,
    Record, RecordKind, RejectRecord, Relay, Sasl, SentRecord, UnknownRecord,
};
