use std::fmt;
use std::net::Ipv4Addr;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::error::ClassifyError;

/// Fields shared by every recognized maillog line:
/// `Sep 27 09:58:05 smtpserver <info> postfix/smtpd[6900]:`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub hostname: String,
    pub process: String,
    pub service: Option<String>,
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sasl {
    pub method: String,
    pub username: String,
}

/// `smtpd` accepted a client connection for a queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    #[serde(flatten)]
    pub header: Header,
    pub queue_id: String,
    pub client_hostname: Option<String>,
    pub client_ip: Ipv4Addr,
    pub sasl: Option<Sasl>,
}

/// `cleanup` assigned a Message-ID header to a queue id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageIdRecord {
    #[serde(flatten)]
    pub header: Header,
    pub queue_id: String,
    pub message_id: String,
}

/// `qmgr` moved a message into the active queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FromRecord {
    #[serde(flatten)]
    pub header: Header,
    pub queue_id: String,
    pub sender: String,
    pub size: u64,
    pub nrcpt: u32,
}

/// Next hop of a delivery attempt: either a remote endpoint or a local
/// transport name such as `local`, `virtual` or `none`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Relay {
    Host {
        hostname: String,
        ip: Ipv4Addr,
        port: Option<u16>,
    },
    Transport {
        name: String,
    },
}

/// `delays=a/b/c/d` breakdown in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Delays {
    pub before_queue: f64,
    pub in_queue: f64,
    pub connect: f64,
    pub transmit: f64,
}

impl Delays {
    pub fn as_array(&self) -> [f64; 4] {
        [self.before_queue, self.in_queue, self.connect, self.transmit]
    }
}

impl From<[f64; 4]> for Delays {
    fn from([before_queue, in_queue, connect, transmit]: [f64; 4]) -> Self {
        Self { before_queue, in_queue, connect, transmit }
    }
}

impl fmt::Display for Delays {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.before_queue, self.in_queue, self.connect, self.transmit
        )
    }
}

/// Delivery attempt outcome (`status=sent|deferred|bounced|...`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentRecord {
    #[serde(flatten)]
    pub header: Header,
    pub queue_id: String,
    pub recipient: String,
    pub orig_to: Option<String>,
    pub relay: Relay,
    pub conn_use: Option<u32>,
    pub delay: f64,
    pub delays: Delays,
    pub dsn: String,
    pub status: String,
    pub status_msg: String,
}

/// Any other queue-id line, typically `host X[ip] refused to talk to me`
/// or `connect to ...: Connection timed out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFailRecord {
    #[serde(flatten)]
    pub header: Header,
    pub queue_id: String,
    pub msg: String,
}

/// `NOQUEUE: reject: RCPT from ...` emitted before a queue id exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectRecord {
    #[serde(flatten)]
    pub header: Header,
    pub client_hostname: Option<String>,
    pub client_ip: Ipv4Addr,
    pub error_code: u16,
    pub dsn: String,
    pub mail_addr: String,
    pub error_msg: String,
    pub sender: String,
    pub recipient: String,
    pub proto: String,
    pub helo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownRecord {
    pub raw_text: String,
    pub reason: ClassifyError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Client(ClientRecord),
    MessageId(MessageIdRecord),
    From(FromRecord),
    Sent(SentRecord),
    HostFail(HostFailRecord),
    Reject(RejectRecord),
    Unknown(UnknownRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Client(_) => RecordKind::Client,
            Self::MessageId(_) => RecordKind::MessageId,
            Self::From(_) => RecordKind::From,
            Self::Sent(_) => RecordKind::Sent,
            Self::HostFail(_) => RecordKind::HostFail,
            Self::Reject(_) => RecordKind::Reject,
            Self::Unknown(_) => RecordKind::Unknown,
        }
    }

    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::Client(r) => Some(&r.header),
            Self::MessageId(r) => Some(&r.header),
            Self::From(r) => Some(&r.header),
            Self::Sent(r) => Some(&r.header),
            Self::HostFail(r) => Some(&r.header),
            Self::Reject(r) => Some(&r.header),
            Self::Unknown(_) => None,
        }
    }

    /// Reject and Unknown records never carry a queue id.
    pub fn queue_id(&self) -> Option<&str> {
        match self {
            Self::Client(r) => Some(&r.queue_id),
            Self::MessageId(r) => Some(&r.queue_id),
            Self::From(r) => Some(&r.queue_id),
            Self::Sent(r) => Some(&r.queue_id),
            Self::HostFail(r) => Some(&r.queue_id),
            Self::Reject(_) | Self::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Client,
    MessageId,
    From,
    Sent,
    HostFail,
    Reject,
    Unknown,
}

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        Self::Client,
        Self::MessageId,
        Self::From,
        Self::Sent,
        Self::HostFail,
        Self::Reject,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::MessageId => "message_id",
            Self::From => "from",
            Self::Sent => "sent",
            Self::HostFail => "host_fail",
            Self::Reject => "reject",
            Self::Unknown => "unknown",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Self::Client => 0,
            Self::MessageId => 1,
            Self::From => 2,
            Self::Sent => 3,
            Self::HostFail => 4,
            Self::Reject => 5,
            Self::Unknown => 6,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
