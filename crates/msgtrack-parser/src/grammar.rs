//! The six line grammars. Each one receives the already parsed header and
//! the remainder of the line and must consume all of it to match.

use std::net::Ipv4Addr;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{alphanumeric1, char, digit1};
use nom::combinator::{map, not, opt, recognize, rest};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::Parser;

use crate::error::GrammarError;
use crate::normalize;
use crate::prefix::{
    PResult, client_endpoint, coerce, hostname, ipv4, keyword, mail_addr,
    sender_addr, token, value
};
use crate::record::{
    ClientRecord, Delays, FromRecord, Header, HostFailRecord, MessageIdRecord,
    Record, RejectRecord, Relay, Sasl, SentRecord
};

/// Keys that open a specific queue-id grammar. A payload starting with one
/// of them belongs to that grammar even when it fails to match, so the
/// host-fail fallback must not claim it.
const CLAIMED_KEYS: [&str; 4] = ["client=", "message-id=", "from=", "to="];

const REJECT_OPENING: &str = "NOQUEUE: reject: RCPT from";

/// Runs `parser` over `input` and requires that only blanks remain.
fn complete<'a, O, F>(
    mut parser: F,
    input: &'a str
) -> Result<O, GrammarError<'a>>
where
    F: Parser<&'a str, O, GrammarError<'a>>,
{
    match parser.parse(input) {
        Ok((rest, out)) if rest.trim().is_empty() => Ok(out),
        Ok((rest, _)) => Err(GrammarError::Mismatch(rest)),
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => Err(err),
        Err(nom::Err::Incomplete(_)) => Err(GrammarError::Mismatch(input)),
    }
}

fn sasl(input: &str) -> PResult<'_, Sasl> {
    let (input, _) = keyword(",")(input)?;
    let (input, _) = keyword("sasl_method")(input)?;
    let (input, _) = keyword("=")(input)?;
    let (input, method) = token(take_while1(|c: char| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    }))(input)?;
    let (input, _) = keyword(",")(input)?;
    let (input, _) = keyword("sasl_username")(input)?;
    let (input, _) = keyword("=")(input)?;
    let (input, username) =
        token(take_while1(|c: char| !c.is_whitespace() && c != ','))(input)?;

    Ok((
        input,
        Sasl { method: method.to_string(), username: username.to_string() },
    ))
}

/// `8EE541568: client=unknown[10.3.4.26], sasl_method=PLAIN, sasl_username=pepe`
pub(crate) fn client<'a>(
    header: &Header,
    queue_id: &str,
    input: &'a str
) -> Result<Record, GrammarError<'a>> {
    let ((client_hostname, client_ip), sasl) =
        complete(pair(client_endpoint, opt(sasl)), input)?;

    Ok(Record::Client(ClientRecord {
        header: header.clone(),
        queue_id: queue_id.to_string(),
        client_hostname,
        client_ip,
        sasl
    }))
}

/// `032BF146F: message-id=<246183886.QAIGEMNN7340BUON4898378@bla.bla.com>`
pub(crate) fn message_id<'a>(
    header: &Header,
    queue_id: &str,
    input: &'a str
) -> Result<Record, GrammarError<'a>> {
    let message_id = complete(
        preceded(
            pair(keyword("message-id"), keyword("=")),
            token(take_while1(|c: char| c.is_ascii_graphic())),
        ),
        input,
    )?;

    Ok(Record::MessageId(MessageIdRecord {
        header: header.clone(),
        queue_id: queue_id.to_string(),
        message_id: message_id.to_string()
    }))
}

fn from_body(input: &str) -> PResult<'_, (String, u64, u32)> {
    let (input, sender) = preceded(keyword("from="), sender_addr)(input)?;
    let (input, size) = delimited(
        keyword("size="),
        token(coerce("size", value, normalize::integer::<u64>)),
        keyword(","),
    )(input)?;
    let (input, nrcpt) = preceded(
        keyword("nrcpt="),
        token(coerce("nrcpt", value, normalize::integer::<u32>)),
    )(input)?;
    let (input, _) = keyword("(queue active)")(input)?;
    Ok((input, (sender, size, nrcpt)))
}

/// `46B7918E1: from=<ppepe@example.com>, size=16324, nrcpt=1 (queue active)`
pub(crate) fn from<'a>(
    header: &Header,
    queue_id: &str,
    input: &'a str
) -> Result<Record, GrammarError<'a>> {
    let (sender, size, nrcpt) = complete(from_body, input)?;

    Ok(Record::From(FromRecord {
        header: header.clone(),
        queue_id: queue_id.to_string(),
        sender,
        size,
        nrcpt
    }))
}

/// `imap.example.coop[10.6.2.40]:2003`; the port is optional.
fn relay_host(input: &str) -> PResult<'_, Relay> {
    let (input, name) = token(hostname)(input)?;
    let (input, ip) = delimited(keyword("["), token(ipv4), keyword("]"))(input)?;
    let (input, port) = opt(preceded(
        char(':'),
        coerce("relay_port", digit1, normalize::integer::<u16>),
    ))(input)?;

    Ok((input, Relay::Host { hostname: name.to_string(), ip, port }))
}

/// Bare transport name such as `local`, `virtual` or `none`.
fn relay_transport(input: &str) -> PResult<'_, Relay> {
    map(
        token(take_while1(|c: char| {
            c.is_ascii_alphanumeric() || c == '_' || c == '-'
        })),
        |name: &str| Relay::Transport { name: name.to_string() },
    )(input)
}

fn relay(input: &str) -> PResult<'_, Relay> {
    delimited(keyword("relay="), alt((relay_host, relay_transport)), keyword(","))(
        input,
    )
}

/// `key=value,` where the value goes through `convert`.
fn field<'a, O, G>(
    key: &'static str,
    name: &'static str,
    convert: G
) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    G: Fn(&'a str) -> Option<O>,
{
    delimited(keyword(key), token(coerce(name, value, convert)), keyword(","))
}

fn sent_body(input: &str) -> PResult<'_, SentBody<'_>> {
    let (input, recipient) = preceded(keyword("to="), mail_addr)(input)?;
    let (input, orig_to) = opt(preceded(keyword("orig_to="), mail_addr))(input)?;
    let (input, relay) = relay(input)?;
    let (input, conn_use) =
        opt(field("conn_use=", "conn_use", normalize::integer::<u32>))(input)?;
    let (input, delay) = field("delay=", "delay", normalize::seconds)(input)?;
    let (input, delays) = field("delays=", "delays", normalize::delays)(input)?;
    let (input, dsn) = field("dsn=", "dsn", normalize::dsn)(input)?;
    let (input, status) = preceded(keyword("status="), token(alphanumeric1))(input)?;
    let (input, status_msg) = token(recognize(pair(char('('), rest)))(input)?;

    Ok((
        input,
        SentBody {
            recipient,
            orig_to,
            relay,
            conn_use,
            delay,
            delays,
            dsn,
            status,
            status_msg
        },
    ))
}

struct SentBody<'a> {
    recipient: String,
    orig_to: Option<String>,
    relay: Relay,
    conn_use: Option<u32>,
    delay: f64,
    delays: Delays,
    dsn: String,
    status: &'a str,
    status_msg: &'a str
}

/// `3674F146F: to=<pepe@example.coop>, relay=imap.example.coop[10.6.2.40]:2003,
/// delay=0.18, delays=0.11/0/0/0.06, dsn=2.1.5, status=sent (250 2.1.5 Ok)`
pub(crate) fn sent<'a>(
    header: &Header,
    queue_id: &str,
    input: &'a str
) -> Result<Record, GrammarError<'a>> {
    let body = complete(sent_body, input)?;

    Ok(Record::Sent(SentRecord {
        header: header.clone(),
        queue_id: queue_id.to_string(),
        recipient: body.recipient,
        orig_to: body.orig_to,
        relay: body.relay,
        conn_use: body.conn_use,
        delay: body.delay,
        delays: body.delays,
        dsn: body.dsn,
        status: body.status.to_string(),
        status_msg: body.status_msg.to_string()
    }))
}

fn claimed_key(input: &str) -> PResult<'_, &str> {
    let [client_key, message_id_key, from_key, to_key] = CLAIMED_KEYS;
    token(alt((
        tag(client_key),
        tag(message_id_key),
        tag(from_key),
        tag(to_key),
    )))(input)
}

/// `59E15400C7E7: host smtpxx.blabla.com[60.70.90.100] refused to talk to me: ...`
///
/// Takes the whole remainder, unless it opens with a key owned by a more
/// specific grammar.
pub(crate) fn host_fail<'a>(
    header: &Header,
    queue_id: &str,
    input: &'a str
) -> Result<Record, GrammarError<'a>> {
    let msg = complete(preceded(not(claimed_key), token(rest)), input)?;

    Ok(Record::HostFail(HostFailRecord {
        header: header.clone(),
        queue_id: queue_id.to_string(),
        msg: msg.to_string()
    }))
}

fn reject_body(input: &str) -> PResult<'_, RejectRecordBody<'_>> {
    let (input, _) = keyword(REJECT_OPENING)(input)?;
    let (input, (client_hostname, client_ip)) = client_endpoint(input)?;
    let (input, error_code) =
        token(coerce("error_code", digit1, normalize::integer::<u16>))(input)?;
    let (input, dsn) = token(coerce(
        "dsn",
        take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        normalize::dsn,
    ))(input)?;
    let (input, mail_addr_value) = mail_addr(input)?;
    let (input, error_msg) = terminated(
        token(take_while1(|c: char| {
            c != ';' && (c.is_ascii_graphic() || c == ' ' || c == '\t')
        })),
        char(';'),
    )(input)?;
    let (input, sender) = preceded(keyword("from="), sender_addr)(input)?;
    let (input, recipient) = preceded(keyword("to="), mail_addr)(input)?;
    let (input, proto) = preceded(keyword("proto="), token(alphanumeric1))(input)?;
    let (input, helo) =
        delimited(keyword("helo=<"), token(hostname), keyword(">"))(input)?;

    Ok((
        input,
        RejectRecordBody {
            client_hostname,
            client_ip,
            error_code,
            dsn,
            mail_addr: mail_addr_value,
            error_msg: error_msg.trim_end(),
            sender,
            recipient,
            proto,
            helo
        },
    ))
}

struct RejectRecordBody<'a> {
    client_hostname: Option<String>,
    client_ip: Ipv4Addr,
    error_code: u16,
    dsn: String,
    mail_addr: String,
    error_msg: &'a str,
    sender: String,
    recipient: String,
    proto: &'a str,
    helo: &'a str
}

/// `NOQUEUE: reject: RCPT from unknown[192.168.240.39]: 550 5.1.1
/// <pepe@example.gov.ar>: Recipient address rejected: ...;
/// from=<a@b> to=<c@d> proto=SMTP helo=<smtp.example.gov.ar>`
pub(crate) fn reject<'a>(
    header: &Header,
    input: &'a str
) -> Result<Record, GrammarError<'a>> {
    let body = complete(reject_body, input)?;

    Ok(Record::Reject(RejectRecord {
        header: header.clone(),
        client_hostname: body.client_hostname,
        client_ip: body.client_ip,
        error_code: body.error_code,
        dsn: body.dsn,
        mail_addr: body.mail_addr,
        error_msg: body.error_msg.to_string(),
        sender: body.sender,
        recipient: body.recipient,
        proto: body.proto.to_string(),
        helo: body.helo.to_string()
    }))
}
