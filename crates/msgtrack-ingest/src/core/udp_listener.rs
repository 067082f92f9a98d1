use std::net::SocketAddr;

use std::borrow::Cow;

use anyhow::{Context, Result};
use msgtrack_parser::{Classifier, Dispatcher, Record, RecordSink, Tally};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::sink::ChannelSink;

const UDP_PACKET_BYTES: usize = 8192;

/// Binds the syslog socket and runs [`run_udp_listener_on`] until shutdown.
pub async fn run_udp_listener(
    listen_udp: SocketAddr,
    classifier: Classifier,
    records_tx: mpsc::Sender<Record>,
    shutdown: CancellationToken
) -> Result<Tally> {
    let socket = UdpSocket::bind(listen_udp)
        .await
        .with_context(|| format!("failed to bind udp socket {listen_udp}"))?;

    run_udp_listener_on(socket, classifier, records_tx, shutdown).await
}

/// Classifies maillog lines forwarded by rsyslog, one or more per datagram.
///
/// The receive loop never waits for the writer: when the record queue is
/// full the record is dropped with a warning.
pub async fn run_udp_listener_on(
    socket: UdpSocket,
    classifier: Classifier,
    records_tx: mpsc::Sender<Record>,
    shutdown: CancellationToken
) -> Result<Tally> {
    let local_addr = socket.local_addr().context("udp socket has no local address")?;
    let mut buf = [0_u8; UDP_PACKET_BYTES];
    let mut dispatcher =
        Dispatcher::new(classifier, ChannelSink::lossy(records_tx));

    info!(
        "udp listener ready: listen_udp={}, year={}",
        local_addr,
        classifier.year()
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(
                    "udp listener stopping: dropped={}, {}",
                    dispatcher.sink().dropped(),
                    dispatcher.tally()
                );
                break;
            }
            recv = socket.recv_from(&mut buf) => {
                let (len, peer) = recv.context("udp recv failed")?;
                if len == 0 {
                    continue;
                }

                if let Err(err) = dispatch_datagram(&mut dispatcher, &buf[..len], peer) {
                    // The writer closes the queue on shutdown.
                    if shutdown.is_cancelled() {
                        break;
                    }
                    return Err(err);
                }
            }
        }
    }

    Ok(*dispatcher.tally())
}

/// Dispatches each non-blank line of one datagram. Invalid UTF-8 is
/// replaced, so such lines still arrive as unknown records.
fn dispatch_datagram<S>(
    dispatcher: &mut Dispatcher<S>,
    datagram: &[u8],
    peer: SocketAddr
) -> Result<()>
where
    S: RecordSink,
    anyhow::Error: From<S::Error>,
{
    let text = String::from_utf8_lossy(datagram);
    if let Cow::Owned(_) = text {
        debug!("non-utf8 datagram decoded lossily: peer={peer}, len={}", datagram.len());
    }

    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        dispatcher.dispatch(line)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use msgtrack_parser::RecordKind;
    use tokio::time::timeout;

    use super::*;

    const FROM_LINE: &str = "Sep 27 00:30:23 smtpserver <info> postfix/qmgr[15879]: 46B7918E1: from=<ppepe@example.com>, size=16324, nrcpt=1 (queue active)\n";

    #[test]
    fn non_utf8_datagram_is_dispatched_as_unknown() {
        let mut dispatcher = Dispatcher::new(Classifier::new(2009), Vec::new());
        let peer: SocketAddr = "127.0.0.1:514".parse().unwrap();

        dispatch_datagram(&mut dispatcher, b"Sep 27 \xff\xfe broken", peer).unwrap();
        dispatch_datagram(&mut dispatcher, FROM_LINE.as_bytes(), peer).unwrap();

        let kinds: Vec<RecordKind> = dispatcher.sink().iter().map(Record::kind).collect();
        assert_eq!(kinds, vec![RecordKind::Unknown, RecordKind::From]);

        let Record::Unknown(unknown) = &dispatcher.sink()[0] else {
            panic!("expected unknown record");
        };
        assert_eq!(unknown.raw_text, "Sep 27 \u{fffd}\u{fffd} broken");
    }

    #[tokio::test]
    async fn classifies_datagrams_until_shutdown() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let listener = tokio::spawn(run_udp_listener_on(
            socket,
            Classifier::new(2009),
            tx,
            shutdown.clone(),
        ));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(FROM_LINE.as_bytes(), addr).await.unwrap();
        client.send_to(b"garbage\nmore garbage", addr).await.unwrap();

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let record = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("record should arrive")
                .expect("queue should stay open");
            kinds.push(record.kind());
        }
        assert_eq!(
            kinds,
            vec![RecordKind::From, RecordKind::Unknown, RecordKind::Unknown]
        );

        shutdown.cancel();
        let tally = listener.await.unwrap().unwrap();
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.get(RecordKind::From), 1);
    }
}
