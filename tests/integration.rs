//! Integration tests for lottery-client.
//!
//! These tests run the full client against an in-process mock server that
//! reads frames with the crate's own `FrameBuffer`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use lottery_client::bets::{Bet, BetSource, EagerBetSource, FileBetSource};
use lottery_client::codec::{decode_batch, parse_winners};
use lottery_client::protocol::{frame_message, FrameBuffer, MessageAssembler};
use lottery_client::transport::connect;
use lottery_client::{ClientError, LotteryClient, Phase, Violation};

const LENGTH_BYTES: usize = 6;

/// One side of a mock server connection.
struct Peer {
    socket: TcpStream,
    frames: FrameBuffer,
    assembler: MessageAssembler,
}

impl Peer {
    fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            frames: FrameBuffer::new(LENGTH_BYTES),
            assembler: MessageAssembler::new(),
        }
    }

    /// Next whole message, or `None` once the client hangs up.
    async fn recv(&mut self) -> Option<String> {
        let mut buf = [0u8; 1024];
        loop {
            while let Some(body) = self.frames.next_frame().unwrap() {
                if let Some(message) = self.assembler.push(&body).unwrap() {
                    return Some(message.text);
                }
            }
            let n = self.socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return None;
            }
            self.frames.extend(&buf[..n]);
        }
    }

    /// Reply with `text`, split into frames of at most 4 bytes.
    async fn reply(&mut self, text: &str) {
        for frame in frame_message(text.as_bytes(), 4, LENGTH_BYTES).unwrap() {
            self.socket.write_all(&frame).await.unwrap();
        }
    }
}

/// What the mock server saw.
#[derive(Debug, Default)]
struct Transcript {
    batches: Vec<String>,
    fin: Option<String>,
    winners_queries: Vec<String>,
}

/// Accept the batch connection, then one connection per winners poll.
///
/// The first `closed_polls` polls are closed before any reply; the next one
/// gets `winners`.
fn spawn_server(
    listener: TcpListener,
    closed_polls: usize,
    winners: &'static str,
) -> JoinHandle<Transcript> {
    tokio::spawn(async move {
        let mut transcript = Transcript::default();

        let (socket, _) = listener.accept().await.unwrap();
        let mut peer = Peer::new(socket);
        while let Some(message) = peer.recv().await {
            if message.starts_with("BATCH,") {
                transcript.batches.push(message);
                peer.reply("OK").await;
            } else {
                transcript.fin = Some(message);
            }
        }

        for poll in 0..=closed_polls {
            let (socket, _) = listener.accept().await.unwrap();
            let mut peer = Peer::new(socket);
            let query = peer.recv().await.unwrap();
            transcript.winners_queries.push(query);
            if poll == closed_polls {
                peer.reply(winners).await;
            }
        }

        transcript
    })
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

fn client(address: &str, batch_size: usize) -> LotteryClient {
    LotteryClient::builder()
        .server_address(address)
        .agency_id("4")
        .batch_size(batch_size)
        .max_message_size(64)
        .poll_interval(Duration::from_millis(50))
        .winners_backoff(Duration::from_millis(20))
        .build()
        .unwrap()
}

fn bets_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "lottery-client-it-{}-{}.csv",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

const FIVE_BETS: &str = "\
Santiago,Lorca,30904465,1999-03-17,2201
\"Ana,Maria\",Diaz,31000001,2000-01-01,1234
Juan,Perez,32000002,1980-05-05,777
Maria,Gomez,33000003,1975-12-31,9999
Pedro,Ruiz,34000004,1990-07-07,4321
";

#[tokio::test]
async fn test_full_exchange_with_resumable_source() {
    let (listener, address) = bind().await;
    let server = spawn_server(listener, 1, "2,111,222");

    let path = bets_file("full", FIVE_BETS);
    let mut client = client(&address, 2);
    let mut source = FileBetSource::new(&path, 2);

    let winners = client.run(&mut source).await.unwrap();
    assert_eq!(winners.count, 2);
    assert_eq!(winners.documents, vec!["111".to_string(), "222".to_string()]);
    assert_eq!(client.phase(), Phase::Done);

    let transcript = server.await.unwrap();

    // 5 bets in batches of 2; the bet named "Ana,Maria" is left out of the
    // first batch but the batch is still sent
    let counts: Vec<usize> = transcript
        .batches
        .iter()
        .map(|body| decode_batch(body).unwrap().declared)
        .collect();
    assert_eq!(counts, vec![1, 2, 1]);

    let first = decode_batch(&transcript.batches[0]).unwrap();
    assert_eq!(first.records[0].0, "4");
    assert_eq!(first.records[0].1.document, "30904465");
    assert!(!transcript.batches[0].contains("Ana"));

    assert_eq!(transcript.fin.as_deref(), Some("FIN,AGENCIA=4"));
    assert_eq!(
        transcript.winners_queries,
        vec!["GANADORES,AGENCIA=4".to_string(); 2]
    );

    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn test_batch_counts_follow_batch_size() {
    let (listener, address) = bind().await;
    let server = spawn_server(listener, 0, "0");

    let bets: Vec<Bet> = (1..=5)
        .map(|i| Bet::new("Nombre", "Apellido", i.to_string(), "2000-01-01", "100"))
        .collect();
    let mut source = EagerBetSource::new(bets.chunks(2).map(<[Bet]>::to_vec).collect());
    let mut client = client(&address, 2);

    let winners = client.run(&mut source).await.unwrap();
    assert!(winners.is_empty());

    let transcript = server.await.unwrap();
    let decoded: Vec<_> = transcript
        .batches
        .iter()
        .map(|body| decode_batch(body).unwrap())
        .collect();
    assert_eq!(
        decoded.iter().map(|b| b.declared).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );

    // Field values survive the trip in order
    let documents: Vec<String> = decoded
        .iter()
        .flat_map(|b| b.records.iter().map(|(_, bet)| bet.document.clone()))
        .collect();
    assert_eq!(documents, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_next_batch_waits_for_ack() {
    let (listener, address) = bind().await;

    // Holds back the first ack and checks nothing else arrives meanwhile
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut peer = Peer::new(socket);

        let first = peer.recv().await.unwrap();
        assert!(peer.frames.is_empty());

        let mut buf = [0u8; 64];
        let early =
            tokio::time::timeout(Duration::from_millis(200), peer.socket.read(&mut buf)).await;
        assert!(early.is_err(), "bytes of the next batch arrived before the ack");

        peer.reply("OK").await;
        let second = peer.recv().await.unwrap();
        peer.reply("OK").await;
        (first, second)
    });

    let client = client(&address, 1);
    let mut transport = connect(&address, &client.cancel_token(), client.config().transport())
        .await
        .unwrap();
    let mut source = EagerBetSource::new(vec![
        vec![Bet::new("Juan", "Perez", "1", "2000-01-01", "7")],
        vec![Bet::new("Ana", "Diaz", "2", "2001-02-03", "8")],
    ]);

    let sent = client
        .send_all_batches(&mut transport, &mut source)
        .await
        .unwrap();
    assert_eq!(sent, 2);

    let (first, second) = server.await.unwrap();
    assert_eq!(decode_batch(&first).unwrap().records[0].1.document, "1");
    assert_eq!(decode_batch(&second).unwrap().records[0].1.document, "2");
}

#[tokio::test]
async fn test_winners_mismatch_fails_run() {
    let (listener, address) = bind().await;
    let server = spawn_server(listener, 0, "3,111");

    let mut source = EagerBetSource::default();
    let mut client = client(&address, 10);

    let result = client.run(&mut source).await;
    assert!(matches!(
        result,
        Err(ClientError::ProtocolViolation(Violation::WinnersMismatch {
            expected: 3,
            actual: 1
        }))
    ));
    assert_eq!(client.phase(), Phase::Failed);

    let transcript = server.await.unwrap();
    assert!(transcript.batches.is_empty());
    assert!(transcript.fin.is_some());
}

#[tokio::test]
async fn test_cancel_while_awaiting_ack() {
    let (listener, address) = bind().await;

    // Reads everything, never answers
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
    });

    let mut source = EagerBetSource::new(vec![vec![Bet::new(
        "Juan",
        "Perez",
        "1",
        "2000-01-01",
        "7",
    )]]);
    let mut client = client(&address, 10);

    let cancel = client.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = client.run(&mut source).await;

    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert_eq!(client.phase(), Phase::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));

    drop(client);
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let (listener, address) = bind().await;
    drop(listener);

    let mut source = EagerBetSource::default();
    let mut client = client(&address, 10);

    let result = client.run(&mut source).await;
    assert!(matches!(result, Err(ClientError::Connect { .. })));
    assert_eq!(client.phase(), Phase::Failed);
}

#[tokio::test]
async fn test_eager_and_resumable_sources_agree() {
    let path = bets_file("agree", FIVE_BETS);
    let cancel = tokio_util::sync::CancellationToken::new();

    let mut eager = EagerBetSource::load(&path, 2, &cancel).await.unwrap();
    let mut resumable = FileBetSource::new(&path, 2);

    loop {
        let a = eager.next_batch().await.unwrap();
        let b = resumable.next_batch().await.unwrap();
        assert_eq!(a, b);
        if a.is_none() {
            break;
        }
    }

    let _ = std::fs::remove_file(path);
}

#[test]
fn test_parse_winners_cases() {
    assert_eq!(parse_winners("0").unwrap().count, 0);

    let winners = parse_winners("2,111,222").unwrap();
    assert_eq!(winners.count, 2);
    assert_eq!(winners.documents, vec!["111", "222"]);

    let err = parse_winners("2,111").unwrap_err();
    assert!(matches!(err, ClientError::ProtocolViolation(_)));
    assert!(matches!(
        err,
        ClientError::ProtocolViolation(Violation::WinnersMismatch {
            expected: 2,
            actual: 1
        })
    ));
}
