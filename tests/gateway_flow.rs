//! Gateway integration tests.
//!
//! These tests run the full dispatch path: chat message in, scripted
//! game server over a duplex pipe, formatted fragments out through a
//! recording sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use mudgate::gateway::{ChatSink, Gateway, GatewayOptions, InboundMessage};
use mudgate::output::{FormatOptions, TRUNCATION_NOTICE};
use mudgate::session::{QuiescenceTuning, SessionConfig, SessionRegistry};
use mudgate::store::{CredentialStore, MemoryStore};
use mudgate::transport::{Connector, TransportPair};

const LINE_DEADLINE: Duration = Duration::from_secs(2);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn fast_tuning() -> QuiescenceTuning {
    QuiescenceTuning {
        banner_wait: ms(80),
        login_wait: ms(80),
        create_wait: ms(80),
        command_wait: ms(80),
        poll_interval: ms(10),
        extend_window: ms(40),
        idle_nap: ms(5),
        peek_wait: ms(10),
        capture_ceiling: ms(1500),
    }
}

/// Connector that hands the server half of every dialed pipe to the
/// test, so the test can play the game server.
struct DuplexConnector {
    peers: mpsc::Sender<DuplexStream>,
}

impl DuplexConnector {
    fn new() -> (Arc<Self>, mpsc::Receiver<DuplexStream>) {
        let (tx, rx) = mpsc::channel(4);
        (Arc::new(Self { peers: tx }), rx)
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn open(&self, _host: &str, _port: u16) -> std::io::Result<TransportPair> {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let (reader, writer) = tokio::io::split(client);
        self.peers.send(server).await.map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no listener")
        })?;
        Ok(TransportPair {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

/// Test-side driver for one accepted connection.
struct Peer<S> {
    stream: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Peer<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    async fn send(&mut self, text: &str) {
        self.stream.write_all(text.as_bytes()).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn expect_line(&mut self) -> String {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                return String::from_utf8_lossy(&line)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
            }
            let mut chunk = [0u8; 1024];
            let n = timeout(LINE_DEADLINE, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for a line")
                .expect("peer read failed");
            assert!(n > 0, "peer closed while waiting for a line");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Assert that the gateway side closed the connection.
    async fn expect_closed(&mut self) {
        let mut chunk = [0u8; 1024];
        loop {
            let n = timeout(LINE_DEADLINE, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for close")
                .expect("peer read failed");
            if n == 0 {
                return;
            }
        }
    }
}

async fn accept(peers: &mut mpsc::Receiver<DuplexStream>) -> Peer<DuplexStream> {
    let stream = timeout(LINE_DEADLINE, peers.recv())
        .await
        .expect("no dial within deadline")
        .expect("connector dropped");
    Peer::new(stream)
}

#[derive(Debug, PartialEq)]
enum SinkEvent {
    Reply(String),
    Send(String),
    Ack,
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn reply(&self, text: &str) -> mudgate::Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Reply(text.to_string()));
        Ok(())
    }

    async fn send(&self, text: &str) -> mudgate::Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Send(text.to_string()));
        Ok(())
    }

    async fn ack(&self) -> mudgate::Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Ack);
        Ok(())
    }
}

struct TestBed {
    gateway: Gateway,
    registry: Arc<SessionRegistry>,
    store: Arc<MemoryStore>,
}

fn bed(tweak: impl FnOnce(&mut GatewayOptions)) -> (TestBed, mpsc::Receiver<DuplexStream>) {
    let (connector, peers) = DuplexConnector::new();
    let mut options = GatewayOptions {
        secret: "test-secret".to_string(),
        account_prefix: "chat_".to_string(),
        auto_create: true,
        dm_only: true,
        warn_public_play: true,
        rename_template: None,
        format: FormatOptions::default(),
        pacing: ms(1),
    };
    tweak(&mut options);

    let config = SessionConfig {
        host: "game.test".to_string(),
        port: 4000,
        idle_timeout: Duration::from_secs(3600),
        tuning: fast_tuning(),
    };
    let registry = Arc::new(SessionRegistry::new(connector, config));
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::new(
        options,
        Arc::clone(&registry),
        Arc::clone(&store) as Arc<dyn CredentialStore>,
    );
    (
        TestBed {
            gateway,
            registry,
            store,
        },
        peers,
    )
}

fn dm(identity: &str, display_name: &str, text: &str) -> InboundMessage {
    InboundMessage {
        identity: identity.to_string(),
        display_name: display_name.to_string(),
        text: text.to_string(),
        public_channel: false,
    }
}

// ============================================================================
// First Contact
// ============================================================================

#[tokio::test]
async fn test_first_contact_provisions_account() {
    let (bed, mut peers) = bed(|options| {
        options.rename_template = Some("@name me={name}".to_string());
    });

    let server = tokio::spawn(async move {
        let mut peer = accept(&mut peers).await;
        peer.send("Welcome to TestMUD! Type 'connect <name> <password>'.\r\n")
            .await;

        let line = peer.expect_line().await;
        let parts: Vec<&str> = line.split(' ').collect();
        assert_eq!(parts[0], "connect");
        assert_eq!(parts[1], "chat_u7");
        let password = parts[2].to_string();
        assert!(password.starts_with("pw_"));
        assert_eq!(password.len(), 23);
        peer.send("That name does not exist.\r\n").await;

        assert_eq!(
            peer.expect_line().await,
            format!("create chat_u7 {}", password)
        );
        peer.send("Account chat_u7 created.\r\n").await;

        assert_eq!(
            peer.expect_line().await,
            format!("connect chat_u7 {}", password)
        );
        peer.send("You become Adventurer.\r\n").await;

        assert_eq!(peer.expect_line().await, "@name me=Alice Smith");
        peer.send("Name set.\r\n").await;

        assert_eq!(peer.expect_line().await, "look");
        peer.send("A moonlit courtyard. Exits: gate.\r\n").await;
    });

    let sink = RecordingSink::default();
    bed.gateway
        .handle_message(&dm("u7", "Alice Smith", "look"), &sink)
        .await
        .unwrap();
    server.await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2, "got {events:?}");
    assert_eq!(
        events[0],
        SinkEvent::Reply("Created game account **chat_u7** for you.".to_string())
    );
    match &events[1] {
        SinkEvent::Reply(text) => assert!(text.contains("moonlit courtyard"), "got {text:?}"),
        other => panic!("expected reply, got {other:?}"),
    }

    let record = bed.store.get("u7").await.unwrap().unwrap();
    assert_eq!(record.account, "chat_u7");
    assert!(record.password.starts_with("pw_"));
    assert_eq!(record.display_name.as_deref(), Some("Alice Smith"));
}

// ============================================================================
// Fragmentation
// ============================================================================

#[tokio::test]
async fn test_long_output_capped_with_notice() {
    let (bed, mut peers) = bed(|options| {
        options.format = FormatOptions {
            fragment_size: 40,
            max_fragments: 3,
        };
    });

    let server = tokio::spawn(async move {
        let mut peer = accept(&mut peers).await;
        peer.send("Welcome!\r\n").await;
        let line = peer.expect_line().await;
        assert!(line.starts_with("connect chat_u1 "));
        peer.send("Connected.\r\n").await;
        assert_eq!(peer.expect_line().await, "read plaque");
        peer.send(&format!("{}\r\n", "a".repeat(150))).await;
    });

    let sink = RecordingSink::default();
    bed.gateway
        .handle_message(&dm("u1", "u1", "read plaque"), &sink)
        .await
        .unwrap();
    server.await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 3, "got {events:?}");
    assert_eq!(events[0], SinkEvent::Reply("a".repeat(40)));
    assert_eq!(events[1], SinkEvent::Send("a".repeat(40)));
    assert_eq!(events[2], SinkEvent::Send(TRUNCATION_NOTICE.to_string()));
    for event in &events {
        let text = match event {
            SinkEvent::Reply(t) | SinkEvent::Send(t) => t,
            SinkEvent::Ack => continue,
        };
        assert!(text.len() <= 40, "over budget: {:?}", text.len());
    }
}

// ============================================================================
// Quiet Commands
// ============================================================================

#[tokio::test]
async fn test_empty_response_acknowledged() {
    let (bed, mut peers) = bed(|_| {});

    let server = tokio::spawn(async move {
        let mut peer = accept(&mut peers).await;
        peer.send("Welcome!\r\n").await;
        let line = peer.expect_line().await;
        assert!(line.starts_with("connect chat_u1 "));
        peer.send("Connected.\r\n").await;
        assert_eq!(peer.expect_line().await, "press lever");
        // No response at all.
    });

    let sink = RecordingSink::default();
    bed.gateway
        .handle_message(&dm("u1", "u1", "press lever"), &sink)
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(sink.events(), vec![SinkEvent::Ack]);
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn test_logout_closes_session() {
    let (bed, mut peers) = bed(|_| {});

    let server = tokio::spawn(async move {
        let mut peer = accept(&mut peers).await;
        peer.send("Welcome!\r\n").await;
        let line = peer.expect_line().await;
        assert!(line.starts_with("connect chat_u1 "));
        peer.send("Connected.\r\n").await;
        assert_eq!(peer.expect_line().await, "look");
        peer.send("A quiet library.\r\n").await;
        peer.expect_closed().await;
    });

    let sink = RecordingSink::default();
    bed.gateway
        .handle_message(&dm("u1", "u1", "look"), &sink)
        .await
        .unwrap();
    assert_eq!(bed.registry.count(), 1);

    bed.gateway
        .handle_message(&dm("u1", "u1", "logout"), &sink)
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(bed.registry.count(), 0);
    let events = sink.events();
    assert!(
        events.contains(&SinkEvent::Reply("Logged out.".to_string())),
        "got {events:?}"
    );
}

// ============================================================================
// Login Failure
// ============================================================================

#[tokio::test]
async fn test_login_failure_reports_server_text() {
    let (bed, mut peers) = bed(|options| {
        options.auto_create = false;
    });

    let server = tokio::spawn(async move {
        let mut peer = accept(&mut peers).await;
        peer.send("Welcome!\r\n").await;
        let line = peer.expect_line().await;
        assert!(line.starts_with("connect chat_u1 "));
        peer.send("Either that name does not exist, or it has a different password.\r\n")
            .await;
    });

    let sink = RecordingSink::default();
    bed.gateway
        .handle_message(&dm("u1", "u1", "look"), &sink)
        .await
        .unwrap();
    server.await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 1, "got {events:?}");
    match &events[0] {
        SinkEvent::Reply(text) => {
            assert!(text.contains("different password"), "got {text:?}");
        }
        other => panic!("expected reply, got {other:?}"),
    }
}
