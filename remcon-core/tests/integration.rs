//! Integration tests — full session lifecycles against mock Source and
//! BattlEye servers on localhost, covering authentication, command
//! round-trips, fragmented responses, server-pushed messages, and
//! timeout behaviour.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use remcon_core::battleye::packet as be_packet;
use remcon_core::source::{SourceCodec, SourcePacket, SourcePacketType};
use remcon_core::{
    BattlEyeClient, ConnectionState, RconConfig, RconError, RconEvent, SourceClient,
};

const TEST_DEADLINE: Duration = Duration::from_secs(5);

// ── Source mock server ───────────────────────────────────────────

/// Serve one connection: authenticate against `password`, answer each
/// command with the fragments produced by `respond`, and echo
/// terminator sentinels. Mirrors how real servers interleave replies.
async fn spawn_source_server<F>(password: &'static str, respond: F) -> SocketAddr
where
    F: Fn(&str) -> Vec<Vec<u8>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, SourceCodec);

        while let Some(Ok(packet)) = framed.next().await {
            match packet.packet_type {
                SourcePacketType::Auth => {
                    if packet.body == password.as_bytes() {
                        // Empty preamble, then the verdict echoing the id.
                        framed
                            .send(SourcePacket::response(packet.id, Vec::new()))
                            .await
                            .unwrap();
                        framed
                            .send(SourcePacket::new(
                                packet.id,
                                SourcePacketType::ExecCommand,
                                Vec::new(),
                            ))
                            .await
                            .unwrap();
                    } else {
                        framed
                            .send(SourcePacket::new(
                                -1,
                                SourcePacketType::ExecCommand,
                                Vec::new(),
                            ))
                            .await
                            .unwrap();
                    }
                }
                SourcePacketType::ExecCommand => {
                    let command = String::from_utf8_lossy(&packet.body).into_owned();
                    for fragment in respond(&command) {
                        framed
                            .send(SourcePacket::response(packet.id, fragment))
                            .await
                            .unwrap();
                    }
                }
                SourcePacketType::Response => {
                    // Terminator sentinel: echo it back.
                    framed
                        .send(SourcePacket::response(packet.id, Vec::new()))
                        .await
                        .unwrap();
                }
            }
        }
    });

    addr
}

/// A server that authenticates but swallows every request afterwards.
async fn spawn_mute_source_server(password: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, SourceCodec);

        while let Some(Ok(packet)) = framed.next().await {
            if packet.packet_type == SourcePacketType::Auth && packet.body == password.as_bytes() {
                framed
                    .send(SourcePacket::new(
                        packet.id,
                        SourcePacketType::ExecCommand,
                        Vec::new(),
                    ))
                    .await
                    .unwrap();
            }
            // Everything else is swallowed.
        }
    });

    addr
}

fn source_config(addr: SocketAddr, password: &str) -> RconConfig {
    RconConfig::source("127.0.0.1", password).with_port(addr.port())
}

// ── Source scenarios ─────────────────────────────────────────────

#[tokio::test]
async fn source_happy_path() {
    let addr = spawn_source_server("test_password", |command| match command {
        "list" => vec![b"There are 3 players online: Alice, Bob, Charlie".to_vec()],
        _ => vec![],
    })
    .await;

    let mut client = SourceClient::new(source_config(addr, "test_password"));
    client.connect().await.unwrap();
    assert!(client.is_authenticated());

    let response = timeout(TEST_DEADLINE, client.execute("list"))
        .await
        .expect("deadline")
        .unwrap();
    assert_eq!(response, "There are 3 players online: Alice, Bob, Charlie");

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn source_wrong_password() {
    let addr = spawn_source_server("test_password", |_| vec![]).await;

    let mut client = SourceClient::new(source_config(addr, "not_the_password"));
    let err = timeout(TEST_DEADLINE, client.connect())
        .await
        .expect("deadline")
        .unwrap_err();

    assert!(matches!(err, RconError::AuthFailed));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn source_multi_fragment_response() {
    let addr = spawn_source_server("pw", |command| match command {
        "dump" => vec![b"foo".to_vec(), b"bar".to_vec()],
        _ => vec![],
    })
    .await;

    let mut client = SourceClient::new(source_config(addr, "pw"));
    client.connect().await.unwrap();

    let response = timeout(TEST_DEADLINE, client.execute("dump"))
        .await
        .expect("deadline")
        .unwrap();
    assert_eq!(response, "foobar");

    client.disconnect().await;
}

#[tokio::test]
async fn source_empty_response() {
    let addr = spawn_source_server("pw", |_| vec![]).await;

    let mut client = SourceClient::new(source_config(addr, "pw"));
    client.connect().await.unwrap();

    let response = timeout(TEST_DEADLINE, client.execute("save-all"))
        .await
        .expect("deadline")
        .unwrap();
    assert_eq!(response, "");

    client.disconnect().await;
}

#[tokio::test]
async fn source_execute_timeout_tears_down_entry() {
    let addr = spawn_mute_source_server("pw").await;

    let config = source_config(addr, "pw").with_io_timeout(Duration::from_millis(200));
    let mut client = SourceClient::new(config);
    client.connect().await.unwrap();

    let err = client.execute("list").await.unwrap_err();
    assert!(matches!(err, RconError::Timeout(_)));
    assert_eq!(client.pending_requests(), 0);

    client.disconnect().await;
}

#[tokio::test]
async fn source_execute_before_connect() {
    let mut client = SourceClient::new(RconConfig::source("127.0.0.1", "pw"));
    let err = client.execute("list").await.unwrap_err();
    assert!(matches!(err, RconError::NotAuthenticated));
}

#[tokio::test]
async fn source_lifecycle_events() {
    let addr = spawn_source_server("pw", |_| vec![]).await;

    let mut client = SourceClient::new(source_config(addr, "pw"));
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    client.disconnect().await;

    let mut states = Vec::new();
    let mut saw_authenticated = false;
    let mut saw_disconnected = false;
    let mut saw_close = false;
    while let Ok(event) = events.try_recv() {
        match event {
            RconEvent::StateChange { new, .. } => states.push(new),
            RconEvent::Authenticated => saw_authenticated = true,
            RconEvent::Disconnected => saw_disconnected = true,
            RconEvent::Close { had_error } => {
                saw_close = true;
                assert!(!had_error);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Authenticating,
            ConnectionState::Authenticated,
            ConnectionState::Disconnected,
        ]
    );
    assert!(saw_authenticated);
    assert!(saw_disconnected);
    assert!(saw_close);
}

#[tokio::test]
async fn source_connect_twice_rejected() {
    let addr = spawn_source_server("pw", |_| vec![]).await;

    let mut client = SourceClient::new(source_config(addr, "pw"));
    client.connect().await.unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, RconError::ConnectionFailed(_)));
    // The live session is unaffected.
    assert!(client.is_authenticated());

    client.disconnect().await;
}

// ── BattlEye mock server ─────────────────────────────────────────

struct BeServerHandle {
    addr: SocketAddr,
    /// Raw payloads of every ack datagram the server receives.
    acks: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Serve BattlEye RCON: check logins against `password`, answer
/// commands through `respond` (`None` = stay silent), and push
/// `push_after_login` to the client right after a successful login.
async fn spawn_battleye_server<F>(
    password: &'static str,
    respond: F,
    push_after_login: Option<Vec<u8>>,
) -> BeServerHandle
where
    F: Fn(&str) -> Option<String> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (ack_tx, acks) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let payload = match be_packet::parse(&buf[..len]) {
                Ok(payload) => payload.to_vec(),
                Err(_) => continue,
            };

            match payload.first() {
                Some(0x00) => {
                    let ok = &payload[1..] == password.as_bytes();
                    let verdict =
                        be_packet::build(&[0x00, if ok { 0x01 } else { 0x00 }]);
                    socket.send_to(&verdict, peer).await.unwrap();

                    if ok {
                        if let Some(message) = &push_after_login {
                            socket
                                .send_to(&be_packet::build(message), peer)
                                .await
                                .unwrap();
                        }
                    }
                }
                Some(0x01) => {
                    let seq = payload[1];
                    let command = String::from_utf8_lossy(&payload[2..]).into_owned();
                    if let Some(reply) = respond(&command) {
                        let datagram = be_packet::build(&be_packet::command_payload(
                            seq,
                            reply.as_bytes(),
                        ));
                        socket.send_to(&datagram, peer).await.unwrap();
                    }
                }
                Some(0x02) => {
                    let _ = ack_tx.send(payload);
                }
                _ => {}
            }
        }
    });

    BeServerHandle { addr, acks }
}

fn battleye_config(addr: SocketAddr, password: &str) -> RconConfig {
    RconConfig::battleye("127.0.0.1", password).with_port(addr.port())
}

// ── BattlEye scenarios ───────────────────────────────────────────

#[tokio::test]
async fn battleye_happy_path() {
    let server = spawn_battleye_server(
        "testpassword",
        |command| match command {
            "players" => Some("0 players".to_string()),
            _ => Some(String::new()),
        },
        None,
    )
    .await;

    let mut client = BattlEyeClient::new(battleye_config(server.addr, "testpassword"));
    client.connect().await.unwrap();
    assert!(client.is_authenticated());

    let response = timeout(TEST_DEADLINE, client.execute("players"))
        .await
        .expect("deadline")
        .unwrap();
    assert_eq!(response, "0 players");

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn battleye_wrong_password() {
    let server = spawn_battleye_server("testpassword", |_| None, None).await;

    let mut client = BattlEyeClient::new(battleye_config(server.addr, "nope"));
    let err = timeout(TEST_DEADLINE, client.connect())
        .await
        .expect("deadline")
        .unwrap_err();

    assert!(matches!(err, RconError::AuthFailed));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn battleye_server_message_is_acked_and_delivered() {
    let pushed = be_packet::command_payload(42, b"player connected");
    // Type byte 0x02 instead of 0x01: a server message, same shape.
    let pushed = {
        let mut p = pushed;
        p[0] = 0x02;
        p
    };
    let mut server = spawn_battleye_server("pw", |_| None, Some(pushed)).await;

    let mut client = BattlEyeClient::new(battleye_config(server.addr, "pw"));
    let mut events = client.subscribe();
    client.connect().await.unwrap();

    // The message text reaches subscribers...
    let message = timeout(TEST_DEADLINE, async {
        loop {
            match events.recv().await.expect("event stream ended") {
                RconEvent::ServerMessage(text) => break text,
                _ => continue,
            }
        }
    })
    .await
    .expect("deadline");
    assert_eq!(message, "player connected");

    // ...and the wire carried back exactly {0x02, seq}.
    let ack = timeout(TEST_DEADLINE, server.acks.recv())
        .await
        .expect("deadline")
        .unwrap();
    assert_eq!(ack, vec![0x02, 42]);

    client.disconnect().await;
}

#[tokio::test]
async fn battleye_execute_timeout() {
    let server = spawn_battleye_server("pw", |_| None, None).await;

    let config =
        battleye_config(server.addr, "pw").with_connect_timeout(Duration::from_millis(200));
    let mut client = BattlEyeClient::new(config);
    client.connect().await.unwrap();

    let err = client.execute("players").await.unwrap_err();
    assert!(matches!(err, RconError::Timeout(_)));
    assert_eq!(client.pending_requests(), 0);

    client.disconnect().await;
}

#[tokio::test]
async fn battleye_sequence_wraps_across_many_commands() {
    let server = spawn_battleye_server("pw", |command| Some(command.to_string()), None).await;

    let mut client = BattlEyeClient::new(battleye_config(server.addr, "pw"));
    client.connect().await.unwrap();

    // Cross the 255 → 0 wrap and keep correlating correctly.
    for i in 0..260 {
        let command = format!("echo {i}");
        let response = timeout(TEST_DEADLINE, client.execute(&command))
            .await
            .expect("deadline")
            .unwrap();
        assert_eq!(response, command);
    }

    client.disconnect().await;
}

#[tokio::test]
async fn battleye_execute_after_disconnect() {
    let server = spawn_battleye_server("pw", |_| None, None).await;

    let mut client = BattlEyeClient::new(battleye_config(server.addr, "pw"));
    client.connect().await.unwrap();
    client.disconnect().await;

    let err = client.execute("players").await.unwrap_err();
    assert!(matches!(err, RconError::NotAuthenticated));
}
