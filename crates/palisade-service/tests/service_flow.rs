//! End-to-end Service scenarios over real sockets: a fake gate in front,
//! a fake game behind, the real registry/dispatcher/router in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use palisade_protocol::messages::{ChatMessagePush, ChatSendReq, LoginReq, LoginRsp};
use palisade_protocol::{Codec, Envelope, JsonCodec, msgid};
use palisade_service::{modules, NetServer, ServiceConfig};
use palisade_store::MemoryStore;
use palisade_transport::{Conn, ConnTimeouts, FramedTcp};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MAX: usize = 64 * 1024;

/// Fake Game node: acks enter-game, reports everything it reads.
async fn spawn_fake_game(
    cancel: CancellationToken,
) -> (SocketAddr, mpsc::Receiver<()>, mpsc::Receiver<Envelope>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (link_tx, link_rx) = mpsc::channel(8);
    let (seen_tx, seen_rx) = mpsc::channel(64);

    tokio::spawn(async move {
        loop {
            let (stream, _) = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(_) => continue,
                }
            };
            let _ = link_tx.send(()).await;
            let seen_tx = seen_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let conn = FramedTcp::new(stream, MAX, ConnTimeouts::default());
                loop {
                    let env = tokio::select! {
                        _ = cancel.cancelled() => return,
                        read = conn.read_envelope() => match read {
                            Ok(env) => env,
                            Err(_) => return,
                        }
                    };
                    if env.msg_id == msgid::PLAYER_ENTER_GAME_REQ {
                        let rsp = Envelope::new(
                            msgid::PLAYER_ENTER_GAME_RSP,
                            env.session_id,
                            env.player_id,
                            Vec::new(),
                        );
                        let _ = conn.write_envelope(&rsp).await;
                    }
                    let _ = seen_tx.send(env).await;
                }
            });
        }
    });

    (addr, link_rx, seen_rx)
}

fn free_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr")
}

async fn read_msg(conn: &FramedTcp, want_msg_id: i32) -> Envelope {
    let env = tokio::time::timeout(Duration::from_secs(5), conn.read_envelope())
        .await
        .expect("read within deadline")
        .expect("read");
    assert_eq!(env.msg_id, want_msg_id, "unexpected message {}", env.msg_id);
    env
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_dispatch_game_relay_and_ordering() {
    let cancel = CancellationToken::new();
    let (game_addr, mut game_link, mut game_seen) = spawn_fake_game(cancel.clone()).await;

    let listen_addr = free_port();
    let config = ServiceConfig {
        listen_addr: listen_addr.to_string(),
        game_addr: game_addr.to_string(),
        max_envelope_size: MAX,
        timeouts: ConnTimeouts::default(),
    };
    let registry =
        modules::default_registry(Arc::new(MemoryStore::new())).expect("registry builds");
    let server = Arc::new(NetServer::new(config, registry));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            server.run(cancel).await.expect("service runs");
        });
    }

    // The game link must be up before game-band forwards are admitted.
    tokio::time::timeout(Duration::from_secs(5), game_link.recv())
        .await
        .expect("game dial in time")
        .expect("game link");

    // A fake gate connects like the pool would.
    let gate = FramedTcp::new(
        TcpStream::connect(listen_addr).await.expect("connect"),
        MAX,
        ConnTimeouts::default(),
    );

    // -- keep-alive ---------------------------------------------------------
    gate.write_envelope(&Envelope::new(msgid::SERVICE_PING, 0, 0, Vec::new()))
        .await
        .expect("ping");
    read_msg(&gate, msgid::SERVICE_PONG).await;

    // -- login dispatch -----------------------------------------------------
    let login_payload = JsonCodec
        .encode(&LoginReq {
            account: "acct-a".into(),
            platform: 0,
            token: String::new(),
        })
        .expect("encode");
    gate.write_envelope(&Envelope::new(msgid::LOGIN_REQ, 7, 0, login_payload))
        .await
        .expect("send login");

    let rsp_env = read_msg(&gate, msgid::LOGIN_RSP).await;
    assert_eq!(rsp_env.session_id, 7);
    let rsp: LoginRsp = JsonCodec.decode(&rsp_env.payload).expect("decode");
    assert!(rsp.player_id > 0);
    assert_eq!(
        rsp_env.player_id, rsp.player_id,
        "set_player_id must stamp the reply envelope"
    );
    let player_id = rsp.player_id;

    // -- game-band relay and reply routing ----------------------------------
    gate.write_envelope(&Envelope::new(
        msgid::PLAYER_ENTER_GAME_REQ,
        7,
        player_id,
        Vec::new(),
    ))
    .await
    .expect("send enter game");

    let forwarded = tokio::time::timeout(Duration::from_secs(5), game_seen.recv())
        .await
        .expect("game sees enter in time")
        .expect("game channel");
    assert_eq!(forwarded.msg_id, msgid::PLAYER_ENTER_GAME_REQ);
    assert_eq!(forwarded.player_id, player_id);

    // The fake game's reply comes back on the originating gate link.
    let relayed = read_msg(&gate, msgid::PLAYER_ENTER_GAME_RSP).await;
    assert_eq!(relayed.session_id, 7);

    // -- per-session ordering ------------------------------------------------
    // Ten chat sends on one session land on one shard; the pushes must
    // come back in send order.
    for i in 0..10 {
        let payload = JsonCodec
            .encode(&ChatSendReq {
                channel: "world".into(),
                text: format!("msg-{i}"),
            })
            .expect("encode");
        gate.write_envelope(&Envelope::new(msgid::CHAT_SEND_REQ, 7, player_id, payload))
            .await
            .expect("send chat");
    }
    for i in 0..10 {
        read_msg(&gate, msgid::CHAT_SEND_RSP).await;
        let push = read_msg(&gate, msgid::CHAT_MESSAGE_PUSH).await;
        let push: ChatMessagePush = JsonCodec.decode(&push.payload).expect("decode");
        assert_eq!(push.text, format!("msg-{i}"), "dispatch order must match arrival order");
        assert_eq!(push.from_player, player_id);
    }

    // -- offline notify clears the player route ------------------------------
    gate.write_envelope(&Envelope::new(
        msgid::PLAYER_OFFLINE_NOTIFY,
        7,
        player_id,
        Vec::new(),
    ))
    .await
    .expect("send offline");
    let seen = tokio::time::timeout(Duration::from_secs(5), game_seen.recv())
        .await
        .expect("game sees offline in time")
        .expect("game channel");
    assert_eq!(seen.msg_id, msgid::PLAYER_OFFLINE_NOTIFY);

    cancel.cancel();
}
