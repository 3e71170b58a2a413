use redlite::config::ServerConfig;
use redlite::resp::{encode_command, parse_frame, Resp};
use redlite::server;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start_master() -> SocketAddr {
    let config = ServerConfig {
        port: 0,
        ..Default::default()
    };
    let (addr, _handle) = server::start(config).await.unwrap();
    addr
}

async fn start_replica(master: SocketAddr) -> SocketAddr {
    let config = ServerConfig {
        port: 0,
        replica_of: Some((master.ip().to_string(), master.port())),
        ..Default::default()
    };
    let (addr, _handle) = server::start(config).await.unwrap();
    addr
}

struct Client {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        Client {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: Vec::new(),
        }
    }

    async fn send(&mut self, args: &[&str]) {
        self.stream.write_all(&encode_command(args)).await.unwrap();
    }

    async fn read_reply(&mut self) -> Resp {
        loop {
            if let Some((frame, consumed)) = parse_frame(&self.buf).unwrap() {
                self.buf.drain(..consumed);
                return frame;
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "server closed the connection mid-reply");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn roundtrip(&mut self, args: &[&str]) -> Resp {
        self.send(args).await;
        self.read_reply().await
    }
}

fn bulk(s: &str) -> Resp {
    Resp::Bulk(s.to_string())
}

// S1: SET/GET with px expiry.
#[tokio::test]
async fn set_get_with_expiry() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.roundtrip(&["SET", "foo", "bar"]).await,
        Resp::Simple("OK".into())
    );
    assert_eq!(client.roundtrip(&["GET", "foo"]).await, bulk("bar"));
    assert_eq!(
        client.roundtrip(&["SET", "foo", "baz", "px", "100"]).await,
        Resp::Simple("OK".into())
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(client.roundtrip(&["GET", "foo"]).await, Resp::NullBulk);
    assert_eq!(
        client.roundtrip(&["TYPE", "foo"]).await,
        Resp::Simple("none".into())
    );
}

// S2: stream add and range, with the duplicate-id error.
#[tokio::test]
async fn stream_add_and_range() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.roundtrip(&["XADD", "s", "1-1", "f", "v"]).await,
        bulk("1-1")
    );
    assert_eq!(
        client.roundtrip(&["XADD", "s", "1-2", "f", "w"]).await,
        bulk("1-2")
    );
    assert_eq!(
        client.roundtrip(&["XADD", "s", "1-1", "x", "y"]).await,
        Resp::Error(
            "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                .into()
        )
    );
    let range = client.roundtrip(&["XRANGE", "s", "-", "+"]).await;
    assert_eq!(
        range,
        Resp::Array(vec![
            Resp::Array(vec![
                bulk("1-1"),
                Resp::Array(vec![bulk("f"), bulk("v")]),
            ]),
            Resp::Array(vec![
                bulk("1-2"),
                Resp::Array(vec![bulk("f"), bulk("w")]),
            ]),
        ])
    );
}

// S3: BLPOP blocks until another connection pushes.
#[tokio::test]
async fn blpop_wakes_on_push() {
    let addr = start_master().await;
    let mut blocked = Client::connect(addr).await;
    let mut pusher = Client::connect(addr).await;

    blocked.send(&["BLPOP", "q", "0"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pusher.roundtrip(&["RPUSH", "q", "a"]).await, Resp::Int(1));
    let reply = tokio::time::timeout(Duration::from_secs(2), blocked.read_reply())
        .await
        .expect("BLPOP should wake");
    assert_eq!(reply, Resp::Array(vec![bulk("q"), bulk("a")]));
}

#[tokio::test]
async fn blpop_times_out_with_null_bulk() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;
    assert_eq!(
        client.roundtrip(&["BLPOP", "empty", "0.1"]).await,
        Resp::NullBulk
    );
}

// S4: pub/sub delivery, subscribed-mode PING and gating.
#[tokio::test]
async fn pubsub_delivery_and_subscribed_mode() {
    let addr = start_master().await;
    let mut subscriber = Client::connect(addr).await;
    let mut publisher = Client::connect(addr).await;

    assert_eq!(
        subscriber.roundtrip(&["SUBSCRIBE", "ch1"]).await,
        Resp::Array(vec![bulk("subscribe"), bulk("ch1"), Resp::Int(1)])
    );
    assert_eq!(
        publisher.roundtrip(&["PUBLISH", "ch1", "hi"]).await,
        Resp::Int(1)
    );
    assert_eq!(
        subscriber.read_reply().await,
        Resp::Array(vec![bulk("message"), bulk("ch1"), bulk("hi")])
    );
    // PING is allowed and changes shape in subscribed mode.
    assert_eq!(
        subscriber.roundtrip(&["PING"]).await,
        Resp::Array(vec![bulk("pong"), bulk("")])
    );
    // Everything else is refused.
    assert_eq!(
        subscriber.roundtrip(&["GET", "k"]).await,
        Resp::Error("ERR Can't execute 'get' in subscribed mode".into())
    );
    // Unsubscribing the last channel returns to plain mode.
    assert_eq!(
        subscriber.roundtrip(&["UNSUBSCRIBE", "ch1"]).await,
        Resp::Array(vec![bulk("unsubscribe"), bulk("ch1"), Resp::Int(0)])
    );
    assert_eq!(
        subscriber.roundtrip(&["PING"]).await,
        Resp::Simple("PONG".into())
    );
    // The publisher now reaches nobody.
    assert_eq!(
        publisher.roundtrip(&["PUBLISH", "ch1", "again"]).await,
        Resp::Int(0)
    );
}

// S5: MULTI queues, EXEC replays in order, one array reply.
#[tokio::test]
async fn transaction_queues_and_execs() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.roundtrip(&["MULTI"]).await,
        Resp::Simple("OK".into())
    );
    assert_eq!(
        client.roundtrip(&["SET", "a", "1"]).await,
        Resp::Simple("QUEUED".into())
    );
    assert_eq!(
        client.roundtrip(&["INCR", "a"]).await,
        Resp::Simple("QUEUED".into())
    );
    assert_eq!(
        client.roundtrip(&["EXEC"]).await,
        Resp::Array(vec![Resp::Simple("OK".into()), Resp::Int(2)])
    );
    assert_eq!(client.roundtrip(&["GET", "a"]).await, bulk("2"));
}

#[tokio::test]
async fn transaction_state_errors() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;

    assert_eq!(
        client.roundtrip(&["EXEC"]).await,
        Resp::Error("ERR EXEC without MULTI".into())
    );
    assert_eq!(
        client.roundtrip(&["DISCARD"]).await,
        Resp::Error("ERR DISCARD without MULTI".into())
    );
    client.roundtrip(&["MULTI"]).await;
    client.roundtrip(&["SET", "x", "1"]).await;
    assert_eq!(
        client.roundtrip(&["DISCARD"]).await,
        Resp::Simple("OK".into())
    );
    assert_eq!(client.roundtrip(&["GET", "x"]).await, Resp::NullBulk);
}

// S6: replica handshake, propagation, WAIT quorum.
#[tokio::test]
async fn replica_receives_writes_and_acks() {
    let master = start_master().await;
    let replica = start_replica(master).await;

    let mut master_client = Client::connect(master).await;
    // Wait for the replica link to register (offset is still 0, so any
    // attached replica counts).
    let mut attached = false;
    for _ in 0..50 {
        if master_client.roundtrip(&["WAIT", "1", "100"]).await == Resp::Int(1) {
            attached = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(attached, "replica never finished the handshake");

    assert_eq!(
        master_client.roundtrip(&["SET", "k", "v"]).await,
        Resp::Simple("OK".into())
    );

    let mut replica_client = Client::connect(replica).await;
    let mut replicated = false;
    for _ in 0..50 {
        if replica_client.roundtrip(&["GET", "k"]).await == bulk("v") {
            replicated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(replicated, "write never reached the replica");

    assert_eq!(
        master_client.roundtrip(&["WAIT", "1", "2000"]).await,
        Resp::Int(1)
    );

    let info = master_client.roundtrip(&["INFO", "replication"]).await;
    let Resp::Bulk(body) = info else {
        panic!("INFO must reply a bulk string");
    };
    assert!(body.starts_with("role:master"));
    assert!(body.contains("master_replid:"));

    let replica_info = replica_client.roundtrip(&["INFO", "replication"]).await;
    assert_eq!(replica_info, bulk("role:slave"));
}

#[tokio::test]
async fn pipelined_commands_all_get_replies() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;
    let mut frame = encode_command(&["PING"]);
    frame.extend_from_slice(&encode_command(&["SET", "p", "1"]));
    frame.extend_from_slice(&encode_command(&["GET", "p"]));
    client.stream.write_all(&frame).await.unwrap();
    assert_eq!(client.read_reply().await, Resp::Simple("PONG".into()));
    assert_eq!(client.read_reply().await, Resp::Simple("OK".into()));
    assert_eq!(client.read_reply().await, bulk("1"));
}

#[tokio::test]
async fn protocol_and_arity_errors_keep_the_session_alive() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;

    assert!(matches!(
        client.roundtrip(&["NOSUCHCMD"]).await,
        Resp::Error(_)
    ));
    assert!(matches!(client.roundtrip(&["GET"]).await, Resp::Error(_)));
    assert_eq!(
        client.roundtrip(&["INCR", "s"]).await,
        Resp::Int(1)
    );
    client.roundtrip(&["SET", "s", "abc"]).await;
    assert_eq!(
        client.roundtrip(&["INCR", "s"]).await,
        Resp::Error("ERR value is not an integer or out of range".into())
    );
    // Type error, then the connection still serves.
    client.roundtrip(&["RPUSH", "l", "x"]).await;
    assert!(matches!(
        client.roundtrip(&["GET", "l"]).await,
        Resp::Error(_)
    ));
    assert_eq!(
        client.roundtrip(&["PING"]).await,
        Resp::Simple("PONG".into())
    );
}

#[tokio::test]
async fn lists_and_sorted_sets_over_the_wire() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;

    client.roundtrip(&["RPUSH", "l", "a", "b", "c"]).await;
    assert_eq!(client.roundtrip(&["LLEN", "l"]).await, Resp::Int(3));
    assert_eq!(
        client.roundtrip(&["LRANGE", "l", "0", "-1"]).await,
        Resp::Array(vec![bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(client.roundtrip(&["LPOP", "l"]).await, bulk("a"));
    assert_eq!(
        client.roundtrip(&["LPOP", "l", "2"]).await,
        Resp::Array(vec![bulk("b"), bulk("c")])
    );
    assert_eq!(client.roundtrip(&["LPOP", "l"]).await, Resp::NullBulk);

    assert_eq!(
        client.roundtrip(&["ZADD", "z", "2", "two"]).await,
        Resp::Int(1)
    );
    assert_eq!(
        client.roundtrip(&["ZADD", "z", "1", "one"]).await,
        Resp::Int(1)
    );
    assert_eq!(
        client.roundtrip(&["ZADD", "z", "3", "one"]).await,
        Resp::Int(0)
    );
    assert_eq!(client.roundtrip(&["ZCARD", "z"]).await, Resp::Int(2));
    assert_eq!(
        client.roundtrip(&["ZRANK", "z", "two"]).await,
        Resp::Int(0)
    );
    assert_eq!(client.roundtrip(&["ZSCORE", "z", "one"]).await, bulk("3"));
    assert_eq!(
        client.roundtrip(&["ZRANGE", "z", "0", "-1"]).await,
        Resp::Array(vec![bulk("two"), bulk("one")])
    );
    assert_eq!(client.roundtrip(&["ZREM", "z", "one"]).await, Resp::Int(1));
    assert_eq!(
        client.roundtrip(&["ZRANK", "z", "one"]).await,
        Resp::NullBulk
    );
}

#[tokio::test]
async fn xread_blocks_until_new_entry() {
    let addr = start_master().await;
    let mut reader = Client::connect(addr).await;
    let mut writer = Client::connect(addr).await;

    writer.roundtrip(&["XADD", "s", "1-1", "f", "v"]).await;
    reader
        .send(&["XREAD", "block", "5000", "streams", "s", "$"])
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    writer.roundtrip(&["XADD", "s", "2-0", "f", "w"]).await;
    let reply = tokio::time::timeout(Duration::from_secs(2), reader.read_reply())
        .await
        .expect("XREAD should wake");
    assert_eq!(
        reply,
        Resp::Array(vec![Resp::Array(vec![
            bulk("s"),
            Resp::Array(vec![Resp::Array(vec![
                bulk("2-0"),
                Resp::Array(vec![bulk("f"), bulk("w")]),
            ])]),
        ])])
    );
}

#[tokio::test]
async fn xread_block_timeout_is_null_bulk() {
    let addr = start_master().await;
    let mut client = Client::connect(addr).await;
    assert_eq!(
        client
            .roundtrip(&["XREAD", "block", "100", "streams", "nosuch", "$"])
            .await,
        Resp::NullBulk
    );
}

#[tokio::test]
async fn keys_and_config_get() {
    let dir = std::env::temp_dir().join(format!("redlite-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    // Checksum field zero means "not checksummed" and must be accepted.
    let mut snapshot = b"REDIS0011".to_vec();
    snapshot.push(0x00);
    snapshot.extend_from_slice(&[4]);
    snapshot.extend_from_slice(b"seed");
    snapshot.extend_from_slice(&[5]);
    snapshot.extend_from_slice(b"value");
    snapshot.push(0xFF);
    snapshot.extend_from_slice(&0u64.to_le_bytes());
    std::fs::write(dir.join("dump.rdb"), &snapshot).unwrap();

    let config = ServerConfig {
        port: 0,
        dir: Some(dir.to_string_lossy().to_string()),
        dbfilename: Some("dump.rdb".to_string()),
        ..Default::default()
    };
    let (addr, _handle) = server::start(config).await.unwrap();
    let mut client = Client::connect(addr).await;

    assert_eq!(client.roundtrip(&["GET", "seed"]).await, bulk("value"));
    assert_eq!(
        client.roundtrip(&["KEYS", "*"]).await,
        Resp::Array(vec![bulk("seed")])
    );
    assert_eq!(
        client.roundtrip(&["CONFIG", "GET", "dir"]).await,
        Resp::Array(vec![bulk("dir"), bulk(&dir.to_string_lossy())])
    );
}
