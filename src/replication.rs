use crate::command::CommandContext;
use crate::connection::dispatch_command;
use crate::errors::ReplicationError;
use crate::resp::{encode_command, parse_frame, parse_rdb_bulk, Resp};
use crate::session::Session;
use bytes::{Bytes, BytesMut};
use rand::RngCore;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    None,
    Master,
    Slave,
}

struct SlaveHandle {
    outbox: mpsc::UnboundedSender<Bytes>,
    acked: u64,
}

/// Master-side replication bookkeeping: 40-hex repl id, the offset of
/// propagated write bytes, and the attached replica links with their
/// acknowledged offsets.
pub struct MasterState {
    replid: String,
    repl_offset: AtomicU64,
    slaves: Mutex<HashMap<u64, SlaveHandle>>,
    ack_notify: Notify,
}

impl MasterState {
    fn new() -> Self {
        Self {
            replid: generate_replid(),
            repl_offset: AtomicU64::new(0),
            slaves: Mutex::new(HashMap::new()),
            ack_notify: Notify::new(),
        }
    }

    pub fn replid(&self) -> &str {
        &self.replid
    }

    pub fn repl_offset(&self) -> u64 {
        self.repl_offset.load(Ordering::SeqCst)
    }

    pub fn add_slave(&self, id: u64, outbox: mpsc::UnboundedSender<Bytes>) {
        let mut slaves = self.slaves.lock().unwrap();
        slaves.insert(id, SlaveHandle { outbox, acked: 0 });
        info!(connection = id, "registered replica link");
    }

    pub fn remove_slave(&self, id: u64) {
        let mut slaves = self.slaves.lock().unwrap();
        if slaves.remove(&id).is_some() {
            debug!(connection = id, "replica link removed");
        }
    }

    pub fn slave_count(&self) -> usize {
        self.slaves.lock().unwrap().len()
    }

    /// Record `REPLCONF ACK <offset>` from a replica and wake WAIT callers.
    pub fn update_ack(&self, id: u64, offset: u64) {
        {
            let mut slaves = self.slaves.lock().unwrap();
            if let Some(handle) = slaves.get_mut(&id) {
                handle.acked = offset;
            }
        }
        self.ack_notify.notify_waiters();
    }

    /// Fan a raw write-command frame out to every replica. The offset bump
    /// and the fan-out happen under the same lock section, so two writes
    /// reach every replica in master execution order.
    pub fn propagate(&self, raw: &Bytes) {
        let slaves = self.slaves.lock().unwrap();
        self.repl_offset.fetch_add(raw.len() as u64, Ordering::SeqCst);
        for handle in slaves.values() {
            let _ = handle.outbox.send(raw.clone());
        }
    }

    pub fn broadcast_getack(&self) {
        let frame = Bytes::from(encode_command(&["REPLCONF", "GETACK", "*"]));
        let slaves = self.slaves.lock().unwrap();
        for handle in slaves.values() {
            let _ = handle.outbox.send(frame.clone());
        }
    }

    /// WAIT: block until at least `needed` replicas have acknowledged the
    /// offset observed at entry, or the deadline passes. A zero timeout
    /// waits forever. Returns how many qualify.
    pub async fn wait_for_acks(&self, needed: usize, timeout_ms: u64) -> usize {
        let target = self.repl_offset();
        let deadline = (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));
        loop {
            let notified = self.ack_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let count = self.count_acked(target);
            if count >= needed {
                return count;
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return count;
                    }
                    if tokio::time::timeout(deadline - now, notified).await.is_err() {
                        return self.count_acked(target);
                    }
                }
            }
        }
    }

    fn count_acked(&self, target: u64) -> usize {
        let slaves = self.slaves.lock().unwrap();
        slaves.values().filter(|handle| handle.acked >= target).count()
    }
}

/// Replica-side bookkeeping: bytes consumed from the master link after the
/// snapshot, as reported by REPLCONF ACK.
pub struct SlaveState {
    bytes_processed: AtomicU64,
}

impl SlaveState {
    fn new() -> Self {
        Self {
            bytes_processed: AtomicU64::new(0),
        }
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::SeqCst)
    }

    pub fn add_processed(&self, n: u64) {
        self.bytes_processed.fetch_add(n, Ordering::SeqCst);
    }
}

/// Process-wide replication state; the role is fixed at boot.
pub struct ReplicationState {
    role: Role,
    master: Option<MasterState>,
    slave: Option<SlaveState>,
}

impl ReplicationState {
    pub fn new_master() -> Self {
        Self {
            role: Role::Master,
            master: Some(MasterState::new()),
            slave: None,
        }
    }

    pub fn new_slave() -> Self {
        Self {
            role: Role::Slave,
            master: None,
            slave: Some(SlaveState::new()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }

    pub fn master(&self) -> Option<&MasterState> {
        self.master.as_ref()
    }

    pub fn slave(&self) -> Option<&SlaveState> {
        self.slave.as_ref()
    }

    /// INFO replication section body.
    pub fn replication_info(&self) -> String {
        match (&self.master, self.role) {
            (Some(master), _) => {
                let mut info = String::from("role:master");
                let _ = write!(info, "\nmaster_replid:{}", master.replid());
                let _ = write!(info, "\nmaster_repl_offset:{}", master.repl_offset());
                info
            }
            (None, Role::Slave) => "role:slave".to_string(),
            (None, _) => "role:none".to_string(),
        }
    }
}

fn generate_replid() -> String {
    let mut bytes = [0u8; 20];
    rand::rng().fill_bytes(&mut bytes);
    let mut id = String::with_capacity(40);
    for byte in bytes {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

fn fullresync_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^FULLRESYNC ([0-9a-fA-F]{40}) ([0-9]+)$").expect("valid FULLRESYNC pattern")
    })
}

/// Boot-time connect to the configured master. Failure here is fatal for
/// the process; later link errors only kill the link task.
pub async fn connect_master(host: &str, port: u16) -> Result<TcpStream, ReplicationError> {
    Ok(TcpStream::connect((host, port)).await?)
}

struct MasterLink {
    read: OwnedReadHalf,
    write: OwnedWriteHalf,
    buf: BytesMut,
}

impl MasterLink {
    async fn send(&mut self, args: &[&str]) -> Result<(), ReplicationError> {
        self.write.write_all(&encode_command(args)).await?;
        Ok(())
    }

    async fn read_frame(&mut self, step: &'static str) -> Result<Resp, ReplicationError> {
        loop {
            match parse_frame(&self.buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = self.buf.split_to(consumed);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(ReplicationError::Handshake {
                        step,
                        detail: e.to_string(),
                    })
                }
            }
            if self.read.read_buf(&mut self.buf).await? == 0 {
                return Err(ReplicationError::Handshake {
                    step,
                    detail: "master closed the connection".to_string(),
                });
            }
        }
    }

    async fn expect_simple(&mut self, want: &str, step: &'static str) -> Result<(), ReplicationError> {
        match self.read_frame(step).await? {
            Resp::Simple(s) if s == want => Ok(()),
            other => Err(ReplicationError::Handshake {
                step,
                detail: format!("unexpected reply: {other:?}"),
            }),
        }
    }

    /// The snapshot bulk that follows FULLRESYNC carries no trailing CRLF.
    async fn read_snapshot(&mut self) -> Result<Vec<u8>, ReplicationError> {
        loop {
            match parse_rdb_bulk(&self.buf) {
                Ok(Some((payload, consumed))) => {
                    let _ = self.buf.split_to(consumed);
                    return Ok(payload);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(ReplicationError::Handshake {
                        step: "snapshot",
                        detail: e.to_string(),
                    })
                }
            }
            if self.read.read_buf(&mut self.buf).await? == 0 {
                return Err(ReplicationError::Handshake {
                    step: "snapshot",
                    detail: "master closed the connection".to_string(),
                });
            }
        }
    }
}

/// Drive the replica side: PING, REPLCONF x2, PSYNC, snapshot ingest, then
/// the streaming apply loop with byte-accurate offset accounting.
pub async fn run_replica_link(
    stream: TcpStream,
    ctx: Arc<CommandContext>,
    listen_port: u16,
) -> Result<(), ReplicationError> {
    let (read, write) = stream.into_split();
    let mut link = MasterLink {
        read,
        write,
        buf: BytesMut::with_capacity(4096),
    };

    link.send(&["PING"]).await?;
    link.expect_simple("PONG", "PING").await?;
    link.send(&["REPLCONF", "listening-port", &listen_port.to_string()])
        .await?;
    link.expect_simple("OK", "REPLCONF listening-port").await?;
    link.send(&["REPLCONF", "capa", "psync2"]).await?;
    link.expect_simple("OK", "REPLCONF capa").await?;
    link.send(&["PSYNC", "?", "-1"]).await?;
    match link.read_frame("PSYNC").await? {
        Resp::Simple(line) if fullresync_pattern().is_match(&line) => {
            info!(%line, "master accepted psync");
        }
        other => {
            return Err(ReplicationError::Handshake {
                step: "PSYNC",
                detail: format!("unexpected reply: {other:?}"),
            })
        }
    }
    let snapshot = link.read_snapshot().await?;
    info!(bytes = snapshot.len() as u64, "snapshot received from master");
    seed_from_snapshot(&ctx, &snapshot).await;

    apply_master_stream(link, ctx).await
}

async fn seed_from_snapshot(ctx: &CommandContext, snapshot: &[u8]) {
    match crate::rdb::parse(snapshot) {
        Ok(records) => {
            for record in records {
                ctx.store
                    .set_string(&record.key, &record.value, record.expires_at)
                    .await;
            }
        }
        Err(e) => warn!(error = %e, "could not parse master snapshot, starting empty"),
    }
}

/// Apply every command the master streams. Replies are transmitted only for
/// `REPLCONF GETACK *`; each applied frame bumps `bytes_processed` by its
/// raw byte length after the reply is built, so the first GETACK reports
/// the offset before itself.
async fn apply_master_stream(
    mut link: MasterLink,
    ctx: Arc<CommandContext>,
) -> Result<(), ReplicationError> {
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<Bytes>();
    let mut session = Session::new(0, outbox);
    session.from_master = true;

    loop {
        loop {
            let (frame, consumed) = match parse_frame(&link.buf) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(e) => return Err(ReplicationError::Protocol(e.to_string())),
            };
            let raw = link.buf.split_to(consumed).freeze();
            let is_getack = is_getack_frame(&frame);
            let replies = dispatch_command(&ctx, &mut session, &frame, raw).await;
            if is_getack {
                for reply in &replies {
                    link.write.write_all(&reply.encode()).await?;
                }
            }
            // Anything a handler pushed at the session outbox is dropped:
            // the master link never receives unsolicited replies.
            while outbox_rx.try_recv().is_ok() {}
            if let Some(slave) = ctx.repl.slave() {
                slave.add_processed(consumed as u64);
            }
        }
        if link.read.read_buf(&mut link.buf).await? == 0 {
            info!("master closed the replication stream");
            return Ok(());
        }
    }
}

fn is_getack_frame(frame: &Resp) -> bool {
    let Resp::Array(items) = frame else {
        return false;
    };
    match (items.first(), items.get(1)) {
        (Some(Resp::Bulk(cmd)), Some(Resp::Bulk(sub))) => {
            cmd.eq_ignore_ascii_case("REPLCONF") && sub.eq_ignore_ascii_case("GETACK")
        }
        _ => false,
    }
}
