use crate::config::ServerConfig;
use crate::pubsub::ChannelManager;
use crate::registry::Registry;
use crate::replication::ReplicationState;
use crate::resp::{encode_rdb_bulk, Resp};
use crate::session::Session;
use crate::store::Store;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// One unit of reply. `Rdb` is the no-trailing-CRLF bulk a master sends
/// after `+FULLRESYNC`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Resp),
    Rdb(Vec<u8>),
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Value(resp) => resp.encode(),
            Reply::Rdb(payload) => encode_rdb_bulk(payload),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Value(Resp::Error(_)))
    }
}

pub fn value(resp: Resp) -> Vec<Reply> {
    vec![Reply::Value(resp)]
}

pub fn error(detail: impl AsRef<str>) -> Vec<Reply> {
    vec![Reply::Value(Resp::err(detail))]
}

/// Everything a handler needs besides the per-connection session.
pub struct CommandContext {
    pub store: Arc<Store>,
    pub repl: Arc<ReplicationState>,
    pub channels: Arc<ChannelManager>,
    pub config: Arc<ServerConfig>,
    pub commands: Registry<&'static str, Arc<dyn CommandHandler>>,
}

/// A stateless command implementation, shared behind the registry. `args`
/// excludes the verb itself. Session state (transactions, subscriptions,
/// replica flags) lives on the `Session`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Propagated to replicas and counted into the master offset.
    fn is_write(&self) -> bool {
        false
    }

    /// EXEC/DISCARD run even while a transaction is buffering.
    fn is_control(&self) -> bool {
        false
    }

    /// Permitted while the session is in subscribed mode.
    fn is_subscribed_mode(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply>;
}

/// Master-side write propagation: bump the offset by the raw frame length
/// and fan the same bytes out to every attached replica. No-op for
/// non-writes, failed commands, replica roles, and the master link itself.
pub fn propagate_if_write(
    ctx: &CommandContext,
    handler: &Arc<dyn CommandHandler>,
    session: &Session,
    raw: &Bytes,
    replies: &[Reply],
) {
    if !handler.is_write() || session.from_master {
        return;
    }
    if replies.first().is_some_and(Reply::is_error) {
        return;
    }
    if let Some(master) = ctx.repl.master() {
        master.propagate(raw);
    }
}
