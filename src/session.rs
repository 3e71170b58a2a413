use crate::command::CommandHandler;
use crate::pubsub::{ChannelManager, Subscriber, Subscription};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct QueuedCommand {
    pub handler: Arc<dyn CommandHandler>,
    pub args: Vec<String>,
    pub raw: Bytes,
}

/// Per-connection execution state: plain, transaction buffering, or
/// subscribed mode. Also carries the replica-link flags the dispatcher and
/// the replication engine consult.
pub struct Session {
    pub id: u64,
    pub outbox: mpsc::UnboundedSender<Bytes>,
    /// True for the replica's inbound link from its master: replies are
    /// suppressed and nothing propagates onward.
    pub from_master: bool,
    /// Flipped when a client identifies itself via REPLCONF listening-port.
    pub is_replica_link: bool,
    in_transaction: bool,
    queued: Vec<QueuedCommand>,
    subscriber: Option<Arc<Subscriber>>,
    subscriptions: HashMap<String, Subscription>,
}

impl Session {
    pub fn new(id: u64, outbox: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            id,
            outbox,
            from_master: false,
            is_replica_link: false,
            in_transaction: false,
            queued: Vec::new(),
            subscriber: None,
            subscriptions: HashMap::new(),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn begin_transaction(&mut self) {
        self.in_transaction = true;
        self.queued.clear();
    }

    pub fn discard_transaction(&mut self) {
        self.in_transaction = false;
        self.queued.clear();
    }

    pub fn queue_command(&mut self, handler: Arc<dyn CommandHandler>, args: Vec<String>, raw: Bytes) {
        self.queued.push(QueuedCommand { handler, args, raw });
    }

    /// Drain the transaction queue and leave transaction mode.
    pub fn take_queued(&mut self) -> Vec<QueuedCommand> {
        self.in_transaction = false;
        std::mem::take(&mut self.queued)
    }

    pub fn is_subscribed(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Materialize a subscription for `name` unless one exists. Returns the
    /// subscription count for this session.
    pub fn subscribe(&mut self, channels: &ChannelManager, name: &str) -> usize {
        if !self.subscriptions.contains_key(name) {
            let subscriber = self
                .subscriber
                .get_or_insert_with(|| Subscriber::new(self.outbox.clone()))
                .clone();
            let channel = channels.channel(name);
            let guard = channel.subscribe(&subscriber);
            self.subscriptions.insert(name.to_string(), guard);
        }
        self.subscriptions.len()
    }

    /// Drop the subscription for `name`; leaving the last one returns the
    /// session to plain mode. Returns the remaining count.
    pub fn unsubscribe(&mut self, name: &str) -> usize {
        self.subscriptions.remove(name);
        self.subscriptions.len()
    }
}
