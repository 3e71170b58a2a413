use crate::resp::Resp;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::warn;

/// A connection's delivery endpoint. Messages are pushed into the
/// connection's socket outbox, which drains FIFO, so per-publisher order is
/// preserved per subscriber.
pub struct Subscriber {
    outbox: mpsc::UnboundedSender<Bytes>,
}

impl Subscriber {
    pub fn new(outbox: mpsc::UnboundedSender<Bytes>) -> Arc<Self> {
        Arc::new(Self { outbox })
    }

    fn deliver(&self, channel: &str, payload: &str) -> bool {
        let frame = Resp::Array(vec![
            Resp::bulk("message"),
            Resp::bulk(channel),
            Resp::bulk(payload),
        ])
        .encode();
        self.outbox.send(Bytes::from(frame)).is_ok()
    }
}

struct ChannelInner {
    next_id: u64,
    subscribers: HashMap<u64, Weak<Subscriber>>,
}

/// Named channel holding weak subscriber references. Subscribers own their
/// `Subscription` guards; dropping a guard detaches the id, and a dropped
/// subscriber is swept on the next publish.
pub struct Channel {
    name: String,
    inner: Mutex<ChannelInner>,
}

impl Channel {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            inner: Mutex::new(ChannelInner {
                next_id: 0,
                subscribers: HashMap::new(),
            }),
        })
    }

    pub fn subscribe(self: &Arc<Self>, subscriber: &Arc<Subscriber>) -> Subscription {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Arc::downgrade(subscriber));
        Subscription {
            channel: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver `payload` to every live subscriber. Dead entries are swept
    /// under a brief lock; delivery happens after the lock is released.
    /// Returns the number of attempted deliveries.
    pub fn publish(&self, payload: &str) -> usize {
        let live: Vec<Arc<Subscriber>> = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .subscribers
                .retain(|_, subscriber| subscriber.strong_count() > 0);
            inner
                .subscribers
                .values()
                .filter_map(Weak::upgrade)
                .collect()
        };
        let count = live.len();
        for subscriber in live {
            if !subscriber.deliver(&self.name, payload) {
                warn!(channel = %self.name, "dropping pub/sub message for closed connection");
            }
        }
        count
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.lock().unwrap().subscribers.remove(&id);
    }
}

/// Subscription guard: dropping it detaches from the channel, a no-op if the
/// channel is already gone.
pub struct Subscription {
    channel: Weak<Channel>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unsubscribe(self.id);
        }
    }
}

pub struct ChannelManager {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create the named channel.
    pub fn channel(&self, name: &str) -> Arc<Channel> {
        {
            let channels = self.channels.read().unwrap();
            if let Some(channel) = channels.get(name) {
                return channel.clone();
            }
        }
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(name.to_string())
            .or_insert_with(|| Channel::new(name))
            .clone()
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
