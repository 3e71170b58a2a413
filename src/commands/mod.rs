mod basic;
mod lists;
mod pubsub;
mod replication;
mod streams;
mod strings;
mod transactions;
mod zsets;

use crate::command::CommandHandler;
use crate::registry::Registry;
use std::sync::Arc;

/// Build the command table. Every verb the server speaks is registered
/// here, once, at startup.
pub fn register_all() -> Registry<&'static str, Arc<dyn CommandHandler>> {
    let mut registry = Registry::new();
    let handlers: Vec<Arc<dyn CommandHandler>> = vec![
        Arc::new(basic::PingCommand),
        Arc::new(basic::EchoCommand),
        Arc::new(basic::TypeCommand),
        Arc::new(basic::KeysCommand),
        Arc::new(basic::ConfigCommand),
        Arc::new(basic::InfoCommand),
        Arc::new(strings::SetCommand),
        Arc::new(strings::GetCommand),
        Arc::new(strings::IncrCommand),
        Arc::new(lists::RpushCommand),
        Arc::new(lists::LpushCommand),
        Arc::new(lists::LlenCommand),
        Arc::new(lists::LrangeCommand),
        Arc::new(lists::LpopCommand),
        Arc::new(lists::BlpopCommand),
        Arc::new(streams::XaddCommand),
        Arc::new(streams::XrangeCommand),
        Arc::new(streams::XreadCommand),
        Arc::new(zsets::ZaddCommand),
        Arc::new(zsets::ZrankCommand),
        Arc::new(zsets::ZrangeCommand),
        Arc::new(zsets::ZcardCommand),
        Arc::new(zsets::ZscoreCommand),
        Arc::new(zsets::ZremCommand),
        Arc::new(pubsub::SubscribeCommand),
        Arc::new(pubsub::UnsubscribeCommand),
        Arc::new(pubsub::PublishCommand),
        Arc::new(transactions::MultiCommand),
        Arc::new(transactions::ExecCommand),
        Arc::new(transactions::DiscardCommand),
        Arc::new(replication::ReplconfCommand),
        Arc::new(replication::PsyncCommand),
        Arc::new(replication::WaitCommand),
    ];
    for handler in handlers {
        registry.register(handler.name(), handler);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_verb_is_registered() {
        let registry = register_all();
        for name in [
            "PING", "ECHO", "SET", "GET", "INCR", "TYPE", "KEYS", "CONFIG", "INFO", "RPUSH",
            "LPUSH", "LLEN", "LRANGE", "LPOP", "BLPOP", "XADD", "XRANGE", "XREAD", "ZADD",
            "ZRANK", "ZRANGE", "ZCARD", "ZSCORE", "ZREM", "MULTI", "EXEC", "DISCARD",
            "SUBSCRIBE", "UNSUBSCRIBE", "PUBLISH", "WAIT", "REPLCONF", "PSYNC",
        ] {
            assert!(registry.contains(name), "missing handler for {name}");
        }
        assert_eq!(registry.len(), 33);
    }

    #[test]
    fn write_flags_match_the_propagation_set() {
        let registry = register_all();
        for name in ["SET", "RPUSH", "LPUSH", "XADD", "INCR", "LPOP", "ZADD", "ZREM"] {
            assert!(registry.get(name).unwrap().is_write(), "{name} must be a write");
        }
        for name in ["GET", "BLPOP", "PING", "PUBLISH", "WAIT", "EXEC"] {
            assert!(!registry.get(name).unwrap().is_write(), "{name} must not propagate");
        }
    }
}
