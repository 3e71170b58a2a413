use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use crate::store::Value;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

pub struct SetCommand;

#[async_trait]
impl CommandHandler for SetCommand {
    fn name(&self) -> &'static str {
        "SET"
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 2 && args.len() != 4 {
            return error("Invalid args");
        }
        let mut expires_at = None;
        if args.len() == 4 {
            let unit_ms = match args[2].to_lowercase().as_str() {
                "px" => 1,
                "ex" => 1000,
                _ => return error("Unsupported command arg"),
            };
            let Ok(amount) = args[3].parse::<u64>() else {
                return error("Unsupported command arg");
            };
            expires_at = Some(SystemTime::now() + Duration::from_millis(amount * unit_ms));
        }
        ctx.store.set_string(&args[0], &args[1], expires_at).await;
        value(Resp::simple("OK"))
    }
}

pub struct GetCommand;

#[async_trait]
impl CommandHandler for GetCommand {
    fn name(&self) -> &'static str {
        "GET"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 1 {
            return error("Invalid args");
        }
        match ctx.store.get(&args[0]).await {
            None => value(Resp::NullBulk),
            Some(entry) => match entry.value {
                Value::String(s) => value(Resp::bulk(s)),
                _ => error("Operation against a key holding the wrong kind of value"),
            },
        }
    }
}

pub struct IncrCommand;

#[async_trait]
impl CommandHandler for IncrCommand {
    fn name(&self) -> &'static str {
        "INCR"
    }

    fn is_write(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 1 {
            return error("Invalid args");
        }
        match ctx.store.incr(&args[0]).await {
            Ok(n) => value(Resp::Int(n)),
            Err(e) => error(e.to_string()),
        }
    }
}
