use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use crate::store::format_score;
use async_trait::async_trait;

pub struct ZaddCommand;

#[async_trait]
impl CommandHandler for ZaddCommand {
    fn name(&self) -> &'static str {
        "ZADD"
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
        if args.len() != 3 {
            return error("Invalid args");
        }
        let Ok(score) = args[1].parse::<f64>() else {
            return error("value is not a valid float");
        };
        match ctx.store.zadd(&args[0], score, &args[2]).await {
            Ok(inserted) => value(Resp::Int(inserted as i64)),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct ZrankCommand;

#[async_trait]
impl CommandHandler for ZrankCommand {
    fn name(&self) -> &'static str {
        "ZRANK"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 2 {
            return error("Invalid args");
        }
        match ctx.store.zrank(&args[0], &args[1]).await {
            Ok(Some(rank)) => value(Resp::Int(rank as i64)),
            Ok(None) => value(Resp::NullBulk),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct ZrangeCommand;

#[async_trait]
impl CommandHandler for ZrangeCommand {
    fn name(&self) -> &'static str {
        "ZRANGE"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 3 {
            return error("Invalid args");
        }
        let (Ok(start), Ok(stop)) = (args[1].parse::<i64>(), args[2].parse::<i64>()) else {
            return error("Invalid args");
        };
        match ctx.store.zrange(&args[0], start, stop).await {
            Ok(members) => value(Resp::Array(members.into_iter().map(Resp::bulk).collect())),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct ZcardCommand;

#[async_trait]
impl CommandHandler for ZcardCommand {
    fn name(&self) -> &'static str {
        "ZCARD"
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
        match ctx.store.zcard(&args[0]).await {
            Ok(len) => value(Resp::Int(len as i64)),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct ZscoreCommand;

#[async_trait]
impl CommandHandler for ZscoreCommand {
    fn name(&self) -> &'static str {
        "ZSCORE"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 2 {
            return error("Invalid args");
        }
        match ctx.store.zscore(&args[0], &args[1]).await {
            Ok(Some(score)) => value(Resp::bulk(format_score(score))),
            Ok(None) => value(Resp::NullBulk),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct ZremCommand;

#[async_trait]
impl CommandHandler for ZremCommand {
    fn name(&self) -> &'static str {
        "ZREM"
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
        if args.len() != 2 {
            return error("Invalid args");
        }
        match ctx.store.zrem(&args[0], &args[1]).await {
            Ok(removed) => value(Resp::Int(removed as i64)),
            Err(e) => error(e.to_string()),
        }
    }
}
