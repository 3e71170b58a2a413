use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use async_trait::async_trait;
use std::time::Duration;

pub struct RpushCommand;

#[async_trait]
impl CommandHandler for RpushCommand {
    fn name(&self) -> &'static str {
        "RPUSH"
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
        if args.len() < 2 {
            return error("Invalid args");
        }
        match ctx.store.list_push_back(&args[0], args[1..].to_vec()).await {
            Ok(len) => value(Resp::Int(len as i64)),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct LpushCommand;

#[async_trait]
impl CommandHandler for LpushCommand {
    fn name(&self) -> &'static str {
        "LPUSH"
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
        if args.len() < 2 {
            return error("Invalid args");
        }
        match ctx.store.list_push_front(&args[0], args[1..].to_vec()).await {
            Ok(len) => value(Resp::Int(len as i64)),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct LlenCommand;

#[async_trait]
impl CommandHandler for LlenCommand {
    fn name(&self) -> &'static str {
        "LLEN"
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
        match ctx.store.list_len(&args[0]).await {
            Ok(len) => value(Resp::Int(len as i64)),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct LrangeCommand;

#[async_trait]
impl CommandHandler for LrangeCommand {
    fn name(&self) -> &'static str {
        "LRANGE"
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
        match ctx.store.list_range(&args[0], start, stop).await {
            Ok(items) => value(Resp::Array(items.into_iter().map(Resp::bulk).collect())),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct LpopCommand;

#[async_trait]
impl CommandHandler for LpopCommand {
    fn name(&self) -> &'static str {
        "LPOP"
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
        if args.is_empty() || args.len() > 2 {
            return error("Invalid args");
        }
        let count = if args.len() == 2 {
            match args[1].parse::<usize>() {
                Ok(count) => count,
                Err(_) => return error("Invalid args"),
            }
        } else {
            1
        };
        match ctx.store.list_pop_front(&args[0], count, None).await {
            Ok((_, popped)) => {
                if popped.is_empty() {
                    return value(Resp::NullBulk);
                }
                if count == 1 {
                    return value(Resp::bulk(popped.into_iter().next().unwrap_or_default()));
                }
                value(Resp::Array(popped.into_iter().map(Resp::bulk).collect()))
            }
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct BlpopCommand;

#[async_trait]
impl CommandHandler for BlpopCommand {
    fn name(&self) -> &'static str {
        "BLPOP"
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
        let Ok(timeout_s) = args[1].parse::<f64>() else {
            return error("Invalid args");
        };
        if !timeout_s.is_finite() || timeout_s < 0.0 {
            return error("Invalid args");
        }
        let timeout = Duration::from_secs_f64(timeout_s);
        match ctx.store.list_pop_front(&args[0], 1, Some(timeout)).await {
            Ok((timed_out, popped)) => {
                if timed_out || popped.is_empty() {
                    return value(Resp::NullBulk);
                }
                value(Resp::Array(vec![
                    Resp::bulk(args[0].clone()),
                    Resp::bulk(popped.into_iter().next().unwrap_or_default()),
                ]))
            }
            Err(e) => error(e.to_string()),
        }
    }
}
