use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use async_trait::async_trait;

pub struct SubscribeCommand;

#[async_trait]
impl CommandHandler for SubscribeCommand {
    fn name(&self) -> &'static str {
        "SUBSCRIBE"
    }

    fn is_subscribed_mode(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 1 {
            return error("Invalid args");
        }
        let count = session.subscribe(&ctx.channels, &args[0]);
        value(Resp::Array(vec![
            Resp::bulk("subscribe"),
            Resp::bulk(args[0].clone()),
            Resp::Int(count as i64),
        ]))
    }
}

pub struct UnsubscribeCommand;

#[async_trait]
impl CommandHandler for UnsubscribeCommand {
    fn name(&self) -> &'static str {
        "UNSUBSCRIBE"
    }

    fn is_subscribed_mode(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: &[String],
        _ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 1 {
            return error("Invalid args");
        }
        let count = session.unsubscribe(&args[0]);
        value(Resp::Array(vec![
            Resp::bulk("unsubscribe"),
            Resp::bulk(args[0].clone()),
            Resp::Int(count as i64),
        ]))
    }
}

pub struct PublishCommand;

#[async_trait]
impl CommandHandler for PublishCommand {
    fn name(&self) -> &'static str {
        "PUBLISH"
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
        let delivered = ctx.channels.channel(&args[0]).publish(&args[1]);
        value(Resp::Int(delivered as i64))
    }
}
