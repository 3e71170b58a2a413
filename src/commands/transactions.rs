use crate::command::{error, propagate_if_write, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use async_trait::async_trait;

pub struct MultiCommand;

#[async_trait]
impl CommandHandler for MultiCommand {
    fn name(&self) -> &'static str {
        "MULTI"
    }

    async fn execute(
        &self,
        _args: &[String],
        _ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        session.begin_transaction();
        value(Resp::simple("OK"))
    }
}

pub struct ExecCommand;

#[async_trait]
impl CommandHandler for ExecCommand {
    fn name(&self) -> &'static str {
        "EXEC"
    }

    fn is_control(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _args: &[String],
        ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        if !session.in_transaction() {
            return error("EXEC without MULTI");
        }
        let queued = session.take_queued();
        let mut collected = Vec::with_capacity(queued.len());
        for command in queued {
            let replies = command
                .handler
                .execute(&command.args, ctx, session)
                .await;
            propagate_if_write(ctx, &command.handler, session, &command.raw, &replies);
            for reply in replies {
                if let Reply::Value(resp) = reply {
                    collected.push(resp);
                }
            }
        }
        value(Resp::Array(collected))
    }
}

pub struct DiscardCommand;

#[async_trait]
impl CommandHandler for DiscardCommand {
    fn name(&self) -> &'static str {
        "DISCARD"
    }

    fn is_control(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _args: &[String],
        _ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        if !session.in_transaction() {
            return error("DISCARD without MULTI");
        }
        session.discard_transaction();
        value(Resp::simple("OK"))
    }
}
