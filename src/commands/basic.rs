use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use async_trait::async_trait;

pub struct PingCommand;

#[async_trait]
impl CommandHandler for PingCommand {
    fn name(&self) -> &'static str {
        "PING"
    }

    fn is_subscribed_mode(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _args: &[String],
        _ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        if session.is_subscribed() {
            return value(Resp::Array(vec![Resp::bulk("pong"), Resp::bulk("")]));
        }
        value(Resp::simple("PONG"))
    }
}

pub struct EchoCommand;

#[async_trait]
impl CommandHandler for EchoCommand {
    fn name(&self) -> &'static str {
        "ECHO"
    }

    async fn execute(
        &self,
        args: &[String],
        _ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 1 {
            return error("Invalid args");
        }
        value(Resp::bulk(args[0].clone()))
    }
}

pub struct TypeCommand;

#[async_trait]
impl CommandHandler for TypeCommand {
    fn name(&self) -> &'static str {
        "TYPE"
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
        value(Resp::simple(ctx.store.type_name(&args[0]).await))
    }
}

pub struct KeysCommand;

#[async_trait]
impl CommandHandler for KeysCommand {
    fn name(&self) -> &'static str {
        "KEYS"
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
        if args[0] != "*" {
            return error(format!("Invalid argument: {}", args[0]));
        }
        let keys = ctx.store.keys().await;
        value(Resp::Array(keys.into_iter().map(Resp::bulk).collect()))
    }
}

pub struct ConfigCommand;

#[async_trait]
impl CommandHandler for ConfigCommand {
    fn name(&self) -> &'static str {
        "CONFIG"
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
        if !args[0].eq_ignore_ascii_case("GET") {
            return error(format!("Invalid argument: {}", args[0]));
        }
        if !ctx.repl.is_master() {
            return error("Command not supported in non-master mode");
        }
        let setting = args[1].to_lowercase();
        let stored = match setting.as_str() {
            "dir" => ctx.config.dir.clone(),
            "dbfilename" => ctx.config.dbfilename.clone(),
            _ => return error(format!("Unknown config: {}", args[1])),
        };
        value(Resp::Array(vec![
            Resp::bulk(setting),
            Resp::bulk(stored.unwrap_or_default()),
        ]))
    }
}

pub struct InfoCommand;

#[async_trait]
impl CommandHandler for InfoCommand {
    fn name(&self) -> &'static str {
        "INFO"
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
        if !args[0].eq_ignore_ascii_case("replication") {
            return error("Unsupported command arg");
        }
        value(Resp::bulk(ctx.repl.replication_info()))
    }
}
