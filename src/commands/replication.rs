use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::protocol_constants::{hex_to_binary, EMPTY_RDB_HEX};
use crate::resp::Resp;
use crate::session::Session;
use async_trait::async_trait;
use tracing::warn;

pub struct ReplconfCommand;

#[async_trait]
impl CommandHandler for ReplconfCommand {
    fn name(&self) -> &'static str {
        "REPLCONF"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() < 2 {
            return error("Invalid args");
        }
        if let Some(master) = ctx.repl.master() {
            // Master side: record ACKs silently, acknowledge everything else
            // (listening-port registration happened at dispatch).
            if args[0].eq_ignore_ascii_case("ack") {
                let Ok(offset) = args[1].parse::<u64>() else {
                    warn!(raw = %args[1], "bad offset in REPLCONF ACK");
                    return error("Unsupported command arg");
                };
                master.update_ack(session.id, offset);
                return Vec::new();
            }
            return value(Resp::simple("OK"));
        }
        if let Some(slave) = ctx.repl.slave() {
            // Replica side: the only inbound REPLCONF is GETACK *.
            if args[0].eq_ignore_ascii_case("getack") && args[1] == "*" {
                return value(Resp::Array(vec![
                    Resp::bulk("REPLCONF"),
                    Resp::bulk("ACK"),
                    Resp::bulk(slave.bytes_processed().to_string()),
                ]));
            }
        }
        error("Unsupported command arg")
    }
}

pub struct PsyncCommand;

#[async_trait]
impl CommandHandler for PsyncCommand {
    fn name(&self) -> &'static str {
        "PSYNC"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        if args.len() != 2 || args[0] != "?" || args[1] != "-1" {
            return error("Unsupported command arg");
        }
        let Some(master) = ctx.repl.master() else {
            return error("Command not supported in non-master mode");
        };
        vec![
            Reply::Value(Resp::simple(format!(
                "FULLRESYNC {} {}",
                master.replid(),
                master.repl_offset()
            ))),
            Reply::Rdb(hex_to_binary(EMPTY_RDB_HEX)),
        ]
    }
}

pub struct WaitCommand;

#[async_trait]
impl CommandHandler for WaitCommand {
    fn name(&self) -> &'static str {
        "WAIT"
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
        let (Ok(needed), Ok(timeout_ms)) = (args[0].parse::<usize>(), args[1].parse::<u64>())
        else {
            return error("Invalid args");
        };
        let Some(master) = ctx.repl.master() else {
            return error("Command not supported in non-master mode");
        };
        master.broadcast_getack();
        let count = master.wait_for_acks(needed, timeout_ms).await;
        value(Resp::Int(count as i64))
    }
}
