use crate::command::{error, value, CommandContext, CommandHandler, Reply};
use crate::resp::Resp;
use crate::session::Session;
use crate::store::{parse_range_end, parse_range_start, StreamFields, StreamId};
use async_trait::async_trait;

pub struct XaddCommand;

#[async_trait]
impl CommandHandler for XaddCommand {
    fn name(&self) -> &'static str {
        "XADD"
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
        if args.len() < 4 || (args.len() - 2) % 2 != 0 {
            return error("Invalid args");
        }
        let fields: StreamFields = args[2..]
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();
        match ctx.store.stream_add(&args[0], &args[1], fields).await {
            Ok(id) => value(Resp::bulk(id.to_string())),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct XrangeCommand;

#[async_trait]
impl CommandHandler for XrangeCommand {
    fn name(&self) -> &'static str {
        "XRANGE"
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
        let (Ok(start), Ok(end)) = (parse_range_start(&args[1]), parse_range_end(&args[2]))
        else {
            return error("Invalid entry_id for stream");
        };
        match ctx.store.stream_range(&args[0], start, end).await {
            Ok(entries) => value(entries_to_resp(entries)),
            Err(e) => error(e.to_string()),
        }
    }
}

pub struct XreadCommand;

#[async_trait]
impl CommandHandler for XreadCommand {
    fn name(&self) -> &'static str {
        "XREAD"
    }

    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext,
        _session: &mut Session,
    ) -> Vec<Reply> {
        let mut idx = 0;
        let mut timeout_ms = None;
        let Some(first) = args.first() else {
            return error("Invalid args");
        };
        if first.eq_ignore_ascii_case("block") {
            let Some(raw_timeout) = args.get(1) else {
                return error("Invalid args");
            };
            let Ok(parsed) = raw_timeout.parse::<u64>() else {
                return error("Invalid args");
            };
            timeout_ms = Some(parsed);
            idx = 2;
        }
        match args.get(idx) {
            Some(keyword) if keyword.eq_ignore_ascii_case("streams") => idx += 1,
            Some(keyword) => return error(format!("Unsupported read_type arg: {keyword}")),
            None => return error("Invalid args"),
        }
        let rest = &args[idx..];
        if rest.is_empty() || rest.len() % 2 != 0 {
            return error("Invalid args");
        }
        let pairs = rest.len() / 2;
        let keys = rest[..pairs].to_vec();
        let ids = rest[pairs..].to_vec();

        match ctx.store.stream_read_any(&keys, &ids, timeout_ms).await {
            Ok((timed_out, found)) => {
                if timed_out {
                    return value(Resp::NullBulk);
                }
                let per_key = found
                    .into_iter()
                    .map(|(key, entries)| {
                        Resp::Array(vec![Resp::bulk(key), entries_to_resp(entries)])
                    })
                    .collect();
                value(Resp::Array(per_key))
            }
            Err(e) => error(e.to_string()),
        }
    }
}

/// `[[id, [f1, v1, ...]], ...]` — the shape XRANGE and XREAD share.
fn entries_to_resp(entries: Vec<(StreamId, StreamFields)>) -> Resp {
    Resp::Array(
        entries
            .into_iter()
            .map(|(id, fields)| {
                let mut flat = Vec::with_capacity(fields.len() * 2);
                for (field, field_value) in fields {
                    flat.push(Resp::bulk(field));
                    flat.push(Resp::bulk(field_value));
                }
                Resp::Array(vec![Resp::bulk(id.to_string()), Resp::Array(flat)])
            })
            .collect(),
    )
}
