use crate::command::{error, CommandContext, Reply};
use crate::resp::{command_args, parse_frame, Resp};
use crate::session::Session;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Run one parsed frame through the session state machine and the command
/// table. Returns the replies to transmit; the raw frame bytes are what a
/// master propagates to its replicas.
pub async fn dispatch_command(
    ctx: &Arc<CommandContext>,
    session: &mut Session,
    frame: &Resp,
    raw: Bytes,
) -> Vec<Reply> {
    let args = match command_args(frame) {
        Ok(args) => args,
        Err(e) => return error(e.to_string()),
    };
    let name = args[0].to_uppercase();
    let Some(handler) = ctx.commands.get(name.as_str()) else {
        return error(format!("unknown command '{}'", args[0]));
    };
    let handler = handler.clone();

    if session.is_subscribed() && !handler.is_subscribed_mode() {
        return error(format!(
            "Can't execute '{}' in subscribed mode",
            name.to_lowercase()
        ));
    }

    if session.in_transaction() && !handler.is_control() {
        session.queue_command(handler, args[1..].to_vec(), raw);
        return vec![Reply::Value(Resp::simple("QUEUED"))];
    }

    // A client turns into a replica link the moment it announces its
    // listening port.
    if ctx.repl.is_master()
        && name == "REPLCONF"
        && args.get(1).is_some_and(|a| a.eq_ignore_ascii_case("listening-port"))
        && !session.is_replica_link
    {
        session.is_replica_link = true;
        if let Some(master) = ctx.repl.master() {
            master.add_slave(session.id, session.outbox.clone());
        }
    }

    let replies = handler.execute(&args[1..], ctx, session).await;
    crate::command::propagate_if_write(ctx, &handler, session, &raw, &replies);
    replies
}

/// Own one accepted client socket: writer task drains the outbox, reader
/// loop consumes as many whole frames as each read yields. A malformed
/// frame answers `-ERR` and the session keeps going; EOF ends it.
pub async fn handle_client(stream: TcpStream, id: u64, ctx: Arc<CommandContext>) {
    let peer = stream.peer_addr().ok();
    debug!(connection = id, ?peer, "client connected");
    let (mut read_half, mut write_half) = stream.into_split();

    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<Bytes>();
    let writer = tokio::spawn(async move {
        while let Some(chunk) = outbox_rx.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(id, outbox.clone());
    let mut buf = BytesMut::with_capacity(4096);

    'read: loop {
        loop {
            let (frame, consumed) = match parse_frame(&buf) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(e) => {
                    warn!(connection = id, error = %e, "protocol error");
                    let _ = outbox.send(Bytes::from(Resp::err(e.to_string()).encode()));
                    buf.clear();
                    break;
                }
            };
            let raw = buf.split_to(consumed).freeze();
            let replies = dispatch_command(&ctx, &mut session, &frame, raw).await;
            for reply in &replies {
                if outbox.send(Bytes::from(reply.encode())).is_err() {
                    break 'read;
                }
            }
        }
        match read_half.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = id, error = %e, "socket read failed");
                break;
            }
        }
    }

    if session.is_replica_link {
        if let Some(master) = ctx.repl.master() {
            master.remove_slave(id);
        }
    }
    drop(session);
    drop(outbox);
    let _ = writer.await;
    debug!(connection = id, "client disconnected");
}
