use crate::command::CommandContext;
use crate::commands;
use crate::config::ServerConfig;
use crate::connection::handle_client;
use crate::pubsub::ChannelManager;
use crate::replication::{self, ReplicationState};
use crate::store::Store;
use anyhow::Context as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Wire up the process-wide state for the configured role and, for masters,
/// seed the store from the RDB snapshot if one exists.
pub async fn build_context(config: ServerConfig) -> anyhow::Result<Arc<CommandContext>> {
    let repl = if config.is_replica() {
        ReplicationState::new_slave()
    } else {
        ReplicationState::new_master()
    };
    let ctx = Arc::new(CommandContext {
        store: Arc::new(Store::new()),
        repl: Arc::new(repl),
        channels: Arc::new(ChannelManager::new()),
        config: Arc::new(config),
        commands: commands::register_all(),
    });

    if let Some(path) = ctx.config.rdb_path() {
        if path.exists() {
            let records = crate::rdb::load_file(&path)
                .with_context(|| format!("reading snapshot {}", path.display()))?;
            info!(keys = records.len() as u64, path = %path.display(), "seeded store from snapshot");
            for record in records {
                ctx.store
                    .set_string(&record.key, &record.value, record.expires_at)
                    .await;
            }
        }
    }
    Ok(ctx)
}

/// Bind, start the replica link when configured, and hand back the accept
/// loop as a task. Startup failures (bind, snapshot parse, master connect)
/// surface here and are fatal.
pub async fn start(config: ServerConfig) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    // Connect to the master before serving: an unreachable master is a
    // startup error, while later link failures only end the link task.
    let master_stream = match &config.replica_of {
        Some((host, port)) => Some(
            replication::connect_master(host, *port)
                .await
                .with_context(|| format!("connecting to master {host}:{port}"))?,
        ),
        None => None,
    };

    let ctx = build_context(config).await?;
    let listener = TcpListener::bind(("127.0.0.1", ctx.config.port))
        .await
        .with_context(|| format!("binding port {}", ctx.config.port))?;
    let addr = listener.local_addr().context("resolving bound address")?;
    info!(%addr, role = ?ctx.repl.role(), "listening");

    if let Some(stream) = master_stream {
        let link_ctx = ctx.clone();
        let listen_port = addr.port();
        tokio::spawn(async move {
            if let Err(e) = replication::run_replica_link(stream, link_ctx, listen_port).await {
                error!(error = %e, "replica link terminated");
            }
        });
    }

    let handle = tokio::spawn(accept_loop(listener, ctx));
    Ok((addr, handle))
}

/// Accept until ctrl-c; every connection gets its own task and owns its
/// socket until EOF.
async fn accept_loop(listener: TcpListener, ctx: Arc<CommandContext>) {
    let next_id = AtomicU64::new(1);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(handle_client(stream, id, ctx.clone()));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, closing listener");
                break;
            }
        }
    }
}
