//! Network front of a daemon.
//!
//! One accept loop, one task per inbound connection. A connection carries a
//! single request: the header is read and validated (field presence, then
//! the authenticator), heartbeats update the membership map, and the command
//! is routed to its handler. Metadata verbs require the store and are
//! answered `400 Illegal Command` on a non-tracker host.

pub mod meta;
pub mod register;
pub mod transfer;

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::context::ServerContext;
use crate::error::Result;
use crate::membership::Sweeper;
use crate::wire::{self, Status};

use register::HeartbeatTask;

/// Binds the configured address and runs the daemon until failure.
pub async fn start_daemon(config: Config) -> Result<()> {
    let listener = TcpListener::bind((config.ip.as_str(), config.port)).await?;
    run_daemon(config, listener).await
}

/// Daemon lifecycle on an already-bound listener: open the store (tracker),
/// register the root tree, start the periodic task for this role, serve.
pub async fn run_daemon(config: Config, listener: TcpListener) -> Result<()> {
    let ctx = Arc::new(ServerContext::new(config)?);
    register::bootstrap(&ctx).await?;

    if ctx.is_tracker() {
        Sweeper::spawn(ctx.clone());
    } else {
        HeartbeatTask::spawn(ctx.config.clone());
    }

    tracing::info!(addr = %ctx.config.self_addr(), tracker = ctx.is_tracker(), "serving");
    serve(ctx, listener).await
}

/// Accept loop; never returns except on listener failure.
pub async fn serve(ctx: Arc<ServerContext>, listener: TcpListener) -> Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_request(ctx, socket).await {
                tracing::warn!(%peer, error = %e, "request failed");
            }
        });
    }
}

/// Writes a bare status reply.
pub(crate) async fn reply(socket: &mut TcpStream, status: Status) -> Result<()> {
    socket.write_all(wire::build_reply(status).as_bytes()).await?;
    Ok(())
}

/// Writes a `200 OK` reply followed by a JSON body, then half-closes so the
/// peer sees end-of-body.
pub(crate) async fn reply_with_body(socket: &mut TcpStream, body: &[u8]) -> Result<()> {
    socket.write_all(wire::build_reply(Status::Ok).as_bytes()).await?;
    socket.write_all(body).await?;
    socket.shutdown().await?;
    Ok(())
}

async fn handle_request(ctx: Arc<ServerContext>, mut socket: TcpStream) -> Result<()> {
    let header = wire::read_header(&mut socket).await?;

    let Some(version) = header.get("V") else {
        return reply(&mut socket, Status::NoVersionField).await;
    };
    let Some(auth) = header.get("A") else {
        return reply(&mut socket, Status::NoAuthorizationField).await;
    };
    let Some(command) = header.get("C") else {
        return reply(&mut socket, Status::NoCommandField).await;
    };

    if !wire::verify_authenticator(&ctx.config.secret, command, auth) {
        tracing::warn!("rejected request with bad authenticator");
        return reply(&mut socket, Status::Unauthorized).await;
    }

    let (host_name, tag) = version.split_once(' ').unwrap_or((version, wire::VERSION_TAG));
    if tag == wire::HEARTBEAT_TAG && ctx.is_tracker() {
        ctx.membership.record(host_name).await;
    }

    let host_name = host_name.to_string();
    let command = command.to_string();
    let length = header.length();
    dispatch(&ctx, &host_name, &command, length, &mut socket).await
}

async fn dispatch(
    ctx: &Arc<ServerContext>,
    host_name: &str,
    command: &str,
    length: Option<u64>,
    socket: &mut TcpStream,
) -> Result<()> {
    let mut parts = command.split(' ');
    let verb = parts.next().unwrap_or("");
    let arg1 = parts.next();
    let arg2 = parts.next();

    match (verb, arg1, arg2) {
        ("ln", Some(src), dst) => match ctx.store() {
            Some(store) => meta::ln(store, src, dst, host_name, length, socket).await,
            None => reply(socket, Status::IllegalCommand).await,
        },
        ("ls", Some(dst), _) => match ctx.store() {
            Some(store) => meta::ls(store, dst, socket).await,
            None => reply(socket, Status::IllegalCommand).await,
        },
        ("md", Some(dst), _) => match ctx.store() {
            Some(store) => meta::md(store, dst, socket).await,
            None => reply(socket, Status::IllegalCommand).await,
        },
        ("rm", Some(dst), _) => match ctx.store() {
            Some(store) => meta::rm(store, dst, socket).await,
            None => reply(socket, Status::IllegalCommand).await,
        },
        ("cp", Some(src), Some(dst)) => {
            transfer::serve(ctx, src, dst, length, socket, false).await
        }
        ("mv", Some(src), Some(dst)) => {
            transfer::serve(ctx, src, dst, length, socket, true).await
        }
        _ => {
            tracing::warn!(command, "illegal command");
            reply(socket, Status::IllegalCommand).await
        }
    }
}
