//! Bulk file transfer between hosts (`cp`, `mv`).
//!
//! Exactly one side of the two physical arguments names this host; that side
//! picks the role. The sender streams the file after its header; the
//! receiver writes under its root and refuses to overwrite. `mv` is copy
//! then unlink — failures past the copy are warnings, never rollbacks.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::client::{self, TrackerClient};
use crate::config::Config;
use crate::context::ServerContext;
use crate::error::Result;
use crate::path::{self, Target};
use crate::record::Category;
use crate::wire::{self, Status};

use super::{register, reply};

/// Resolves a wire tail to a local filesystem path: root-relative tails land
/// under the configured root, outside-root tails are taken as they are.
pub(crate) fn resolve_tail(config: &Config, tail: &str) -> PathBuf {
    if path::outside_root(tail) {
        if let Some(stripped) = tail.strip_prefix('/') {
            if stripped.starts_with('/') {
                return PathBuf::from(stripped);
            }
        }
        PathBuf::from(tail)
    } else {
        PathBuf::from(format!("{}{}", config.root, tail))
    }
}

/// Entry point for an inbound `cp`/`mv` request.
pub async fn serve(
    ctx: &Arc<ServerContext>,
    src: &str,
    dst: &str,
    length: Option<u64>,
    socket: &mut TcpStream,
    delete_src: bool,
) -> Result<()> {
    if let Target::Physical { location, tail } = Target::parse(src) {
        if ctx.is_self_location(&location) {
            return send_role(ctx, src, dst, &location, &tail, socket, delete_src).await;
        }
    }
    if let Target::Physical { location, tail } = Target::parse(dst) {
        if ctx.is_self_location(&location) {
            return receive_role(ctx, &tail, length, socket).await;
        }
    }
    tracing::warn!(src, dst, "transfer names neither side of this host");
    reply(socket, Status::IllegalCommand).await
}

/// This host owns `src`: stream it to the requesting peer.
async fn send_role(
    ctx: &Arc<ServerContext>,
    src: &str,
    dst: &str,
    src_location: &str,
    src_tail: &str,
    socket: &mut TcpStream,
    delete_src: bool,
) -> Result<()> {
    let tail = path::trim_trailing_slash(src_tail);
    let local = resolve_tail(&ctx.config, tail);
    if !ctx.fs.is_file(&local).await {
        return reply(socket, Status::FileNotFound).await;
    }
    let size = ctx.fs.stat(&local).await?.size;

    let command = format!("cp {src} {dst}");
    let header =
        wire::build_request(&ctx.config.name, &ctx.config.secret, &command, size, false);
    socket.write_all(header.as_bytes()).await?;

    let mut file = ctx.fs.open_read(&local).await?;
    wire::copy_exact(&mut file, socket, size).await?;
    socket.shutdown().await?;

    match client::read_status(socket).await {
        Ok(()) => tracing::info!(src, dst, size, "sent file"),
        Err(e) => tracing::warn!(error = %e, "peer refused the transfer"),
    }

    // a move unlinks its source after the copy attempt, acknowledged or not
    if delete_src {
        if let Err(e) = ctx.fs.remove_file(&local).await {
            tracing::warn!(error = %e, "source unlink failed after move");
            return Ok(());
        }
        let outcome = match ctx.store() {
            Some(store) => store.remove_physical(src_location, tail).await,
            None => TrackerClient::new(&ctx.config).round_trip(&format!("rm {src}")).await,
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "source record removal failed after move");
        } else {
            tracing::info!(path = %local.display(), "removed moved source");
        }
    }
    Ok(())
}

/// This host owns `dst`: accept the stream under the root.
async fn receive_role(
    ctx: &Arc<ServerContext>,
    dst_tail: &str,
    length: Option<u64>,
    socket: &mut TcpStream,
) -> Result<()> {
    let tail = path::trim_trailing_slash(dst_tail);
    let local = PathBuf::from(format!("{}{}", ctx.config.root, tail));
    if ctx.fs.exists(&local).await {
        return reply(socket, Status::FileAlreadyExists).await;
    }
    let Some(size) = length.filter(|len| *len > 0) else {
        return reply(socket, Status::NoLengthField).await;
    };

    let mut file = ctx.fs.create_write(&local).await?;
    wire::copy_exact(socket, &mut file, size).await?;
    drop(file);
    reply(socket, Status::Ok).await?;
    tracing::info!(path = %local.display(), size, "received file");

    // advertise the new file
    let outcome = match ctx.store() {
        Some(store) => {
            store
                .insert_physical(
                    tail,
                    Category::File,
                    size,
                    &ctx.config.self_addr(),
                    &ctx.config.name,
                )
                .await
        }
        None => register::link_one(&ctx.config, ctx.fs.as_ref(), &local, None, true).await,
    };
    if let Err(e) = outcome {
        tracing::warn!(error = %e, "failed to record received file");
    }
    Ok(())
}
