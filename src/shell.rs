//! Shell client: one command per invocation.
//!
//! Metadata verbs are a single tracker round-trip. `cp`/`mv` classify both
//! arguments as local or remote, then either copy on the local filesystem,
//! push bytes to the destination host, or pull bytes from the source host —
//! the peer's address is learned from an `ls` round-trip first.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::client::{read_status, TrackerClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hostfs::{HostFs, LocalFs};
use crate::path::{self, Target};
use crate::server::register;
use crate::server::transfer::resolve_tail;
use crate::wire::{self, Status};

/// Dispatches one shell command. Unknown commands are hard errors; failures
/// inside a known command are logged and swallowed.
pub async fn run(config: &Config, command: &[String]) -> Result<()> {
    let fs = LocalFs;
    let outcome = match command {
        [verb, args @ ..] => match (verb.as_str(), args) {
            ("ls", [dst]) => ls(config, dst).await,
            ("ln", [src, dst]) => ln(config, &fs, src, dst).await,
            ("md", [dst]) => md(config, dst).await,
            ("rm", [dst]) => rm(config, dst).await,
            ("cp", [src, dst]) => cp(config, &fs, src, dst, false).await,
            ("mv", [src, dst]) => cp(config, &fs, src, dst, true).await,
            _ => return Err(Error::Protocol(format!("unknown command: {verb}"))),
        },
        [] => return Err(Error::Protocol("no command given".to_string())),
    };
    if let Err(e) = outcome {
        tracing::warn!(error = %e, "command failed");
    }
    Ok(())
}

async fn ls(config: &Config, dst: &str) -> Result<()> {
    let body = TrackerClient::new(config).listing_raw(dst).await?;
    println!("{}", String::from_utf8_lossy(&body));
    Ok(())
}

/// `ln <src> <dst>`: a local path is converted to its physical spelling and,
/// for directories, linked recursively; an already-physical source is passed
/// through as-is.
async fn ln(config: &Config, fs: &dyn HostFs, src: &str, dst: &str) -> Result<()> {
    let dst = path::trim_trailing_slash(dst);
    if src.starts_with("//") {
        let src = path::trim_trailing_slash(src);
        TrackerClient::new(config).round_trip(&format!("ln {src} {dst}")).await?;
        tracing::info!(src, dst, "linked");
        return Ok(());
    }

    let local = PathBuf::from(path::trim_trailing_slash(src));
    if !fs.exists(&local).await {
        tracing::warn!(src, "source does not exist");
        return Ok(());
    }
    register::link_one(config, fs, &local, Some(dst), false).await?;
    if fs.is_dir(&local).await {
        register::link_tree(config, fs, &local, Some(dst), false).await?;
    }
    Ok(())
}

async fn md(config: &Config, dst: &str) -> Result<()> {
    TrackerClient::new(config).round_trip(&format!("md {dst}")).await?;
    tracing::info!(dst, "made directory");
    Ok(())
}

async fn rm(config: &Config, dst: &str) -> Result<()> {
    TrackerClient::new(config).round_trip(&format!("rm {dst}")).await?;
    tracing::info!(dst, "removed");
    Ok(())
}

/// Whether a path argument denotes something on this host: drive-prefixed
/// paths are local, logical paths are not, physical paths are matched by
/// location.
fn in_this_host(config: &Config, raw: &str) -> bool {
    if !raw.starts_with('/') {
        return true;
    }
    if !raw.starts_with("//") {
        return false;
    }
    match Target::parse(raw) {
        Target::Physical { location, .. } => {
            location == config.ip || location == config.name || location == config.self_addr()
        }
        _ => false,
    }
}

/// Local filesystem path behind a path argument.
fn local_path_of(config: &Config, raw: &str) -> PathBuf {
    if !raw.starts_with('/') {
        return PathBuf::from(raw);
    }
    match Target::parse(path::trim_trailing_slash(raw)) {
        Target::Physical { tail, .. } => resolve_tail(config, &tail),
        _ => PathBuf::from(format!("{}{}", config.root, raw)),
    }
}

async fn cp(
    config: &Config,
    fs: &dyn HostFs,
    src: &str,
    dst: &str,
    delete_src: bool,
) -> Result<()> {
    let src_here = in_this_host(config, src);
    let dst_here = in_this_host(config, dst);

    if !src_here && !dst_here {
        tracing::warn!(src, dst, "either src or dst must be on this host");
        return Ok(());
    }

    if src_here && dst_here {
        let src_local = local_path_of(config, src);
        let dst_local = local_path_of(config, dst);
        if !fs.exists(&src_local).await {
            tracing::warn!(src, "source does not exist");
            return Ok(());
        }
        if delete_src {
            fs.rename(&src_local, &dst_local).await?;
        } else {
            fs.copy(&src_local, &dst_local).await?;
        }
        return Ok(());
    }

    if src_here {
        push(config, fs, src, dst, delete_src).await
    } else {
        pull(config, fs, src, dst, delete_src).await
    }
}

/// Local source, remote destination: learn the peer from the destination's
/// parent listing, then stream the file at it.
async fn push(
    config: &Config,
    fs: &dyn HostFs,
    src: &str,
    dst: &str,
    delete_src: bool,
) -> Result<()> {
    let src_local = local_path_of(config, src);
    if !fs.exists(&src_local).await {
        tracing::warn!(src, "source does not exist");
        return Ok(());
    }

    let client = TrackerClient::new(config);
    let parent = match dst.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &dst[..idx],
    };
    let entries = client.listing(parent).await?;
    let Some(first) = entries.first() else {
        tracing::warn!(parent, "destination parent has no records");
        return Ok(());
    };
    let Some(host) = first.host.clone() else {
        tracing::warn!(parent, "destination parent has no host");
        return Ok(());
    };

    let dst_trim = path::trim_trailing_slash(dst);
    let remote_tail = if dst.starts_with("//") {
        match Target::parse(dst_trim) {
            Target::Physical { tail, .. } => tail,
            _ => "/".to_string(),
        }
    } else {
        // logical destination: the parent entry's `type` carries the parent's
        // physical path, the new leaf goes under it
        let Some(parent_physical) = first.kind.clone() else {
            tracing::warn!(parent, "destination parent has no physical path");
            return Ok(());
        };
        format!("{}/{}", parent_physical.trim_end_matches('/'), path::leaf(dst_trim))
    };
    let dst_physical = if remote_tail.starts_with('/') {
        format!("//{host}{remote_tail}")
    } else {
        format!("//{host}/{remote_tail}")
    };

    let size = fs.stat(&src_local).await?.size;
    let command = format!("cp {} {}", src_local.display(), dst_physical);
    let mut stream = TcpStream::connect(host.as_str()).await?;
    let header = wire::build_request(&config.name, &config.secret, &command, size, false);
    stream.write_all(header.as_bytes()).await?;
    let mut file = fs.open_read(&src_local).await?;
    wire::copy_exact(&mut file, &mut stream, size).await?;
    stream.shutdown().await?;
    match read_status(&mut stream).await {
        Ok(()) => tracing::info!(src, dst = %dst_physical, size, "sent file"),
        Err(e) => tracing::warn!(error = %e, "destination host refused"),
    }

    // a move unlinks its source after the copy attempt, acknowledged or not
    if delete_src {
        fs.remove_file(&src_local).await?;
        if src.starts_with("//") {
            client.round_trip(&format!("rm {}", path::trim_trailing_slash(src))).await?;
        } else if src_local.starts_with(config.root_path()) {
            let physical = register::to_physical(config, &src_local, true, false);
            client.round_trip(&format!("rm {physical}")).await?;
        }
        tracing::info!(src, "removed moved source");
    }
    Ok(())
}

/// Remote source, local destination: ask the source host to start sending,
/// then consume its header and stream.
async fn pull(
    config: &Config,
    fs: &dyn HostFs,
    src: &str,
    dst: &str,
    delete_src: bool,
) -> Result<()> {
    let dst_local = local_path_of(config, dst);

    let client = TrackerClient::new(config);
    let entries = client.listing(src).await?;
    let Some(first) = entries.first() else {
        tracing::warn!(src, "source has no records");
        return Ok(());
    };
    let Some(host) = first.host.clone() else {
        tracing::warn!(src, "source has no host");
        return Ok(());
    };

    let remote_tail = if src.starts_with("//") {
        match Target::parse(path::trim_trailing_slash(src)) {
            Target::Physical { tail, .. } => tail,
            _ => "/".to_string(),
        }
    } else {
        let Some(physical) = first.kind.clone() else {
            tracing::warn!(src, "source has no physical path");
            return Ok(());
        };
        format!("/{}", physical.trim_start_matches('/'))
    };
    let src_physical = if remote_tail.starts_with('/') {
        format!("//{host}{remote_tail}")
    } else {
        format!("//{host}/{remote_tail}")
    };

    let verb = if delete_src { "mv" } else { "cp" };
    let command = format!("{verb} {src_physical} {}", dst_local.display());
    let mut stream = TcpStream::connect(host.as_str()).await?;
    let header = wire::build_request(&config.name, &config.secret, &command, 0, false);
    stream.write_all(header.as_bytes()).await?;

    let inbound = wire::read_header(&mut stream).await?;
    if let Some((code, message)) = inbound.status() {
        if code != 200 {
            tracing::warn!(code, message = %message, "source host refused");
            return Ok(());
        }
    }
    let Some(size) = inbound.length() else {
        tracing::warn!("no length field in inbound transfer");
        return Ok(());
    };

    let mut file = fs.create_write(&dst_local).await?;
    wire::copy_exact(&mut stream, &mut file, size).await?;
    drop(file);
    stream.write_all(wire::build_reply(Status::Ok).as_bytes()).await?;
    tracing::info!(src = %src_physical, dst = %dst_local.display(), size, "received file");

    if dst_local.starts_with(config.root_path()) {
        if let Err(e) = register::link_one(config, fs, &dst_local, None, true).await {
            tracing::warn!(error = %e, "failed to register pulled file");
        }
    }
    Ok(())
}
