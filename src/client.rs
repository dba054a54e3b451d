//! One-shot request client.
//!
//! Every interaction with the tracker is a fresh connection: send one
//! authenticated header, read one `E:` status line, optionally read a JSON
//! body. The shell, the registration walk and the heartbeat sender all go
//! through here.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::{HostEntry, ListEntry};
use crate::wire;

/// Reads the `E:` status header of a reply; errors on anything but 200.
pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    let header = wire::read_header(reader).await?;
    let (code, message) = header
        .status()
        .ok_or_else(|| Error::Protocol("reply carries no status line".to_string()))?;
    if code != 200 {
        return Err(Error::Peer { code, message });
    }
    Ok(())
}

pub struct TrackerClient<'a> {
    config: &'a Config,
}

impl<'a> TrackerClient<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Opens a connection to the tracker and sends one request header.
    pub async fn send(&self, command: &str, length: u64, heartbeat: bool) -> Result<TcpStream> {
        let mut stream =
            TcpStream::connect((self.config.tracker_ip(), self.config.tracker_port())).await?;
        let header =
            wire::build_request(&self.config.name, &self.config.secret, command, length, heartbeat);
        tracing::debug!(command, "sending request");
        stream.write_all(header.as_bytes()).await?;
        Ok(stream)
    }

    /// One command, one status line, no body.
    pub async fn round_trip(&self, command: &str) -> Result<()> {
        self.round_trip_sized(command, 0).await
    }

    /// Same, with an `L` field announcing the linked file's size.
    pub async fn round_trip_sized(&self, command: &str, length: u64) -> Result<()> {
        let mut stream = self.send(command, length, false).await?;
        read_status(&mut stream).await
    }

    /// `ls <dst>` returning the decoded listing.
    pub async fn listing(&self, dst: &str) -> Result<Vec<ListEntry>> {
        let body = self.listing_raw(dst).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// `ls <dst>` returning the raw JSON body, for display.
    pub async fn listing_raw(&self, dst: &str) -> Result<Vec<u8>> {
        self.fetch_body(&format!("ls {dst}"), false).await
    }

    /// `ls //` returning the host roster.
    pub async fn roster(&self) -> Result<Vec<HostEntry>> {
        let body = self.fetch_body("ls //", false).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Heartbeat: `ls //` under the `HB` tag; the reply is the roster.
    pub async fn heartbeat(&self) -> Result<Vec<HostEntry>> {
        let body = self.fetch_body("ls //", true).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_body(&self, command: &str, heartbeat: bool) -> Result<Vec<u8>> {
        let mut stream = self.send(command, 0, heartbeat).await?;
        read_status(&mut stream).await?;
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await?;
        Ok(body)
    }
}
