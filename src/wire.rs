//! Wire codec for the PNS protocol.
//!
//! A message is a header of `KEY: VALUE` lines terminated by an empty line,
//! optionally followed by a body of `L` bytes. Requests carry `V` (host name
//! and protocol tag), `A` (authenticator) and `C` (command); replies carry a
//! single `E` status line and, for listings, a JSON body.

use std::fmt;
use std::io::{self, ErrorKind};

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol tag for ordinary requests.
pub const VERSION_TAG: &str = "V1";
/// Protocol tag for heartbeat requests.
pub const HEARTBEAT_TAG: &str = "HB";

/// Reference chunk size for bulk payload streaming.
pub const CHUNK_SIZE: usize = 4096;

/// Upper bound on the header, far above anything the shell emits.
const MAX_HEADER_LEN: usize = 8 * 1024;

/// Reply status lines, `<code> <message>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    IllegalCommand,
    NoVersionField,
    NoAuthorizationField,
    NoCommandField,
    NoLengthField,
    Unauthorized,
    ParentPathMissing,
    PathAlreadyExist,
    FileAlreadyExists,
    PathNotFound,
    FileNotFound,
    NoHostDetected,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::IllegalCommand
            | Status::NoVersionField
            | Status::NoAuthorizationField
            | Status::NoCommandField
            | Status::NoLengthField => 400,
            Status::Unauthorized => 401,
            Status::ParentPathMissing | Status::PathAlreadyExist | Status::FileAlreadyExists => 403,
            Status::PathNotFound | Status::FileNotFound => 404,
            Status::NoHostDetected => 500,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::IllegalCommand => "Illegal Command",
            Status::NoVersionField => "No Version Field",
            Status::NoAuthorizationField => "No Authorization Field",
            Status::NoCommandField => "No Command Field",
            Status::NoLengthField => "No Length Field",
            Status::Unauthorized => "Unauthorized",
            Status::ParentPathMissing => "Parent Path Doesn't Exist",
            Status::PathAlreadyExist => "Path Already Exist",
            Status::FileAlreadyExists => "File Already Exists",
            Status::PathNotFound => "Path Not Found",
            Status::FileNotFound => "File Not Found",
            Status::NoHostDetected => "No Host Detected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.message())
    }
}

/// Hex SHA-1 over `secret || command`.
pub fn authenticator(secret: &str, command: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(secret.as_bytes());
    hasher.update(command.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time check of a presented authenticator.
pub fn verify_authenticator(secret: &str, command: &str, presented: &str) -> bool {
    let expected = authenticator(secret, command);
    constant_time_eq::constant_time_eq(expected.as_bytes(), presented.as_bytes())
}

/// Parsed header fields, in arrival order. Lines without a `": "` separator
/// are skipped rather than rejected.
#[derive(Debug, Default)]
pub struct RawHeader {
    fields: Vec<(String, String)>,
}

impl RawHeader {
    pub fn parse(text: &str) -> Self {
        let mut fields = Vec::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(": ") {
                fields.push((key.to_string(), value.to_string()));
            }
        }
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Body length from the `L` field, if present and well-formed.
    pub fn length(&self) -> Option<u64> {
        self.get("L").and_then(|v| v.parse().ok())
    }

    /// Splits the `E` line of a reply into code and message.
    pub fn status(&self) -> Option<(u16, String)> {
        let line = self.get("E")?;
        let (code, message) = line.split_once(' ')?;
        Some((code.parse().ok()?, message.to_string()))
    }
}

/// Builds a request header. `length` is emitted only when positive.
pub fn build_request(
    host_name: &str,
    secret: &str,
    command: &str,
    length: u64,
    heartbeat: bool,
) -> String {
    let tag = if heartbeat { HEARTBEAT_TAG } else { VERSION_TAG };
    let mut header = format!("V: {host_name} {tag}\n");
    header.push_str(&format!("A: {}\n", authenticator(secret, command)));
    header.push_str(&format!("C: {command}\n"));
    if length > 0 {
        header.push_str(&format!("L: {length}\n"));
    }
    header.push('\n');
    header
}

/// Builds a bare status reply.
pub fn build_reply(status: Status) -> String {
    format!("E: {status}\n\n")
}

/// Reads from the socket until the empty line that ends a header.
///
/// Errors with `UnexpectedEof` when the peer closes mid-header and with
/// `InvalidData` when the header exceeds [`MAX_HEADER_LEN`].
pub async fn read_header<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<RawHeader> {
    let mut buf = Vec::with_capacity(256);
    loop {
        let byte = match reader.read_u8().await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "connection closed mid-header"))
            }
            Err(e) => return Err(e),
        };
        buf.push(byte);
        if buf.ends_with(b"\n\n") {
            break;
        }
        if buf.len() > MAX_HEADER_LEN {
            return Err(io::Error::new(ErrorKind::InvalidData, "header exceeds maximum"));
        }
    }
    let text = String::from_utf8(buf)
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "header is not valid utf-8"))?;
    Ok(RawHeader::parse(&text))
}

/// Copies exactly `len` payload bytes in protocol-sized chunks.
///
/// Errors with `UnexpectedEof` when the source dries up before `len` bytes
/// arrived; the partial write stays wherever it landed.
pub async fn copy_exact<R, W>(reader: &mut R, writer: &mut W, len: u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "payload ended early"));
        }
        writer.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn request_round_trips_through_parser() {
        let text = build_request("h1", "hush", "ls //", 0, false);
        let mut cursor = Cursor::new(text.into_bytes());
        let header = read_header(&mut cursor).await.unwrap();
        assert_eq!(header.get("V"), Some("h1 V1"));
        assert_eq!(header.get("C"), Some("ls //"));
        assert_eq!(header.get("A"), Some(authenticator("hush", "ls //").as_str()));
        assert_eq!(header.length(), None);
    }

    #[tokio::test]
    async fn heartbeat_carries_hb_tag_and_length() {
        let text = build_request("h2", "hush", "cp /a /b", 42, true);
        let mut cursor = Cursor::new(text.into_bytes());
        let header = read_header(&mut cursor).await.unwrap();
        assert_eq!(header.get("V"), Some("h2 HB"));
        assert_eq!(header.length(), Some(42));
    }

    #[tokio::test]
    async fn truncated_header_is_an_eof_error() {
        let mut cursor = Cursor::new(b"V: h1 V1\nA: 00".to_vec());
        let err = read_header(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let header = RawHeader::parse("V: h1 V1\ngarbage\nC: md /x\n");
        assert_eq!(header.get("V"), Some("h1 V1"));
        assert_eq!(header.get("C"), Some("md /x"));
        assert_eq!(header.get("garbage"), None);
    }

    #[test]
    fn authenticator_is_sha1_of_secret_then_command() {
        let auth = authenticator("secret", "ls //");
        assert_eq!(auth.len(), 40);
        assert!(verify_authenticator("secret", "ls //", &auth));
        let flipped = if auth.ends_with('0') {
            format!("{}1", &auth[..39])
        } else {
            format!("{}0", &auth[..39])
        };
        assert!(!verify_authenticator("secret", "ls //", &flipped));
        assert!(!verify_authenticator("other", "ls //", &auth));
    }

    #[test]
    fn status_lines_match_the_protocol_table() {
        assert_eq!(build_reply(Status::Ok), "E: 200 OK\n\n");
        assert_eq!(
            build_reply(Status::ParentPathMissing),
            "E: 403 Parent Path Doesn't Exist\n\n"
        );
        assert_eq!(build_reply(Status::NoHostDetected), "E: 500 No Host Detected\n\n");
        let reply = RawHeader::parse("E: 401 Unauthorized\n");
        assert_eq!(reply.status(), Some((401, "Unauthorized".to_string())));
    }
}
