//! End-to-end federation scenarios over loopback sockets.
//!
//! Each test stands up a real tracker (and, where needed, a second daemon)
//! on ephemeral ports and drives it through the wire protocol.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use pns::client::TrackerClient;
use pns::server;
use pns::shell;
use pns::wire;
use pns::{Config, Error, ServerContext};

const SECRET: &str = "hush";

struct Host {
    config: Config,
    root: tempfile::TempDir,
    _db: Option<tempfile::TempDir>,
}

fn host_config(name: &str, root: &Path, port: u16, tracker: &str, istracker: bool) -> Config {
    Config {
        name: name.to_string(),
        root: root.to_string_lossy().into_owned(),
        port,
        tracker: tracker.to_string(),
        istracker,
        secret: SECRET.to_string(),
        ip: "127.0.0.1".to_string(),
        db: String::new(),
    }
}

async fn bind_ephemeral() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}

/// Starts a tracker daemon and waits until its own rows are visible.
async fn start_tracker(name: &str) -> Host {
    let root = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    let (listener, port) = bind_ephemeral().await;
    let mut config = host_config(name, root.path(), port, &format!("127.0.0.1:{port}"), true);
    config.db = db.path().join("pns.sqlite3").to_string_lossy().into_owned();

    let daemon_config = config.clone();
    tokio::spawn(async move {
        let _ = server::run_daemon(daemon_config, listener).await;
    });

    wait_until(|| {
        let config = config.clone();
        async move { TrackerClient::new(&config).roster().await.is_ok() }
    })
    .await;
    Host { config, root, _db: Some(db) }
}

/// Starts a non-tracker daemon (heartbeats included) and waits for its
/// registration to land.
async fn join_daemon(tracker: &Config, name: &str, files: &[(&str, &[u8])]) -> Host {
    let root = tempfile::tempdir().unwrap();
    for (file, contents) in files {
        std::fs::write(root.path().join(file), contents).unwrap();
    }
    let (listener, port) = bind_ephemeral().await;
    let config = host_config(name, root.path(), port, &tracker.tracker, false);

    let daemon_config = config.clone();
    tokio::spawn(async move {
        let _ = server::run_daemon(daemon_config, listener).await;
    });

    let probe = format!("//{}/", config.self_addr());
    let expected: Vec<String> = files.iter().map(|(file, _)| format!("/{file}")).collect();
    let tracker = tracker.clone();
    wait_until(|| {
        let tracker = tracker.clone();
        let probe = probe.clone();
        let expected = expected.clone();
        async move {
            match TrackerClient::new(&tracker).listing(&probe).await {
                Ok(entries) => expected
                    .iter()
                    .all(|name| entries.iter().any(|entry| &entry.name == name)),
                Err(_) => false,
            }
        }
    })
    .await;
    Host { config, root, _db: None }
}

fn assert_peer_error(result: Result<impl std::fmt::Debug, Error>, want_code: u16, want: &str) {
    match result {
        Err(Error::Peer { code, message }) => {
            assert_eq!(code, want_code);
            assert_eq!(message, want);
        }
        other => panic!("expected {want_code} {want}, got {other:?}"),
    }
}

#[tokio::test]
async fn tracker_bootstrap_publishes_its_own_tree() {
    let tracker = start_tracker("t").await;
    let client = TrackerClient::new(&tracker.config);

    let roster = client.roster().await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].name, "t");
    assert_eq!(roster[0].addr, tracker.config.self_addr());

    // logical root is the only record under `/`, host columns null
    let entries = client.listing("/").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "/");
    assert!(entries[0].host.is_none());
}

#[tokio::test]
async fn daemon_registration_is_listable_by_name_and_addr() {
    let tracker = start_tracker("t").await;
    let h1 = join_daemon(&tracker.config, "h1", &[("a.txt", b"abc")]).await;
    let client = TrackerClient::new(&tracker.config);

    for location in [h1.config.self_addr(), "h1".to_string()] {
        let entries = client.listing(&format!("//{location}/")).await.unwrap();
        let file = entries.iter().find(|e| e.name == "/a.txt").expect("/a.txt listed");
        assert_eq!(file.kind.as_deref(), Some("f"));
        assert_eq!(file.size, 3);
        assert_eq!(file.host.as_deref(), Some(h1.config.self_addr().as_str()));
    }
}

#[tokio::test]
async fn logical_link_round_trip() {
    let tracker = start_tracker("t").await;
    let h1 = join_daemon(&tracker.config, "h1", &[("a.txt", b"abc")]).await;
    let client = TrackerClient::new(&tracker.config);

    let src = format!("//{}/a.txt", h1.config.self_addr());
    client.round_trip(&format!("ln {src} /x")).await.unwrap();

    let top = client.listing("/").await.unwrap();
    assert!(top.iter().any(|e| e.name == "/x"));

    let x = client.listing("/x").await.unwrap();
    assert_eq!(x.len(), 1);
    assert_eq!(x[0].host.as_deref(), Some(h1.config.self_addr().as_str()));
    // the `type` field of a logical listing carries the physical path
    assert_eq!(x[0].kind.as_deref(), Some("/a.txt"));
}

#[tokio::test]
async fn make_directory_is_not_idempotent() {
    let tracker = start_tracker("t").await;
    let client = TrackerClient::new(&tracker.config);

    client.round_trip("md /docs").await.unwrap();
    assert_peer_error(client.round_trip("md /docs").await, 403, "Path Already Exist");
}

#[tokio::test]
async fn remove_undoes_make_directory() {
    let tracker = start_tracker("t").await;
    let client = TrackerClient::new(&tracker.config);

    client.round_trip("md /scratch").await.unwrap();
    client.round_trip("rm /scratch").await.unwrap();
    assert_peer_error(client.listing("/scratch").await, 404, "Path Not Found");
    // the name is free again
    client.round_trip("md /scratch").await.unwrap();
}

#[tokio::test]
async fn missing_parent_is_refused() {
    let tracker = start_tracker("t").await;
    let client = TrackerClient::new(&tracker.config);

    assert_peer_error(client.round_trip("md /a/b").await, 403, "Parent Path Doesn't Exist");
    assert_peer_error(
        client.round_trip("ln //127.0.0.1:1/f.txt /nope/x").await,
        403,
        "Parent Path Doesn't Exist",
    );
}

#[tokio::test]
async fn unknown_verbs_are_illegal() {
    let tracker = start_tracker("t").await;
    let client = TrackerClient::new(&tracker.config);
    assert_peer_error(client.round_trip("frobnicate /x").await, 400, "Illegal Command");
    // the namespace root cannot be removed
    assert_peer_error(client.round_trip("rm /").await, 400, "Illegal Command");
}

#[tokio::test]
async fn empty_tracker_reports_no_hosts() {
    let root = tempfile::tempdir().unwrap();
    let (listener, port) = bind_ephemeral().await;
    let config = host_config("t", root.path(), port, &format!("127.0.0.1:{port}"), true);

    // serve over a fresh store without the bootstrap walk
    let ctx = Arc::new(ServerContext::with_memory_store(config.clone()).unwrap());
    tokio::spawn(async move {
        let _ = server::serve(ctx, listener).await;
    });

    wait_until(|| {
        let addr = config.self_addr();
        async move { TcpStream::connect(addr).await.is_ok() }
    })
    .await;
    assert_peer_error(TrackerClient::new(&config).roster().await, 500, "No Host Detected");
}

#[tokio::test]
async fn flipped_authenticator_byte_yields_unauthorized() {
    let tracker = start_tracker("t").await;

    let command = "ls //";
    let auth = wire::authenticator(SECRET, command);
    let flipped = if auth.ends_with('0') {
        format!("{}1", &auth[..auth.len() - 1])
    } else {
        format!("{}0", &auth[..auth.len() - 1])
    };
    let header = format!("V: t V1\nA: {flipped}\nC: {command}\n\n");

    let mut stream = TcpStream::connect(tracker.config.self_addr()).await.unwrap();
    stream.write_all(header.as_bytes()).await.unwrap();
    let reply = wire::read_header(&mut stream).await.unwrap();
    assert_eq!(reply.status(), Some((401, "Unauthorized".to_string())));
}

#[tokio::test]
async fn transfer_without_length_is_refused() {
    let tracker = start_tracker("t").await;

    let command = format!(
        "cp //127.0.0.1:1/ghost.txt //{}/incoming.txt",
        tracker.config.self_addr()
    );
    let header = wire::build_request("t", SECRET, &command, 0, false);
    let mut stream = TcpStream::connect(tracker.config.self_addr()).await.unwrap();
    stream.write_all(header.as_bytes()).await.unwrap();
    let reply = wire::read_header(&mut stream).await.unwrap();
    assert_eq!(reply.status(), Some((400, "No Length Field".to_string())));
    assert!(!tracker.root.path().join("incoming.txt").exists());
}

#[tokio::test]
async fn receiver_refuses_to_overwrite() {
    let tracker = start_tracker("t").await;
    let h1 = join_daemon(&tracker.config, "h1", &[("a.txt", b"abc")]).await;

    let command =
        format!("cp //127.0.0.1:1/other.txt //{}/a.txt", h1.config.self_addr());
    let header = wire::build_request("t", SECRET, &command, 5, false);
    let mut stream = TcpStream::connect(h1.config.self_addr()).await.unwrap();
    stream.write_all(header.as_bytes()).await.unwrap();
    let reply = wire::read_header(&mut stream).await.unwrap();
    assert_eq!(reply.status(), Some((403, "File Already Exists".to_string())));
}

#[tokio::test]
async fn copy_pulls_bytes_between_hosts() {
    let tracker = start_tracker("t").await;
    let h1 = join_daemon(&tracker.config, "h1", &[("a.txt", b"abc")]).await;
    let client = TrackerClient::new(&tracker.config);

    let src = format!("//{}/a.txt", h1.config.self_addr());
    client.round_trip(&format!("ln {src} /x")).await.unwrap();

    // shell runs on the tracker host: /x is remote, //t/... is local
    shell::run(
        &tracker.config,
        &["cp".to_string(), "/x".to_string(), "//t/b.txt".to_string()],
    )
    .await
    .unwrap();

    let copied = tracker.root.path().join("b.txt");
    assert_eq!(std::fs::read(&copied).unwrap(), b"abc");

    let entries =
        client.listing(&format!("//{}/", tracker.config.self_addr())).await.unwrap();
    let b = entries.iter().find(|e| e.name == "/b.txt").expect("/b.txt registered");
    assert_eq!(b.size, 3);
    assert_eq!(b.kind.as_deref(), Some("f"));
}

#[tokio::test]
async fn move_removes_the_source_side() {
    let tracker = start_tracker("t").await;
    let h1 = join_daemon(&tracker.config, "h1", &[("b2.txt", b"move me")]).await;
    let client = TrackerClient::new(&tracker.config);

    let src = format!("//{}/b2.txt", h1.config.self_addr());
    client.round_trip(&format!("ln {src} /y")).await.unwrap();

    shell::run(
        &tracker.config,
        &["mv".to_string(), "/y".to_string(), "//t/c.txt".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(std::fs::read(tracker.root.path().join("c.txt")).unwrap(), b"move me");

    // the source daemon unlinks and deregisters after acknowledging
    let moved = h1.root.path().join("b2.txt");
    wait_until(|| {
        let moved = moved.clone();
        async move { !moved.exists() }
    })
    .await;
    wait_until(|| {
        let tracker = tracker.config.clone();
        let src = src.clone();
        async move { TrackerClient::new(&tracker).listing(&src).await.is_err() }
    })
    .await;
}

#[tokio::test]
async fn silent_daemon_is_evicted_with_its_records() {
    let tracker = start_tracker("t").await;
    let client = TrackerClient::new(&tracker.config);

    // daemon without the automatic heartbeat task: we beat by hand
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), b"abc").unwrap();
    let (listener, port) = bind_ephemeral().await;
    let config = host_config("h1", root.path(), port, &tracker.config.tracker, false);
    let ctx = Arc::new(ServerContext::new(config.clone()).unwrap());
    server::register::bootstrap(&ctx).await.unwrap();
    let serve_task = tokio::spawn(async move {
        let _ = server::serve(ctx, listener).await;
    });

    let h1_client = TrackerClient::new(&config);
    h1_client.heartbeat().await.unwrap();

    let src = format!("//{}/a.txt", config.self_addr());
    client.round_trip(&format!("ln {src} /x")).await.unwrap();

    let roster = client.roster().await.unwrap();
    assert!(roster.iter().any(|h| h.name == "h1"));

    // go silent past the liveness window and let the sweeper run
    serve_task.abort();
    tokio::time::sleep(Duration::from_secs(8)).await;

    let roster = client.roster().await.unwrap();
    assert!(!roster.iter().any(|h| h.name == "h1"));
    assert_peer_error(client.listing("/x").await, 404, "Path Not Found");
}
