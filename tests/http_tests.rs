use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use camwatch_node::broadcast::{BroadcastSettings, FrameBroadcaster};
use camwatch_node::core::CameraId;
use camwatch_node::http::{HttpServer, ServerSettings};

fn settings(storage: &Path, credentials: Option<(&str, &str)>) -> ServerSettings {
    ServerSettings {
        bind: "127.0.0.1:0".into(),
        subscribe_timeout: Duration::from_millis(50),
        max_idle_timeouts: 2,
        credentials: credentials.map(|(u, p)| (u.to_string(), p.to_string())),
        storage_path: storage.to_path_buf(),
        resolution: (320, 240),
        fps: 10,
    }
}

fn start(storage: &Path, credentials: Option<(&str, &str)>) -> (HttpServer, Arc<FrameBroadcaster>) {
    let b = FrameBroadcaster::new(CameraId(0), BroadcastSettings::default());
    let lookup = b.clone();
    let server = HttpServer::start(settings(storage, credentials), &[CameraId(0)], move |cam| {
        (cam == CameraId(0)).then(|| lookup.clone())
    })
    .unwrap();
    (server, b)
}

fn get(addr: SocketAddr, path: &str, extra: &str) -> String {
    request(addr, &format!("GET {} HTTP/1.1\r\nHost: x\r\nConnection: close\r\n{}\r\n", path, extra))
}

fn request(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out);
    String::from_utf8_lossy(&out).into_owned()
}

#[test]
fn test_health_and_unknown_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (server, _b) = start(dir.path(), None);
    let addr = server.local_addr().unwrap();

    let health = get(addr, "/health", "");
    assert!(health.starts_with("HTTP/1.1 200"), "{}", health);
    assert!(health.ends_with("ok"));

    assert!(get(addr, "/nope", "").starts_with("HTTP/1.1 404"));
    assert!(get(addr, "/stream/cam7.mjpeg", "").starts_with("HTTP/1.1 404"));
}

#[test]
fn test_post_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (server, _b) = start(dir.path(), None);
    let addr = server.local_addr().unwrap();
    let resp = request(
        addr,
        "POST /health HTTP/1.1\r\nHost: x\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    assert!(resp.starts_with("HTTP/1.1 405"), "{}", resp);
}

#[test]
fn test_credentials_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let (server, _b) = start(dir.path(), Some(("admin", "pw")));
    let addr = server.local_addr().unwrap();

    let denied = get(addr, "/health", "");
    assert!(denied.starts_with("HTTP/1.1 401"), "{}", denied);
    assert!(denied.contains("WWW-Authenticate: Basic realm=\"camwatch\""));

    let auth = format!("Authorization: Basic {}\r\n", STANDARD.encode("admin:pw"));
    assert!(get(addr, "/health", &auth).starts_with("HTTP/1.1 200"));
}

#[test]
fn test_camera_list_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let (server, b) = start(dir.path(), None);
    let addr = server.local_addr().unwrap();

    let list = get(addr, "/api/cameras", "");
    assert!(list.contains("\"url\":\"/stream/cam0.mjpeg\""), "{}", list);
    assert!(list.contains("\"resolution\":\"320x240\""));

    // noch kein Frame -> 503
    assert!(get(addr, "/snapshot/cam0.jpg", "").starts_with("HTTP/1.1 503"));
    b.push(b"JPEGDATA".to_vec(), 0);
    let snap = get(addr, "/snapshot/cam0.jpg", "");
    assert!(snap.starts_with("HTTP/1.1 200"));
    assert!(snap.contains("Content-Type: image/jpeg"));
    assert!(snap.ends_with("JPEGDATA"));
}

#[test]
fn test_stream_sends_multipart_parts() {
    let dir = tempfile::tempdir().unwrap();
    let (server, b) = start(dir.path(), None);
    let addr = server.local_addr().unwrap();
    b.push(b"FIRST".to_vec(), 0);

    // HTTP/1.0: ungechunkter Body; Stream endet nach zwei leeren Timeouts
    let resp = request(addr, "GET /stream/cam0.mjpeg HTTP/1.0\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.0 200") || resp.starts_with("HTTP/1.1 200"), "{}", resp);
    assert!(resp.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(resp.contains("--frame\r\nContent-Type: image/jpeg\r\n\r\nFIRST\r\n"));
}

#[test]
fn test_footage_lists_recordings() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cam0_20240101_120000.mjpeg"), b"").unwrap();
    let (server, _b) = start(dir.path(), None);
    let addr = server.local_addr().unwrap();

    let resp = get(addr, "/api/footage", "");
    assert!(resp.starts_with("HTTP/1.1 200"));
    assert!(resp.contains("cam0_20240101_120000.mjpeg"), "{}", resp);
}
