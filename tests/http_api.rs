use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crowdsense::api::{ApiConfig, ApiHandle, ApiServer};
use crowdsense::detect::ScriptedBackend;
use crowdsense::{
    CameraManager, CrowdService, Detection, InMemoryStore, ManagerSettings, PersonDetector,
    SourceFactory, ZoneTable,
};

struct Response {
    status: u16,
    headers: String,
    body: Vec<u8>,
}

impl Response {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

fn request(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> Result<Response> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let body = body.unwrap_or("");
    write!(
        stream,
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    )?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)?;
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap_or(raw.len());
    let headers = String::from_utf8_lossy(&raw[..split]).to_string();
    let status = headers
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = raw.get(split + 4..).unwrap_or(&[]).to_vec();
    Ok(Response {
        status,
        headers,
        body,
    })
}

struct TestApi {
    manager: Arc<CameraManager>,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(backend: ScriptedBackend) -> Result<Self> {
        let manager = Arc::new(CameraManager::new(
            ManagerSettings {
                default_zone: "hall".into(),
                ..ManagerSettings::default()
            },
            Arc::new(InMemoryStore::new()),
            Arc::new(SourceFactory::default()),
        ));
        manager.start();
        let service = Arc::new(CrowdService::new(
            manager.clone(),
            PersonDetector::new(Arc::new(Mutex::new(backend))),
            ZoneTable::default_grid(),
            crowdsense::config::StreamSettings {
                fps: 10,
                jpeg_quality: 75,
            },
        ));
        let api_handle = ApiServer::new(
            ApiConfig {
                addr: "127.0.0.1:0".to_string(),
            },
            service,
        )
        .spawn()?;
        Ok(Self {
            manager,
            api_handle: Some(api_handle),
        })
    }

    fn open_streams(&self) -> usize {
        self.api_handle
            .as_ref()
            .map(ApiHandle::open_streams)
            .unwrap_or(0)
    }

    fn addr(&self) -> SocketAddr {
        self.api_handle.as_ref().map(|h| h.addr).expect("api running")
    }

    fn call(&self, method: &str, path: &str, body: Option<&str>) -> Response {
        request(self.addr(), method, path, body).expect("request")
    }

    /// Poll until `path` answers 200 or the deadline passes.
    fn wait_ok(&self, path: &str) -> Response {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.call("GET", path, None);
            if response.status == 200 || Instant::now() > deadline {
                return response;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            let _ = handle.stop();
        }
        self.manager.shutdown(Duration::from_secs(1));
    }
}

#[test]
fn camera_crud_statuses() -> Result<()> {
    let api = TestApi::new(ScriptedBackend::new())?;

    let created = api.call(
        "POST",
        "/cameras",
        Some(r#"{"id":"cam-1","url":"stub://one","enabled":false}"#),
    );
    assert_eq!(created.status, 201);
    assert_eq!(created.json()["name"], "cam-1");
    assert_eq!(created.json()["zone"], "hall");
    assert_eq!(created.json()["status"], "offline");

    let duplicate = api.call(
        "POST",
        "/cameras",
        Some(r#"{"id":"cam-1","url":"stub://again"}"#),
    );
    assert_eq!(duplicate.status, 409);

    assert_eq!(api.call("POST", "/cameras", Some("{not json")).status, 400);
    assert_eq!(
        api.call("POST", "/cameras", Some(r#"{"id":"cam-2"}"#)).status,
        400
    );
    assert_eq!(
        api.call("POST", "/cameras", Some(r#"{"id":"  ","url":"stub://x"}"#))
            .status,
        400
    );

    let fetched = api.call("GET", "/cameras/cam-1", None);
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.json()["url"], "stub://one");
    assert_eq!(api.call("GET", "/cameras/nope", None).status, 404);

    let updated = api.call("PATCH", "/cameras/cam-1", Some(r#"{"name":"Entrance"}"#));
    assert_eq!(updated.status, 200);
    assert_eq!(updated.json()["name"], "Entrance");
    assert_eq!(
        api.call("PATCH", "/cameras/cam-1", Some(r#"{"id":"other"}"#))
            .status,
        400
    );
    assert_eq!(
        api.call("PATCH", "/cameras/ghost", Some(r#"{"name":"x"}"#))
            .status,
        404
    );

    let listed = api.call("GET", "/cameras", None);
    assert_eq!(listed.json().as_array().map(Vec::len), Some(1));

    assert_eq!(api.call("PUT", "/cameras", None).status, 405);
    assert_eq!(api.call("DELETE", "/cameras/cam-1", None).status, 200);
    assert_eq!(api.call("DELETE", "/cameras/cam-1", None).status, 404);
    assert_eq!(api.call("GET", "/cameras/cam-1", None).status, 404);
    Ok(())
}

#[test]
fn frame_routes_without_frames() -> Result<()> {
    let api = TestApi::new(ScriptedBackend::new())?;

    let response = api.call("GET", "/detect", None);
    assert_eq!(response.status, 503);
    assert_eq!(response.json()["error"], "No frame available");

    assert_eq!(api.call("GET", "/frame", None).status, 503);
    assert_eq!(api.call("GET", "/analytics?camera_id=missing", None).status, 404);
    assert_eq!(api.call("GET", "/stream?camera_id=missing", None).status, 404);

    let overview = api.call("GET", "/analytics/all", None);
    assert_eq!(overview.status, 200);
    assert_eq!(overview.json()["total_people_count"], 0);
    assert_eq!(overview.json()["online_cameras"], 0);
    Ok(())
}

#[test]
fn detection_routes_on_live_camera() -> Result<()> {
    let api = TestApi::new(ScriptedBackend::with_detections(vec![
        Detection::person(2.0, 2.0, 12.0, 20.0, 0.9),
        Detection::person(40.0, 30.0, 60.0, 46.0, 0.8),
    ]))?;
    let created = api.call(
        "POST",
        "/cameras",
        Some(r#"{"id":"lobby","url":"stub://lobby?width=64&height=48&fps=30"}"#),
    );
    assert_eq!(created.status, 201);

    let detect = api.wait_ok("/detect?camera_id=lobby");
    assert_eq!(detect.status, 200);
    assert_eq!(detect.json()["camera_id"], "lobby");
    assert_eq!(detect.json()["person_count"], 2);

    let frame = api.call("GET", "/frame", None);
    assert_eq!(frame.status, 200);
    assert!(frame.headers.contains("Content-Type: image/jpeg"));
    assert!(frame.headers.contains("X-Camera-Id: lobby"));
    assert_eq!(&frame.body[..2], &[0xFF, 0xD8]);

    let snapshot = api.call("GET", "/get-frame", None);
    assert_eq!(snapshot.status, 200);
    assert_eq!(snapshot.json()["camera_id"], "lobby");
    assert!(snapshot.json().get("person_count").is_none());

    let boxed = api.call("GET", "/get-image-with-boxes", None);
    assert_eq!(boxed.status, 200);
    assert!(boxed.json()["image"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(boxed.json()["width"], 64);

    let coords = api.call("GET", "/coordinates?camera_id=lobby", None);
    assert_eq!(coords.status, 200);
    assert_eq!(coords.json()["points"][0]["zone"], "top-left");
    assert_eq!(coords.json()["points"][1]["zone"], "bottom-right");

    let analytics = api.call("GET", "/analytics?camera_id=lobby", None);
    assert_eq!(analytics.json()["people_count"], 2);

    let overview = api.call("GET", "/analytics/all", None);
    assert_eq!(overview.json()["total_people_count"], 2);
    assert_eq!(overview.json()["online_cameras"], 1);
    assert_eq!(overview.json()["cameras"][0]["zone"], "hall");
    Ok(())
}

#[test]
fn stream_delivers_multipart_jpeg() -> Result<()> {
    let api = TestApi::new(ScriptedBackend::new())?;
    api.call(
        "POST",
        "/cameras",
        Some(r#"{"id":"s","url":"stub://s?width=32&height=24&fps=30"}"#),
    );
    api.wait_ok("/frame?camera_id=s");

    let mut stream = TcpStream::connect(api.addr())?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.write_all(b"GET /stream?camera_id=s HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let mut seen = Vec::new();
    let mut buf = [0u8; 4096];
    while seen.windows(2).filter(|w| *w == [0xFF, 0xD8]).count() < 2 {
        let n = stream.read(&mut buf)?;
        assert!(n > 0, "stream closed early");
        seen.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&seen);
    assert!(text.contains("multipart/x-mixed-replace; boundary=frame"));
    assert!(text.contains("--frame\r\nContent-Type: image/jpeg"));
    Ok(())
}

fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn idle_stream_ends_when_client_disconnects() -> Result<()> {
    let api = TestApi::new(ScriptedBackend::new())?;
    let created = api.call(
        "POST",
        "/cameras",
        Some(r#"{"id":"off","url":"stub://off","enabled":false}"#),
    );
    assert_eq!(created.status, 201);

    let mut clients = Vec::new();
    for _ in 0..5 {
        let mut stream = TcpStream::connect(api.addr())?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.write_all(b"GET /stream?camera_id=off HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
        let mut buf = [0u8; 512];
        let n = stream.read(&mut buf)?;
        assert!(String::from_utf8_lossy(&buf[..n]).contains("200"));
        clients.push(stream);
    }
    assert!(wait_until(|| api.open_streams() == 5));

    drop(clients);
    assert!(
        wait_until(|| api.open_streams() == 0),
        "{} stream(s) still open after clients left",
        api.open_streams()
    );
    Ok(())
}

#[test]
fn health_options_and_unknown_routes() -> Result<()> {
    let api = TestApi::new(ScriptedBackend::new())?;

    let health = api.call("GET", "/health", None);
    assert_eq!(health.status, 200);
    assert_eq!(health.json()["status"], "ok");
    assert!(health.headers.contains("Access-Control-Allow-Origin: *"));

    let options = api.call("OPTIONS", "/cameras", None);
    assert_eq!(options.status, 204);
    assert!(options.headers.contains("Access-Control-Allow-Methods"));

    assert_eq!(api.call("GET", "/nope", None).status, 404);
    assert_eq!(api.call("POST", "/detect", None).status, 405);
    Ok(())
}
