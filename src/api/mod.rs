//! HTTP API.
//!
//! A nonblocking accept loop on its own thread hands each connection to a
//! short-lived thread. MJPEG streams keep their connection thread until the
//! client goes away or the server stops.

pub mod http;
mod routes;

use anyhow::{anyhow, Result};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::service::CrowdService;
use routes::Reply;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const STREAM_IDLE_TICK: Duration = Duration::from_millis(100);
const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    open_streams: Arc<AtomicUsize>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// MJPEG connections currently being served.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Stop accepting and end open streams. Requests already in flight finish
    /// on their own threads.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for ApiHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: Arc<CrowdService>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: Arc<CrowdService>) -> Self {
        Self { cfg, service }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let open_streams = Arc::new(AtomicUsize::new(0));
        let conns = Connections {
            service: self.service,
            shutdown: shutdown.clone(),
            open_streams: open_streams.clone(),
        };
        let join = std::thread::Builder::new()
            .name("api-accept".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, conns) {
                    log::error!("api server stopped: {}", err);
                }
            })?;

        log::info!("api: listening on http://{}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            open_streams,
            join: Some(join),
        })
    }
}

/// State shared by the accept loop and every connection thread.
#[derive(Clone)]
struct Connections {
    service: Arc<CrowdService>,
    shutdown: Arc<AtomicBool>,
    open_streams: Arc<AtomicUsize>,
}

/// Counts one open stream for as long as it lives.
struct StreamGuard<'a>(&'a AtomicUsize);

impl<'a> StreamGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn run_api(listener: TcpListener, conns: Connections) -> Result<()> {
    loop {
        if conns.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let conns = conns.clone();
                let spawned = std::thread::Builder::new()
                    .name("api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &conns) {
                            log::debug!("api: connection from {} ended: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("api: failed to spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, conns: &Connections) -> Result<()> {
    let service = conns.service.as_ref();
    stream.set_nonblocking(false)?;
    let request = match http::read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            let body = serde_json::json!({ "error": "bad_request" }).to_string();
            http::write_json(&mut stream, 400, body.as_bytes())?;
            return Err(err);
        }
    };
    log::debug!("api: {} {}", request.method, request.path);

    match routes::route(&request, service) {
        Reply::Json(status, body) => http::write_json(&mut stream, status, &body),
        Reply::Jpeg { camera_id, body } => http::write_response(
            &mut stream,
            200,
            "image/jpeg",
            &format!("X-Camera-Id: {}\r\n", camera_id),
            &body,
        ),
        Reply::NoContent => http::write_response(&mut stream, 204, "text/plain", "", &[]),
        Reply::Stream {
            camera_id,
            with_boxes,
        } => {
            let _open = StreamGuard::enter(&conns.open_streams);
            serve_stream(
                &mut stream,
                service,
                camera_id.as_deref(),
                with_boxes,
                &conns.shutdown,
            )
        }
    }
}

/// Push parts paced at the configured stream rate, waiting in short ticks
/// while the camera has no frame. Ends on write failure, a closed peer, server
/// stop, or when the camera goes away.
fn serve_stream(
    stream: &mut TcpStream,
    service: &CrowdService,
    camera_id: Option<&str>,
    with_boxes: bool,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_write_timeout(Some(STREAM_WRITE_TIMEOUT))?;
    http::write_stream_header(stream)?;
    let fps = service.stream_settings().fps.max(1);
    let interval = Duration::from_millis((1000 / fps as u64).max(1));

    while !shutdown.load(Ordering::SeqCst) {
        match service.stream_part(camera_id, with_boxes) {
            Ok(Some(jpeg)) => {
                http::write_stream_part(stream, &jpeg)?;
                std::thread::sleep(interval);
            }
            Ok(None) => {
                // Nothing is written while idle, so a departed client only
                // shows up here.
                if peer_closed(stream)? {
                    log::debug!("api: stream client left while idle");
                    break;
                }
                std::thread::sleep(STREAM_IDLE_TICK);
            }
            Err(err) => {
                log::info!("api: stream ended: {:#}", err);
                break;
            }
        }
    }
    Ok(())
}

/// Non-blocking check for EOF or a reset from the client. Bytes the client
/// sends after its request are left unread.
fn peer_closed(stream: &TcpStream) -> Result<bool> {
    stream.set_nonblocking(true)?;
    let mut byte = [0u8; 1];
    let closed = match stream.peek(&mut byte) {
        Ok(0) => true,
        Ok(_) => false,
        Err(err) if err.kind() == ErrorKind::WouldBlock => false,
        Err(err) if err.kind() == ErrorKind::Interrupted => false,
        Err(_) => true,
    };
    stream.set_nonblocking(false)?;
    Ok(closed)
}
