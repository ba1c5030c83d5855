// src/http/mod.rs
//! Live view over HTTP: MJPEG streams, still snapshots and a small JSON API.

pub mod auth;
pub mod mjpeg;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::broadcast::FrameBroadcaster;
use crate::core::CameraId;
use crate::recorder::footage;

pub use mjpeg::MjpegBody;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: String,
    pub subscribe_timeout: Duration,
    pub max_idle_timeouts: u32,
    /// Basic auth pair; `None` leaves every route open.
    pub credentials: Option<(String, String)>,
    pub storage_path: PathBuf,
    pub resolution: (u32, u32),
    pub fps: u32,
}

/// Entry of `/api/cameras`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CameraRoute {
    pub name: String,
    pub url: String,
    pub resolution: String,
    pub framerate: u32,
}

type Lookup = dyn Fn(CameraId) -> Option<Arc<FrameBroadcaster>> + Send + Sync;

struct Shared {
    settings: ServerSettings,
    routes: Vec<CameraRoute>,
    lookup: Box<Lookup>,
}

pub struct HttpServer {
    server: Arc<Server>,
    handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Binds and starts the accept loop. Each request is served on its own
    /// thread, so a slow viewer never holds up another.
    pub fn start(
        settings: ServerSettings,
        cameras: &[CameraId],
        lookup: impl Fn(CameraId) -> Option<Arc<FrameBroadcaster>> + Send + Sync + 'static,
    ) -> anyhow::Result<Self> {
        let server = Server::http(settings.bind.as_str()).map_err(|e| anyhow::anyhow!(e))?;
        let server = Arc::new(server);
        info!("[http] server on {}", settings.bind);

        let routes = camera_routes(cameras, settings.resolution, settings.fps);
        for r in &routes {
            info!("[http] streaming route registered: {}", r.url);
        }

        let shared = Arc::new(Shared {
            settings,
            routes,
            lookup: Box::new(lookup),
        });

        let accept = server.clone();
        let handle = thread::Builder::new()
            .name("http-accept".into())
            .spawn(move || {
                for req in accept.incoming_requests() {
                    let shared = shared.clone();
                    let spawned = thread::Builder::new()
                        .name("http-req".into())
                        .spawn(move || handle_request(req, &shared));
                    if let Err(e) = spawned {
                        warn!("[http] could not spawn request thread: {}", e);
                    }
                }
                debug!("[http] accept loop ended");
            })?;

        Ok(Self {
            server,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Unblocks the accept loop and waits for it, releasing the port.
    /// Streams already being served end when their broadcaster closes.
    pub fn stop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("[http] server stopped");
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn camera_routes(cameras: &[CameraId], resolution: (u32, u32), fps: u32) -> Vec<CameraRoute> {
    cameras
        .iter()
        .map(|cam| CameraRoute {
            name: format!("{}.mjpeg", cam),
            url: format!("/stream/{}.mjpeg", cam),
            resolution: format!("{}x{}", resolution.0, resolution.1),
            framerate: fps,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Cameras,
    Footage,
    Stream(CameraId),
    Snapshot(CameraId),
    NotFound,
}

pub fn route(path: &str) -> Route {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    match path {
        "/health" => Route::Health,
        "/api/cameras" => Route::Cameras,
        "/api/footage" => Route::Footage,
        _ => {
            if let Some(name) = path
                .strip_prefix("/stream/")
                .and_then(|rest| rest.strip_suffix(".mjpeg"))
            {
                return CameraId::parse_name(name).map_or(Route::NotFound, Route::Stream);
            }
            if let Some(name) = path
                .strip_prefix("/snapshot/")
                .and_then(|rest| rest.strip_suffix(".jpg"))
            {
                return CameraId::parse_name(name).map_or(Route::NotFound, Route::Snapshot);
            }
            Route::NotFound
        }
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn with_headers<R: std::io::Read>(
    mut response: Response<R>,
    headers: &[(&str, &str)],
) -> Response<R> {
    for (name, value) in headers {
        if let Some(h) = header(name, value) {
            response.add_header(h);
        }
    }
    response
}

fn respond_status(req: Request, code: u16) {
    let _ = req.respond(Response::empty(StatusCode(code)));
}

fn respond_json<T: Serialize>(req: Request, value: &T) {
    match serde_json::to_string(value) {
        Ok(body) => {
            let response = with_headers(
                Response::from_string(body),
                &[("Content-Type", "application/json")],
            );
            let _ = req.respond(response);
        }
        Err(e) => {
            warn!("[http] json encoding failed: {}", e);
            respond_status(req, 500);
        }
    }
}

fn authorized(req: &Request, settings: &ServerSettings) -> bool {
    let Some((user, password)) = &settings.credentials else {
        return true;
    };
    let value = req
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str());
    auth::basic_auth_ok(value, user, password)
}

fn handle_request(req: Request, shared: &Shared) {
    if req.method() != &Method::Get {
        respond_status(req, 405);
        return;
    }

    if !authorized(&req, &shared.settings) {
        let challenge = auth::challenge();
        let response = with_headers(
            Response::from_string("authentication required").with_status_code(StatusCode(401)),
            &[("WWW-Authenticate", challenge.as_str())],
        );
        let _ = req.respond(response);
        return;
    }

    match route(req.url()) {
        Route::Health => {
            let response = with_headers(
                Response::from_string("ok"),
                &[("Content-Type", "text/plain")],
            );
            let _ = req.respond(response);
        }
        Route::Cameras => respond_json(req, &shared.routes),
        Route::Footage => respond_json(req, &footage::scan(&shared.settings.storage_path)),
        Route::Stream(camera) => match (shared.lookup)(camera) {
            Some(b) => serve_stream(req, &b, &shared.settings),
            None => respond_status(req, 404),
        },
        Route::Snapshot(camera) => match (shared.lookup)(camera) {
            Some(b) => match b.latest() {
                Some(frame) => {
                    let response = with_headers(
                        Response::from_data(frame.bytes.to_vec()),
                        &[("Content-Type", "image/jpeg"), ("Cache-Control", "no-store")],
                    );
                    let _ = req.respond(response);
                }
                None => respond_status(req, 503),
            },
            None => respond_status(req, 404),
        },
        Route::NotFound => respond_status(req, 404),
    }
}

fn serve_stream(req: Request, broadcaster: &Arc<FrameBroadcaster>, settings: &ServerSettings) {
    let camera = broadcaster.camera();
    let peer = req
        .remote_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "?".to_string());
    info!("[http:{}] viewer connected from {}", camera, peer);

    let (sub, first) = broadcaster.subscribe_with_latest(settings.subscribe_timeout);
    let body = MjpegBody::new(sub, first, settings.max_idle_timeouts);
    let content_type = mjpeg::content_type();

    let headers: Vec<Header> = [
        ("Content-Type", content_type.as_str()),
        ("Cache-Control", "no-store"),
        ("Connection", "close"),
    ]
    .iter()
    .filter_map(|(n, v)| header(n, v))
    .collect();

    let response = Response::new(StatusCode(200), headers, body, None, None);
    if let Err(e) = req.respond(response) {
        debug!("[http:{}] stream to {} ended: {}", camera, peer, e);
    }
}
