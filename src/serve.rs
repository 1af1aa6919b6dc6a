//! Development server for watch mode.
//!
//! Serves the publish directory over HTTP with `tiny_http`:
//!
//! - Static file serving, `GET` and `HEAD`
//! - Automatic `index.html` resolution for directories
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │  (HTTP Server)  │     │  (File Monitor)  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │ read guard            │ write guard
//!          ▼                       ▼
//!    Serve files ◀── RwLock ──▶ Rebuild site
//!                    │
//!                    ▼
//!              publish dir
//! ```

use crate::{config::SiteConfig, log};
use anyhow::{Context, Result, anyhow};
use parking_lot::RwLock;
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    process::Command,
    sync::Arc,
    thread,
    time::Duration,
};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve the publish directory until Ctrl+C.
///
/// Responses are sent while holding a read guard of `lock`; the watcher
/// holds the write guard while it rebuilds.
pub fn serve_site(config: &SiteConfig, lock: Arc<RwLock<()>>) -> Result<()> {
    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", config.serve.interface))?;

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    let url = format!("http://{addr}");
    log!("serve"; "serving {} at {url}", config.pub_dir.display());
    if config.serve.open_browser {
        open_browser_later(url);
    }

    for request in server.incoming_requests() {
        let _guard = lock.read();
        if let Err(e) = handle_request(request, &config.pub_dir) {
            log!("serve"; "request error: {e}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_err = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Map a request URL onto a file in `root`.
///
/// Directories resolve to their `index.html`. Query strings are ignored and
/// `..` segments never resolve.
fn resolve_path(root: &Path, url: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(url).ok()?;
    let path = decoded.split(['?', '#']).next().unwrap_or_default();
    let rel = Path::new(path.trim_start_matches('/'));
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let local = root.join(rel);
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    index.is_file().then_some(index)
}

fn handle_request(request: Request, root: &Path) -> Result<()> {
    let head = match request.method() {
        Method::Get => false,
        Method::Head => true,
        _ => return respond_status(request, 405, "405 Method Not Allowed"),
    };

    match resolve_path(root, request.url()) {
        Some(path) => serve_file(request, &path, head),
        None => respond_status(request, 404, "404 Not Found"),
    }
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("invalid header `{value}`"))
}

/// Serve a file with appropriate content type; `HEAD` gets headers only.
fn serve_file(request: Request, path: &Path, head: bool) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let header = content_type(guess_content_type(path))?;

    if head {
        let len = content.len();
        let response = Response::new(StatusCode(200), vec![header], Cursor::new(Vec::new()), Some(len), None);
        request.respond(response)?;
    } else {
        request.respond(Response::from_data(content).with_header(header))?;
    }
    Ok(())
}

fn respond_status(request: Request, code: u16, body: &str) -> Result<()> {
    let response = Response::new(
        StatusCode(code),
        vec![content_type("text/plain")?],
        Cursor::new(body.as_bytes().to_vec()),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",

        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

// ============================================================================
// Browser
// ============================================================================

/// Open `url` in the default browser once the server is accepting.
fn open_browser_later(url: String) {
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(1));
        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/c", "start", ""]);
            cmd
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        if let Err(e) = cmd.arg(&url).status() {
            log!("warn"; "could not open browser: {e}");
        }
    });
}
