//! A loopback HTTP release host serving canned GitHub-style JSON.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread;

/// Serves fixed JSON bodies by request path until the test process exits.
/// Unknown paths answer 404.
pub struct ReleaseServer {
    base_url: String,
}

impl ReleaseServer {
    pub fn start(routes: BTreeMap<String, String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind loopback port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                respond(stream, &routes);
            }
        });
        Self { base_url }
    }

    /// Serve `body` as the latest release of `repository`.
    pub fn latest(repository: &str, body: String) -> Self {
        let path = format!("/repos/{repository}/releases/latest");
        Self::start(BTreeMap::from([(path, body)]))
    }

    /// Use as `releases.api_base`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// A release payload for `version` whose `.zip` asset points at `archive`.
pub fn release_json(version: &str, archive: &Path) -> String {
    serde_json::json!({
        "tag_name": format!("v{version}"),
        "body": format!("Release {version}"),
        "published_at": "2026-01-15T12:00:00Z",
        "prerelease": false,
        "draft": false,
        "assets": [{
            "name": format!("module-{version}.zip"),
            "browser_download_url": format!("file://{}", archive.display()),
        }],
    })
    .to_string()
}

fn respond(mut stream: TcpStream, routes: &BTreeMap<String, String>) {
    let Ok(clone) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(clone);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    // Headers up to the blank line
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (status, body) = match routes.get(path) {
        Some(body) => ("200 OK", body.as_str()),
        None => ("404 Not Found", r#"{"message":"Not Found"}"#),
    };
    let _ = write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.flush();
}
