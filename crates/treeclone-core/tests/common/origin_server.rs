//! Minimal HTTP/1.1 origin for integration tests.
//!
//! Serves a fixed set of files under `/`. HEAD and GET both send a quoted
//! `ETag` holding the MD5 of the body; unknown paths get 404. Selected paths
//! can be made to answer GET with 500 a number of times before serving.

use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    failures: Mutex<HashMap<String, usize>>,
    heads: AtomicUsize,
    gets: AtomicUsize,
}

/// Handle to a running origin. The server runs until the process exits.
#[derive(Clone)]
pub struct Origin {
    base: String,
    state: Arc<State>,
}

impl Origin {
    /// Base URL with a trailing slash, e.g. "http://127.0.0.1:12345/".
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.state.heads.load(Ordering::SeqCst)
    }
}

/// Serve `files` (relative path, body).
pub fn start(files: &[(String, Vec<u8>)]) -> Origin {
    start_failing(files, &[], 0)
}

/// Like `start`, but each path in `failing` answers GET with 500 `times` times first.
pub fn start_failing(files: &[(String, Vec<u8>)], failing: &[&str], times: usize) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let state = Arc::new(State {
        files: files.iter().cloned().collect(),
        failures: Mutex::new(failing.iter().map(|p| (p.to_string(), times)).collect()),
        ..State::default()
    });
    let server_state = Arc::clone(&state);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&server_state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    Origin {
        base: format!("http://127.0.0.1:{}/", port),
        state,
    }
}

pub fn md5_hex(body: &[u8]) -> String {
    hex::encode(Md5::digest(body))
}

fn handle(mut stream: TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/").trim_start_matches('/').to_string();

    let is_head = method.eq_ignore_ascii_case("HEAD");
    if is_head {
        state.heads.fetch_add(1, Ordering::SeqCst);
    } else if method.eq_ignore_ascii_case("GET") {
        state.gets.fetch_add(1, Ordering::SeqCst);
        let mut failures = state.failures.lock().unwrap();
        if let Some(left) = failures.get_mut(&path) {
            if *left > 0 {
                *left -= 1;
                let _ = stream.write_all(
                    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
                return;
            }
        }
    } else {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let Some(body) = state.files.get(&path) else {
        let _ = stream.write_all(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nETag: \"{}\"\r\nConnection: close\r\n\r\n",
        body.len(),
        md5_hex(body)
    );
    let _ = stream.write_all(response.as_bytes());
    if !is_head {
        let _ = stream.write_all(body);
    }
}
