//! Loopback service for end-to-end client and stream tests.
//!
//! Speaks just enough HTTP/1.1 and WebSocket to stand in for the service:
//! nonce and token exchange, a few REST endpoints that check signatures, and
//! scripted WebSocket peers on `/feed` and `/control`. The first token it
//! issues (`tok-0`) is rejected everywhere except the token exchange.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

use crate::{
    User,
    session::now_ns,
    types::{CreateOrderRequest, TxSettlementRequest, UserPublicKey, WithdrawalRequest},
};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub nonces: usize,
    pub auths: usize,
    pub inventory: usize,
    pub upgrades: usize,
    pub pongs: usize,
}

pub(crate) struct MockService {
    user: UserPublicKey,
    counters: Mutex<Counters>,
    /// Lower-cased heads of every WebSocket upgrade request.
    upgrade_heads: Mutex<Vec<String>>,
    /// Bodies of accepted signed POSTs, by path.
    posted: Mutex<Vec<(String, Value)>>,
}

impl MockService {
    pub fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap()
    }

    pub fn upgrade_heads(&self) -> Vec<String> {
        self.upgrade_heads.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().unwrap().clone()
    }

    /// Credentials check shared by REST and WebSocket endpoints.
    fn authorized(&self, head: &str) -> bool {
        head.contains(&format!("user-id: {}", self.user))
            && head.contains("authorization: bearer tok-")
            && !head.contains("authorization: bearer tok-0")
    }

    /// Accepts `body` if its signature verifies over `payload(body)`.
    fn accept_signed<R, P>(&self, path: &str, body: &[u8], payload: impl Fn(&R) -> &P) -> bool
    where
        R: DeserializeOwned,
        P: Serialize,
    {
        let Ok(request) = serde_json::from_slice::<R>(body) else {
            return false;
        };
        let value: Value = serde_json::from_slice(body).unwrap();
        let Some(signature) = value["signature"].as_array() else {
            return false;
        };
        let signature: Vec<u8> = signature
            .iter()
            .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect();
        if !verify_json(&self.user, payload(&request), &signature) {
            return false;
        }
        self.posted.lock().unwrap().push((path.to_string(), value));
        true
    }

    fn respond(&self, method: &str, path: &str, head: &str, body: &[u8]) -> (&'static str, String) {
        match (method, path) {
            ("GET", p) if p == format!("/nonce/{}", self.user) => {
                let mut counters = self.counters();
                counters.nonces += 1;
                let nonce = format!("nonce-{}", counters.nonces);
                ("200 OK", json!({ "value": nonce }).to_string())
            }
            ("POST", "/auth") => {
                let req: Value = serde_json::from_slice(body).unwrap();
                let signature: Vec<u8> = serde_json::from_value(req["signature"].clone()).unwrap();
                let nonce = req["nonce"].as_str().unwrap();
                if !verify(&self.user, nonce.as_bytes(), &signature) {
                    return ("401 Unauthorized", String::new());
                }

                let mut counters = self.counters();
                let token = format!("tok-{}", counters.auths);
                counters.auths += 1;
                let expiry = (now_ns() + 3_600_000_000_000).to_string();
                ("200 OK", json!({ "token": token, "expiry_ns": expiry }).to_string())
            }
            _ if !self.authorized(head) => ("401 Unauthorized", "stale token".into()),
            ("GET", p) if p.starts_with("/inventory/user/") => {
                self.counters().inventory += 1;
                ("200 OK", json!({ "balances": [] }).to_string())
            }
            ("GET", p) if p.starts_with("/orders/user/") => ("204 No Content", String::new()),
            ("GET", "/market/200") => (
                "200 OK",
                json!({
                    "asset_id": "200",
                    "book_price_decimals": 2,
                    "book_quantity_decimals": 3,
                })
                .to_string(),
            ),
            ("POST", "/orders/create") => {
                if self.accept_signed(path, body, |req: &CreateOrderRequest| &req.order) {
                    let order: Value = serde_json::from_slice(body).unwrap();
                    let id = order["order"]["order_id"].clone();
                    ("200 OK", json!({ "order_id": id, "status": "Received" }).to_string())
                } else {
                    ("400 Bad Request", "bad signature".into())
                }
            }
            ("POST", "/settlement/init") => {
                if self.accept_signed(path, body, |req: &TxSettlementRequest| &req.inner) {
                    ("200 OK", String::new())
                } else {
                    ("400 Bad Request", "bad signature".into())
                }
            }
            ("POST", "/withdrawal/init") => {
                if self.accept_signed(path, body, |req: &WithdrawalRequest| &req.inner) {
                    ("200 OK", String::new())
                } else {
                    ("400 Bad Request", "bad signature".into())
                }
            }
            ("POST", "/withdrawal/update") => {
                let value: Value = serde_json::from_slice(body).unwrap();
                self.posted.lock().unwrap().push((path.to_string(), value));
                ("204 No Content", String::new())
            }
            _ => ("404 Not Found", "not found".into()),
        }
    }

    /// Completes a WebSocket upgrade and runs the script for `path`.
    async fn upgrade(&self, mut socket: TcpStream, path: &str, raw_head: &str, head: &str) {
        self.counters().upgrades += 1;
        self.upgrade_heads.lock().unwrap().push(head.to_string());

        let status = if path == "/forbidden" {
            Some("403 Forbidden")
        } else if !self.authorized(head) {
            Some("401 Unauthorized")
        } else {
            None
        };
        if let Some(status) = status {
            let response =
                format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            return;
        }

        let key = raw_head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_string())
            })
            .unwrap();
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(&key)
        );
        socket.write_all(response.as_bytes()).await.unwrap();

        let ws = ServerSocket(socket);
        match path {
            "/feed" => self.feed(ws).await,
            "/control" => self.control(ws).await,
            _ => ws.close().await,
        }
    }

    /// Ping, wait for the pong, then a mix of control, data and junk frames
    /// followed by a close.
    async fn feed(&self, mut ws: ServerSocket) {
        ws.send_text(r#"{"type":"ping"}"#).await;
        if let Some(reply) = ws.recv_text().await {
            if serde_json::from_str::<Value>(&reply).ok() == Some(json!({ "type": "pong" })) {
                self.counters().pongs += 1;
            }
        }

        ws.send_text(r#"{"type":"subscriptions","topics":["trades"]}"#)
            .await;
        ws.send_text(r#"{"n":1}"#).await;
        ws.send_text("not json").await;
        ws.send_text(r#"{"n":2}"#).await;
        ws.close().await;
    }

    /// Answers cancels. Order id `hold` is never answered and `hangup` drops
    /// the connection.
    async fn control(&self, mut ws: ServerSocket) {
        ws.send_text(r#"{"type":"ping"}"#).await;

        while let Some(text) = ws.recv_text().await {
            let request: Value = serde_json::from_str(&text).unwrap();
            if request == json!({ "type": "pong" }) {
                self.counters().pongs += 1;
                continue;
            }
            let Some(cancel) = request.get("CancelOrderRequest") else {
                continue;
            };
            let order_id = cancel["cancel"]["order_id"].as_str().unwrap_or_default();
            match order_id {
                "hold" => {}
                "hangup" => break,
                _ => {
                    let response = json!({
                        "CancelOrderResponse": {
                            "response": { "order_id": order_id, "status": "Received" },
                            "asset_id": cancel["cancel"]["asset_id"],
                        }
                    });
                    ws.send_text(&response.to_string()).await;
                }
            }
        }
        ws.close().await;
    }
}

fn verify(user: &UserPublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(user.as_bytes()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Checks a signature made with `User::sign_json`.
fn verify_json(user: &UserPublicKey, payload: &impl Serialize, signature: &[u8]) -> bool {
    let message: String = serde_json::to_string(payload)
        .unwrap()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\r' | '\n'))
        .collect();
    verify(user, message.as_bytes(), signature)
}

fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Server end of a WebSocket: unmasked writes, masked reads.
struct ServerSocket(TcpStream);

impl ServerSocket {
    async fn send_text(&mut self, payload: &str) {
        let len = payload.len();
        let mut frame = vec![0x81];
        if len < 126 {
            frame.push(len as u8);
        } else {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        frame.extend_from_slice(payload.as_bytes());
        // the client may already be gone
        let _ = self.0.write_all(&frame).await;
    }

    /// Next text frame from the client. `None` once it closes or the
    /// connection drops.
    async fn recv_text(&mut self) -> Option<String> {
        loop {
            let mut header = [0u8; 2];
            self.0.read_exact(&mut header).await.ok()?;
            let opcode = header[0] & 0x0f;
            let masked = header[1] & 0x80 != 0;
            let len = match header[1] & 0x7f {
                126 => {
                    let mut ext = [0u8; 2];
                    self.0.read_exact(&mut ext).await.ok()?;
                    usize::from(u16::from_be_bytes(ext))
                }
                127 => {
                    let mut ext = [0u8; 8];
                    self.0.read_exact(&mut ext).await.ok()?;
                    usize::try_from(u64::from_be_bytes(ext)).ok()?
                }
                len => usize::from(len),
            };

            let mut mask = [0u8; 4];
            if masked {
                self.0.read_exact(&mut mask).await.ok()?;
            }
            let mut payload = vec![0u8; len];
            self.0.read_exact(&mut payload).await.ok()?;
            if masked {
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= mask[i % 4];
                }
            }

            match opcode {
                0x1 => return String::from_utf8(payload).ok(),
                0x8 => return None,
                // ping, pong, binary
                _ => continue,
            }
        }
    }

    /// Sends a normal close frame and shuts the connection down.
    async fn close(mut self) {
        let _ = self.0.write_all(&[0x88, 0x02, 0x03, 0xe8]).await;
        let _ = self.0.shutdown().await;
    }
}

async fn handle(mut socket: TcpStream, service: Arc<MockService>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let raw_head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let head = raw_head.to_lowercase();
    let mut request_line = raw_head.lines().next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    if head.contains("upgrade: websocket") {
        service.upgrade(socket, &path, &raw_head, &head).await;
        return;
    }

    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|len| len.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    if path == "/slow" {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    let (status, body) = service.respond(&method, &path, &head, &buf[header_end..]);

    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Starts a service that knows `user` and returns its base URL.
pub(crate) async fn spawn_service(user: &User) -> (Url, Arc<MockService>) {
    let _ = simple_logger::init_with_level(log::Level::Debug);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = Arc::new(MockService {
        user: user.public_key(),
        counters: Mutex::default(),
        upgrade_heads: Mutex::default(),
        posted: Mutex::default(),
    });

    let shared = Arc::clone(&service);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handle(socket, Arc::clone(&shared)));
        }
    });

    (format!("http://{addr}").parse().unwrap(), service)
}
