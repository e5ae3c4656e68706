//! In-process mock of the STP service
//!
//! Accepts WebSocket connections on 127.0.0.1, answers Register according to
//! a configurable policy, and records every envelope it receives. Everything
//! else (replies, notifications, closes) is driven by the test.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stp_client::connector::protocol::{RequestParams, METHOD_REQUEST};
use stp_client::Envelope;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How the mock answers `Register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterPolicy {
    Accept,
    Reject,
    Ignore,
    /// Close the connection instead of answering
    HangUp,
}

/// What the test asks the connection task to write.
enum Outgoing {
    Frame(Message),
    /// Raw bytes written past the WebSocket codec
    Garbage(Vec<u8>),
}

/// A correlated request as seen by the service.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub cookie: u64,
    pub timeout: u64,
    pub inner: Envelope,
}

struct Control {
    policy: Mutex<RegisterPolicy>,
    accepting: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    stall_after_register: AtomicBool,
    connections: AtomicUsize,
    sessions_issued: AtomicUsize,
}

pub struct MockStp {
    pub url: String,
    received: mpsc::UnboundedReceiver<Envelope>,
    control: Arc<Control>,
    server: JoinHandle<()>,
}

impl MockStp {
    pub async fn start() -> Self {
        Self::start_with(RegisterPolicy::Accept).await
    }

    pub async fn start_with(policy: RegisterPolicy) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let control = Arc::new(Control {
            policy: Mutex::new(policy),
            accepting: AtomicBool::new(true),
            outbound: Mutex::new(None),
            connections: AtomicUsize::new(0),
            sessions_issued: AtomicUsize::new(0),
            stall_after_register: AtomicBool::new(false),
        });

        let server = tokio::spawn(accept_loop(listener, Arc::clone(&control), received_tx));

        Self {
            url,
            received,
            control,
            server,
        }
    }

    pub fn set_register_policy(&self, policy: RegisterPolicy) {
        *self.control.policy.lock().unwrap() = policy;
    }

    /// When false, new TCP connections are dropped before the handshake.
    pub fn set_accepting(&self, accepting: bool) {
        self.control.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Stop reading from a connection once its Register has been answered.
    pub fn set_stall_after_register(&self, stall: bool) {
        self.control.stall_after_register.store(stall, Ordering::SeqCst);
    }

    /// WebSocket sessions completed so far
    pub fn connection_count(&self) -> usize {
        self.control.connections.load(Ordering::SeqCst)
    }

    pub fn send_raw(&self, frame: Message) {
        self.push(Outgoing::Frame(frame));
    }

    /// Write bytes that are not a valid WebSocket frame, then drop the socket.
    pub fn send_garbage(&self, bytes: Vec<u8>) {
        self.push(Outgoing::Garbage(bytes));
    }

    fn push(&self, outgoing: Outgoing) {
        let outbound = self.control.outbound.lock().unwrap();
        outbound
            .as_ref()
            .expect("no client connected")
            .send(outgoing)
            .expect("connection writer gone");
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.send_raw(Message::Text(text.into()));
    }

    pub fn notify(&self, method: &str, params: Value) {
        self.send_text(json!({"method": method, "params": params}).to_string());
    }

    pub fn reply(&self, cookie: u64, success: bool, result: Value) {
        self.notify(
            "RequestResponse",
            json!({"cookie": cookie, "success": success, "result": result}),
        );
    }

    /// Close the current connection with a proper closing handshake.
    pub fn close_connection(&self) {
        self.send_raw(Message::Close(None));
    }

    /// Next envelope the client sent, if one arrives within `within`.
    pub async fn next_envelope(&mut self, within: Duration) -> Option<Envelope> {
        tokio::time::timeout(within, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip ahead to the next fire-and-forget envelope named `method`.
    pub async fn expect_inform(&mut self, method: &str) -> Envelope {
        loop {
            let envelope = self
                .next_envelope(Duration::from_secs(5))
                .await
                .unwrap_or_else(|| panic!("no {} received", method));
            if envelope.method == method {
                return envelope;
            }
        }
    }

    /// Skip ahead to the next correlated request whose inner method is `method`.
    pub async fn expect_request(&mut self, method: &str) -> SeenRequest {
        loop {
            let envelope = self
                .next_envelope(Duration::from_secs(5))
                .await
                .unwrap_or_else(|| panic!("no {} request received", method));
            if let Some(request) = as_request(&envelope) {
                if request.inner.method == method {
                    return request;
                }
            }
        }
    }

    /// Everything received so far that has not been consumed.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.received.try_recv() {
            out.push(envelope);
        }
        out
    }
}

impl Drop for MockStp {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Unwrap a `Request` envelope.
pub fn as_request(envelope: &Envelope) -> Option<SeenRequest> {
    if envelope.method != METHOD_REQUEST {
        return None;
    }
    let params: RequestParams = envelope.params_as().ok()?;
    let inner = Envelope::decode(&params.json_request).ok()?;
    Some(SeenRequest {
        cookie: params.cookie,
        timeout: params.timeout,
        inner,
    })
}

/// Poll `condition` until it holds or `within` elapses.
pub async fn wait_until<F: Fn() -> bool>(within: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn accept_loop(
    listener: TcpListener,
    control: Arc<Control>,
    received: mpsc::UnboundedSender<Envelope>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        if !control.accepting.load(Ordering::SeqCst) {
            drop(stream);
            continue;
        }
        tokio::spawn(serve(stream, Arc::clone(&control), received.clone()));
    }
}

async fn serve(stream: TcpStream, control: Arc<Control>, received: mpsc::UnboundedSender<Envelope>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    control.connections.fetch_add(1, Ordering::SeqCst);

    let (mut ws_sink, mut ws_stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
    *control.outbound.lock().unwrap() = Some(out_tx.clone());

    let mut reading = true;
    let mut garbage = None;

    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                let message = match outgoing {
                    Some(Outgoing::Frame(message)) => message,
                    Some(Outgoing::Garbage(bytes)) => {
                        garbage = Some(bytes);
                        break;
                    }
                    None => break,
                };
                let closing = matches!(message, Message::Close(_));
                if ws_sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            incoming = ws_stream.next(), if reading => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(envelope) = Envelope::decode(&text) else { continue };

                if let Some(request) = as_request(&envelope) {
                    if request.inner.method == "Register" {
                        let policy = *control.policy.lock().unwrap();
                        if policy == RegisterPolicy::HangUp {
                            let _ = out_tx.send(Outgoing::Frame(Message::Close(None)));
                        } else if let Some(reply) = register_reply(&control, &request) {
                            let _ = out_tx.send(Outgoing::Frame(Message::Text(reply.to_string())));
                            if control.stall_after_register.load(Ordering::SeqCst) {
                                reading = false;
                            }
                        }
                    }
                }
                let _ = received.send(envelope);
            }
        }
    }

    if let Some(bytes) = garbage {
        if let Ok(mut ws) = ws_sink.reunite(ws_stream) {
            let _ = ws.get_mut().write_all(&bytes).await;
            let _ = ws.get_mut().flush().await;
        }
    }

    // Let the client see the close before the socket goes away.
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn register_reply(control: &Control, request: &SeenRequest) -> Option<Value> {
    let policy = *control.policy.lock().unwrap();
    let (success, result) = match policy {
        RegisterPolicy::Ignore | RegisterPolicy::HangUp => return None,
        RegisterPolicy::Reject => (false, json!("service name not allowed")),
        RegisterPolicy::Accept => {
            let requested = request.inner.params["sessionId"].as_str().unwrap_or_default();
            // A session id this mock issued earlier is resumed as is.
            let session_id = if requested.starts_with("session-") {
                requested.to_string()
            } else {
                let n = control.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
                format!("session-{}", n)
            };
            (true, json!({"sessionId": session_id}))
        }
    };
    Some(json!({
        "method": "RequestResponse",
        "params": {"cookie": request.cookie, "success": success, "result": result}
    }))
}
