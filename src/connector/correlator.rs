//! Request Correlator
//!
//! Single responsibility: let many request/response exchanges share one
//! connection without cross-talk.
//!
//! Each request gets a cookie from a monotonically increasing counter owned by
//! this correlator. The cookie is registered in the pending set *before* the
//! frame is sent, so a fast reply can never miss its entry. An entry is removed
//! exactly once, by whichever happens first: the reply, the timeout, a send
//! failure, or `fail_all`. Anything arriving for a removed cookie is dropped.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use super::protocol::{encode_request, Envelope, RequestResponse};
use crate::error::StpError;

type ReplySender = oneshot::Sender<Result<Value, StpError>>;

struct PendingRequest {
    method: String,
    reply_tx: ReplySender,
    created_at: Instant,
}

/// Cookie allocator plus the set of requests still waiting for a reply.
pub struct Correlator {
    next_cookie: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_cookie: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send `inner` as a correlated request and wait for its reply.
    ///
    /// `send` receives the complete text frame. On `success: false` the error
    /// carries the service's result payload unchanged.
    pub async fn issue<F, Fut>(
        &self,
        inner: &Envelope,
        timeout: Duration,
        send: F,
    ) -> Result<Value, StpError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(), StpError>>,
    {
        let cookie = self.next_cookie.fetch_add(1, Ordering::SeqCst);
        let frame = encode_request(cookie, inner, timeout)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                cookie,
                PendingRequest {
                    method: inner.method.clone(),
                    reply_tx,
                    created_at: Instant::now(),
                },
            );
        }

        debug!(cookie = cookie, method = %inner.method, "Issuing request");

        // One deadline covers the send and the wait for the reply.
        let deadline = tokio::time::Instant::now() + timeout;

        match tokio::time::timeout_at(deadline, send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.forget(cookie).await;
                return Err(e);
            }
            Err(_) => {
                debug!(cookie = cookie, "Send did not complete before the deadline");
                self.forget(cookie).await;
                return Err(timed_out(inner, timeout));
            }
        }

        match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StpError::Closed("Reply channel dropped".into())),
            Err(_) => {
                self.forget(cookie).await;
                Err(timed_out(inner, timeout))
            }
        }
    }

    /// Settle the request a reply belongs to.
    ///
    /// Returns false when no request is waiting on the cookie (stale,
    /// duplicate, or already timed out).
    pub async fn resolve(&self, reply: RequestResponse) -> bool {
        let entry = self.pending.lock().await.remove(&reply.cookie);
        let Some(request) = entry else {
            return false;
        };

        debug!(
            cookie = reply.cookie,
            method = %request.method,
            success = reply.success,
            elapsed_ms = request.created_at.elapsed().as_millis() as u64,
            "Reply received"
        );

        let outcome = if reply.success {
            Ok(reply.result)
        } else {
            Err(StpError::Application(reply.result))
        };
        // The caller may have given up already; nothing to do then.
        let _ = request.reply_tx.send(outcome);
        true
    }

    /// Drop a pending entry without settling it.
    pub async fn forget(&self, cookie: u64) -> bool {
        self.pending.lock().await.remove(&cookie).is_some()
    }

    /// Fail every outstanding request.
    pub async fn fail_all(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        for (cookie, request) in pending.drain() {
            debug!(cookie = cookie, method = %request.method, "Failing pending request");
            let _ = request.reply_tx.send(Err(StpError::Closed(reason.to_string())));
        }
    }

    /// Fail the outstanding requests for one method, leaving the rest pending.
    pub async fn fail_method<E>(&self, method: &str, error: E) -> usize
    where
        E: Fn() -> StpError,
    {
        let mut pending = self.pending.lock().await;
        let cookies: Vec<u64> = pending
            .iter()
            .filter(|(_, request)| request.method == method)
            .map(|(cookie, _)| *cookie)
            .collect();
        for cookie in &cookies {
            if let Some(request) = pending.remove(cookie) {
                debug!(cookie = *cookie, method = %method, "Failing pending request");
                let _ = request.reply_tx.send(Err(error()));
            }
        }
        cookies.len()
    }

    /// Number of requests still waiting for a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

fn timed_out(inner: &Envelope, timeout: Duration) -> StpError {
    StpError::Timeout {
        operation: inner.method.clone(),
        timeout,
    }
}
