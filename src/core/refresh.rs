//! Single-flight session refresh.
//!
//! When a request comes back `401`, the first caller to notice becomes the
//! leader of a refresh cycle and performs exactly one `POST` to the refresh
//! endpoint. Any other request that fails while that exchange is in flight is
//! parked at the back of a FIFO list together with a reply channel.
//!
//! ```text
//!            401 (not retried, not refresh path)
//!   Idle ─────────────────────────────────────────► Refreshing ──┐
//!    ▲                                                  │        │ 401s park (FIFO)
//!    │        exchange failed: reject all, invalidate   │ ◄──────┘
//!    ├──────────────────────────────────────────────────┤
//!    │                                                  │ exchange ok
//!    │        batch replayed                            ▼
//!    └─────────────────────────────────────────────── Draining
//! ```
//!
//! On success the leader replays its own request first and then every parked
//! request in the order it was parked, each with the retry marker set. Each
//! outcome goes back only to the caller that issued the request.

use crate::domain::model::{ApiRequest, ApiResponse};
use crate::domain::ports::{SessionInvalidator, Transport};
use crate::utils::error::{ApiError, RefreshFailure, Result};
use futures::future::{join, join_all};
use reqwest::Method;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Draining,
}

struct Parked {
    request: ApiRequest,
    reply: oneshot::Sender<Result<ApiResponse>>,
}

struct CoordinatorState {
    state: RefreshState,
    waiting: VecDeque<Parked>,
    /// Incremented each time a leader starts an exchange.
    cycle: u64,
}

enum Role {
    Leader(u64, ApiRequest),
    Follower(oneshot::Receiver<Result<ApiResponse>>),
}

pub struct RefreshCoordinator<T: Transport> {
    transport: Arc<T>,
    refresh_path: String,
    refresh_timeout: Option<Duration>,
    invalidator: Option<SessionInvalidator>,
    inner: Mutex<CoordinatorState>,
}

impl<T: Transport> RefreshCoordinator<T> {
    pub fn new(
        transport: Arc<T>,
        refresh_path: impl Into<String>,
        refresh_timeout: Option<Duration>,
        invalidator: Option<SessionInvalidator>,
    ) -> Self {
        Self {
            transport,
            refresh_path: refresh_path.into(),
            refresh_timeout,
            invalidator,
            inner: Mutex::new(CoordinatorState {
                state: RefreshState::Idle,
                waiting: VecDeque::new(),
                cycle: 0,
            }),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    /// Number of requests currently parked behind an in-flight refresh.
    pub fn parked(&self) -> usize {
        self.lock().waiting.len()
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    /// Compares paths the way `ClientConfig::endpoint` joins them, so
    /// `auth/refresh`, `//auth/refresh/` and `/auth/refresh?x=1` all match.
    pub fn is_refresh_path(&self, path: &str) -> bool {
        normalize_path(path) == normalize_path(&self.refresh_path)
    }

    /// Whether a `401` on this request may start or join a refresh cycle.
    pub fn intercepts(&self, request: &ApiRequest) -> bool {
        !request.is_retried() && !self.is_refresh_path(&request.path)
    }

    /// Recovers a request that just failed with `401`.
    ///
    /// Returns the raw response of the replayed request, or the refresh
    /// failure when the session could not be renewed.
    pub async fn recover(&self, request: ApiRequest) -> Result<ApiResponse> {
        let role = {
            let mut inner = self.lock();
            if inner.state == RefreshState::Refreshing {
                let (reply, waiter) = oneshot::channel();
                tracing::debug!(
                    path = %request.path,
                    cycle = inner.cycle,
                    position = inner.waiting.len() + 1,
                    "⏸️ Session refresh in flight, request parked"
                );
                inner.waiting.push_back(Parked { request, reply });
                Role::Follower(waiter)
            } else {
                inner.cycle += 1;
                inner.state = RefreshState::Refreshing;
                Role::Leader(inner.cycle, request)
            }
        };

        match role {
            Role::Follower(waiter) => waiter.await.unwrap_or(Err(ApiError::RefreshAbandoned)),
            Role::Leader(cycle, request) => self.lead(cycle, request).await,
        }
    }

    async fn lead(&self, cycle: u64, request: ApiRequest) -> Result<ApiResponse> {
        let mut guard = CycleGuard {
            coordinator: self,
            cycle,
            settled: false,
        };

        tracing::info!(path = %request.path, cycle, "🔄 Session expired, refreshing");

        match self.exchange().await {
            Ok(()) => {
                let parked = {
                    let mut inner = self.lock();
                    inner.state = RefreshState::Draining;
                    std::mem::take(&mut inner.waiting)
                };

                tracing::info!(
                    cycle,
                    replays = parked.len() + 1,
                    "✅ Session refreshed, replaying requests"
                );

                let outcome = self.drain(request, parked).await;

                {
                    let mut inner = self.lock();
                    if inner.cycle == cycle && inner.state == RefreshState::Draining {
                        inner.state = RefreshState::Idle;
                    }
                }
                guard.settled = true;

                outcome
            }
            Err(failure) => {
                let parked = {
                    let mut inner = self.lock();
                    inner.state = RefreshState::Idle;
                    std::mem::take(&mut inner.waiting)
                };
                guard.settled = true;

                tracing::warn!(
                    cycle,
                    rejected = parked.len() + 1,
                    error = %failure,
                    "❌ Session refresh failed"
                );

                for entry in parked {
                    let _ = entry.reply.send(Err(ApiError::RefreshFailed(failure.clone())));
                }
                self.invalidate();

                Err(ApiError::RefreshFailed(failure))
            }
        }
    }

    /// The one network call of a refresh cycle.
    async fn exchange(&self) -> std::result::Result<(), RefreshFailure> {
        let request = ApiRequest::new(Method::POST, self.refresh_path.clone(), None);
        let call = self.transport.send(&request);

        let response = match self.refresh_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(response) => response,
                Err(_) => {
                    return Err(RefreshFailure::new(
                        None,
                        format!("refresh did not settle within {:?}", limit),
                    ))
                }
            },
            None => call.await,
        };

        match response {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(RefreshFailure::new(
                Some(response.status),
                describe_body(&response.body),
            )),
            Err(e) => Err(RefreshFailure::new(e.status(), e.to_string())),
        }
    }

    async fn drain(&self, own: ApiRequest, parked: VecDeque<Parked>) -> Result<ApiResponse> {
        let followers = join_all(parked.into_iter().map(|entry| async move {
            let outcome = self.replay(entry.request).await;
            // 呼叫端可能已經放棄等待
            let _ = entry.reply.send(outcome);
        }));

        let (outcome, _) = join(self.replay(own), followers).await;
        outcome
    }

    async fn replay(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.mark_retried();
        tracing::debug!(method = %request.method, path = %request.path, "🔁 Replaying request");
        self.transport.send(&request).await
    }

    fn invalidate(&self) {
        match &self.invalidator {
            Some(hook) => hook(),
            None => tracing::debug!("No session invalidation hook registered"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the coordinator if a leader is dropped before its cycle settles.
/// Parked senders are dropped with the list, so their callers see `RefreshAbandoned`.
struct CycleGuard<'a, T: Transport> {
    coordinator: &'a RefreshCoordinator<T>,
    cycle: u64,
    settled: bool,
}

impl<T: Transport> Drop for CycleGuard<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut inner = self.coordinator.lock();
        if inner.cycle != self.cycle || inner.state == RefreshState::Idle {
            return;
        }

        tracing::warn!(cycle = self.cycle, "Session refresh abandoned before it settled");
        if inner.state == RefreshState::Refreshing {
            inner.waiting.clear();
        }
        inner.state = RefreshState::Idle;
    }
}

fn normalize_path(path: &str) -> &str {
    path.split('?').next().unwrap_or(path).trim_matches('/')
}

fn describe_body(body: &serde_json::Value) -> String {
    match body {
        serde_json::Value::Null => "refresh rejected".to_string(),
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        other => other.to_string(),
    }
}
