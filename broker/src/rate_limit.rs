//! Inbound per-IP sliding-window limiter, per §6 `rate_limit_{enabled,requests,window_seconds}`.
//! A narrow global-state module in the same style as `metrics` (§9 "Global process state").

use crate::routes::AppState;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

static WINDOWS: Mutex<Option<HashMap<String, VecDeque<Instant>>>> = Mutex::new(None);

fn allow(key: &str, max_requests: usize, window: Duration) -> bool {
    let mut guard = WINDOWS.lock();
    let map = guard.get_or_insert_with(HashMap::new);
    let now = Instant::now();
    let entry = map.entry(key.to_string()).or_insert_with(VecDeque::new);
    while let Some(&oldest) = entry.front() {
        if now.duration_since(oldest) > window {
            entry.pop_front();
        } else {
            break;
        }
    }
    if entry.len() >= max_requests {
        false
    } else {
        entry.push_back(now);
        true
    }
}

pub async fn limit<B: Send + 'static>(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    let (enabled, max_requests, window) = {
        let settings = state.settings.read().await;
        (
            settings.rate_limit_enabled,
            settings.rate_limit_requests as usize,
            Duration::from_secs(settings.rate_limit_window_seconds),
        )
    };

    if enabled && !allow(&addr.ip().to_string(), max_requests, window) {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let key = "test-peer-a";
        for _ in 0..3 {
            assert!(allow(key, 3, Duration::from_secs(60)));
        }
        assert!(!allow(key, 3, Duration::from_secs(60)));
    }

    #[test]
    fn old_entries_fall_out_of_the_window() {
        let key = "test-peer-b";
        assert!(allow(key, 1, Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(allow(key, 1, Duration::from_millis(1)));
    }
}
