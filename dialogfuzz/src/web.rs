//! Background HTTP status server. Grounded on `logannye-tinyzkp`'s
//! `tinyzkp_api.rs`: a small `axum` router spun up on its own `tokio`
//! runtime on a background OS thread, reading shared state through a
//! lock rather than message-passing, since the only traffic is
//! infrequent GETs against a snapshot that changes once per test case —
//! the one concurrent actor alongside the main fuzz loop.

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use dialogfuzz_common::stats::SessionSnapshot;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
struct AppState {
    snapshot: Arc<RwLock<SessionSnapshot>>,
}

async fn get_status(State(state): State<AppState>) -> Json<SessionSnapshot> {
    let snapshot = state.snapshot.read().expect("snapshot lock poisoned").clone();
    Json(snapshot)
}

/// Spawn the status server on a dedicated OS thread with its own
/// single-threaded Tokio runtime, returning immediately. The thread runs
/// until the process exits; there is no graceful shutdown handshake,
/// matching the fire-and-forget lifetime `sessions.py`'s
/// `build_webapp_thread` gives its Tornado server.
pub fn spawn(port: u16, snapshot: Arc<RwLock<SessionSnapshot>>) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("dialogfuzz-web".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build web status runtime");
            runtime.block_on(async move {
                let state = AppState { snapshot };
                let app = Router::new().route("/status", get(get_status)).with_state(state);
                let addr = SocketAddr::from(([0, 0, 0, 0], port));
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::error!(port, error = %e, "failed to bind web status server");
                        return;
                    }
                };
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "web status server exited with an error");
                }
            });
        })
        .expect("failed to spawn web status thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_clone_shares_the_same_lock() {
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::default()));
        let state = AppState { snapshot: Arc::clone(&snapshot) };
        let cloned = state.clone();
        snapshot.write().unwrap().total_mutant_index = 7;
        assert_eq!(cloned.snapshot.read().unwrap().total_mutant_index, 7);
    }
}
