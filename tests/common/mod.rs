#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use url::Url;

use roomhost::devserver::{create_router, DevState};
use roomhost::RoomApiClient;

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

pub async fn spawn_dev_server() -> (Url, DevState) {
    let state = DevState::new(8);
    let base = serve(create_router(state.clone())).await;
    (base, state)
}

pub fn client(base: Url) -> RoomApiClient {
    RoomApiClient::with_base(base, Duration::from_secs(5)).unwrap()
}
