#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aman_dashboard::{AmanClient, ClientStorage, Config, Role, Session, SessionEvent, User};
use axum::Router;
use tokio::sync::broadcast;

pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve stub");
    });
    addr
}

/// An address nothing is listening on.
pub async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    listener.local_addr().expect("local addr")
}

pub fn config_for(addr: SocketAddr, session_db: &Path) -> Config {
    Config {
        api_url: format!("http://{addr}"),
        timeout_secs: 5,
        session_db: session_db.to_path_buf(),
        retry_attempts: 3,
        retry_base_ms: 1,
        ..Config::default()
    }
}

pub fn client_for(addr: SocketAddr, session_db: &Path) -> AmanClient {
    AmanClient::new(config_for(addr, session_db)).expect("build client")
}

pub fn operator() -> User {
    User {
        id: Some(1),
        username: "operator".into(),
        email: Some("ops@example.com".into()),
        role: Role::User,
    }
}

pub fn seed_session(session_db: &Path, token: &str) {
    let mut storage = ClientStorage::open(session_db).expect("open storage");
    storage
        .save_session(&Session {
            token: token.into(),
            user: operator(),
        })
        .expect("seed session");
}

pub fn stored_token(session_db: &Path) -> Option<String> {
    ClientStorage::open(session_db)
        .expect("open storage")
        .token()
        .expect("read token")
}

pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
