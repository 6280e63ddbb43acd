//! Shared helpers for integration tests: local TCP servers and event waits.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use sockprobe::api::state::AppState;
use sockprobe::config::SockprobeConfig;
use sockprobe::notify::Notification;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn test_state() -> AppState {
    sockprobe::app_state(&SockprobeConfig::default())
}

/// Accept connections forever and echo every byte back.
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind echo server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Accept connections forever and forward every received chunk.
pub async fn spawn_recording_server() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind recording server");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

/// Next notification, failing the test if none arrives in time.
pub async fn next_event(rx: &mut broadcast::Receiver<Notification>) -> Notification {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

/// Skip notifications until one matches `pred`.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<Notification>, mut pred: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

/// True if no notification arrives within `window`.
pub async fn quiet_for(rx: &mut broadcast::Receiver<Notification>, window: Duration) -> bool {
    tokio::time::timeout(window, rx.recv()).await.is_err()
}
