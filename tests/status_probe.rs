//! End-to-end tests for the status probe against a local Server List Ping
//! responder.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use warden::probe::codec::{read_varint, write_string, write_varint};
use warden::probe::{ProbeError, ProbeStatus, ProbeTarget, ServerListPing, StatusProbe};

const TIMEOUT: Duration = Duration::from_secs(2);

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|err| panic!("bind: {err}"));
    let port = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("addr: {err}"))
        .port();
    (listener, port)
}

/// Answers one status exchange with `json`.
fn respond_with(listener: TcpListener, json: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut stream, _) = listener
            .accept()
            .await
            .unwrap_or_else(|err| panic!("accept: {err}"));
        for _ in 0..2 {
            let len = read_varint(&mut stream)
                .await
                .unwrap_or_else(|err| panic!("length: {err}"));
            let mut body = vec![0_u8; usize::try_from(len).unwrap_or_default()];
            stream
                .read_exact(&mut body)
                .await
                .unwrap_or_else(|err| panic!("body: {err}"));
        }

        let mut packet = Vec::new();
        write_varint(&mut packet, 0);
        write_string(&mut packet, json);
        let mut frame = Vec::new();
        write_varint(&mut frame, u32::try_from(packet.len()).unwrap_or(u32::MAX));
        frame.extend_from_slice(&packet);
        stream
            .write_all(&frame)
            .await
            .unwrap_or_else(|err| panic!("write: {err}"));
    })
}

fn probe_for(port: u16) -> ServerListPing {
    let target: ProbeTarget = format!("127.0.0.1:{port}")
        .parse()
        .unwrap_or_else(|err| panic!("target: {err}"));
    ServerListPing::new(Some(target))
}

#[tokio::test]
async fn answering_server_reports_players() {
    let (listener, port) = bind().await;
    let server = respond_with(
        listener,
        r#"{"version":{"name":"1.21.1","protocol":767},"players":{"online":3,"max":20},"description":"hi"}"#,
    );

    let status = probe_for(port)
        .probe(TIMEOUT)
        .await
        .unwrap_or_else(|err| panic!("probe: {err}"));

    assert_eq!(
        status,
        ProbeStatus {
            online: 3,
            max: 20,
            version: Some(String::from("1.21.1")),
        }
    );
    server.await.unwrap_or_else(|err| panic!("join: {err}"));
}

#[tokio::test]
async fn reply_without_players_is_a_protocol_error() {
    let (listener, port) = bind().await;
    let server = respond_with(listener, r#"{"version":{"name":"1.21.1"}}"#);

    let err = probe_for(port)
        .probe(TIMEOUT)
        .await
        .expect_err("reply without players should fail");

    assert!(matches!(err, ProbeError::Protocol { .. }), "{err:?}");
    server.await.unwrap_or_else(|err| panic!("join: {err}"));
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let (listener, port) = bind().await;
    drop(listener);

    let err = probe_for(port)
        .probe(TIMEOUT)
        .await
        .expect_err("closed port should fail");

    assert!(matches!(err, ProbeError::Unreachable { .. }), "{err:?}");
}

#[tokio::test]
async fn silent_server_times_out() {
    let (listener, port) = bind().await;
    let holder = tokio::spawn(async move {
        let accepted = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(accepted);
    });

    let err = probe_for(port)
        .probe(Duration::from_millis(200))
        .await
        .expect_err("silent server should time out");

    assert!(matches!(err, ProbeError::Timeout { .. }), "{err:?}");
    holder.abort();
}
