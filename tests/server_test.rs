//! End-to-end tests against a running server on loopback

mod common;

use common::socks5_mock::*;
use common::*;
use socksd::config::ServerConfig;
use socksd::server::Server;
use socksd::SocksdError;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn assert_echo(client: &mut TcpStream, payload: &[u8]) {
    client.write_all(payload).await.unwrap();
    let echoed = tokio::time::timeout(TIMEOUT, read_n(client, payload.len()))
        .await
        .unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn test_no_auth_connect_ipv4_relays() {
    let echo = start_echo_server().await;
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = connect_no_auth(server.addr).await;
    client.write_all(&create_connect(echo)).await.unwrap();

    let reply = read_reply(&mut client).await;
    assert_eq!(&reply[..3], &[0x05, 0x00, 0x00]);
    assert_eq!(reply[3], 0x01);
    // Bound address is the proxy's outbound socket on loopback
    assert_eq!(&reply[4..8], &[127, 0, 0, 1]);
    assert_ne!(u16::from_be_bytes([reply[8], reply[9]]), 0);

    assert_echo(&mut client, b"GET / HTTP/1.0\r\n\r\n").await;
}

#[tokio::test]
async fn test_connect_ipv6() {
    let Some(echo) = start_echo_server_v6().await else {
        return;
    };
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = connect_no_auth(server.addr).await;
    client.write_all(&create_connect(echo)).await.unwrap();

    let reply = read_reply(&mut client).await;
    assert_eq!(reply[1], 0x00);
    assert_eq!(reply[3], 0x04);

    assert_echo(&mut client, b"over ipv6").await;
}

#[tokio::test]
async fn test_connect_domain() {
    let echo = start_echo_server().await;
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = connect_no_auth(server.addr).await;
    client
        .write_all(&create_connect_domain("localhost", echo.port()))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client).await[1], 0x00);
    assert_echo(&mut client, b"by name").await;
}

#[tokio::test]
async fn test_password_auth_success() {
    let echo = start_echo_server().await;
    let config = TestConfigBuilder::new().credentials("alice", "s3cret").build();
    let server = start_test_server(config).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client
        .write_all(&create_auth_request_password())
        .await
        .unwrap();
    assert_eq!(read_n(&mut client, 2).await, vec![0x05, 0x02]);

    client
        .write_all(&create_password_auth("alice", "s3cret"))
        .await
        .unwrap();
    assert_eq!(read_n(&mut client, 2).await, vec![0x01, 0x00]);

    client.write_all(&create_connect(echo)).await.unwrap();
    assert_eq!(read_reply(&mut client).await[1], 0x00);
    assert_echo(&mut client, b"authenticated").await;
}

#[tokio::test]
async fn test_password_auth_failure_closes_without_relay() {
    let echo = start_echo_server().await;
    let config = TestConfigBuilder::new().credentials("alice", "s3cret").build();
    let server = start_test_server(config).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client
        .write_all(&create_auth_request_password())
        .await
        .unwrap();
    assert_eq!(read_n(&mut client, 2).await, vec![0x05, 0x02]);

    client
        .write_all(&create_password_auth("alice", "wrong"))
        .await
        .unwrap();

    let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(rest, vec![0x01, 0x01]);

    // A request sent after the failure goes nowhere
    let _ = client.write_all(&create_connect(echo)).await;
    let after = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_no_acceptable_method() {
    let config = TestConfigBuilder::new().credentials("alice", "s3cret").build();
    let server = start_test_server(config).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client
        .write_all(&create_auth_request_no_auth())
        .await
        .unwrap();

    let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(rest, vec![0x05, 0xFF]);
}

#[tokio::test]
async fn test_no_auth_server_rejects_password_only_client() {
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client
        .write_all(&create_auth_request_password())
        .await
        .unwrap();

    let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(rest, vec![0x05, 0xFF]);
}

#[tokio::test]
async fn test_connection_refused_reply() {
    let target = closed_port_addr().await;
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = connect_no_auth(server.addr).await;
    client.write_all(&create_connect(target)).await.unwrap();

    let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(rest, vec![0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn test_bind_and_udp_associate_not_supported() {
    let server = start_test_server(TestConfigBuilder::new().build()).await;
    let target = "127.0.0.1:80".parse().unwrap();

    for command in [0x02, 0x03] {
        let mut client = connect_no_auth(server.addr).await;
        client
            .write_all(&create_request(command, target))
            .await
            .unwrap();

        let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
            .await
            .unwrap();
        assert_eq!(rest, vec![0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    }
}

#[tokio::test]
async fn test_wrong_version_closed_without_reply() {
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

    let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_destination_close_reaches_client() {
    let (listener, target) = create_test_listener().await;
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut client = connect_no_auth(server.addr).await;
    client.write_all(&create_connect(target)).await.unwrap();

    let (mut dest, _) = listener.accept().await.unwrap();
    assert_eq!(read_reply(&mut client).await[1], 0x00);

    dest.write_all(b"last words").await.unwrap();
    drop(dest);

    let received = tokio::time::timeout(TIMEOUT, read_until_close(&mut client))
        .await
        .unwrap();
    assert_eq!(received, b"last words");
}

#[tokio::test]
async fn test_handshake_timeout_closes_idle_client() {
    let config = TestConfigBuilder::new().handshake_timeout(1).build();
    let server = start_test_server(config).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();

    let rest = tokio::time::timeout(Duration::from_secs(3), read_until_close(&mut client))
        .await
        .expect("server should close an idle client");
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_bind_error_when_port_in_use() {
    let (_occupied, addr) = create_test_listener().await;
    let config = ServerConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: addr.port(),
        ..Default::default()
    };

    let err = Server::bind(&config).await.err().unwrap();
    assert!(matches!(err, SocksdError::Bind { .. }));
    assert_eq!(err.bind_reason(), Some("address in use"));
}

#[tokio::test]
async fn test_graceful_shutdown_lets_sessions_finish() {
    let echo = start_echo_server().await;
    let config = TestConfigBuilder::new().shutdown_grace_period(5).build();
    let server = start_test_server(config).await;

    let mut client = connect_no_auth(server.addr).await;
    client.write_all(&create_connect(echo)).await.unwrap();
    assert_eq!(read_reply(&mut client).await[1], 0x00);

    server.shutdown.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // New connections are refused, the open tunnel still works
    assert!(TcpStream::connect(server.addr).await.is_err());
    assert_echo(&mut client, b"still here").await;

    drop(client);
    tokio::time::timeout(TIMEOUT, server.task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_max_connections_rejects_excess() {
    let config = TestConfigBuilder::new().max_connections(1).build();
    let server = start_test_server(config).await;

    // Holds the only slot
    let _first = connect_no_auth(server.addr).await;

    let mut second = TcpStream::connect(server.addr).await.unwrap();
    let _ = second.write_all(&create_auth_request_no_auth()).await;
    let rest = tokio::time::timeout(TIMEOUT, read_until_close(&mut second))
        .await
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let echo = start_echo_server().await;
    let server = start_test_server(TestConfigBuilder::new().build()).await;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let server_addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = connect_no_auth(server_addr).await;
            client.write_all(&create_connect(echo)).await.unwrap();
            assert_eq!(read_reply(&mut client).await[1], 0x00);
            let payload = vec![i; 4096];
            assert_echo(&mut client, &payload).await;
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}
