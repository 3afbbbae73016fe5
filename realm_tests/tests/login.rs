use realm_shared::{config::ServerConfig, net::outbound};
use realm_tests::{fast_config, init_tracing, spawn_server, TestClient};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_then_world_view() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let (mut client, reply) = TestClient::login(addr, "alice").await?;
    assert_eq!(reply.code, 2);
    assert_eq!(reply.rights, 0);

    let welcome = client.wait_for(outbound::CHATBOX_MESSAGE).await?;
    assert_eq!(welcome.text(), "Welcome to the realm.");
    let region = client.wait_for(outbound::CONSTRUCT_REGION).await?;
    // segment 400 at the default spawn: short-A then plain short
    assert_eq!(&region.payload[..], &[0x01, 0x10, 0x01, 0x90]);
    client.wait_for(outbound::PLAYER_UPDATE).await?;
    client.wait_for(outbound::MOB_UPDATE).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_login_with_same_name_is_refused() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let (_first, reply) = TestClient::login(addr, "alice").await?;
    assert_eq!(reply.code, 2);
    let (_second, reply) = TestClient::login(addr, "Alice").await?;
    assert_eq!(reply.code, 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_world_is_refused() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(ServerConfig {
        max_players: 1,
        ..fast_config()
    })
    .await?;

    let (_first, reply) = TestClient::login(addr, "alice").await?;
    assert_eq!(reply.code, 2);
    let (_second, reply) = TestClient::login(addr, "bob").await?;
    assert_eq!(reply.code, 7);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_service_is_dropped() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let mut client = TestClient::connect(addr).await?;
    client.write(&[15]).await?;
    assert!(client.is_closed().await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_client_release_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let mut client = TestClient::connect(addr).await?;
    client.write(&[14, 0]).await?;
    let mut block = vec![255, 0x01, 0x3C, 0];
    block.extend_from_slice(&[0; 36]);
    block.extend_from_slice(&[0; 8]);
    let mut frame = vec![16, block.len() as u8];
    frame.extend_from_slice(&block);
    client.write(&frame).await?;

    let handshake = client.read_bytes(17).await?;
    assert_eq!(handshake.len(), 17);
    let response = client.read_bytes(3).await?;
    assert_eq!(response[0], 11);
    assert!(client.is_closed().await?);
    Ok(())
}
