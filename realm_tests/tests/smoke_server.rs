use realm_server::server::bind_ephemeral;
use realm_shared::net::{inbound, outbound};
use realm_tests::{fast_config, init_tracing, spawn_server, TestClient};
use tracing::info;

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let (mut server, _addr) = bind_ephemeral(5).await?;
    server.run_for_ticks(3).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn yell_reaches_other_players() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let (mut alice, reply) = TestClient::login(addr, "alice").await?;
    assert_eq!(reply.code, 2);
    let (mut bob, reply) = TestClient::login(addr, "bob").await?;
    assert_eq!(reply.code, 2);
    info!("both players logged in");

    // bob is in the world once his first update arrives
    bob.wait_for(outbound::PLAYER_UPDATE).await?;
    alice.send(inbound::COMMAND, b"yell hi there\n").await?;

    let heard = bob.wait_for_message(|text| text.contains("hi there")).await?;
    assert_eq!(heard, "Alice :  hi there");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_button_closes_connection() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let (mut alice, _) = TestClient::login(addr, "alice").await?;
    alice.wait_for(outbound::PLAYER_UPDATE).await?;
    alice.send(inbound::ACTION_BUTTON, &2458u16.to_be_bytes()).await?;
    alice.wait_for(outbound::LOGOUT).await?;
    assert!(alice.is_closed().await?);

    // the name is free again
    let (_again, reply) = TestClient::login(addr, "alice").await?;
    assert_eq!(reply.code, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_toggle_and_restore_command() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let (mut alice, _) = TestClient::login(addr, "alice").await?;
    let energy = alice.wait_for(outbound::RUN_ENERGY).await?;
    assert_eq!(&energy.payload[..], &[100]);

    alice.send(inbound::ACTION_BUTTON, &153u16.to_be_bytes()).await?;
    let config = alice.wait_for(outbound::CLIENT_CONFIG).await?;
    // LE short 173, state 1
    assert_eq!(&config.payload[..], &[173, 0, 1]);

    alice.send(inbound::COMMAND, b"restore\n").await?;
    alice
        .wait_for_message(|text| text == "Your run energy has been restored.")
        .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trained_player_wields_granite_maul() -> anyhow::Result<()> {
    init_tracing();
    let addr = spawn_server(fast_config()).await?;

    let (mut alice, _) = TestClient::login(addr, "alice").await?;
    alice.wait_for(outbound::PLAYER_UPDATE).await?;
    alice.send(inbound::COMMAND, b"add 4153 1\n").await?;
    alice.wait_for(outbound::ITEM_INTERFACE).await?;
    alice.send(inbound::COMMAND, b"exp 0 200000\n").await?;
    alice.send(inbound::COMMAND, b"exp 2 200000\n").await?;
    alice
        .wait_for_message(|text| text.starts_with("Congratulations! You have advanced a Strength level."))
        .await?;

    // item 4153, inventory slot 0 (short-A), inventory interface 3214 (short-A)
    alice
        .send(inbound::EQUIP_ITEM, &[0x10, 0x39, 0x00, 0x80, 0x0C, 0x0E])
        .await?;
    let name = alice.wait_for(outbound::INTERFACE_TEXT).await?;
    assert!(name.payload.starts_with(b"Granite maul\n"));
    let model = alice.wait_for(outbound::ITEM_ON_INTERFACE).await?;
    // LE 426, zoom 200, item 4153
    assert_eq!(&model.payload[..], &[0xAA, 0x01, 0x00, 0xC8, 0x10, 0x39]);
    Ok(())
}
