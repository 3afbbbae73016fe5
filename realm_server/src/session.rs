//! One client connection.
//!
//! A session walks the login negotiation, asks the world for a slot and then
//! shuttles bytes: inbound frames go onto the player's queue, framed
//! outbound packets come back from the world through the outbox channel.
//! Sessions never touch world state.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use bytes::BytesMut;
use realm_shared::{
    login::{LoginCredentials, LoginDecoder, LoginEvent, LoginResponse},
    net::{FrameDecoder, FrameError, KeystreamFactory, SessionId},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::world::{JoinReply, WorldHandle};

/// How long a client may take to finish logging in.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

const READ_BUFFER: usize = 1024;

/// Drives `stream` until the client or the world ends the session.
pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    world: WorldHandle,
    keystreams: Arc<dyn KeystreamFactory>,
) -> anyhow::Result<()> {
    let session = SessionId::new_unique();
    stream.set_nodelay(true).context("set nodelay")?;
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(READ_BUFFER);

    let login = tokio::time::timeout(LOGIN_TIMEOUT, negotiate(&mut reader, &mut writer, &mut buf));
    let credentials = match login.await {
        Ok(Ok(Some(credentials))) => credentials,
        Ok(Ok(None)) => {
            debug!(%session, %peer, "Client left during login");
            return Ok(());
        }
        Ok(Err(e)) => return Err(e).context("login negotiation"),
        Err(_) => {
            debug!(%session, %peer, "Login timed out");
            return Ok(());
        }
    };

    let decryption = keystreams.create(credentials.decryption_seeds());
    let encryption = keystreams.create(credentials.encryption_seeds());
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let reply = world
        .join(credentials.username.clone(), session, out_tx, in_rx, encryption)
        .await?;
    let (handle, rights) = match reply {
        JoinReply::Accepted { handle, rights } => (handle, rights),
        JoinReply::Rejected(response) => {
            writer.write_all(&response.encode(0)).await?;
            return Ok(());
        }
    };
    writer
        .write_all(&LoginResponse::Success.encode(rights))
        .await
        .context("write login response")?;
    info!(%session, %peer, player = %credentials.username, index = handle.index, "Logged in");

    let mut frames = FrameDecoder::new(decryption);
    let outcome: anyhow::Result<()> = async {
        loop {
            loop {
                match frames.decode(&mut buf) {
                    Ok(Some(message)) => {
                        if in_tx.send(message).is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(e.into()),
                }
            }

            tokio::select! {
                read = reader.read_buf(&mut buf) => {
                    if read.context("read")? == 0 {
                        drain_eof(&mut frames, &mut buf)?;
                        return Ok(());
                    }
                }
                frame = out_rx.recv() => match frame {
                    Some(bytes) => writer.write_all(&bytes).await.context("write")?,
                    // the world dropped the player
                    None => return Ok(()),
                },
            }
        }
    }
    .await;

    world.leave(handle);
    let _ = writer.shutdown().await;
    match outcome {
        Ok(()) => info!(%session, %peer, "Disconnected"),
        Err(e) => warn!(%session, %peer, error = %e, "Session closed with error"),
    }
    Ok(())
}

/// Runs the login exchange. `Ok(None)` means the client hung up.
async fn negotiate(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    buf: &mut BytesMut,
) -> anyhow::Result<Option<LoginCredentials>> {
    let mut decoder = LoginDecoder::new(rand::random());
    loop {
        match decoder.decode(buf) {
            Ok(Some(LoginEvent::Reply(bytes))) => writer.write_all(&bytes).await?,
            Ok(Some(LoginEvent::Credentials(credentials))) => return Ok(Some(credentials)),
            Ok(None) => {
                if reader.read_buf(buf).await? == 0 {
                    return Ok(None);
                }
            }
            Err(e) => {
                if let Some(response) = e.response() {
                    let _ = writer.write_all(&response.encode(0)).await;
                }
                return Err(e.into());
            }
        }
    }
}

/// Frames left in the buffer when the client closed. They arrive after the
/// player has already gone, so they are only checked, not delivered.
fn drain_eof(frames: &mut FrameDecoder, buf: &mut BytesMut) -> Result<(), FrameError> {
    while frames.decode_eof(buf)?.is_some() {}
    Ok(())
}
