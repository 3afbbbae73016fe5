//! A minimal socket client for driving a running server from tests.
//!
//! Speaks the login exchange and frames game messages without any
//! obfuscation, matching a server built with the passthrough keystream.

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use bytes::{Buf, Bytes, BytesMut};
use realm_server::GameServer;
use realm_shared::{
    config::ServerConfig,
    login::{LoginCredentials, CACHE_ARCHIVES, SERVICE_LOGIN},
    net::{frame_size, outbound, FrameSize},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

/// Longest a test waits on the server for anything.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// One server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Chatbox text, without the terminator.
    pub fn text(&self) -> String {
        let body = self.payload.strip_suffix(b"\n").unwrap_or(&self.payload[..]);
        String::from_utf8_lossy(body).into_owned()
    }
}

#[derive(Debug, Clone, Copy)]
enum Header {
    Fixed(usize),
    Byte,
    Short,
}

/// Sizes of the frames this server sends.
fn outbound_header(opcode: u8) -> Option<Header> {
    Some(match opcode {
        outbound::PLAYER_UPDATE
        | outbound::MOB_UPDATE
        | outbound::ITEM_INTERFACE
        | outbound::INTERFACE_TEXT => Header::Short,
        outbound::CHATBOX_MESSAGE => Header::Byte,
        outbound::CONSTRUCT_REGION => Header::Fixed(4),
        outbound::RUN_ENERGY => Header::Fixed(1),
        outbound::CLIENT_CONFIG | outbound::SIDEBAR_WIDGET | outbound::LOGIN_DETAILS => {
            Header::Fixed(3)
        }
        outbound::SKILL | outbound::ITEM_ON_INTERFACE => Header::Fixed(6),
        outbound::LOGOUT => Header::Fixed(0),
        _ => return None,
    })
}

pub struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
}

/// What the server said to a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginReply {
    pub code: u8,
    pub rights: u8,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("connect")?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }

    /// Connects and logs in as `username`.
    pub async fn login(addr: SocketAddr, username: &str) -> anyhow::Result<(Self, LoginReply)> {
        let mut client = Self::connect(addr).await?;
        let reply = client.authenticate(username, "password").await?;
        Ok((client, reply))
    }

    /// Runs the whole login exchange on an open connection.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> anyhow::Result<LoginReply> {
        self.write(&[SERVICE_LOGIN, 0]).await?;
        let handshake = self.read_bytes(17).await?;
        if handshake[..9].iter().any(|&b| b != 0) {
            bail!("unexpected handshake {handshake:?}");
        }
        let server_key = u64::from_be_bytes(handshake[9..17].try_into()?);

        let credentials = LoginCredentials {
            username: username.to_string(),
            password: password.to_string(),
            uid: 0,
            client_key: 0x0123_4567_89AB_CDEF,
            server_key,
            low_memory: false,
            reconnecting: false,
            crcs: [0; CACHE_ARCHIVES],
        };
        let mut out = BytesMut::new();
        credentials.write_login(&mut out);
        self.write(&out).await?;

        let response = self.read_bytes(3).await?;
        Ok(LoginReply {
            code: response[0],
            rights: response[1],
        })
    }

    pub async fn write(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(bytes).await.context("write")
    }

    /// Sends one game message, adding the length byte where the opcode
    /// needs one.
    pub async fn send(&mut self, opcode: u8, payload: &[u8]) -> anyhow::Result<()> {
        let mut frame = vec![opcode];
        match frame_size(opcode) {
            FrameSize::Fixed(len) if len == payload.len() => {}
            FrameSize::Fixed(len) => bail!("opcode {opcode} takes {len} bytes, got {}", payload.len()),
            FrameSize::VariableByte => frame.push(u8::try_from(payload.len())?),
            FrameSize::Malformed => bail!("opcode {opcode} is never sent by clients"),
        }
        frame.extend_from_slice(payload);
        self.write(&frame).await
    }

    async fn fill(&mut self, want: usize) -> anyhow::Result<()> {
        while self.buf.len() < want {
            let read = timeout(DEFAULT_WAIT, self.stream.read_buf(&mut self.buf))
                .await
                .context("timed out waiting for the server")??;
            if read == 0 {
                bail!("server closed the connection");
            }
        }
        Ok(())
    }

    /// Reads exactly `n` raw bytes.
    pub async fn read_bytes(&mut self, n: usize) -> anyhow::Result<Bytes> {
        self.fill(n).await?;
        Ok(self.buf.split_to(n).freeze())
    }

    /// Reads the next frame.
    pub async fn next_frame(&mut self) -> anyhow::Result<Frame> {
        self.fill(1).await?;
        let opcode = self.buf[0];
        let Some(header) = outbound_header(opcode) else {
            bail!("unknown outbound opcode {opcode}");
        };
        let (skip, len) = match header {
            Header::Fixed(len) => (1, len),
            Header::Byte => {
                self.fill(2).await?;
                (2, self.buf[1] as usize)
            }
            Header::Short => {
                self.fill(3).await?;
                (3, u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize)
            }
        };
        self.fill(skip + len).await?;
        self.buf.advance(skip);
        let payload = self.buf.split_to(len).freeze();
        Ok(Frame { opcode, payload })
    }

    /// Skips frames until one with `opcode` arrives.
    pub async fn wait_for(&mut self, opcode: u8) -> anyhow::Result<Frame> {
        loop {
            let frame = self.next_frame().await?;
            if frame.opcode == opcode {
                return Ok(frame);
            }
        }
    }

    /// Waits for a chatbox line satisfying `matches`.
    pub async fn wait_for_message(&mut self, matches: impl Fn(&str) -> bool) -> anyhow::Result<String> {
        loop {
            let text = self.wait_for(outbound::CHATBOX_MESSAGE).await?.text();
            if matches(&text) {
                return Ok(text);
            }
        }
    }

    /// True once the server has closed the connection.
    pub async fn is_closed(&mut self) -> anyhow::Result<bool> {
        loop {
            let read = timeout(DEFAULT_WAIT, self.stream.read_buf(&mut self.buf))
                .await
                .context("timed out waiting for close")??;
            if read == 0 {
                return Ok(true);
            }
            self.buf.clear();
        }
    }
}

/// Starts a server on an ephemeral localhost port, ticking every
/// `tick_ms` in the background. It lives as long as the test runtime.
pub async fn spawn_server(cfg: ServerConfig) -> anyhow::Result<SocketAddr> {
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..cfg
    };
    let mut server = GameServer::new(cfg).await?;
    let addr = server.local_addr();
    tokio::spawn(async move { server.run().await });
    Ok(addr)
}

/// Server config with a fast tick for tests.
pub fn fast_config() -> ServerConfig {
    ServerConfig {
        tick_ms: 20,
        ..ServerConfig::default()
    }
}

/// Installs a test log writer once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}
