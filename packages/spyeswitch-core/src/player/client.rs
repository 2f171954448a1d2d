//! TCP transport for the Spyeworks control protocol.
//!
//! Every command runs over its own short-lived connection: connect, `LOGIN`,
//! write the command, optionally drain the reply, close. Nothing is pooled
//! and nothing is retried here; retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use super::protocol::{decode_response, split_lines};
use super::traits::PlayerTransport;
use super::{PlayerError, PlayerResult};
use crate::protocol_constants::{
    CONNECT_TIMEOUT, DEFAULT_DRAIN_QUIET, DRAIN_CHUNK_BYTES, LOGIN_OK_PREFIX,
    LOGIN_REPLY_MAX_BYTES, LOGIN_TOKEN,
};

/// Concrete [`PlayerTransport`] over `tokio::net::TcpStream`.
#[derive(Debug, Clone)]
pub struct PlayerClient {
    /// Silence that ends a response once data has started arriving.
    drain_quiet: Duration,
}

impl Default for PlayerClient {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_QUIET)
    }
}

impl PlayerClient {
    /// Creates a client with the given drain quiet window.
    ///
    /// The drain gives up entirely after twice this window.
    #[must_use]
    pub fn new(drain_quiet: Duration) -> Self {
        Self { drain_quiet }
    }

    /// Returns the configured drain quiet window.
    #[must_use]
    pub fn drain_quiet(&self) -> Duration {
        self.drain_quiet
    }

    /// Runs the handshake and command on an open stream.
    async fn exchange(
        &self,
        stream: &mut TcpStream,
        command: &str,
        read_response: bool,
    ) -> PlayerResult<Option<Vec<String>>> {
        login(stream).await?;

        if !command.is_empty() {
            stream
                .write_all(command.as_bytes())
                .await
                .map_err(|e| PlayerError::ConnectionFailed(format!("write failed: {e}")))?;
            log::debug!("[PlayerClient] Sent {:?}", command.trim_end());
        }

        if !read_response {
            return Ok(None);
        }

        let raw = self.drain(stream).await;
        let lines = split_lines(&decode_response(&raw));
        log::debug!(
            "[PlayerClient] Drained {} byte(s), {} line(s)",
            raw.len(),
            lines.len()
        );
        Ok(Some(lines))
    }

    /// Reads until the player goes quiet.
    ///
    /// Stops when data has arrived and nothing new came in for
    /// `drain_quiet`, when `2 * drain_quiet` has passed since the drain
    /// started, or when the player closes the connection.
    async fn drain(&self, stream: &mut TcpStream) -> Vec<u8> {
        let hard_stop = Instant::now() + self.drain_quiet * 2;
        let mut last_data: Option<Instant> = None;
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; DRAIN_CHUNK_BYTES];

        loop {
            let deadline = match last_data {
                Some(at) => (at + self.drain_quiet).min(hard_stop),
                None => hard_stop,
            };

            match timeout_at(deadline, stream.read(&mut chunk)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    log::debug!("[PlayerClient] Player closed connection during drain");
                    break;
                }
                Ok(Ok(n)) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    last_data = Some(Instant::now());
                }
                Ok(Err(e)) => {
                    log::debug!("[PlayerClient] Read error during drain: {}", e);
                    break;
                }
            }
        }

        buffer
    }
}

/// Sends `LOGIN` and checks the reply starts with `OK`.
async fn login(stream: &mut TcpStream) -> PlayerResult<()> {
    stream
        .write_all(LOGIN_TOKEN.as_bytes())
        .await
        .map_err(|e| PlayerError::ConnectionFailed(format!("login write failed: {e}")))?;

    let mut reply = [0u8; LOGIN_REPLY_MAX_BYTES];
    let n = timeout(CONNECT_TIMEOUT, stream.read(&mut reply))
        .await
        .map_err(|_| PlayerError::ConnectionFailed("timed out waiting for login reply".into()))?
        .map_err(|e| PlayerError::ConnectionFailed(format!("login read failed: {e}")))?;

    let reply = String::from_utf8_lossy(&reply[..n]);
    if reply.starts_with(LOGIN_OK_PREFIX) {
        Ok(())
    } else {
        Err(PlayerError::LoginRejected(reply.trim_end().to_string()))
    }
}

#[async_trait]
impl PlayerTransport for PlayerClient {
    async fn send_command(
        &self,
        address: &str,
        port: u16,
        command: &str,
        read_response: bool,
    ) -> PlayerResult<Option<Vec<String>>> {
        let start = std::time::Instant::now();

        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((address, port)))
            .await
            .map_err(|_| {
                PlayerError::ConnectionFailed(format!(
                    "connect to {address}:{port} timed out after {CONNECT_TIMEOUT:?}"
                ))
            })?
            .map_err(|e| PlayerError::ConnectionFailed(format!("{address}:{port}: {e}")))?;

        let result = self.exchange(&mut stream, command, read_response).await;

        // Close on every path once connected; drop covers the early returns above.
        if let Err(e) = stream.shutdown().await {
            log::trace!("[PlayerClient] Shutdown after exchange failed: {}", e);
        }

        log::debug!(
            "[PlayerClient] {:?} -> {}:{} completed in {:?}: {}",
            command.trim_end(),
            address,
            port,
            start.elapsed(),
            if result.is_ok() { "ok" } else { "error" }
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// What the fake player saw from the client.
    struct Received {
        login: String,
        command: Option<String>,
        /// True once the client closed its side.
        closed: bool,
    }

    /// Spawns a one-shot fake player.
    ///
    /// Replies `login_reply` to the handshake; if the reply starts with OK it
    /// reads one command line and then writes `chunks`, sleeping before each.
    async fn fake_player(
        login_reply: &'static str,
        chunks: Vec<(Duration, &'static [u8])>,
    ) -> (SocketAddr, JoinHandle<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut login = String::new();
            reader.read_line(&mut login).await.unwrap();
            write_half.write_all(login_reply.as_bytes()).await.unwrap();

            let mut command = None;
            if login_reply.starts_with("OK") {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() > 0 {
                    command = Some(line);
                }
                for (delay, bytes) in chunks {
                    tokio::time::sleep(delay).await;
                    if write_half.write_all(bytes).await.is_err() {
                        break;
                    }
                }
            }

            let mut rest = Vec::new();
            let closed = reader.read_to_end(&mut rest).await.is_ok();
            Received {
                login,
                command,
                closed,
            }
        });

        (addr, handle)
    }

    fn ip(addr: &SocketAddr) -> String {
        addr.ip().to_string()
    }

    #[tokio::test]
    async fn sends_command_after_accepted_login() {
        let (addr, player) = fake_player("OK\r\n", vec![]).await;
        let client = PlayerClient::new(Duration::from_millis(100));

        let result = client
            .send_command(&ip(&addr), addr.port(), "SPLc:/x/lobby.dml\r\n", false)
            .await;

        assert_eq!(result, Ok(None));
        let seen = player.await.unwrap();
        assert_eq!(seen.login, "LOGIN\r\n");
        assert_eq!(seen.command.as_deref(), Some("SPLc:/x/lobby.dml\r\n"));
        assert!(seen.closed, "client should close the socket");
    }

    #[tokio::test]
    async fn rejected_login_is_distinct_from_connection_failure() {
        let (addr, player) = fake_player("DENIED\r\n", vec![]).await;
        let client = PlayerClient::new(Duration::from_millis(100));

        let result = client
            .send_command(&ip(&addr), addr.port(), "SCP\r\n", true)
            .await;

        assert_eq!(result, Err(PlayerError::LoginRejected("DENIED".into())));
        let seen = player.await.unwrap();
        assert!(seen.command.is_none(), "no command after a refused login");
        assert!(seen.closed);
    }

    #[tokio::test]
    async fn refused_connection_reports_connection_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PlayerClient::default();
        let result = client
            .send_command(&ip(&addr), addr.port(), "SCP\r\n", true)
            .await;

        assert!(matches!(result, Err(PlayerError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn drain_collects_chunks_until_quiet() {
        let (addr, _player) = fake_player(
            "OK\r\n",
            vec![
                (Duration::ZERO, b"c:/x/active.dml20240101\r\n".as_slice()),
                (Duration::from_millis(20), b"c:/x/idle.dml20240101\r\n".as_slice()),
            ],
        )
        .await;
        let client = PlayerClient::new(Duration::from_millis(200));

        let lines = client
            .send_command(&ip(&addr), addr.port(), "DML\r\n", true)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            lines,
            vec![
                "c:/x/active.dml20240101".to_string(),
                "c:/x/idle.dml20240101".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn drain_gives_up_when_player_stays_silent() {
        let (addr, _player) = fake_player("OK\r\n", vec![]).await;
        let client = PlayerClient::new(Duration::from_millis(50));

        let start = std::time::Instant::now();
        let lines = client
            .send_command(&ip(&addr), addr.port(), "SCP\r\n", true)
            .await
            .unwrap()
            .unwrap();

        assert!(lines.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn drain_is_capped_even_while_data_trickles() {
        let trickle: Vec<(Duration, &'static [u8])> = (0..40)
            .map(|_| (Duration::from_millis(25), b"x".as_slice()))
            .collect();
        let (addr, _player) = fake_player("OK\r\n", trickle).await;
        let client = PlayerClient::new(Duration::from_millis(60));

        let start = std::time::Instant::now();
        let lines = client
            .send_command(&ip(&addr), addr.port(), "SCP\r\n", true)
            .await
            .unwrap()
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(600));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].len() < 40, "drain should stop before the trickle ends");
    }

    #[tokio::test]
    async fn empty_login_reply_is_a_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let client = PlayerClient::default();
        let result = client
            .send_command(&ip(&addr), addr.port(), "SCP\r\n", true)
            .await;

        assert!(matches!(
            result,
            Err(PlayerError::LoginRejected(_)) | Err(PlayerError::ConnectionFailed(_))
        ));
    }
}
