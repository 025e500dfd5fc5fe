//! Scripted IRC server for integration tests.
//!
//! Binds an ephemeral TCP listener, accepts the bot's connection, and lets
//! the test read and write raw wire lines with timeouts.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// An in-process server endpoint the bot connects to.
pub struct TestServer {
    listener: TcpListener,
    /// The `host:port` the bot should be built with.
    pub addr: String,
}

impl TestServer {
    /// Bind on an ephemeral localhost port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind test server")?;
        let addr = listener.local_addr()?.to_string();
        Ok(Self { listener, addr })
    }

    /// Accept the next client connection.
    pub async fn accept(&self) -> anyhow::Result<ServerConn> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .context("timed out waiting for the bot to connect")??;
        Ok(ServerConn::new(stream))
    }
}

/// The server side of one bot connection.
pub struct ServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ServerConn {
    fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Send one wire line, appending CR LF.
    pub async fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Receive one line (without CR LF); `None` on EOF or timeout.
    pub async fn recv_line(&mut self) -> Option<String> {
        self.recv_line_timeout(Duration::from_secs(5)).await
    }

    /// Receive one line with a custom timeout.
    pub async fn recv_line_timeout(&mut self, dur: Duration) -> Option<String> {
        let mut line = String::new();
        match timeout(dur, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(_)) => Some(line.trim_end().to_string()),
            Ok(Err(_)) => None,
            Err(_) => None,
        }
    }

    /// Receive lines until `pred` matches; returns everything received,
    /// match included.
    pub async fn recv_until<F>(&mut self, pred: F) -> anyhow::Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let mut lines = Vec::new();
        loop {
            let Some(line) = self.recv_line().await else {
                bail!("connection ended while waiting; got {lines:?}");
            };
            let done = pred(&line);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Assert the next line equals `want`.
    pub async fn expect_line(&mut self, want: &str) {
        assert_eq!(self.recv_line().await.as_deref(), Some(want));
    }
}

/// Read the standard registration burst, which ends with `NICK`.
pub async fn drain_registration(conn: &mut ServerConn) -> anyhow::Result<Vec<String>> {
    conn.recv_until(|l| l.starts_with("NICK")).await
}

/// Await a bot runner task, bounding the wait.
pub async fn finish(runner: JoinHandle<slirc_bot::Result<bool>>) -> anyhow::Result<bool> {
    let hijacked = timeout(Duration::from_secs(5), runner)
        .await
        .context("bot run did not return in time")??;
    Ok(hijacked?)
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
