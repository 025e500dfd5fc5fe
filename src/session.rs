//! Session handoff between bot processes.
//!
//! A running instance listens on a local UNIX socket derived from its host
//! and nick. A successor process started with the same identity connects,
//! receives the live TCP descriptor as `SCM_RIGHTS` ancillary data, then
//! reads the current prefix and the negotiated capability map. The server
//! never sees a reconnect; the predecessor's `run` returns reporting the
//! handoff.
//!
//! On Linux the socket is an abstract-namespace socket `@<host>-<nick>/bot`;
//! other unixes fall back to `/tmp/<host>-<nick>-bot.sock`. Platforms
//! without UNIX sockets get stubs that report "no prior bot".

use std::collections::HashMap;

use crate::prefix::Prefix;

/// Session state received from a predecessor instance.
pub(crate) struct ResumedSession {
    /// The live TCP connection, still registered with the server.
    pub stream: std::net::TcpStream,
    /// The predecessor's view of our prefix.
    pub prefix: Prefix,
    /// The negotiated capability map.
    pub enabled: HashMap<String, bool>,
}

#[cfg(unix)]
pub(crate) use unix::{handoff_listener, hijack_session};

#[cfg(not(unix))]
pub(crate) use stub::{handoff_listener, hijack_session};

#[cfg(unix)]
mod unix {
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
    use std::os::unix::net::UnixStream as StdUnixStream;

    use tokio::net::UnixListener;
    use tokio::sync::watch;
    use tracing::{debug, error, info};

    use super::ResumedSession;
    use crate::bot::Bot;
    use crate::error::{BotError, Result};
    use crate::prefix::Prefix;

    /// Listen for a successor and hand the session over to it.
    ///
    /// Accepts exactly one connection. The listener is dropped right after
    /// the accept so the successor can bind the same address for its own
    /// lifetime. A bind failure leaves the session running un-hijackable.
    pub(crate) async fn handoff_listener(bot: Bot, mut close_rx: watch::Receiver<bool>) {
        let listener = match bind_listener(bot.host(), bot.nick()) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to bind session handoff socket");
                return;
            }
        };
        debug!("session handoff listener ready");

        let accepted = tokio::select! {
            _ = close_rx.changed() => return,
            res = listener.accept() => res,
        };
        drop(listener);

        let (stream, _addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                if !bot.is_closing() {
                    error!(error = %e, "session handoff accept failed");
                }
                return;
            }
        };

        match transfer_session(&bot, stream).await {
            Ok(()) => {
                info!("session handed off to successor");
                bot.mark_hijacked();
                bot.close();
            }
            Err(e) => error!(error = %e, "session handoff failed"),
        }
    }

    async fn transfer_session(bot: &Bot, stream: tokio::net::UnixStream) -> Result<()> {
        let fd = bot
            .conn_fd()
            .ok_or_else(|| BotError::Handoff("no transferable socket".into()))?;

        let prefix_line = bot.prefix().to_string();
        let cap_line = serde_json::to_string(&bot.cap_state().lock().await.snapshot())?;

        let stream = stream.into_std()?;
        stream.set_nonblocking(false)?;

        send_fd(&stream, fd)
            .map_err(|e| BotError::Handoff(format!("sending descriptor: {}", e)))?;

        let mut w = &stream;
        w.write_all(prefix_line.as_bytes())?;
        w.write_all(b"\n")?;
        w.write_all(cap_line.as_bytes())?;
        w.write_all(b"\n")?;
        Ok(())
    }

    /// Try to take over a previously running instance's session.
    ///
    /// A failed connect means there is no prior bot and the caller falls
    /// through to a normal connect. Failures after the connect succeeded
    /// are not recoverable.
    pub(crate) fn hijack_session(host: &str, nick: &str) -> Result<Option<ResumedSession>> {
        let stream = match connect_stream(host, nick) {
            Ok(s) => s,
            Err(e) => {
                info!(error = %e, "could not reestablish connection, no prior bot");
                return Ok(None);
            }
        };
        // Bound the exchange in case the predecessor dies mid-handoff.
        stream.set_read_timeout(Some(std::time::Duration::from_secs(5)))?;

        let fd = recv_fd(&stream)
            .map_err(|e| BotError::Handoff(format!("receiving descriptor: {}", e)))?;
        // The kernel duplicated the descriptor into this process; we own it.
        let tcp = unsafe { std::net::TcpStream::from_raw_fd(fd) };

        let mut reader = BufReader::new(&stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let prefix = Prefix::parse(line.trim_end());

        line.clear();
        reader.read_line(&mut line)?;
        let enabled: HashMap<String, bool> = serde_json::from_str(line.trim_end())?;

        Ok(Some(ResumedSession {
            stream: tcp,
            prefix,
            enabled,
        }))
    }

    #[cfg(target_os = "linux")]
    fn bind_listener(host: &str, nick: &str) -> std::io::Result<UnixListener> {
        use std::os::linux::net::SocketAddrExt;
        let addr =
            std::os::unix::net::SocketAddr::from_abstract_name(abstract_name(host, nick))?;
        let listener = std::os::unix::net::UnixListener::bind_addr(&addr)?;
        listener.set_nonblocking(true)?;
        UnixListener::from_std(listener)
    }

    #[cfg(target_os = "linux")]
    fn connect_stream(host: &str, nick: &str) -> std::io::Result<StdUnixStream> {
        use std::os::linux::net::SocketAddrExt;
        let addr =
            std::os::unix::net::SocketAddr::from_abstract_name(abstract_name(host, nick))?;
        StdUnixStream::connect_addr(&addr)
    }

    #[cfg(target_os = "linux")]
    fn abstract_name(host: &str, nick: &str) -> Vec<u8> {
        format!("{}-{}/bot", host, nick).into_bytes()
    }

    #[cfg(not(target_os = "linux"))]
    fn bind_listener(host: &str, nick: &str) -> std::io::Result<UnixListener> {
        let path = socket_path(host, nick);
        // Stale sockets from a crashed predecessor would fail the bind.
        let _ = std::fs::remove_file(&path);
        UnixListener::bind(path)
    }

    #[cfg(not(target_os = "linux"))]
    fn connect_stream(host: &str, nick: &str) -> std::io::Result<StdUnixStream> {
        StdUnixStream::connect(socket_path(host, nick))
    }

    #[cfg(not(target_os = "linux"))]
    fn socket_path(host: &str, nick: &str) -> String {
        format!("/tmp/{}-{}-bot.sock", host, nick)
    }

    /// Send one descriptor over a connected UNIX socket.
    ///
    /// The kernel duplicates the descriptor into the receiving process, so
    /// both processes hold independent references to the same open file
    /// description afterwards. Ancillary data needs at least one byte of
    /// ordinary payload; the receiver discards it.
    fn send_fd(stream: &StdUnixStream, fd: RawFd) -> std::io::Result<()> {
        let sock_fd = stream.as_raw_fd();
        let fd_size = std::mem::size_of::<libc::c_int>();
        let cmsg_space = unsafe { libc::CMSG_SPACE(fd_size as u32) } as usize;
        let mut cmsg_buf = vec![0u8; cmsg_space];
        let mut data = [1u8];

        let mut iov = libc::iovec {
            iov_base: data.as_mut_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        };
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_space as _;

        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN(fd_size as u32) as _;
            std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut libc::c_int, fd);
        }

        let n = unsafe { libc::sendmsg(sock_fd, &msg, 0) };
        if n < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Receive one descriptor from a connected UNIX socket.
    fn recv_fd(stream: &StdUnixStream) -> std::io::Result<RawFd> {
        let sock_fd = stream.as_raw_fd();
        let fd_size = std::mem::size_of::<libc::c_int>();
        let cmsg_space = unsafe { libc::CMSG_SPACE(fd_size as u32) } as usize;
        let mut cmsg_buf = vec![0u8; cmsg_space];
        let mut data = [0u8; 1];

        let mut iov = libc::iovec {
            iov_base: data.as_mut_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        };
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = cmsg_space as _;

        let n = unsafe { libc::recvmsg(sock_fd, &mut msg, 0) };
        if n < 0 {
            return Err(std::io::Error::last_os_error());
        }

        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET
                    && (*cmsg).cmsg_type == libc::SCM_RIGHTS
                {
                    let fd =
                        std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::c_int);
                    return Ok(fd);
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no descriptor in ancillary data",
        ))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        /// A descriptor passed through a socketpair refers to the same open
        /// file description on the receiving side.
        #[test]
        fn test_fd_round_trip_over_socketpair() {
            let (tx, rx) = StdUnixStream::pair().expect("socketpair");

            // Pass the read end of a pipe across.
            let mut pipefd = [0 as libc::c_int; 2];
            assert_eq!(unsafe { libc::pipe(pipefd.as_mut_ptr()) }, 0);
            let (pipe_read, pipe_write) = (pipefd[0], pipefd[1]);

            send_fd(&tx, pipe_read).expect("send_fd");
            let received = recv_fd(&rx).expect("recv_fd");
            assert!(received >= 0);

            // The sender's copy can go away without affecting the receiver.
            unsafe { libc::close(pipe_read) };

            let payload = b"through the wormhole";
            let written = unsafe {
                libc::write(
                    pipe_write,
                    payload.as_ptr() as *const libc::c_void,
                    payload.len(),
                )
            };
            assert_eq!(written as usize, payload.len());

            let mut buf = vec![0u8; payload.len()];
            let n = unsafe {
                libc::read(received, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            assert_eq!(n as usize, payload.len());
            assert_eq!(&buf, payload);

            unsafe {
                libc::close(received);
                libc::close(pipe_write);
            }
        }

        #[test]
        fn test_recv_without_fd_is_an_error() {
            use std::io::Write;
            let (mut tx, rx) = StdUnixStream::pair().expect("socketpair");
            tx.write_all(&[1u8]).unwrap();
            assert!(recv_fd(&rx).is_err());
        }
    }
}

#[cfg(not(unix))]
mod stub {
    use tokio::sync::watch;
    use tracing::info;

    use super::ResumedSession;
    use crate::bot::Bot;
    use crate::error::Result;

    pub(crate) async fn handoff_listener(_bot: Bot, _close_rx: watch::Receiver<bool>) {}

    pub(crate) fn hijack_session(_host: &str, _nick: &str) -> Result<Option<ResumedSession>> {
        info!("session handoff is not supported on this platform, no prior bot");
        Ok(None)
    }
}
