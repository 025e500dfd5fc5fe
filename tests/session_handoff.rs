//! Session handoff between two bot instances.
//!
//! Instance A holds a live connection; instance B starts with the same host
//! and nick, receives the TCP descriptor over the local handoff socket, and
//! carries on the session. The "server" never observes a reconnect.

#![cfg(target_os = "linux")]

mod common;

use std::time::Duration;

use slirc_bot::Bot;

use common::{drain_registration, finish, wait_until, TestServer};

#[tokio::test]
async fn session_survives_handoff_to_successor() -> anyhow::Result<()> {
    let server = TestServer::bind().await?;

    let bot_a = Bot::builder(&server.addr, "hb")
        .hijack_session()
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner_a = {
        let bot = bot_a.clone();
        tokio::spawn(async move { bot.run().await })
    };

    let mut conn = server.accept().await?;
    drain_registration(&mut conn).await?;

    // Give A a real prefix and a negotiated cap set to carry across.
    conn.send_line(":hb!bot@example.org JOIN #test").await?;
    wait_until("prefix capture", || {
        let bot = bot_a.clone();
        async move { bot.prefix().to_string() == "hb!bot@example.org" }
    })
    .await;

    conn.send_line(":srv CAP * LS :multi-prefix sasl").await?;
    let req = conn.recv_line().await.expect("CAP REQ");
    assert!(req.starts_with("CAP REQ :"));
    conn.send_line(":srv CAP * ACK :multi-prefix sasl").await?;
    conn.expect_line("CAP END").await;

    // Start the successor with the same identity.
    let bot_b = Bot::builder(&server.addr, "hb")
        .hijack_session()
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner_b = {
        let bot = bot_b.clone();
        tokio::spawn(async move { bot.run().await })
    };

    // The predecessor reports the handoff through its return value.
    assert!(finish(runner_a).await?);

    // The successor inherited prefix and capability map.
    wait_until("successor state restore", || {
        let bot = bot_b.clone();
        async move { bot.prefix().to_string() == "hb!bot@example.org" }
    })
    .await;
    assert_eq!(bot_b.cap_status("multi-prefix").await, (true, true));
    assert_eq!(bot_b.cap_status("sasl").await, (true, true));

    // Same TCP connection, now answered by B.
    conn.send_line("PING :still-alive").await?;
    conn.expect_line("PONG :still-alive").await;

    bot_b.close();
    assert!(!finish(runner_b).await?);
    Ok(())
}

#[tokio::test]
async fn hijack_without_predecessor_falls_through_to_connect() -> anyhow::Result<()> {
    let server = TestServer::bind().await?;
    let bot = Bot::builder(&server.addr, "lonely")
        .hijack_session()
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    // No prior instance exists, so the bot dials normally and registers.
    let mut conn = server.accept().await?;
    let registration = drain_registration(&mut conn).await?;
    assert_eq!(registration.last().map(String::as_str), Some("NICK lonely"));

    bot.close();
    assert!(!finish(runner).await?);
    Ok(())
}

#[tokio::test]
async fn hijack_over_tls_is_rejected_at_startup() {
    let bot = Bot::builder("irc.example.org:6697", "hb")
        .ssl()
        .hijack_session()
        .build();
    assert!(bot.run().await.is_err());
}
