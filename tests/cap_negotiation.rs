//! Capability negotiation and SASL over a scripted server.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use slirc_bot::Bot;

use common::{finish, TestServer};

#[tokio::test]
async fn sasl_plain_happy_path() -> anyhow::Result<()> {
    let server = TestServer::bind().await?;
    let bot = Bot::builder(&server.addr, "u")
        .sasl_auth("p")
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    let mut conn = server.accept().await?;
    // SASL registration goes CAP LS, NICK, USER.
    let registration = conn.recv_until(|l| l.starts_with("USER")).await?;
    assert_eq!(
        registration,
        vec![
            "CAP LS".to_string(),
            "NICK u".to_string(),
            "USER u 0 * :u".to_string(),
        ]
    );

    conn.send_line(":srv CAP * LS :sasl multi-prefix").await?;
    let req = conn.recv_line().await.expect("CAP REQ");
    let requested: HashSet<&str> = req
        .strip_prefix("CAP REQ :")
        .expect("CAP REQ line")
        .split(' ')
        .collect();
    assert_eq!(requested, HashSet::from(["sasl", "multi-prefix"]));

    conn.send_line(":srv CAP * ACK :sasl multi-prefix").await?;
    conn.expect_line("AUTHENTICATE PLAIN").await;

    conn.send_line("AUTHENTICATE +").await?;
    // base64 of "u\0u\0p"
    conn.expect_line("AUTHENTICATE dQB1AHA=").await;

    conn.send_line(":srv 903 u :SASL authentication successful")
        .await?;
    conn.expect_line("CAP END").await;

    assert_eq!(bot.cap_status("sasl").await, (true, true));
    assert_eq!(bot.cap_status("multi-prefix").await, (true, true));
    assert_eq!(bot.cap_status("batch").await, (false, false));

    bot.close();
    finish(runner).await?;
    Ok(())
}

#[tokio::test]
async fn sasl_failure_still_ends_negotiation() -> anyhow::Result<()> {
    let server = TestServer::bind().await?;
    let bot = Bot::builder(&server.addr, "u")
        .sasl_auth("wrong")
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    let mut conn = server.accept().await?;
    conn.recv_until(|l| l.starts_with("USER")).await?;

    conn.send_line(":srv CAP * LS :sasl").await?;
    conn.expect_line("CAP REQ :sasl").await;
    conn.send_line(":srv CAP * ACK :sasl").await?;
    conn.expect_line("AUTHENTICATE PLAIN").await;
    conn.send_line("AUTHENTICATE +").await?;
    let _ = conn.recv_line().await.expect("AUTHENTICATE payload");

    conn.send_line(":srv 904 u :SASL authentication failed")
        .await?;
    conn.expect_line("CAP END").await;

    bot.close();
    finish(runner).await?;
    Ok(())
}

#[tokio::test]
async fn sasl_unsupported_by_server_ends_without_auth() -> anyhow::Result<()> {
    let server = TestServer::bind().await?;
    let bot = Bot::builder(&server.addr, "u")
        .sasl_auth("p")
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    let mut conn = server.accept().await?;
    conn.recv_until(|l| l.starts_with("USER")).await?;

    // The server offers caps but no sasl.
    conn.send_line(":srv CAP * LS :multi-prefix").await?;
    conn.expect_line("CAP REQ :multi-prefix").await;
    conn.send_line(":srv CAP * ACK :multi-prefix").await?;
    // No AUTHENTICATE; negotiation closes immediately.
    conn.expect_line("CAP END").await;

    assert_eq!(bot.cap_status("sasl").await, (false, false));
    assert_eq!(bot.cap_status("multi-prefix").await, (true, true));

    bot.close();
    finish(runner).await?;
    Ok(())
}

#[tokio::test]
async fn caps_outside_the_allow_list_are_present_but_disabled() -> anyhow::Result<()> {
    let server = TestServer::bind().await?;
    let bot = Bot::builder(&server.addr, "kit")
        .throttle_delay(Duration::from_millis(1))
        .build();
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run().await })
    };

    let mut conn = server.accept().await?;
    conn.recv_until(|l| l.starts_with("NICK")).await?;

    conn.send_line(":srv CAP * LS :server-time batch echo-message")
        .await?;
    conn.expect_line("CAP REQ :server-time").await;
    conn.send_line(":srv CAP * ACK :server-time").await?;
    conn.expect_line("CAP END").await;

    assert_eq!(bot.cap_status("server-time").await, (true, true));
    assert_eq!(bot.cap_status("batch").await, (false, true));
    assert_eq!(bot.cap_status("echo-message").await, (false, true));

    bot.close();
    finish(runner).await?;
    Ok(())
}
