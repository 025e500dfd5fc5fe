//! # slirc-bot
//!
//! An IRCv3-enabled framework for writing IRC bots.
//!
//! ## Features
//!
//! - Full-duplex connection engine with outgoing throttling and an idle
//!   deadline, over plain TCP or TLS
//! - Concurrent handler dispatch: every message is fanned out to every
//!   registered handler in its own task
//! - IRCv3 capability negotiation with optional SASL PLAIN authentication
//! - UTF-8-safe splitting of outgoing text into protocol-sized lines, with
//!   optional reply rate limiting
//! - Session hijacking: a restarted bot takes over the live TCP connection
//!   from its predecessor through a local UNIX socket, invisible to the
//!   server
//!
//! ## Quick Start
//!
//! ```no_run
//! use futures_util::future::BoxFuture;
//! use slirc_bot::{Bot, Message, Trigger};
//!
//! fn hello<'a>(bot: &'a Bot, msg: &'a Message) -> BoxFuture<'a, ()> {
//!     Box::pin(async move {
//!         bot.reply(msg, "hello yourself").await;
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> slirc_bot::Result<()> {
//!     let bot = Bot::builder("irc.libera.chat:6667", "mybot")
//!         .channels(["#mybot-test"])
//!         .build();
//!
//!     bot.add_trigger(Trigger::new(
//!         |_, m| m.command == "PRIVMSG" && m.content == "!hello",
//!         hello,
//!     ));
//!
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod bot;
pub mod caps;
mod codec;
mod commands;
mod conn;
pub mod error;
pub mod handler;
mod limiter;
pub mod message;
pub mod prefix;
mod sasl;
mod session;
mod text;
mod triggers;

pub use self::bot::{Bot, BotBuilder, HijackAfterFn};
pub use self::caps::ALLOWED_CAPS;
pub use self::conn::DialFn;
pub use self::error::{BotError, Result};
pub use self::handler::{Action, Condition, Handler, Trigger};
pub use self::message::Message;
pub use self::prefix::Prefix;
