//! Message handlers and the trigger adaptor.
//!
//! Every incoming message is dispatched to every registered handler in its
//! own task; a slow handler never holds up the reader or the other handlers.
//! Handlers must treat the message as read-only.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::bot::Bot;
use crate::message::Message;

/// Something that reacts to incoming messages.
///
/// Implement this directly for stateful handlers, or use [`Trigger`] for the
/// common condition-plus-action case.
#[async_trait]
pub trait Handler: Send + Sync {
    /// React to one message. Called concurrently with other handlers.
    async fn handle(&self, bot: &Bot, msg: &Message);
}

/// Predicate deciding whether a trigger fires for a message.
pub type Condition = Box<dyn Fn(&Bot, &Message) -> bool + Send + Sync>;

/// Effect run when a trigger's condition holds.
pub type Action = Box<dyn for<'a> Fn(&'a Bot, &'a Message) -> BoxFuture<'a, ()> + Send + Sync>;

/// A [`Handler`] guarded by a condition.
///
/// ```no_run
/// use futures_util::future::BoxFuture;
/// use slirc_bot::{Bot, Message, Trigger};
///
/// fn echo<'a>(bot: &'a Bot, msg: &'a Message) -> BoxFuture<'a, ()> {
///     Box::pin(async move {
///         bot.reply(msg, &msg.content).await;
///     })
/// }
///
/// let trigger = Trigger::new(|_, m| m.command == "PRIVMSG", echo);
/// ```
pub struct Trigger {
    /// Returns true when this trigger applies to the message.
    pub condition: Condition,
    /// The action to perform when the condition holds.
    pub action: Action,
}

impl Trigger {
    /// Build a trigger from a condition and an action.
    pub fn new<C, A>(condition: C, action: A) -> Self
    where
        C: Fn(&Bot, &Message) -> bool + Send + Sync + 'static,
        A: for<'a> Fn(&'a Bot, &'a Message) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        Self {
            condition: Box::new(condition),
            action: Box::new(action),
        }
    }
}

#[async_trait]
impl Handler for Trigger {
    async fn handle(&self, bot: &Bot, msg: &Message) {
        if (self.condition)(bot, msg) {
            (self.action)(bot, msg).await;
        }
    }
}
