//! Domain route sets.
//!
//! Each submodule contributes one [`RouteSet`]; [`all`] is the union the
//! node mounts at startup.

pub mod chat;
pub mod entity;
pub mod ping;
pub mod roll;
pub mod search;

use std::sync::Arc;

use tracing::debug;

use crate::history::{ChatHistory, RollHistory};
use crate::host::Host;
use crate::router::RouteSet;

/// What the handlers share: the host and the two histories.
#[derive(Clone)]
pub struct Services {
    /// Host capabilities.
    pub host: Arc<dyn Host>,
    /// Recent rolls.
    pub rolls: Arc<RollHistory>,
    /// Recent non-roll chat messages.
    pub chat: Arc<ChatHistory>,
}

impl Services {
    /// Bundle a host with empty histories of the given capacities.
    #[must_use]
    pub fn new(host: Arc<dyn Host>, max_rolls: usize, max_chat: usize) -> Self {
        Self {
            host,
            rolls: Arc::new(RollHistory::new(max_rolls)),
            chat: Arc::new(ChatHistory::new(max_chat)),
        }
    }

    /// Rebuild the roll history from the host chat log.
    pub fn refresh_rolls(&self) -> usize {
        let log = self.host.chat_log();
        self.rolls
            .replace_all(log.iter().filter_map(|message| message.to_roll_record()));
        let count = self.rolls.len();
        debug!(count, "roll history rebuilt from chat log");
        count
    }

    /// Rebuild the chat history from the host chat log.
    pub fn refresh_chat(&self) -> usize {
        let log = self.host.chat_log();
        self.chat.replace_all(
            log.iter()
                .filter(|message| !message.is_roll())
                .map(|message| message.to_chat_record()),
        );
        let count = self.chat.len();
        debug!(count, "chat history rebuilt from chat log");
        count
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("rolls", &self.rolls.len())
            .field("chat", &self.chat.len())
            .finish_non_exhaustive()
    }
}

/// Every route set, in mount order.
#[must_use]
pub fn all(services: &Services) -> Vec<RouteSet> {
    vec![
        ping::routes(),
        entity::routes(services),
        chat::routes(services),
        roll::routes(services),
        search::routes(services),
    ]
}
