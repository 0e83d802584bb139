//! Parley IRC - keyword-triggered chat assistant for IRC.
//!
//! The session keeps one connection to an IRC server, answers keepalives,
//! joins the configured channels and hands channel traffic to the
//! dispatcher. Messages containing a trigger keyword are answered by the
//! chat-completion backend with the recent conversation as context, and
//! every exchange is appended to the persistent conversation memory.
//!
//! ## Architecture
//!
//! ```text
//! IRC server ⇄ Connector/Connection ⇄ Session ─→ Dispatcher ─→ Responder ─→ Provider
//!                                                    ↕
//!                                            ConversationMemory ⇄ HistoryStore
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod codec;
pub mod dispatcher;
pub mod memory;
pub mod message;
pub mod reconnect;
pub mod responder;
pub mod session;
pub mod traits;
pub mod transport;

// Re-export commonly used types
pub use codec::{Command, LineBuffer, ProtocolEvent};
pub use dispatcher::Dispatcher;
pub use memory::{ConversationMemory, HistoryStore, InMemoryStore, JsonFileStore, Role, Turn};
pub use message::{ChannelMessage, OutgoingMessage};
pub use reconnect::{ReconnectPolicy, Sleeper, TokioSleeper};
pub use responder::{LlmResponder, Responder, API_ERROR_REPLY, UNEXPECTED_ERROR_REPLY};
pub use session::{Session, SessionState};
pub use traits::{ChannelError, ChannelResult, Connection, Connector, MessageHandler};
pub use transport::{StreamConnection, TcpConnector};

use parley_common::config::Config;
use parley_provider::OpenAIProvider;

/// Wire everything from `config` and run until Ctrl-C.
pub async fn start(config: &Config) -> anyhow::Result<()> {
    let api_key = config.chat.api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("No API key configured, chat requests will be rejected");
    }

    let provider = OpenAIProvider::with_base_url(
        api_key,
        config.chat.base_url.clone(),
        config.chat.request_timeout(),
    );
    let responder = LlmResponder::new(provider, config.chat.clone());

    let store = JsonFileStore::new(config.memory.resolved_path());
    tracing::info!(path = %store.path().display(), "Using conversation memory file");
    let memory = ConversationMemory::load(store);

    let dispatcher = Dispatcher::new(&config.irc, config.memory.recall_depth, responder, memory);
    let connector = TcpConnector::from_config(&config.irc);
    let policy = ReconnectPolicy::from_config(&config.reconnect);

    let mut session = Session::new(config.irc.clone(), connector, dispatcher, policy);
    session
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Parley stopped");
    Ok(())
}
