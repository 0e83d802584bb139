//! IRC session: registration, keepalive, channel joins, and the reconnect loop.

use crate::codec::{Command, LineBuffer, ProtocolEvent};
use crate::reconnect::{ReconnectPolicy, Sleeper, TokioSleeper};
use crate::traits::{ChannelError, ChannelResult, Connection, Connector, MessageHandler};
use parley_common::IrcConfig;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;

/// Where the session is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// NICK/USER sent, waiting for the welcome numeric.
    Registering,
    Joining,
    /// Joined; channel messages are dispatched.
    Active,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Registering => "registering",
            Self::Joining => "joining",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long-running IRC client session.
///
/// Owns the connection for its whole lifetime. A lost connection resets the
/// state to [`SessionState::Disconnected`] and the session reconnects after
/// the policy's delay, replaying registration and joins.
pub struct Session<C, H, S = TokioSleeper> {
    config: IrcConfig,
    connector: C,
    handler: H,
    policy: ReconnectPolicy,
    sleeper: S,
    state: SessionState,
    attempts: u32,
}

impl<C: Connector, H: MessageHandler> Session<C, H> {
    pub fn new(config: IrcConfig, connector: C, handler: H, policy: ReconnectPolicy) -> Self {
        Self {
            config,
            connector,
            handler,
            policy,
            sleeper: TokioSleeper,
            state: SessionState::Disconnected,
            attempts: 0,
        }
    }
}

impl<C: Connector, H: MessageHandler, S: Sleeper> Session<C, H, S> {
    /// Replace the sleeper used between reconnect attempts.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Session<C, H, T> {
        Session {
            config: self.config,
            connector: self.connector,
            handler: self.handler,
            policy: self.policy,
            sleeper,
            state: self.state,
            attempts: self.attempts,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consecutive connection failures since the session was last active.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Connect, serve, and reconnect forever.
    pub async fn run(&mut self) {
        loop {
            let error = self.connect_and_serve().await;
            self.state = SessionState::Disconnected;
            self.attempts = self.attempts.saturating_add(1);

            let delay = self.policy.next_delay();
            tracing::warn!(
                endpoint = %self.connector.endpoint(),
                attempt = self.attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "IRC connection ended, reconnecting"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    /// Run until `shutdown` completes, then drop the connection.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            () = self.run() => {}
            () = shutdown => {
                tracing::info!("Shutdown requested, closing IRC session");
            }
        }
        self.state = SessionState::Disconnected;
    }

    /// One connection lifecycle. Only returns once the connection is gone.
    pub async fn connect_and_serve(&mut self) -> ChannelError {
        self.state = SessionState::Connecting;
        tracing::info!(endpoint = %self.connector.endpoint(), "Connecting to IRC server");

        let mut connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => return e,
        };

        match self.serve(&mut *connection).await {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    async fn serve(&mut self, connection: &mut dyn Connection) -> ChannelResult<Infallible> {
        self.state = SessionState::Registering;
        self.register(connection).await?;

        let mut buffer = LineBuffer::new();
        loop {
            let bytes = connection.receive().await?;
            for event in buffer.decode(&bytes) {
                self.handle_event(connection, event).await?;
            }
        }
    }

    async fn register(&self, connection: &mut dyn Connection) -> ChannelResult<()> {
        if let Some(password) = self
            .config
            .server_password
            .as_deref()
            .filter(|p| !p.is_empty())
        {
            send(connection, &Command::Pass(password.to_string())).await?;
        }
        send(connection, &Command::Nick(self.config.nickname.clone())).await?;
        send(
            connection,
            &Command::User {
                ident: self.config.ident.clone(),
                realname: self.config.realname.clone(),
            },
        )
        .await
    }

    async fn join_channels(&mut self, connection: &mut dyn Connection) -> ChannelResult<()> {
        self.state = SessionState::Joining;

        let channels: Vec<String> = self
            .config
            .channels
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        for channel in &channels {
            send(connection, &Command::Join(channel.clone())).await?;
        }

        self.state = SessionState::Active;
        self.attempts = 0;
        tracing::info!(
            nickname = %self.config.nickname,
            channels = ?channels,
            "IRC session active"
        );
        Ok(())
    }

    async fn handle_event(
        &mut self,
        connection: &mut dyn Connection,
        event: ProtocolEvent,
    ) -> ChannelResult<()> {
        match event {
            ProtocolEvent::Keepalive(token) => send(connection, &Command::Pong(token)).await,
            ProtocolEvent::RegistrationComplete => {
                if self.state == SessionState::Registering {
                    self.join_channels(connection).await
                } else {
                    tracing::debug!(state = %self.state, "Ignoring repeated welcome");
                    Ok(())
                }
            }
            ProtocolEvent::ChannelMessage(message) => {
                if self.state != SessionState::Active {
                    tracing::debug!(
                        state = %self.state,
                        sender = %message.sender,
                        "Ignoring message before channels are joined"
                    );
                    return Ok(());
                }

                match self.handler.handle(message).await {
                    Ok(Some(reply)) => {
                        for command in Command::privmsg_lines(&reply.target, &reply.text) {
                            send(connection, &command).await?;
                        }
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(e) if e.is_connection() => Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "Message handler failed");
                        Ok(())
                    }
                }
            }
            ProtocolEvent::Unrecognized(line) => {
                tracing::trace!(line = %line, "Unhandled IRC line");
                Ok(())
            }
        }
    }
}

async fn send(connection: &mut dyn Connection, command: &Command) -> ChannelResult<()> {
    tracing::debug!(command = command.name(), "Sending");
    connection.send(&command.to_bytes()).await
}
