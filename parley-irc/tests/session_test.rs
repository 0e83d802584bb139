//! End-to-end tests for the IRC session.
//!
//! A scripted connector feeds server lines to the real session, dispatcher
//! and conversation memory, and records every line the bot writes.

use async_trait::async_trait;
use parley_common::{ChatCompletionConfig, IrcConfig};
use parley_irc::{
    ChannelError, ChannelResult, Connection, Connector, ConversationMemory, Dispatcher,
    InMemoryStore, LlmResponder, ReconnectPolicy, Responder, Session, SessionState, Sleeper,
    Turn, API_ERROR_REPLY,
};
use parley_provider::{ChatRequest, ChatResponse, Provider, ProviderError, ProviderErrorKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Fakes
// ============================================================================

/// Lines the bot wrote, tagged with the connection they went out on.
type SentLog = Arc<Mutex<Vec<(usize, String)>>>;

struct ScriptedConnection {
    id: usize,
    chunks: VecDeque<Vec<u8>>,
    sent: SentLog,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((self.id, String::from_utf8_lossy(bytes).into_owned()));
        Ok(())
    }

    async fn receive(&mut self) -> ChannelResult<Vec<u8>> {
        self.chunks
            .pop_front()
            .ok_or_else(|| ChannelError::ConnectionLost("server closed the connection".into()))
    }
}

/// Hands out one scripted connection per entry, then blocks forever.
struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<&'static str>>>,
    connects: Mutex<usize>,
    sent: SentLog,
    exhausted: Arc<Notify>,
}

impl ScriptedConnector {
    fn new(scripts: Vec<Vec<&'static str>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            connects: Mutex::new(0),
            sent: Arc::default(),
            exhausted: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn endpoint(&self) -> String {
        "irc://scripted:6667".into()
    }

    async fn connect(&self) -> ChannelResult<Box<dyn Connection>> {
        let script = self.scripts.lock().unwrap().pop_front();
        let Some(script) = script else {
            self.exhausted.notify_one();
            return std::future::pending().await;
        };

        let id = {
            let mut connects = self.connects.lock().unwrap();
            *connects += 1;
            *connects
        };
        Ok(Box::new(ScriptedConnection {
            id,
            chunks: script.into_iter().map(|s| s.as_bytes().to_vec()).collect(),
            sent: self.sent.clone(),
        }))
    }
}

#[derive(Clone, Default)]
struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

struct FixedResponder(&'static str);

#[async_trait]
impl Responder for FixedResponder {
    async fn respond(&self, _question: &str, _history: &[Turn]) -> String {
        self.0.to_string()
    }
}

struct TimingOutProvider;

#[async_trait]
impl Provider for TimingOutProvider {
    fn name(&self) -> &str {
        "timing-out"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError {
            provider: "timing-out".into(),
            model: request.model,
            kind: ProviderErrorKind::Timeout,
            message: "request timed out".into(),
            status_code: None,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn irc_config() -> IrcConfig {
    IrcConfig {
        server: "irc.example.net".into(),
        nickname: "parley".into(),
        ident: "parley".into(),
        realname: "Parley assistant".into(),
        channels: vec!["#chan".into()],
        keywords: vec!["bot".into(), "gpt".into(), "ai".into(), "assistant".into()],
        ..Default::default()
    }
}

/// Run a session over `scripts` until every scripted connection is used up.
async fn run_scripted<R: Responder>(
    config: IrcConfig,
    responder: R,
    scripts: Vec<Vec<&'static str>>,
) -> (
    Session<ScriptedConnector, Dispatcher<R, InMemoryStore>, RecordingSleeper>,
    SentLog,
    Vec<Duration>,
) {
    let connector = ScriptedConnector::new(scripts);
    let sent = connector.sent.clone();
    let exhausted = connector.exhausted.clone();

    let memory = ConversationMemory::load(InMemoryStore::new());
    let dispatcher = Dispatcher::new(&config, 10, responder, memory);
    let sleeper = RecordingSleeper::default();
    let delays = sleeper.delays.clone();

    let mut session = Session::new(config, connector, dispatcher, ReconnectPolicy::default())
        .with_sleeper(sleeper);

    tokio::time::timeout(
        Duration::from_secs(5),
        session.run_until(async move { exhausted.notified().await }),
    )
    .await
    .expect("session did not finish the script");

    let delays = delays.lock().unwrap().clone();
    (session, sent, delays)
}

fn lines(sent: &SentLog) -> Vec<String> {
    sent.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
}

fn lines_on(sent: &SentLog, connection: usize) -> Vec<String> {
    sent.lock()
        .unwrap()
        .iter()
        .filter(|(id, _)| *id == connection)
        .map(|(_, l)| l.clone())
        .collect()
}

const WELCOME: &str = ":irc.example.net 001 parley :Welcome to the network\r\n";

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_keepalive_is_answered_once_without_dispatch() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("unused"),
        vec![vec![WELCOME, "PING :irc.example.net\r\n"]],
    )
    .await;

    let pongs: Vec<String> = lines(&sent)
        .into_iter()
        .filter(|l| l.starts_with("PONG"))
        .collect();
    assert_eq!(pongs, vec!["PONG :irc.example.net\r\n"]);
    assert!(lines(&sent).iter().all(|l| !l.starts_with("PRIVMSG")));
    assert!(session.handler().memory().is_empty());
}

#[tokio::test]
async fn test_registration_and_join_order() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("unused"),
        vec![vec![WELCOME]],
    )
    .await;

    assert_eq!(
        lines(&sent),
        vec![
            "NICK parley\r\n",
            "USER parley 0 * :Parley assistant\r\n",
            "JOIN #chan\r\n",
        ]
    );
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_server_password_precedes_nick() {
    let mut config = irc_config();
    config.server_password = Some("s3cret".into());

    let (_, sent, _) = run_scripted(config, FixedResponder("unused"), vec![vec![WELCOME]]).await;

    let sent = lines(&sent);
    assert_eq!(sent[0], "PASS s3cret\r\n");
    assert_eq!(sent[1], "NICK parley\r\n");
}

#[tokio::test]
async fn test_channel_message_is_answered_and_remembered() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("Doing great!"),
        vec![vec![
            WELCOME,
            ":alice!alice@host PRIVMSG #chan :hey bot, how are you?\r\n",
        ]],
    )
    .await;

    assert_eq!(
        lines(&sent).last().unwrap(),
        "PRIVMSG #chan :Doing great!\r\n"
    );
    assert_eq!(
        session.handler().memory().recent("#chan", 10),
        vec![
            Turn::user("hey bot, how are you?"),
            Turn::assistant("Doing great!"),
        ]
    );
}

#[tokio::test]
async fn test_untriggered_message_gets_no_reply() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("unused"),
        vec![vec![WELCOME, ":alice!a@h PRIVMSG #chan :just chatting\r\n"]],
    )
    .await;

    assert!(lines(&sent).iter().all(|l| !l.starts_with("PRIVMSG")));
    assert!(session.handler().memory().is_empty());
}

#[tokio::test]
async fn test_private_message_is_answered_to_sender() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("Hi Bob"),
        vec![vec![WELCOME, ":bob!b@h PRIVMSG parley :hello assistant\r\n"]],
    )
    .await;

    assert_eq!(lines(&sent).last().unwrap(), "PRIVMSG bob :Hi Bob\r\n");
    assert_eq!(session.handler().memory().len("bob"), 2);
    assert_eq!(session.handler().memory().len("parley"), 0);
}

#[tokio::test]
async fn test_multiline_reply_is_split() {
    let (_, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("first line\n\nsecond line"),
        vec![vec![WELCOME, ":alice!a@h PRIVMSG #chan :bot?\r\n"]],
    )
    .await;

    let privmsgs: Vec<String> = lines(&sent)
        .into_iter()
        .filter(|l| l.starts_with("PRIVMSG"))
        .collect();
    assert_eq!(
        privmsgs,
        vec!["PRIVMSG #chan :first line\r\n", "PRIVMSG #chan :second line\r\n"]
    );
}

#[tokio::test]
async fn test_line_split_across_reads_is_reassembled() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("ok"),
        vec![vec![
            ":irc.example.net 00",
            "1 parley :Welcome\r\n:alice!a@h PRIVMSG #chan :he",
            "y bot\r\n",
        ]],
    )
    .await;

    assert_eq!(lines(&sent).last().unwrap(), "PRIVMSG #chan :ok\r\n");
    assert_eq!(
        session.handler().memory().recent("#chan", 1),
        vec![Turn::assistant("ok")]
    );
}

#[tokio::test]
async fn test_messages_before_registration_are_ignored() {
    let (session, sent, _) = run_scripted(
        irc_config(),
        FixedResponder("too soon"),
        vec![vec![
            ":alice!a@h PRIVMSG #chan :hey bot\r\n",
            WELCOME,
        ]],
    )
    .await;

    assert!(lines(&sent).iter().all(|l| !l.starts_with("PRIVMSG")));
    assert!(session.handler().memory().is_empty());
}

#[tokio::test]
async fn test_reconnect_replays_registration_and_keeps_memory() {
    let (session, sent, delays) = run_scripted(
        irc_config(),
        FixedResponder("answer"),
        vec![
            vec![WELCOME, ":alice!a@h PRIVMSG #chan :bot one\r\n"],
            vec![WELCOME],
        ],
    )
    .await;

    let registration = [
        "NICK parley\r\n",
        "USER parley 0 * :Parley assistant\r\n",
        "JOIN #chan\r\n",
    ];
    assert_eq!(lines_on(&sent, 1)[..3], registration);
    assert_eq!(lines_on(&sent, 2), registration);
    assert_eq!(delays, vec![Duration::from_secs(5), Duration::from_secs(5)]);
    // Reset by the second successful join, then bumped by its loss
    assert_eq!(session.attempts(), 1);
    assert_eq!(session.handler().memory().len("#chan"), 2);
}

#[tokio::test]
async fn test_backend_timeout_sends_placeholder() {
    let responder = LlmResponder::new(TimingOutProvider, ChatCompletionConfig::default());

    let (session, sent, _) = run_scripted(
        irc_config(),
        responder,
        vec![vec![WELCOME, ":alice!a@h PRIVMSG #chan :gpt what time is it\r\n"]],
    )
    .await;

    assert_eq!(
        lines(&sent).last().unwrap(),
        &format!("PRIVMSG #chan :{API_ERROR_REPLY}\r\n")
    );
    assert_eq!(
        session.handler().memory().recent("#chan", 10),
        vec![
            Turn::user("gpt what time is it"),
            Turn::assistant(API_ERROR_REPLY),
        ]
    );
}
