//! Downstream client sessions.
//!
//! Registration, keepalive and capability traffic is answered locally; every
//! other command is relayed to the upstream server.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use chrono::Utc;
use mio::Token;
use tracing::{debug, info, trace, warn};

use crate::error::{MessageParseError, ProtocolError, Result};
use crate::isupport::FeatureCache;
use crate::message::{MessageRef, PARAM_MAX};
use crate::response::Response;
use crate::transport::{Connection, SendBuffer};

use super::Settings;

/// Description closing every `005` reply.
const ISUPPORT_TRAILER: &str = "are supported by this server";

/// Target, features and description must fit in one message.
const FEATURES_PER_REPLY: usize = PARAM_MAX - 2;

/// Identity a client announced with `NICK` and `USER`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub nickname: Option<String>,
    pub username: Option<String>,
}

/// What a client session may touch on the upstream side.
pub struct UpstreamLink<'a> {
    pub send: &'a mut SendBuffer,
    pub features: &'a FeatureCache,
}

#[derive(Debug)]
pub struct ClientSession<S> {
    token: Token,
    pub(crate) conn: Connection<S>,
    registration: Registration,
    last_active: Instant,
}

impl<S> ClientSession<S> {
    pub fn new(token: Token, stream: S, settings: &Settings) -> Self {
        Self {
            token,
            conn: Connection::new(stream, settings.recv_capacity, settings.send_capacity),
            registration: Registration::default(),
            last_active: Instant::now(),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn nickname(&self) -> Option<&str> {
        self.registration.nickname.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.registration.username.as_deref()
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Time since the client last sent a complete line.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }
}

impl<S: Read + Write> ClientSession<S> {
    /// Queue the `PING :<unix time>` sent to every new client.
    pub fn probe(&mut self, limit: usize) -> Result<()> {
        let stamp = Utc::now().timestamp().to_string();
        let ping = MessageRef::new("PING").with_trailing(&stamp);
        self.conn.send.enqueue_message(&ping, limit)?;
        Ok(())
    }

    /// Drain every complete line from the socket and act on it.
    ///
    /// # Errors
    ///
    /// Any error returned here is fatal for this client.
    pub fn on_readable(&mut self, upstream: &mut UpstreamLink<'_>, settings: &Settings) -> Result<()> {
        let Connection {
            stream, recv, send, ..
        } = &mut self.conn;

        while let Some(frame) = recv.read_frame(stream)? {
            self.last_active = Instant::now();
            let line = String::from_utf8_lossy(frame);
            let msg = match MessageRef::parse(&line) {
                Ok(msg) => msg,
                Err(MessageParseError::EmptyMessage) => continue,
                Err(cause) => {
                    return Err(ProtocolError::InvalidMessage {
                        string: line.to_string(),
                        cause,
                    })
                }
            };
            trace!(token = self.token.0, line = %line, "client frame");
            dispatch(&msg, &mut self.registration, send, upstream, settings);
        }
        Ok(())
    }
}

fn dispatch(
    msg: &MessageRef<'_>,
    registration: &mut Registration,
    send: &mut SendBuffer,
    upstream: &mut UpstreamLink<'_>,
    settings: &Settings,
) {
    match msg.command {
        "NICK" | "USER" => {
            let Some(nick) = msg.param(0) else {
                need_more_params(msg.command, registration, send, settings);
                return;
            };
            if msg.command == "USER" {
                registration.username = Some(nick.to_owned());
            }
            registration.nickname = Some(nick.to_owned());
            info!(nick, command = msg.command, "client registered");
            send_welcome(nick, send, upstream.features, settings);
        }
        "CAP" => trace!("ignoring capability negotiation"),
        "PING" => {
            let echo = MessageRef {
                tags: None,
                source: None,
                ..msg.clone()
            };
            queue(send, &echo, settings.line_limit);
        }
        "PONG" => {}
        _ => match msg.to_line(settings.line_limit) {
            Ok(line) => {
                if let Err(e) = upstream.send.enqueue(&line) {
                    warn!(command = msg.command, error = %e, "upstream send buffer full, dropping client line");
                }
            }
            Err(e) => warn!(command = msg.command, error = %e, "dropping unforwardable client line"),
        },
    }
}

/// Queue a locally generated reply, dropping it with a warning if it does
/// not fit.
fn queue(send: &mut SendBuffer, msg: &MessageRef<'_>, limit: usize) {
    if let Err(e) = send.enqueue_message(msg, limit) {
        warn!(command = msg.command, error = %e, "dropping reply to client");
    }
}

fn need_more_params(
    command: &str,
    registration: &Registration,
    send: &mut SendBuffer,
    settings: &Settings,
) {
    let target = registration.nickname.as_deref().unwrap_or("*");
    let reply = MessageRef::new(Response::ERR_NEEDMOREPARAMS.as_str())
        .with_source(&settings.server_name)
        .with_param(target)
        .with_param(command)
        .with_trailing("Not enough parameters");
    queue(send, &reply, settings.line_limit);
}

fn send_welcome(nick: &str, send: &mut SendBuffer, features: &FeatureCache, settings: &Settings) {
    let network = features.network().unwrap_or(&settings.network);
    let text = format!("Welcome to {network}, {nick}");
    let welcome = MessageRef::new(Response::RPL_WELCOME.as_str())
        .with_source(&settings.server_name)
        .with_param(nick)
        .with_trailing(&text);
    queue(send, &welcome, settings.line_limit);

    let replies = isupport_replies(nick, features, settings);
    debug!(nick, features = features.len(), replies = replies.len(), "replaying server features");
    for reply in &replies {
        queue(send, reply, settings.line_limit);
    }
}

/// Split the cached features into `005` replies for `nick`.
///
/// A reply is closed once it holds [`FEATURES_PER_REPLY`] tokens or when the
/// next token would push the line past the configured limit.
pub fn isupport_replies<'a>(
    nick: &'a str,
    features: &'a FeatureCache,
    settings: &'a Settings,
) -> Vec<MessageRef<'a>> {
    let command = Response::RPL_ISUPPORT.as_str();
    // ":<server> 005 <nick> :<trailer>"
    let base = 1 + settings.server_name.len() + 1 + command.len() + 1 + nick.len() + 2 + ISUPPORT_TRAILER.len();

    let reply = |batch: Vec<&'a str>| {
        let mut params = Vec::with_capacity(batch.len() + 2);
        params.push(nick);
        params.extend(batch);
        params.push(ISUPPORT_TRAILER);
        MessageRef {
            tags: None,
            source: Some(settings.server_name.as_str()),
            command,
            params,
            trailing: true,
        }
    };

    let mut replies = Vec::new();
    let mut batch: Vec<&'a str> = Vec::new();
    let mut width = base;

    for token in features.tokens() {
        let full = batch.len() == FEATURES_PER_REPLY;
        let too_wide = !batch.is_empty() && width + 1 + token.len() > settings.line_limit;
        if full || too_wide {
            replies.push(reply(std::mem::take(&mut batch)));
            width = base;
        }
        width += 1 + token.len();
        batch.push(token);
    }
    if !batch.is_empty() {
        replies.push(reply(batch));
    }
    replies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStream;

    struct Harness {
        client: ClientSession<MockStream>,
        upstream_send: SendBuffer,
        features: FeatureCache,
        settings: Settings,
    }

    impl Harness {
        fn new() -> Self {
            let settings = Settings::default();
            Self {
                client: ClientSession::new(Token(2), MockStream::new(), &settings),
                upstream_send: SendBuffer::with_capacity(4096),
                features: FeatureCache::new(),
                settings,
            }
        }

        /// Feed `input` to the client and return what it queued for itself
        /// and for the upstream.
        fn feed(&mut self, input: &str) -> (String, String) {
            self.client.conn.stream.push_input(input.as_bytes());
            let mut link = UpstreamLink {
                send: &mut self.upstream_send,
                features: &self.features,
            };
            self.client.on_readable(&mut link, &self.settings).unwrap();

            let mut to_client = MockStream::new();
            self.client.conn.send.flush(&mut to_client).unwrap();
            let mut to_upstream = MockStream::new();
            self.upstream_send.flush(&mut to_upstream).unwrap();
            (to_client.output_str(), to_upstream.output_str())
        }
    }

    #[test]
    fn test_nick_with_empty_cache_sends_only_welcome() {
        let mut h = Harness::new();
        let (client, upstream) = h.feed("NICK bob\r\n");

        assert_eq!(h.client.nickname(), Some("bob"));
        assert_eq!(client, ":example.com 001 bob :Welcome to slirc-bnc, bob\r\n");
        assert!(upstream.is_empty());
    }

    #[test]
    fn test_nick_replays_features() {
        let mut h = Harness::new();
        h.features.merge("CHANTYPES=#");
        h.features.merge("NETWORK=Test");

        let (client, _) = h.feed("NICK bob\r\n");
        assert_eq!(
            client,
            ":example.com 001 bob :Welcome to Test, bob\r\n\
             :example.com 005 bob CHANTYPES=# NETWORK=Test :are supported by this server\r\n"
        );
    }

    #[test]
    fn test_nick_replaces_previous() {
        let mut h = Harness::new();
        h.feed("NICK bob\r\n");
        h.feed("NICK alice\r\n");
        assert_eq!(h.client.nickname(), Some("alice"));
    }

    #[test]
    fn test_user_registers_like_nick() {
        let mut h = Harness::new();
        let (client, upstream) = h.feed("USER guest 0 * :Guest User\r\n");

        assert_eq!(h.client.username(), Some("guest"));
        assert_eq!(h.client.nickname(), Some("guest"));
        assert_eq!(client, ":example.com 001 guest :Welcome to slirc-bnc, guest\r\n");
        assert!(upstream.is_empty());
    }

    #[test]
    fn test_user_after_nick_replaces_nickname_and_resends_burst() {
        let mut h = Harness::new();
        h.features.merge("CHANTYPES=#");
        h.feed("NICK bob\r\n");

        let (client, _) = h.feed("USER alice 0 * :A\r\n");
        assert_eq!(h.client.nickname(), Some("alice"));
        assert_eq!(h.client.username(), Some("alice"));
        assert_eq!(
            client,
            ":example.com 001 alice :Welcome to slirc-bnc, alice\r\n\
             :example.com 005 alice CHANTYPES=# :are supported by this server\r\n"
        );
    }

    #[test]
    fn test_missing_params() {
        let mut h = Harness::new();
        let (client, upstream) = h.feed("NICK\r\n");

        assert_eq!(h.client.nickname(), None);
        assert_eq!(client, ":example.com 461 * NICK :Not enough parameters\r\n");
        assert!(upstream.is_empty());

        h.feed("NICK bob\r\n");
        let (client, _) = h.feed("USER\r\n");
        assert_eq!(client, ":example.com 461 bob USER :Not enough parameters\r\n");
        assert_eq!(h.client.username(), None);
    }

    #[test]
    fn test_cap_and_pong_are_consumed() {
        let mut h = Harness::new();
        let (client, upstream) = h.feed("CAP LS 302\r\nPONG :123\r\n");
        assert!(client.is_empty());
        assert!(upstream.is_empty());
    }

    #[test]
    fn test_ping_echoed_without_source_or_tags() {
        let mut h = Harness::new();
        let (client, upstream) = h.feed("@a=b :me PING :abc def\r\n");
        assert_eq!(client, "PING :abc def\r\n");
        assert!(upstream.is_empty());
    }

    #[test]
    fn test_other_commands_forwarded_unmodified() {
        let mut h = Harness::new();
        let (client, upstream) = h.feed("PRIVMSG #chan :hi\r\nJOIN #rust\r\n\r\n");
        assert!(client.is_empty());
        assert_eq!(upstream, "PRIVMSG #chan :hi\r\nJOIN #rust\r\n");
    }

    #[test]
    fn test_forward_drops_when_upstream_full() {
        let mut h = Harness::new();
        h.upstream_send = SendBuffer::with_capacity(8);
        let (_, upstream) = h.feed("PRIVMSG #chan :this does not fit\r\n");
        assert!(upstream.is_empty());
    }

    #[test]
    fn test_unparsable_line_is_fatal() {
        let mut h = Harness::new();
        h.client.conn.stream.push_input(b"@tags-only\r\n");
        let mut link = UpstreamLink {
            send: &mut h.upstream_send,
            features: &h.features,
        };
        let err = h.client.on_readable(&mut link, &h.settings).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_probe() {
        let mut h = Harness::new();
        h.client.probe(h.settings.line_limit).unwrap();
        let mut out = MockStream::new();
        h.client.conn.send.flush(&mut out).unwrap();

        let line = out.output_str();
        let stamp = line
            .strip_prefix("PING :")
            .and_then(|s| s.strip_suffix("\r\n"))
            .unwrap();
        assert!(stamp.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_isupport_batches_by_count() {
        let settings = Settings::default();
        let mut features = FeatureCache::new();
        for i in 0..30 {
            features.merge(&format!("F{i}=1"));
        }

        let replies = isupport_replies("bob", &features, &settings);
        let counts: Vec<usize> = replies.iter().map(|r| r.params.len() - 2).collect();
        assert_eq!(counts, vec![13, 13, 4]);
        for reply in &replies {
            assert!(reply.params.len() <= PARAM_MAX);
            assert_eq!(reply.param(0), Some("bob"));
            assert_eq!(reply.last_param(), Some(ISUPPORT_TRAILER));
        }
    }

    #[test]
    fn test_isupport_batches_by_width() {
        let settings = Settings {
            line_limit: 120,
            ..Settings::default()
        };
        let mut features = FeatureCache::new();
        for key in ["AAAAAAAAAA", "BBBBBBBBBB", "CCCCCCCCCC", "DDDDDDDDDD"] {
            features.merge(&format!("{key}=0123456789"));
        }

        let replies = isupport_replies("bob", &features, &settings);
        assert!(replies.len() > 1);
        for reply in &replies {
            assert!(reply.serialize(settings.line_limit).is_ok());
        }
        let total: usize = replies.iter().map(|r| r.params.len() - 2).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_isupport_empty_cache() {
        let settings = Settings::default();
        assert!(isupport_replies("bob", &FeatureCache::new(), &settings).is_empty());
    }
}
