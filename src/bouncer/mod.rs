//! Readiness-driven bouncer core.
//!
//! One [`mio::Poll`] multiplexes the listener, the upstream connection and
//! every client. All sockets are non-blocking and all state is owned by the
//! [`Bouncer`], so no locking is involved.

mod client;
mod table;
mod upstream;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, info, warn};

use crate::error::{ProtocolError, Result};
use crate::message::DEFAULT_LINE_LIMIT;
use crate::transport::DEFAULT_BUFFER_CAPACITY;

pub use self::client::{isupport_replies, ClientSession, Registration, UpstreamLink};
pub use self::table::{ConnectionTable, FIRST_CLIENT_TOKEN};
pub use self::upstream::{Dispatch, Identity, UpstreamSession};

pub const LISTENER: Token = Token(0);
pub const UPSTREAM: Token = Token(1);

/// Runtime knobs shared by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Source of locally generated replies.
    pub server_name: String,
    /// Network name used in the welcome text until the server advertises one.
    pub network: String,
    /// Maximum serialized line length, terminator excluded.
    pub line_limit: usize,
    pub recv_capacity: usize,
    pub send_capacity: usize,
    /// Disconnect clients silent for longer than this.
    pub idle_timeout: Option<Duration>,
    pub events_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_name: "example.com".to_string(),
            network: "slirc-bnc".to_string(),
            line_limit: DEFAULT_LINE_LIMIT,
            recv_capacity: DEFAULT_BUFFER_CAPACITY,
            send_capacity: DEFAULT_BUFFER_CAPACITY,
            idle_timeout: None,
            events_capacity: 128,
        }
    }
}

/// Why the event loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
    /// The upstream connection failed or was closed.
    UpstreamLost,
    /// The upstream server sent `ERROR` with this reason.
    UpstreamError(String),
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shutdown::UpstreamLost => write!(f, "upstream connection lost"),
            Shutdown::UpstreamError(reason) => write!(f, "upstream error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Readiness {
    readable: bool,
    writable: bool,
    closed: bool,
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            closed: event.is_error() || event.is_read_closed() || event.is_write_closed(),
        }
    }
}

pub struct Bouncer {
    poll: Poll,
    listener: TcpListener,
    upstream: UpstreamSession<TcpStream>,
    clients: ConnectionTable<TcpStream>,
    settings: Settings,
}

impl Bouncer {
    /// Register the listener and the connected upstream socket.
    pub fn new(mut listener: TcpListener, upstream: TcpStream, settings: Settings) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let mut upstream = UpstreamSession::new(upstream, &settings);
        upstream.conn.register(poll.registry(), UPSTREAM)?;

        Ok(Self {
            poll,
            listener,
            upstream,
            clients: ConnectionTable::new(),
            settings,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn features(&self) -> &crate::isupport::FeatureCache {
        self.upstream.features()
    }

    /// Queue upstream registration; it is sent once the loop runs.
    pub fn login(&mut self, identity: &Identity) -> Result<()> {
        self.upstream.login(identity, self.settings.line_limit)
    }

    /// Run until the upstream connection ends.
    ///
    /// # Errors
    ///
    /// Returns an error only if waiting for readiness fails.
    pub fn run(&mut self) -> io::Result<Shutdown> {
        let mut events = Events::with_capacity(self.settings.events_capacity);
        let timeout = self
            .settings
            .idle_timeout
            .map(|idle| (idle / 2).max(Duration::from_secs(1)));

        if let Err(e) = self.upstream.conn.sync_interest(self.poll.registry(), UPSTREAM) {
            error!(error = %e, "failed to register upstream");
            self.shutdown();
            return Ok(Shutdown::UpstreamLost);
        }
        info!(addr = ?self.listener.local_addr().ok(), "bouncer running");

        loop {
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "poll failed");
                self.shutdown();
                return Err(e);
            }

            let mut accept = false;
            let mut upstream = None;
            let mut ready = Vec::new();
            for event in events.iter() {
                match event.token() {
                    LISTENER => accept = true,
                    UPSTREAM => upstream = Some(Readiness::from(event)),
                    token => ready.push((token, Readiness::from(event))),
                }
            }

            if accept {
                self.accept_clients();
            }

            if let Some(readiness) = upstream {
                if let Some(shutdown) = self.service_upstream(readiness) {
                    self.shutdown();
                    return Ok(shutdown);
                }
            }

            let mut closing = Vec::new();
            for (token, readiness) in ready {
                if let Err(e) = self.service_client(token, readiness) {
                    log_client_error(token, &e);
                    closing.push(token);
                }
            }
            self.evict_idle(&mut closing);

            for token in closing {
                self.close_client(token);
            }

            if let Some(shutdown) = self.sync_interests() {
                self.shutdown();
                return Ok(shutdown);
            }
        }
    }

    fn accept_clients(&mut self) {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
            }

            let client = self.clients.insert(stream, &self.settings);
            let token = client.token();
            if let Err(e) = client.conn.register(self.poll.registry(), token) {
                warn!(peer = %peer, error = %e, "failed to register client");
                self.clients.remove(token);
                continue;
            }
            if let Err(e) = client.probe(self.settings.line_limit) {
                warn!(token = token.0, error = %e, "failed to queue probe");
            }
            info!(token = token.0, peer = %peer, "client connected");
        }
    }

    fn service_upstream(&mut self, readiness: Readiness) -> Option<Shutdown> {
        if readiness.readable {
            match self.upstream.on_readable(&mut self.clients, &self.settings) {
                Ok(Dispatch::Continue) => {}
                Ok(Dispatch::Stop(reason)) => return Some(Shutdown::UpstreamError(reason)),
                Err(e) => {
                    error!(error = %e, "upstream read failed");
                    return Some(Shutdown::UpstreamLost);
                }
            }
        }

        if readiness.writable {
            if let Err(e) = self.upstream.conn.flush() {
                error!(error = %e, "upstream write failed");
                return Some(Shutdown::UpstreamLost);
            }
        }

        if readiness.closed {
            error!("upstream connection closed");
            return Some(Shutdown::UpstreamLost);
        }
        None
    }

    fn service_client(&mut self, token: Token, readiness: Readiness) -> Result<()> {
        let Some(client) = self.clients.get_mut(token) else {
            debug!(token = token.0, "event for unknown client");
            return Ok(());
        };

        if readiness.readable {
            let mut link = UpstreamLink {
                send: &mut self.upstream.conn.send,
                features: &self.upstream.features,
            };
            client.on_readable(&mut link, &self.settings)?;
        }

        if readiness.writable {
            client.conn.flush()?;
        }

        if readiness.closed {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(())
    }

    fn evict_idle(&mut self, closing: &mut Vec<Token>) {
        let Some(limit) = self.settings.idle_timeout else {
            return;
        };
        let now = Instant::now();
        for client in self.clients.iter() {
            let token = client.token();
            if client.idle_for(now) > limit && !closing.contains(&token) {
                info!(token = token.0, nick = ?client.nickname(), "evicting idle client");
                closing.push(token);
            }
        }
    }

    fn close_client(&mut self, token: Token) {
        let Some(mut client) = self.clients.remove(token) else {
            return;
        };
        if let Err(e) = client.conn.deregister(self.poll.registry()) {
            debug!(token = token.0, error = %e, "failed to deregister client");
        }
        info!(token = token.0, nick = ?client.nickname(), "client disconnected");
    }

    /// Match every socket's interest to whether it has output queued.
    fn sync_interests(&mut self) -> Option<Shutdown> {
        let registry = self.poll.registry();
        if let Err(e) = self.upstream.conn.sync_interest(registry, UPSTREAM) {
            error!(error = %e, "failed to update upstream interest");
            return Some(Shutdown::UpstreamLost);
        }

        let mut failed = Vec::new();
        for client in self.clients.iter_mut() {
            let token = client.token();
            if let Err(e) = client.conn.sync_interest(registry, token) {
                warn!(token = token.0, error = %e, "failed to update client interest");
                failed.push(token);
            }
        }
        for token in failed {
            self.close_client(token);
        }
        None
    }

    /// Give clients a last chance to receive pending output, then close all
    /// of them.
    fn shutdown(&mut self) {
        let registry = self.poll.registry();
        for mut client in self.clients.drain() {
            if let Err(e) = client.conn.flush() {
                debug!(token = client.token().0, error = %e, "final flush failed");
            }
            if let Err(e) = client.conn.deregister(registry) {
                debug!(token = client.token().0, error = %e, "failed to deregister client");
            }
        }
        if let Err(e) = self.upstream.conn.deregister(registry) {
            debug!(error = %e, "failed to deregister upstream");
        }
        info!("all clients closed");
    }
}

fn log_client_error(token: Token, e: &ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!(token = token.0, "client closed connection"),
        _ => warn!(token = token.0, error = %e, "dropping client"),
    }
}
