//! The single connection to the real IRC server.

use std::io::{Read, Write};

use tracing::{debug, error, trace, warn};

use crate::error::{MessageParseError, ProtocolError, Result};
use crate::isupport::FeatureCache;
use crate::message::MessageRef;
use crate::response::Response;
use crate::transport::{Connection, SendBuffer};

use super::table::ConnectionTable;
use super::Settings;

const ISUPPORT: &str = Response::RPL_ISUPPORT.as_str();

/// Identity the bouncer registers with upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nick: String,
    pub user: String,
    pub realname: String,
}

/// Whether the event loop may keep using the upstream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    /// The server sent `ERROR`; carries its reason.
    Stop(String),
}

#[derive(Debug)]
pub struct UpstreamSession<S> {
    pub(crate) conn: Connection<S>,
    pub(crate) features: FeatureCache,
}

impl<S> UpstreamSession<S> {
    pub fn new(stream: S, settings: &Settings) -> Self {
        Self {
            conn: Connection::new(stream, settings.recv_capacity, settings.send_capacity),
            features: FeatureCache::new(),
        }
    }

    pub fn features(&self) -> &FeatureCache {
        &self.features
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }
}

impl<S: Read + Write> UpstreamSession<S> {
    /// Queue `NICK` and `USER` for the configured identity.
    pub fn login(&mut self, identity: &Identity, limit: usize) -> Result<()> {
        let nick = MessageRef::new("NICK").with_param(&identity.nick);
        let user = MessageRef::new("USER")
            .with_param(&identity.user)
            .with_param("0")
            .with_param("*")
            .with_trailing(&identity.realname);

        self.conn.send.enqueue_message(&nick, limit)?;
        self.conn.send.enqueue_message(&user, limit)?;
        debug!(nick = %identity.nick, user = %identity.user, "queued upstream registration");
        Ok(())
    }

    /// Drain every complete line from the server, caching features and
    /// relaying traffic to `clients`.
    ///
    /// # Errors
    ///
    /// Any error returned here is fatal for the upstream connection.
    pub fn on_readable<C>(&mut self, clients: &mut ConnectionTable<C>, settings: &Settings) -> Result<Dispatch> {
        let Connection {
            stream, recv, send, ..
        } = &mut self.conn;

        while let Some(frame) = recv.read_frame(stream)? {
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
            trace!(line = %line, "upstream frame");

            if let Dispatch::Stop(reason) = dispatch(&msg, send, &mut self.features, clients, settings) {
                return Ok(Dispatch::Stop(reason));
            }
        }
        Ok(Dispatch::Continue)
    }
}

fn dispatch<C>(
    msg: &MessageRef<'_>,
    send: &mut SendBuffer,
    features: &mut FeatureCache,
    clients: &mut ConnectionTable<C>,
    settings: &Settings,
) -> Dispatch {
    match msg.command {
        ISUPPORT => {
            let seen = features.merge_message(msg);
            debug!(tokens = seen, cached = features.len(), "server features updated");
            broadcast(msg, clients, settings.line_limit);
        }
        "ERROR" => {
            let reason = msg.last_param().unwrap_or_default().to_owned();
            error!(reason = %reason, "upstream sent ERROR");
            broadcast(msg, clients, settings.line_limit);
            return Dispatch::Stop(reason);
        }
        "PING" => {
            let pong = MessageRef {
                command: "PONG",
                params: msg.params.clone(),
                trailing: msg.trailing,
                ..MessageRef::default()
            };
            if let Err(e) = send.enqueue_message(&pong, settings.line_limit) {
                warn!(error = %e, "failed to queue PONG upstream");
            }
        }
        "PONG" => {}
        _ => broadcast(msg, clients, settings.line_limit),
    }
    Dispatch::Continue
}

/// Serialize once and queue the same bytes for every client.
fn broadcast<C>(msg: &MessageRef<'_>, clients: &mut ConnectionTable<C>, limit: usize) {
    let line = match msg.to_line(limit) {
        Ok(line) => line,
        Err(e) => {
            warn!(command = msg.command, error = %e, "dropping unforwardable upstream line");
            return;
        }
    };

    for client in clients.iter_mut() {
        if let Err(e) = client.conn.send.enqueue(&line) {
            warn!(token = client.token().0, error = %e, "client send buffer full, dropping line");
        }
    }
}
