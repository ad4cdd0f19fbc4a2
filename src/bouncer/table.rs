use std::collections::HashMap;

use mio::Token;

use super::client::ClientSession;
use super::Settings;

/// First token handed to a client; lower tokens are reserved.
pub const FIRST_CLIENT_TOKEN: usize = 2;

/// Live client sessions keyed by their poll token.
///
/// Tokens increase monotonically and are never reused, so a stale event can
/// never be delivered to a newer session.
#[derive(Debug)]
pub struct ConnectionTable<S> {
    clients: HashMap<Token, ClientSession<S>>,
    next_token: usize,
}

impl<S> Default for ConnectionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConnectionTable<S> {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
        }
    }

    /// Create a session for `stream` under a fresh token.
    pub fn insert(&mut self, stream: S, settings: &Settings) -> &mut ClientSession<S> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.clients
            .entry(token)
            .or_insert_with(|| ClientSession::new(token, stream, settings))
    }

    /// Remove a session; dropping it closes its socket.
    pub fn remove(&mut self, token: Token) -> Option<ClientSession<S>> {
        self.clients.remove(&token)
    }

    pub fn get(&self, token: Token) -> Option<&ClientSession<S>> {
        self.clients.get(&token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut ClientSession<S>> {
        self.clients.get_mut(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.clients.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientSession<S>> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientSession<S>> {
        self.clients.values_mut()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ClientSession<S>> + '_ {
        self.clients.drain().map(|(_, client)| client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStream;

    #[test]
    fn test_tokens_start_after_reserved_and_increase() {
        let settings = Settings::default();
        let mut table = ConnectionTable::new();

        let a = table.insert(MockStream::new(), &settings).token();
        let b = table.insert(MockStream::new(), &settings).token();
        assert_eq!(a, Token(FIRST_CLIENT_TOKEN));
        assert_eq!(b, Token(FIRST_CLIENT_TOKEN + 1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_remove_does_not_shift_other_sessions() {
        let settings = Settings::default();
        let mut table = ConnectionTable::new();
        let a = table.insert(MockStream::new(), &settings).token();
        let b = table.insert(MockStream::new(), &settings).token();

        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        assert!(!table.contains(a));
        assert_eq!(table.get(b).map(ClientSession::token), Some(b));

        // Removed tokens are not handed out again.
        let c = table.insert(MockStream::new(), &settings).token();
        assert_ne!(c, a);
        assert_eq!(c, Token(FIRST_CLIENT_TOKEN + 2));
    }

    #[test]
    fn test_drain_empties_table() {
        let settings = Settings::default();
        let mut table = ConnectionTable::new();
        table.insert(MockStream::new(), &settings);
        table.insert(MockStream::new(), &settings);

        assert_eq!(table.drain().count(), 2);
        assert!(table.is_empty());
    }
}
