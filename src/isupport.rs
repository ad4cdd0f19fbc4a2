//! Server feature (`RPL_ISUPPORT`) cache.
//!
//! Tokens are stored in their wire form (`KEY` or `KEY=value`) so they can be
//! replayed to clients unchanged.

use tracing::trace;

use crate::message::MessageRef;

/// One advertised feature token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IsupportEntry<'a> {
    pub key: &'a str,
    pub value: Option<&'a str>,
    /// The token was `-KEY`, withdrawing a previous advertisement.
    pub negated: bool,
}

impl<'a> IsupportEntry<'a> {
    /// Parse a single token. Returns `None` for tokens with an empty key.
    pub fn parse(token: &'a str) -> Option<Self> {
        let (negated, token) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };
        if key.is_empty() {
            return None;
        }
        Some(IsupportEntry {
            key,
            value,
            negated,
        })
    }
}

/// The feature tokens of a `005` reply: everything after the target up to
/// the free-form description.
pub fn feature_tokens<'a, 'm>(msg: &'a MessageRef<'m>) -> impl Iterator<Item = &'m str> + 'a {
    let mut end = msg.params.len();
    if msg.trailing {
        end = end.saturating_sub(1);
    }
    msg.params
        .get(1..end)
        .unwrap_or_default()
        .iter()
        .copied()
        .take_while(|p| !p.contains(' '))
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Feature {
    token: String,
    key_len: usize,
}

impl Feature {
    fn key(&self) -> &str {
        &self.token[..self.key_len]
    }

    fn value(&self) -> Option<&str> {
        // Tokens are either `KEY` or `KEY=value`.
        if self.token.len() > self.key_len {
            Some(&self.token[self.key_len + 1..])
        } else {
            None
        }
    }
}

/// Ordered, key-unique set of features advertised by the upstream server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureCache {
    entries: Vec<Feature>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one token. A known key is replaced in place; `-KEY` removes it.
    pub fn merge(&mut self, token: &str) {
        let Some(entry) = IsupportEntry::parse(token) else {
            return;
        };
        let existing = self.entries.iter().position(|f| f.key() == entry.key);

        if entry.negated {
            if let Some(i) = existing {
                trace!(key = entry.key, "feature withdrawn");
                self.entries.remove(i);
            }
            return;
        }

        let feature = Feature {
            token: token.to_owned(),
            key_len: entry.key.len(),
        };
        match existing {
            Some(i) => self.entries[i] = feature,
            None => self.entries.push(feature),
        }
    }

    /// Merge every feature token of a `005` reply. Returns the number of
    /// tokens seen.
    pub fn merge_message(&mut self, msg: &MessageRef<'_>) -> usize {
        let mut seen = 0;
        for token in feature_tokens(msg) {
            self.merge(token);
            seen += 1;
        }
        seen
    }

    /// Look up a key: `None` if unknown, `Some(None)` if advertised without
    /// a value.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|f| f.key() == key)
            .map(Feature::value)
    }

    pub fn network(&self) -> Option<&str> {
        self.get("NETWORK").flatten()
    }

    /// Tokens in wire form, in the order their keys were first advertised.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|f| f.token.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
