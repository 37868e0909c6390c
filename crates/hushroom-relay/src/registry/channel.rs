//! Channel membership table.

use std::collections::HashMap;

/// Channel hash to members in join order. Channels exist only while they
/// have at least one member.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: HashMap<String, Vec<String>>,
}

impl ChannelTable {
    /// Add a member. Returns `false` if it was already present.
    pub fn insert(&mut self, channel: &str, id: &str) -> bool {
        let members = self.channels.entry(channel.to_string()).or_default();
        if members.iter().any(|m| m == id) {
            return false;
        }
        members.push(id.to_string());
        true
    }

    /// Remove a member, deleting the channel once it is empty.
    pub fn remove(&mut self, channel: &str, id: &str) -> bool {
        let Some(members) = self.channels.get_mut(channel) else {
            return false;
        };
        let before = members.len();
        members.retain(|m| m != id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    pub fn members(&self, channel: &str) -> &[String] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
