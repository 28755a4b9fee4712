//! Channel membership from `account_data`.

use crate::gateway::ApiError;
use std::collections::BTreeMap;

/// Channels the account's users are in, and who is in each of those channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelData {
    /// (user, channels) pairs, users and channels both in server order.
    pub users: Vec<(String, Vec<String>)>,
    /// channel -> members.
    pub channels: BTreeMap<String, Vec<String>>,
}

impl ChannelData {
    /// Build from the `users` object of an `account_data` reply (user -> channel -> members).
    /// The first user (in server order) that reports a channel decides its member list.
    pub fn from_account_data(
        users: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ApiError> {
        let mut data = ChannelData::default();
        for (user, channels) in users {
            let channels: serde_json::Map<String, serde_json::Value> =
                serde_json::from_value(channels).map_err(|e| {
                    ApiError::Protocol(format!("account_data for {}: {}", user, e))
                })?;
            let mut names = Vec::with_capacity(channels.len());
            for (channel, members) in channels {
                names.push(channel.clone());
                if data.channels.contains_key(&channel) {
                    continue;
                }
                let members: Vec<String> = serde_json::from_value(members).map_err(|e| {
                    ApiError::Protocol(format!("members of {}: {}", channel, e))
                })?;
                data.channels.insert(channel, members);
            }
            data.users.push((user, names));
        }
        Ok(data)
    }

    /// The account's own users, in the order the server listed them.
    pub fn user_names(&self) -> Vec<String> {
        self.users.iter().map(|(user, _)| user.clone()).collect()
    }

    pub fn channels_of(&self, user: &str) -> Option<&[String]> {
        self.users
            .iter()
            .find(|(name, _)| name == user)
            .map(|(_, channels)| channels.as_slice())
    }
}
