//! Platform identifiers.
//!
//! Identifiers travel as decimal strings on the wire so bridges written in
//! languages without 64-bit integers never round them. Plain JSON numbers are
//! still accepted on input.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Bot API channel ids are the bare id prefixed with `-100`.
const CHANNEL_MARKER: i64 = -1_000_000_000_000;

macro_rules! string_safe_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map($name)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(IdVisitor).map($name)
            }
        }
    };
}

string_safe_id!(UserId, "Identity of a platform user (requesters and admins).");
string_safe_id!(ChannelId, "Identity of a channel, in either bare or `-100` form.");

impl ChannelId {
    /// The id with any Bot API `-100` channel prefix stripped. Other ids,
    /// including negative basic-group ids, are returned unchanged.
    pub fn bare(self) -> i64 {
        if self.0 <= CHANNEL_MARKER {
            CHANNEL_MARKER - self.0
        } else {
            self.0
        }
    }

    /// Normalized string form used for identity comparison.
    pub fn canonical(self) -> String {
        self.bare().to_string()
    }

    /// True when both ids name the same channel regardless of encoding.
    pub fn same_channel(self, other: ChannelId) -> bool {
        self.canonical() == other.canonical()
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer id or a decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::custom(format!("id {v} out of range")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        v.trim()
            .parse::<i64>()
            .map_err(|_| E::custom(format!("invalid id string: {v:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_match_across_encodings() {
        let bot_api = ChannelId(-1003784917581);
        let bare = ChannelId(3784917581);
        assert_eq!(bot_api.canonical(), "3784917581");
        assert!(bot_api.same_channel(bare));
        assert!(!bot_api.same_channel(ChannelId(3784917582)));
    }

    #[test]
    fn group_ids_do_not_alias_channels() {
        assert!(!ChannelId(-5).same_channel(ChannelId(5)));
        assert_eq!(ChannelId(-5).canonical(), "-5");
        assert!(ChannelId(-1000000000005).same_channel(ChannelId(5)));
    }

    #[test]
    fn ids_serialize_as_strings() {
        let json = serde_json::to_string(&UserId(8469993808)).unwrap();
        assert_eq!(json, "\"8469993808\"");
    }

    #[test]
    fn ids_deserialize_from_strings_and_numbers() {
        let from_str: UserId = serde_json::from_str("\"9007199254740993\"").unwrap();
        assert_eq!(from_str, UserId(9007199254740993));

        let from_num: ChannelId = serde_json::from_str("-1003784917581").unwrap();
        assert_eq!(from_num, ChannelId(-1003784917581));

        assert!(serde_json::from_str::<UserId>("\"abc\"").is_err());
    }
}
