pub mod attributes;
pub mod credentials;
pub mod encoding;
pub mod endpoints;
pub mod key_blob;
pub mod link;
pub mod share;

pub use crate::{
    attributes::{Attributes, Fingerprint},
    credentials::AesKey,
    key_blob::NodeKeyBlob,
    share::{ShareBundle, ShareEntry},
};
use {
    anyhow::{Result, bail},
    chrono::{TimeZone, Utc},
    derive_more::{Display, From, Into},
    serde::{Deserialize, Serialize},
};

pub type DateTimeUtc = chrono::DateTime<Utc>;

/// Opaque server-assigned handle of a node.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into, Display,
)]
pub struct NodeId(pub String);

impl NodeId {
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum NodeType {
    File,
    Folder,
    Root,
    Inbox,
    Trash,
}

impl NodeType {
    /// Files and folders carry keys and attributes; root variants do not.
    #[must_use]
    #[inline]
    pub fn is_keyed(self) -> bool {
        matches!(self, Self::File | Self::Folder)
    }
}

impl TryFrom<i32> for NodeType {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::File),
            1 => Ok(Self::Folder),
            2 => Ok(Self::Root),
            3 => Ok(Self::Inbox),
            4 => Ok(Self::Trash),
            _ => bail!("invalid value for NodeType: {}", value),
        }
    }
}

impl From<NodeType> for i32 {
    #[inline]
    fn from(value: NodeType) -> Self {
        match value {
            NodeType::File => 0,
            NodeType::Folder => 1,
            NodeType::Root => 2,
            NodeType::Inbox => 3,
            NodeType::Trash => 4,
        }
    }
}

/// A node exactly as the server sends it in a tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNode {
    #[serde(rename = "h")]
    pub id: NodeId,
    #[serde(rename = "p", default, deserialize_with = "empty_as_none")]
    pub parent_id: Option<NodeId>,
    #[serde(rename = "u", default)]
    pub owner: Option<String>,
    #[serde(rename = "t")]
    pub node_type: NodeType,
    #[serde(rename = "s", default)]
    pub size: Option<u64>,
    #[serde(rename = "ts", default)]
    pub created_at: i64,
    #[serde(rename = "a", default)]
    pub attributes: Option<String>,
    #[serde(rename = "k", default)]
    pub key: Option<String>,
    /// User that shared this node with the account (incoming shares only).
    #[serde(rename = "su", default)]
    pub sharing_user: Option<String>,
    /// Share key of an incoming share, wrapped under the master key.
    #[serde(rename = "sk", default)]
    pub sharing_key: Option<String>,
}

/// Shared key of a subtree, wrapped under the master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedKeyEntry {
    #[serde(rename = "h")]
    pub owner_node_id: NodeId,
    #[serde(rename = "k")]
    pub wrapped_key: String,
}

/// Response to a tree fetch: all nodes plus the shared keys they may reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodesResponse {
    #[serde(rename = "f")]
    pub nodes: Vec<RawNode>,
    #[serde(rename = "ok", default)]
    pub shared_keys: Vec<SharedKeyEntry>,
}

#[inline]
pub fn datetime_from_epoch(seconds: i64) -> Result<DateTimeUtc> {
    match Utc.timestamp_opt(seconds, 0).single() {
        Some(value) => Ok(value),
        None => bail!("timestamp out of range: {seconds}"),
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<NodeId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|id| !id.is_empty()).map(NodeId))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_node_from_json() {
        let json = r#"{"h":"abcdEFGH","p":"rootROOT","u":"user1234567","t":0,"s":42,
            "ts":1600000000,"a":"AAAA","k":"user1234567:BBBB","extra":1}"#;
        let node: RawNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.id.as_str(), "abcdEFGH");
        assert_eq!(node.parent_id, Some(NodeId::from("rootROOT")));
        assert_eq!(node.node_type, NodeType::File);
        assert_eq!(node.size, Some(42));
        assert_eq!(node.sharing_key, None);
    }

    #[test]
    fn root_node_has_no_parent() {
        let json = r#"{"h":"rootROOT","p":"","t":2,"ts":0}"#;
        let node: RawNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.parent_id, None);
        assert_eq!(node.node_type, NodeType::Root);
        assert!(!node.node_type.is_keyed());
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let json = r#"{"h":"x","t":9,"ts":0}"#;
        serde_json::from_str::<RawNode>(json).unwrap_err();
    }

    #[test]
    fn nodes_response_without_shared_keys() {
        let response: NodesResponse = serde_json::from_str(r#"{"f":[]}"#).unwrap();
        assert!(response.nodes.is_empty());
        assert!(response.shared_keys.is_empty());
    }
}
