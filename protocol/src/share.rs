use {
    crate::{AesKey, NodeId, encoding},
    serde::{Serialize, Serializer, ser::SerializeSeq},
};

/// A node key wrapped under a subtree's shared key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEntry {
    pub node_id: NodeId,
    pub wrapped_key: Vec<u8>,
}

/// Key material granting access to a subtree.
///
/// Serializes into the compact wire form
/// `[[rootId], [nodeId, ...], [0, index, wrappedKey, ...]]`.
/// The shared key itself is never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareBundle {
    pub root_id: NodeId,
    pub shared_key: AesKey,
    pub entries: Vec<ShareEntry>,
}

impl ShareBundle {
    #[must_use]
    #[inline]
    pub fn new(root_id: NodeId, shared_key: AesKey) -> Self {
        Self {
            root_id,
            shared_key,
            entries: Vec::new(),
        }
    }

    #[must_use]
    #[inline]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.entries.iter().any(|entry| &entry.node_id == node_id)
    }
}

struct WrappedKeys<'a>(&'a [ShareEntry]);

impl Serialize for WrappedKeys<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len().saturating_mul(3)))?;
        for (index, entry) in self.0.iter().enumerate() {
            seq.serialize_element(&0)?;
            seq.serialize_element(&index)?;
            seq.serialize_element(&encoding::encode(&entry.wrapped_key))?;
        }
        seq.end()
    }
}

impl Serialize for ShareBundle {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ids: Vec<&NodeId> = self.entries.iter().map(|entry| &entry.node_id).collect();
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&[&self.root_id])?;
        seq.serialize_element(&ids)?;
        seq.serialize_element(&WrappedKeys(&self.entries))?;
        seq.end()
    }
}
