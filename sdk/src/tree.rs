//! Key hierarchy resolution over a fetched node tree.
//!
//! Resolution runs in two passes over the raw nodes: [`harvest_shared_keys`] collects
//! share keys of incoming shares, then [`resolve_node`] decrypts every node.
//! Nodes that can't be decrypted stay in the tree as [`NodeState::Inaccessible`].

use {
    crate::{
        Error,
        crypto::{Cipher, FULL_KEY_LENGTH, FileKeyMaterial},
    },
    nodecrypt_protocol::{
        AesKey, Attributes, DateTimeUtc, NodeId, NodeKeyBlob, NodeType, NodesResponse, RawNode,
        SharedKeyEntry, credentials::KEY_LENGTH, datetime_from_epoch, encoding,
        link::{LinkKind, PublicLink},
    },
    std::collections::{HashMap, HashSet},
    tracing::{debug, instrument, warn},
};

/// How the account reached a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Account,
    /// Node of a public folder link; keys derive from the link key.
    PublicLink { share_id: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKeys {
    File(FileKeyMaterial),
    Folder {
        key: AesKey,
        /// Key of the share this folder belongs to, if any.
        shared_key: Option<AesKey>,
    },
}

impl NodeKeys {
    /// Key that encrypts the node's attributes (and content, for files).
    #[must_use]
    #[inline]
    pub fn key(&self) -> &AesKey {
        match self {
            Self::File(material) => &material.content_key,
            Self::Folder { key, .. } => key,
        }
    }

    /// The node's own key as stored in the hierarchy: 32 bytes for files, 16 for folders.
    #[must_use]
    #[inline]
    pub fn full_key(&self) -> Vec<u8> {
        match self {
            Self::File(material) => material.compose().to_vec(),
            Self::Folder { key, .. } => key.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Cloud drive root, inbox and trash carry neither keys nor names.
    Keyless,
    Resolved {
        keys: NodeKeys,
        attributes: Attributes,
        modified: Option<DateTimeUtc>,
    },
    Inaccessible(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub node_type: NodeType,
    pub size: Option<u64>,
    pub owner: Option<String>,
    pub created_at: Option<DateTimeUtc>,
    pub access: Access,
    pub state: NodeState,
}

impl Node {
    #[must_use]
    #[inline]
    pub fn name(&self) -> Option<&str> {
        match &self.state {
            NodeState::Resolved { attributes, .. } => Some(&attributes.name),
            NodeState::Keyless | NodeState::Inaccessible(_) => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn keys(&self) -> Option<&NodeKeys> {
        match &self.state {
            NodeState::Resolved { keys, .. } => Some(keys),
            NodeState::Keyless | NodeState::Inaccessible(_) => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn attributes(&self) -> Option<&Attributes> {
        match &self.state {
            NodeState::Resolved { attributes, .. } => Some(attributes),
            NodeState::Keyless | NodeState::Inaccessible(_) => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn file_key(&self) -> Option<&FileKeyMaterial> {
        match self.keys() {
            Some(NodeKeys::File(material)) => Some(material),
            Some(NodeKeys::Folder { .. }) | None => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn shared_key(&self) -> Option<&AesKey> {
        match self.keys() {
            Some(NodeKeys::Folder { shared_key, .. }) => shared_key.as_ref(),
            Some(NodeKeys::File(_)) | None => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn modification_time(&self) -> Option<DateTimeUtc> {
        match &self.state {
            NodeState::Resolved { modified, .. } => *modified,
            NodeState::Keyless | NodeState::Inaccessible(_) => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            NodeState::Inaccessible(err) => Some(err),
            NodeState::Keyless | NodeState::Resolved { .. } => None,
        }
    }

    #[must_use]
    #[inline]
    pub fn is_accessible(&self) -> bool {
        !matches!(self.state, NodeState::Inaccessible(_))
    }
}

/// Keys and identity the nodes are resolved with.
#[derive(Debug, Clone)]
pub struct ResolveContext<'a> {
    /// Account master key, or the folder key of a public link.
    pub master_key: &'a AesKey,
    /// Handle of the account. Node keys under this handle are wrapped under the master key.
    pub user_handle: Option<&'a str>,
    pub access: Access,
}

impl<'a> ResolveContext<'a> {
    #[must_use]
    #[inline]
    pub fn account(master_key: &'a AesKey, user_handle: Option<&'a str>) -> Self {
        Self {
            master_key,
            user_handle,
            access: Access::Account,
        }
    }

    /// Key that unwraps a node key under `handle`, plus the share key if one was used.
    fn wrapping_key(
        &self,
        handle: Option<&str>,
        shared_keys: &[SharedKeyEntry],
    ) -> Result<(AesKey, Option<AesKey>), Error> {
        let handle = match (&self.access, handle) {
            (Access::PublicLink { .. }, _) | (Access::Account, None) => {
                return Ok((self.master_key.clone(), None));
            }
            (Access::Account, Some(handle)) => handle,
        };
        if self.user_handle == Some(handle) {
            return Ok((self.master_key.clone(), None));
        }
        match find_shared_key(shared_keys, handle) {
            Some(entry) => {
                let key = unwrap_shared_key(entry, self.master_key)?;
                Ok((key.clone(), Some(key)))
            }
            // Without a known account handle, a foreign handle may still be the
            // owner's own one. A wrong key is caught by the attribute marker.
            None if self.user_handle.is_none() => Ok((self.master_key.clone(), None)),
            None => Err(Error::MissingSharedKey {
                handle: handle.to_owned(),
            }),
        }
    }
}

/// First pass: adds share keys carried by incoming share roots to `shared_keys`.
///
/// Entries already present win over later ones. Returns the number of added entries.
#[inline]
pub fn harvest_shared_keys(nodes: &[RawNode], shared_keys: &mut Vec<SharedKeyEntry>) -> usize {
    let mut added = 0_usize;
    for node in nodes {
        if let Some(sharing_key) = &node.sharing_key
            && find_shared_key(shared_keys, node.id.as_str()).is_none()
        {
            shared_keys.push(SharedKeyEntry {
                owner_node_id: node.id.clone(),
                wrapped_key: sharing_key.clone(),
            });
            added = added.saturating_add(1);
        }
    }
    added
}

/// Second pass: decrypts one node. Never fails; errors end up in [`NodeState::Inaccessible`].
#[inline]
pub fn resolve_node(
    raw: &RawNode,
    shared_keys: &[SharedKeyEntry],
    ctx: &ResolveContext<'_>,
) -> Node {
    let state = if raw.node_type.is_keyed() {
        match resolve_keys(raw, shared_keys, ctx) {
            Ok((keys, attributes)) => {
                let modified = attributes.modification_time().unwrap_or_else(|err| {
                    warn!(id = %raw.id, %err, "invalid fingerprint in node attributes");
                    None
                });
                NodeState::Resolved {
                    keys,
                    attributes,
                    modified,
                }
            }
            Err(err) => {
                warn!(id = %raw.id, %err, "node is inaccessible");
                NodeState::Inaccessible(err)
            }
        }
    } else {
        NodeState::Keyless
    };
    Node {
        id: raw.id.clone(),
        parent_id: raw.parent_id.clone(),
        node_type: raw.node_type,
        size: raw.size,
        owner: raw.owner.clone(),
        created_at: datetime_from_epoch(raw.created_at).ok(),
        access: ctx.access.clone(),
        state,
    }
}

fn resolve_keys(
    raw: &RawNode,
    shared_keys: &[SharedKeyEntry],
    ctx: &ResolveContext<'_>,
) -> Result<(NodeKeys, Attributes), Error> {
    let blob: NodeKeyBlob = raw
        .key
        .as_deref()
        .ok_or_else(|| Error::MalformedKey {
            reason: "missing node key".to_owned(),
        })?
        .parse()
        .map_err(Error::malformed)?;
    let (wrapping_key, share_key) = ctx.wrapping_key(blob.handle.as_deref(), shared_keys)?;
    let is_file = raw.node_type == NodeType::File;
    if blob.is_file_sized() != is_file {
        return Err(Error::KeyLength {
            actual: blob.wrapped.len(),
            expected: if is_file { FULL_KEY_LENGTH } else { KEY_LENGTH },
        });
    }
    let full_key = Cipher::new(&wrapping_key).unwrap_key(&blob.wrapped)?;

    let keys = if is_file {
        NodeKeys::File(FileKeyMaterial::split(&full_key)?)
    } else {
        let key = AesKey::try_from(full_key.as_slice()).map_err(|_| Error::KeyLength {
            actual: full_key.len(),
            expected: KEY_LENGTH,
        })?;
        let shared_key = match share_key {
            Some(key) => Some(key),
            // A share root owned by the account lists its key under its own id.
            None if ctx.access == Access::Account => {
                find_shared_key(shared_keys, raw.id.as_str())
                    .map(|entry| unwrap_shared_key(entry, ctx.master_key))
                    .transpose()?
            }
            None => None,
        };
        NodeKeys::Folder { key, shared_key }
    };

    let encrypted = raw.attributes.as_deref().ok_or_else(|| Error::Attributes {
        reason: "missing attributes".to_owned(),
    })?;
    let attributes = Cipher::new(keys.key()).decrypt_attributes(encrypted)?;
    Ok((keys, attributes))
}

fn find_shared_key<'a>(shared_keys: &'a [SharedKeyEntry], id: &str) -> Option<&'a SharedKeyEntry> {
    shared_keys
        .iter()
        .find(|entry| entry.owner_node_id.as_str() == id)
}

fn unwrap_shared_key(entry: &SharedKeyEntry, master_key: &AesKey) -> Result<AesKey, Error> {
    let wrapped = encoding::decode(&entry.wrapped_key).map_err(Error::malformed)?;
    Cipher::new(master_key).unwrap_aes_key(&wrapped)
}

/// Key material of a file shared by a public file link.
#[inline]
pub fn public_file_key(link: &PublicLink) -> Result<FileKeyMaterial, Error> {
    if link.kind != LinkKind::File {
        return Err(Error::Unsupported);
    }
    FileKeyMaterial::split(&link.key)
}

/// Resolved nodes, indexed by id. Parent and child relations are looked up by id.
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    shared_keys: Vec<SharedKeyEntry>,
}

impl NodeTree {
    /// Resolves a tree fetched for the account.
    #[instrument(skip_all, fields(nodes = response.nodes.len()))]
    #[inline(never)]
    pub fn from_response(response: NodesResponse, ctx: &ResolveContext<'_>) -> Self {
        let NodesResponse {
            nodes: raw_nodes,
            mut shared_keys,
        } = response;
        let harvested = harvest_shared_keys(&raw_nodes, &mut shared_keys);
        let mut tree = Self::default();
        for raw in &raw_nodes {
            let node = resolve_node(raw, &shared_keys, ctx);
            tree.insert(node);
        }
        tree.shared_keys = shared_keys;
        debug!(
            harvested,
            inaccessible = tree.inaccessible().count(),
            "node tree resolved"
        );
        tree
    }

    /// Resolves a tree fetched through a public folder link.
    #[inline]
    pub fn from_public_folder(response: NodesResponse, link: &PublicLink) -> Result<Self, Error> {
        if link.kind != LinkKind::Folder {
            return Err(Error::Unsupported);
        }
        let key = AesKey::try_from(link.key.as_slice()).map_err(|_| Error::KeyLength {
            actual: link.key.len(),
            expected: KEY_LENGTH,
        })?;
        let ctx = ResolveContext {
            master_key: &key,
            user_handle: None,
            access: Access::PublicLink {
                share_id: link.id.clone(),
            },
        };
        Ok(Self::from_response(response, &ctx))
    }

    fn insert(&mut self, node: Node) {
        // Duplicate ids: first wins, like shared keys.
        if self.index.contains_key(&node.id) {
            warn!(id = %node.id, "duplicate node in tree");
            return;
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    #[must_use]
    #[inline]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.index.get(id).and_then(|&index| self.nodes.get(index))
    }

    #[must_use]
    #[inline]
    pub fn shared_keys(&self) -> &[SharedKeyEntry] {
        &self.shared_keys
    }

    /// Whether the node is the root of a share of its own.
    #[must_use]
    #[inline]
    pub fn is_share_root(&self, id: &NodeId) -> bool {
        find_shared_key(&self.shared_keys, id.as_str()).is_some()
    }

    #[inline]
    pub fn inaccessible(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_accessible())
    }

    /// Nodes without a parent in this tree.
    #[inline]
    pub fn top_level(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| {
            node.parent_id
                .as_ref()
                .is_none_or(|parent| !self.index.contains_key(parent))
        })
    }

    #[inline]
    pub fn children<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.parent_id.as_ref() == Some(id))
    }

    /// Parent first, top-level node last.
    #[must_use]
    #[inline]
    pub fn ancestors(&self, id: &NodeId) -> Vec<&Node> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.get(id);
        while let Some(parent) = current
            .and_then(|node| node.parent_id.as_ref())
            .and_then(|parent_id| self.get(parent_id))
        {
            if !seen.insert(&parent.id) {
                warn!(id = %id, "cycle in node tree");
                break;
            }
            ancestors.push(parent);
            current = Some(parent);
        }
        ancestors
    }

    /// All nodes whose parent chain leads to `id`, in tree order.
    #[must_use]
    #[inline]
    pub fn descendants(&self, id: &NodeId) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| {
                self.ancestors(&node.id)
                    .iter()
                    .any(|ancestor| &ancestor.id == id)
            })
            .collect()
    }

    /// Slash-separated names from the top-level node down to `id`.
    ///
    /// Keyless roots contribute no component. `None` if a name on the way is unknown.
    #[must_use]
    #[inline]
    pub fn path_of(&self, id: &NodeId) -> Option<String> {
        let node = self.get(id)?;
        let mut chain = self.ancestors(id);
        chain.reverse();
        chain.push(node);
        let mut components = Vec::with_capacity(chain.len());
        for node in chain {
            match &node.state {
                NodeState::Keyless => {}
                NodeState::Resolved { attributes, .. } => {
                    components.push(attributes.name.as_str());
                }
                NodeState::Inaccessible(_) => return None,
            }
        }
        Some(components.join("/"))
    }

    /// Follows `path` by child names, starting at `start`.
    #[must_use]
    #[inline]
    pub fn find_by_path(&self, start: &NodeId, path: &str) -> Option<&Node> {
        let mut current = self.get(start)?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = self
                .children(&current.id)
                .find(|child| child.name() == Some(component))?;
        }
        Some(current)
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "test")]
pub(crate) mod tests {
    use super::*;

    pub(crate) const USER: &str = "user0000000";

    /// Builds raw nodes the way the server would send them.
    pub(crate) struct Fixture {
        pub master_key: AesKey,
        pub nodes: Vec<RawNode>,
        pub shared_keys: Vec<SharedKeyEntry>,
    }

    impl Fixture {
        pub fn new() -> Self {
            let mut fixture = Self {
                master_key: AesKey::from_bytes([0x11; 16]),
                nodes: Vec::new(),
                shared_keys: Vec::new(),
            };
            fixture.nodes.push(RawNode {
                id: NodeId::from("root0000"),
                parent_id: None,
                owner: Some(USER.to_owned()),
                node_type: NodeType::Root,
                size: None,
                created_at: 1_600_000_000,
                attributes: None,
                key: None,
                sharing_user: None,
                sharing_key: None,
            });
            fixture
        }

        pub fn raw(
            &mut self,
            id: &str,
            parent: &str,
            node_type: NodeType,
            full_key: &[u8],
            name: &str,
            wrapping: Option<(&str, &AesKey)>,
        ) -> &mut RawNode {
            let (handle, wrapping_key) = wrapping.unwrap_or((USER, &self.master_key));
            let wrapped = Cipher::new(wrapping_key).wrap_key(full_key).unwrap();
            let attribute_key = if node_type == NodeType::File {
                FileKeyMaterial::split(full_key).unwrap().content_key
            } else {
                AesKey::try_from(full_key).unwrap()
            };
            let attributes = Cipher::new(&attribute_key)
                .encrypt_attributes(&Attributes::new(name, None))
                .unwrap();
            self.nodes.push(RawNode {
                id: NodeId::from(id),
                parent_id: Some(NodeId::from(parent)),
                owner: Some(USER.to_owned()),
                node_type,
                size: (node_type == NodeType::File).then_some(10),
                created_at: 1_600_000_000,
                attributes: Some(attributes),
                key: Some(format!("{handle}:{}", encoding::encode(&wrapped))),
                sharing_user: None,
                sharing_key: None,
            });
            self.nodes.last_mut().unwrap()
        }

        pub fn folder(&mut self, id: &str, parent: &str, key: &AesKey, name: &str) {
            self.raw(id, parent, NodeType::Folder, key.as_bytes(), name, None);
        }

        pub fn file(&mut self, id: &str, parent: &str, material: &FileKeyMaterial, name: &str) {
            self.raw(id, parent, NodeType::File, &material.compose(), name, None);
        }

        /// Registers a share key for `id` the way the server lists owned shares.
        pub fn share(&mut self, id: &str, key: &AesKey) {
            let wrapped = Cipher::new(&self.master_key).wrap_key(key.as_bytes()).unwrap();
            self.shared_keys.push(SharedKeyEntry {
                owner_node_id: NodeId::from(id),
                wrapped_key: encoding::encode(&wrapped),
            });
        }

        pub fn response(&self) -> NodesResponse {
            NodesResponse {
                nodes: self.nodes.clone(),
                shared_keys: self.shared_keys.clone(),
            }
        }

        pub fn tree(&self) -> NodeTree {
            NodeTree::from_response(
                self.response(),
                &ResolveContext::account(&self.master_key, Some(USER)),
            )
        }
    }

    fn material(byte: u8) -> FileKeyMaterial {
        let mut full_key = [0; FULL_KEY_LENGTH];
        for (i, b) in full_key.iter_mut().enumerate() {
            *b = byte.wrapping_add(u8::try_from(i).unwrap());
        }
        FileKeyMaterial::split(&full_key).unwrap()
    }

    #[test]
    fn file_under_folder_key() {
        let mut fixture = Fixture::new();
        let folder_key = AesKey::from_bytes([0x22; 16]);
        fixture.folder("folder01", "root0000", &folder_key, "Documents");
        let file_key = material(0x40);
        // File key wrapped under the folder's key, reached through the folder's share entry.
        fixture.share("folder01", &folder_key);
        fixture.raw(
            "file0001",
            "folder01",
            NodeType::File,
            &file_key.compose(),
            "report.pdf",
            Some(("folder01", &folder_key)),
        );

        let tree = fixture.tree();
        let file = tree.get(&NodeId::from("file0001")).unwrap();
        let resolved = file.file_key().unwrap();
        assert_eq!(resolved.nonce, [0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47]);
        assert_eq!(resolved.mac, [0x48, 0x49, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f]);
        assert_eq!(resolved.content_key.as_bytes()[0], 0x50);
        assert_eq!(resolved, &file_key);
        assert_eq!(file.name(), Some("report.pdf"));
        assert_eq!(file.shared_key(), None);

        let folder = tree.get(&NodeId::from("folder01")).unwrap();
        assert_eq!(folder.shared_key(), Some(&folder_key));
        assert!(tree.is_share_root(&folder.id));
        assert_eq!(tree.path_of(&file.id).as_deref(), Some("Documents/report.pdf"));
    }

    #[test]
    fn missing_shared_key_is_per_node() {
        let mut fixture = Fixture::new();
        fixture.folder("folder01", "root0000", &AesKey::from_bytes([1; 16]), "ok");
        let foreign = AesKey::from_bytes([2; 16]);
        fixture.raw(
            "file0001",
            "folder01",
            NodeType::File,
            &material(1).compose(),
            "hidden",
            Some(("unknown0", &foreign)),
        );
        fixture.raw("broken01", "root0000", NodeType::Folder, &[0; 16], "x", None).key =
            Some("no-separator".to_owned());

        let tree = fixture.tree();
        assert_eq!(tree.len(), 4);
        let file = tree.get(&NodeId::from("file0001")).unwrap();
        assert_eq!(
            file.error(),
            Some(&Error::MissingSharedKey {
                handle: "unknown0".to_owned()
            })
        );
        assert_eq!(file.name(), None);
        assert!(matches!(
            tree.get(&NodeId::from("broken01")).unwrap().error(),
            Some(Error::MalformedKey { .. })
        ));
        assert_eq!(tree.get(&NodeId::from("folder01")).unwrap().name(), Some("ok"));
        assert_eq!(tree.inaccessible().count(), 2);
        assert_eq!(tree.path_of(&file.id), None);
    }

    #[test]
    fn key_size_must_match_node_type() {
        let mut fixture = Fixture::new();
        let folder_key = AesKey::from_bytes([3; 16]);
        fixture.folder("folder01", "root0000", &folder_key, "ok");
        let wrapped = Cipher::new(&fixture.master_key)
            .wrap_key(folder_key.as_bytes())
            .unwrap();
        fixture.file("file0001", "folder01", &material(2), "short");
        fixture.nodes.last_mut().unwrap().key =
            Some(format!("{USER}:{}", encoding::encode(&wrapped)));

        let tree = fixture.tree();
        assert_eq!(
            tree.get(&NodeId::from("file0001")).unwrap().error(),
            Some(&Error::KeyLength {
                actual: KEY_LENGTH,
                expected: FULL_KEY_LENGTH,
            })
        );
        assert_eq!(tree.get(&NodeId::from("folder01")).unwrap().name(), Some("ok"));
    }

    #[test]
    fn unknown_handle_without_user_handle_tries_master_key() {
        let mut fixture = Fixture::new();
        fixture.folder("folder01", "root0000", &AesKey::from_bytes([1; 16]), "mine");
        let tree = NodeTree::from_response(
            fixture.response(),
            &ResolveContext::account(&fixture.master_key, None),
        );
        assert_eq!(tree.get(&NodeId::from("folder01")).unwrap().name(), Some("mine"));
    }

    #[test]
    fn wrong_master_key_is_detected() {
        let mut fixture = Fixture::new();
        fixture.folder("folder01", "root0000", &AesKey::from_bytes([1; 16]), "mine");
        let other = AesKey::from_bytes([0x99; 16]);
        let tree =
            NodeTree::from_response(fixture.response(), &ResolveContext::account(&other, None));
        assert!(matches!(
            tree.get(&NodeId::from("folder01")).unwrap().error(),
            Some(Error::Attributes { .. })
        ));
    }

    #[test]
    fn incoming_share_is_harvested() {
        let mut fixture = Fixture::new();
        let share_key = AesKey::from_bytes([0x33; 16]);
        let folder_key = AesKey::from_bytes([0x44; 16]);
        let wrapped_share = Cipher::new(&fixture.master_key)
            .wrap_key(share_key.as_bytes())
            .unwrap();
        let node = fixture.raw(
            "inshare1",
            "other000",
            NodeType::Folder,
            folder_key.as_bytes(),
            "From a friend",
            Some(("inshare1", &share_key)),
        );
        node.sharing_user = Some("friend00000".to_owned());
        node.sharing_key = Some(encoding::encode(&wrapped_share));
        fixture.raw(
            "file0001",
            "inshare1",
            NodeType::File,
            &material(7).compose(),
            "photo.jpg",
            Some(("inshare1", &share_key)),
        );

        let mut shared_keys = Vec::new();
        assert_eq!(harvest_shared_keys(&fixture.nodes, &mut shared_keys), 1);
        assert_eq!(harvest_shared_keys(&fixture.nodes, &mut shared_keys), 0);

        let tree = fixture.tree();
        assert_eq!(tree.shared_keys().len(), 1);
        let folder = tree.get(&NodeId::from("inshare1")).unwrap();
        assert_eq!(folder.name(), Some("From a friend"));
        assert_eq!(folder.shared_key(), Some(&share_key));
        assert_eq!(
            tree.get(&NodeId::from("file0001")).unwrap().name(),
            Some("photo.jpg")
        );
        assert_eq!(tree.top_level().count(), 2);
    }

    #[test]
    fn first_shared_key_wins() {
        let mut fixture = Fixture::new();
        let key = AesKey::from_bytes([5; 16]);
        fixture.share("folder01", &key);
        fixture.share("folder01", &AesKey::from_bytes([6; 16]));
        fixture.folder("folder01", "root0000", &AesKey::from_bytes([7; 16]), "shared");
        let tree = fixture.tree();
        assert_eq!(
            tree.get(&NodeId::from("folder01")).unwrap().shared_key(),
            Some(&key)
        );
    }

    #[test]
    fn navigation() {
        let mut fixture = Fixture::new();
        fixture.folder("a0000000", "root0000", &AesKey::from_bytes([1; 16]), "a");
        fixture.folder("b0000000", "a0000000", &AesKey::from_bytes([2; 16]), "b");
        fixture.file("c0000000", "b0000000", &material(3), "c.txt");
        fixture.file("d0000000", "root0000", &material(4), "d.txt");
        let tree = fixture.tree();

        let root = NodeId::from("root0000");
        let a = NodeId::from("a0000000");
        let c = NodeId::from("c0000000");
        assert_eq!(tree.children(&root).count(), 2);
        let ancestors: Vec<_> = tree.ancestors(&c).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ancestors, ["b0000000", "a0000000", "root0000"]);
        let descendants: Vec<_> = tree.descendants(&a).iter().map(|n| n.id.as_str()).collect();
        assert_eq!(descendants, ["b0000000", "c0000000"]);
        assert_eq!(tree.path_of(&c).as_deref(), Some("a/b/c.txt"));
        assert_eq!(tree.path_of(&root).as_deref(), Some(""));
        assert_eq!(tree.find_by_path(&root, "/a/b/c.txt").map(|n| &n.id), Some(&c));
        assert_eq!(tree.find_by_path(&root, "a/missing"), None);
        assert_eq!(tree.top_level().count(), 1);

        let created = tree.get(&c).unwrap().created_at.unwrap();
        assert_eq!(created.timestamp(), 1_600_000_000);
        assert_eq!(tree.get(&c).unwrap().access, Access::Account);
    }

    #[test]
    fn cycles_do_not_hang() {
        let mut fixture = Fixture::new();
        fixture.folder("a0000000", "b0000000", &AesKey::from_bytes([1; 16]), "a");
        fixture.folder("b0000000", "a0000000", &AesKey::from_bytes([2; 16]), "b");
        let tree = fixture.tree();
        assert_eq!(tree.ancestors(&NodeId::from("a0000000")).len(), 1);
        assert!(tree.descendants(&NodeId::from("root0000")).is_empty());
    }

    #[test]
    fn public_folder_link() {
        let link_key = AesKey::from_bytes([0x55; 16]);
        let mut fixture = Fixture::new();
        fixture.nodes.clear();
        fixture.master_key = link_key.clone();
        let handle = Some(("pub00000", &link_key));
        fixture
            .raw("pub00000", "", NodeType::Folder, link_key.as_bytes(), "Public", handle)
            .parent_id = None;
        let inner = AesKey::from_bytes([0x66; 16]);
        fixture.raw("sub00000", "pub00000", NodeType::Folder, inner.as_bytes(), "Inner", handle);

        let link: PublicLink = format!(
            "https://example.com/folder/pub00000#{}",
            link_key.display_unmasked()
        )
        .parse()
        .unwrap();
        let tree = NodeTree::from_public_folder(fixture.response(), &link).unwrap();
        let node = tree.get(&NodeId::from("sub00000")).unwrap();
        assert_eq!(node.name(), Some("Inner"));
        assert_eq!(
            node.access,
            Access::PublicLink {
                share_id: NodeId::from("pub00000")
            }
        );
        assert_eq!(tree.path_of(&node.id).as_deref(), Some("Public/Inner"));
    }

    #[test]
    fn public_file_link() {
        let material = material(9);
        let link: PublicLink = format!(
            "https://example.com/file/file0000#{}",
            encoding::encode(&material.compose())
        )
        .parse()
        .unwrap();
        assert_eq!(public_file_key(&link).unwrap(), material);
    }
}
