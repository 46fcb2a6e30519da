use {
    crate::{
        Error,
        crypto::Cipher,
        tree::{NodeKeys, NodeTree},
    },
    nodecrypt_protocol::{
        AesKey, NodeId, NodeType, ShareBundle, ShareEntry, encoding,
        endpoints::{ShareNode, ShareOption},
    },
    tracing::{debug, instrument, warn},
};

/// Key material that grants access to a subtree.
#[derive(Debug, Clone)]
pub struct Share {
    pub bundle: ShareBundle,
    /// Shared key wrapped under the master key.
    pub wrapped_shared_key: Vec<u8>,
    /// The root id twice, wrapped under the master key.
    pub handle_auth: Vec<u8>,
    /// The root already had a shared key; its subtree is known to the server.
    pub reused: bool,
}

impl Share {
    /// Share request granting export access.
    #[must_use]
    #[inline]
    pub fn to_command(&self) -> ShareNode {
        ShareNode {
            node_id: self.bundle.root_id.clone(),
            handle_auth: encoding::encode(&self.handle_auth),
            options: vec![ShareOption {
                r: 0,
                u: "EXP".to_owned(),
            }],
            bundle: (!self.reused).then(|| self.bundle.clone()),
            shared_key: encoding::encode(&self.wrapped_shared_key),
        }
    }
}

/// Wraps the keys of `root_id` and its subtree under the root's shared key.
///
/// A fresh shared key is minted unless the root already has one. Descendants
/// that are share roots themselves, or hang below one, are left out. Descendants
/// without a resolved key are skipped.
#[instrument(skip_all, fields(%root_id))]
#[inline(never)]
pub fn share_subtree(
    tree: &NodeTree,
    root_id: &NodeId,
    master_key: &AesKey,
) -> Result<Share, Error> {
    let root = tree.get(root_id).ok_or_else(|| Error::MalformedKey {
        reason: format!("node {root_id} is not in the tree"),
    })?;
    if root.node_type != NodeType::Folder {
        return Err(Error::Unsupported);
    }
    let root_keys = root
        .keys()
        .ok_or_else(|| root.error().cloned().unwrap_or(Error::Unsupported))?;
    let existing = root.shared_key().cloned();
    let reused = existing.is_some();
    let shared_key = existing.unwrap_or_else(AesKey::generate);
    let cipher = Cipher::new(&shared_key);

    let mut bundle = ShareBundle::new(root_id.clone(), shared_key.clone());
    bundle.entries.push(wrap_entry(&cipher, root_id, root_keys)?);
    for node in tree.descendants(root_id) {
        let below_other_share = tree
            .ancestors(&node.id)
            .iter()
            .take_while(|ancestor| &ancestor.id != root_id)
            .any(|ancestor| tree.is_share_root(&ancestor.id));
        if below_other_share || tree.is_share_root(&node.id) {
            debug!(id = %node.id, "skipping separately shared node");
            continue;
        }
        let Some(keys) = node.keys() else {
            warn!(id = %node.id, "skipping inaccessible node");
            continue;
        };
        bundle.entries.push(wrap_entry(&cipher, &node.id, keys)?);
    }

    let master = Cipher::new(master_key);
    let wrapped_shared_key = master.wrap_key(shared_key.as_bytes())?;
    let handle_auth = master.wrap_key(format!("{root_id}{root_id}").as_bytes())?;
    debug!(entries = bundle.entries.len(), reused, "share prepared");
    Ok(Share {
        bundle,
        wrapped_shared_key,
        handle_auth,
        reused,
    })
}

fn wrap_entry(cipher: &Cipher, node_id: &NodeId, keys: &NodeKeys) -> Result<ShareEntry, Error> {
    Ok(ShareEntry {
        node_id: node_id.clone(),
        wrapped_key: cipher.wrap_key(&keys.full_key())?,
    })
}
