//! Encryption of nodes created or renamed by the client.

use {
    crate::{
        Error,
        crypto::{Cipher, FileKeyMaterial},
        tree::{Node, NodeKeys},
    },
    nodecrypt_protocol::{
        AesKey, Attributes, Fingerprint, NodeId, NodeType, ShareBundle, ShareEntry, encoding,
        endpoints::{CreateNodes, NewNode, SetAttributes},
    },
};

/// Completion handle the server expects for new folders.
pub const FOLDER_PLACEHOLDER_HANDLE: &str = "xxxxxxxx";

/// A node creation request together with the keys of the new node.
#[derive(Debug, Clone)]
pub struct Sealed {
    pub command: CreateNodes,
    pub keys: NodeKeys,
}

/// Seals an uploaded file under `parent`.
///
/// `material` must carry the MAC computed while encrypting the content.
#[inline]
pub fn seal_file(
    parent: &Node,
    name: &str,
    material: &FileKeyMaterial,
    fingerprint: Option<&Fingerprint>,
    completion_handle: &str,
    master_key: &AesKey,
) -> Result<Sealed, Error> {
    let attributes = Attributes::new(name, fingerprint);
    seal(
        parent,
        NodeType::File,
        &attributes,
        NodeKeys::File(material.clone()),
        completion_handle,
        master_key,
    )
}

/// Seals a new folder under `parent` with a freshly generated folder key.
#[inline]
pub fn seal_folder(parent: &Node, name: &str, master_key: &AesKey) -> Result<Sealed, Error> {
    let keys = NodeKeys::Folder {
        key: AesKey::generate(),
        shared_key: parent.shared_key().cloned(),
    };
    seal(
        parent,
        NodeType::Folder,
        &Attributes::new(name, None),
        keys,
        FOLDER_PLACEHOLDER_HANDLE,
        master_key,
    )
}

fn seal(
    parent: &Node,
    node_type: NodeType,
    attributes: &Attributes,
    keys: NodeKeys,
    completion_handle: &str,
    master_key: &AesKey,
) -> Result<Sealed, Error> {
    if matches!(parent.node_type, NodeType::File) || !parent.is_accessible() {
        return Err(Error::Unsupported);
    }
    let full_key = keys.full_key();
    let encrypted_attributes = Cipher::new(keys.key()).encrypt_attributes(attributes)?;
    let wrapped = Cipher::new(master_key).wrap_key(&full_key)?;

    // Inside a shared folder the new key must also be readable with the share key.
    let bundle = match parent.shared_key() {
        Some(shared_key) => {
            let mut bundle = ShareBundle::new(parent.id.clone(), shared_key.clone());
            bundle.entries.push(ShareEntry {
                node_id: NodeId::from(completion_handle),
                wrapped_key: Cipher::new(shared_key).wrap_key(&full_key)?,
            });
            Some(bundle)
        }
        None => None,
    };

    Ok(Sealed {
        command: CreateNodes {
            parent_id: parent.id.clone(),
            nodes: vec![NewNode {
                completion_handle: completion_handle.to_owned(),
                node_type,
                attributes: encrypted_attributes,
                key: encoding::encode(&wrapped),
            }],
            bundle,
        },
        keys,
    })
}

/// Re-encrypts the attributes of `node` under a new name, keeping its fingerprint.
#[inline]
pub fn rename(node: &Node, new_name: &str) -> Result<SetAttributes, Error> {
    let (Some(keys), Some(attributes)) = (node.keys(), node.attributes()) else {
        return Err(node.error().cloned().unwrap_or(Error::Unsupported));
    };
    let attributes = Cipher::new(keys.key()).encrypt_attributes(&attributes.renamed(new_name))?;
    Ok(SetAttributes {
        node_id: node.id.clone(),
        attributes,
    })
}
