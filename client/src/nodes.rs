use {
    crate::config::Config,
    anyhow::{Context, Result},
    nodecrypt_protocol::{
        NodeId, NodeType, NodesResponse, encoding,
        endpoints::to_request,
        link::{LinkKind, PublicLink},
    },
    nodecrypt_sdk::{NodeState, NodeTree, ResolveContext, share_subtree, tree::public_file_key},
    std::path::Path,
    tracing::{info, warn},
};

/// Reads a node listing saved from the server.
pub fn load_listing(path: &Path) -> Result<NodesResponse> {
    serde_json::from_str(&fs_err::read_to_string(path)?)
        .with_context(|| format!("invalid node listing in {}", path.display()))
}

pub fn resolve(
    config: &Config,
    response: NodesResponse,
    link: Option<&PublicLink>,
) -> Result<NodeTree> {
    let tree = if let Some(link) = link {
        NodeTree::from_public_folder(response, link)?
    } else {
        let ctx = ResolveContext::account(config.master_key()?, config.user_handle.as_deref());
        NodeTree::from_response(response, &ctx)
    };
    let inaccessible = tree.inaccessible().count();
    if inaccessible > 0 {
        warn!(inaccessible, "some nodes could not be decrypted");
    }
    Ok(tree)
}

/// Paths of all resolved nodes, sorted.
pub fn list(tree: &NodeTree) -> Vec<String> {
    let mut lines: Vec<_> = tree
        .iter()
        .filter(|node| matches!(node.state, NodeState::Resolved { .. }))
        .filter_map(|node| {
            let path = tree.path_of(&node.id)?;
            Some(match node.node_type {
                NodeType::Folder => format!("{path}/"),
                NodeType::File => format!("{path} ({} bytes)", node.size.unwrap_or_default()),
                NodeType::Root | NodeType::Inbox | NodeType::Trash => path,
            })
        })
        .collect();
    lines.sort();
    lines
}

pub fn print_tree(tree: &NodeTree, all: bool) {
    for line in list(tree) {
        info!("{line}");
    }
    if all {
        for node in tree.inaccessible() {
            if let Some(err) = node.error() {
                info!("{} ({:?}): {err}", node.id, node.node_type);
            }
        }
    }
}

/// Builds the share request for `node_id` and returns it as JSON.
pub fn share(config: &Config, tree: &NodeTree, node_id: &str) -> Result<String> {
    let share = share_subtree(tree, &NodeId::from(node_id), config.master_key()?)?;
    let request = to_request(&share.to_command())?;
    if share.reused {
        info!("folder is already shared, reusing its share key");
    }
    info!(entries = share.bundle.entries.len(), "share prepared");
    Ok(serde_json::to_string_pretty(&request)?)
}

pub fn describe_link(link: &PublicLink) -> Result<()> {
    match link.kind {
        LinkKind::File => {
            let material = public_file_key(link)?;
            info!("file {}", link.id);
            info!("nonce: {}", hex::encode(material.nonce));
            info!("mac: {}", hex::encode(material.mac));
        }
        LinkKind::Folder => {
            info!("folder {}", link.id);
            info!("key: {}", encoding::encode(&link.key));
        }
    }
    Ok(())
}
