use {
    crate::{NodeId, NodeType, ShareBundle},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

pub trait Command {
    const ACTION: &'static str;
}
macro_rules! command {
    ($request:ty, $action:literal) => {
        impl Command for $request {
            const ACTION: &'static str = $action;
        }
    };
}

/// Serializes a command into a request object, including its action tag `a`.
#[inline]
pub fn to_request<C: Command + Serialize>(command: &C) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(command)?;
    if let Value::Object(map) = &mut value {
        map.insert("a".to_owned(), Value::String(C::ACTION.to_owned()));
    }
    Ok(value)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareOption {
    pub r: u8,
    pub u: String,
}

/// Grants access to a subtree.
#[derive(Debug, Clone, Serialize)]
pub struct ShareNode {
    #[serde(rename = "n")]
    pub node_id: NodeId,
    /// Node id repeated twice, wrapped under the master key.
    #[serde(rename = "ha")]
    pub handle_auth: String,
    #[serde(rename = "s")]
    pub options: Vec<ShareOption>,
    /// Absent when the subtree was already shared and its keys are known to the server.
    #[serde(rename = "cr", skip_serializing_if = "Option::is_none")]
    pub bundle: Option<ShareBundle>,
    /// Shared key wrapped under the master key.
    #[serde(rename = "ok")]
    pub shared_key: String,
}
command!(ShareNode, "s2");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    /// Upload completion handle for files, a placeholder for folders.
    #[serde(rename = "h")]
    pub completion_handle: String,
    #[serde(rename = "t")]
    pub node_type: NodeType,
    #[serde(rename = "a")]
    pub attributes: String,
    #[serde(rename = "k")]
    pub key: String,
}

/// Creates nodes under a parent.
#[derive(Debug, Clone, Serialize)]
pub struct CreateNodes {
    #[serde(rename = "t")]
    pub parent_id: NodeId,
    #[serde(rename = "n")]
    pub nodes: Vec<NewNode>,
    /// Keys of the new nodes under the parent's shared key, if the parent is shared.
    #[serde(rename = "cr", skip_serializing_if = "Option::is_none")]
    pub bundle: Option<ShareBundle>,
}
command!(CreateNodes, "p");

/// Replaces the encrypted attributes of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAttributes {
    #[serde(rename = "n")]
    pub node_id: NodeId,
    #[serde(rename = "attr")]
    pub attributes: String,
}
command!(SetAttributes, "a");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tag_is_added() {
        let request = to_request(&SetAttributes {
            node_id: NodeId::from("abcdEFGH"),
            attributes: "xyz".to_owned(),
        })
        .unwrap();
        assert_eq!(
            request,
            serde_json::json!({"a": "a", "n": "abcdEFGH", "attr": "xyz"})
        );
    }

    #[test]
    fn create_nodes_without_share() {
        let request = to_request(&CreateNodes {
            parent_id: NodeId::from("parent00"),
            nodes: vec![NewNode {
                completion_handle: "xxxxxxxx".to_owned(),
                node_type: NodeType::Folder,
                attributes: "attrs".to_owned(),
                key: "key".to_owned(),
            }],
            bundle: None,
        })
        .unwrap();
        assert_eq!(
            request,
            serde_json::json!({
                "a": "p",
                "t": "parent00",
                "n": [{"h": "xxxxxxxx", "t": 1, "a": "attrs", "k": "key"}],
            })
        );
    }
}
