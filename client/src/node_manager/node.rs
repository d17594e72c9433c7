//! Node entries of the pool and their JSON forms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Credentials a node may require.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAuth {
    /// Sent as `Authorization: Bearer <jwt>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    /// HTTP basic auth `(name, password)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth_name_pwd: Option<(String, String)>,
}

impl fmt::Debug for NodeAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeAuth")
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .field(
                "basic_auth_name_pwd",
                &self.basic_auth_name_pwd.as_ref().map(|(name, _)| (name, "<redacted>")),
            )
            .finish()
    }
}

/// A node of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<NodeAuth>,
    #[serde(default)]
    pub disabled: bool,
}

impl Node {
    /// Parses and normalizes `url` (no trailing slash).
    pub fn new(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::Validation(format!("invalid node url `{url}`: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Validation(format!(
                "node url `{url}` must use http or https"
            )));
        }
        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
            auth: None,
            disabled: false,
        })
    }

    pub fn with_auth(mut self, auth: NodeAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Joins an API path onto the node url.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

/// How a binding names a node: a bare URL or a full entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeDto {
    Url(String),
    Node(Node),
}

impl NodeDto {
    pub fn into_node(self) -> Result<Node> {
        match self {
            NodeDto::Url(url) => Node::new(&url),
            NodeDto::Node(node) => {
                let normalized = Node::new(&node.url)?;
                Ok(Node {
                    url: normalized.url,
                    ..node
                })
            }
        }
    }
}

impl From<Node> for NodeDto {
    fn from(node: Node) -> Self {
        NodeDto::Node(node)
    }
}

/// Health of a node as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Not checked yet.
    Unknown,
    Synced,
    Unsynced,
}
