use serde::{Deserialize, Serialize};

/// Which way dependencies flow on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Upstream at the top, downstream below it.
    #[default]
    Down,
    /// Downstream at the top, upstream below it.
    Up,
}

/// Ordered path segments identifying an asset or op.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AssetKey {
    pub path: Vec<String>,
}

impl AssetKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: segments.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    pub name: String,
    pub location_name: String,
}

/// The group/repository/location triple a node is declared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_name: String,
    pub repository_name: String,
    pub repository_location_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDefinition {
    #[serde(default)]
    pub asset_key: Option<AssetKey>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub compute_kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub size_hint: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpDefinition {
    /// Handle path of the op inside its graph, outermost first.
    #[serde(default)]
    pub handle: Vec<String>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub size_hint: Option<Size>,
}

/// Group name used for ops, which are never declared in a named group.
pub const DEFAULT_GROUP_NAME: &str = "default";

/// Node payload handed over by the data-fetching layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeDefinition {
    Asset(AssetDefinition),
    Op(OpDefinition),
}

/// What graph building and layout need from a node payload.
pub trait GraphDefinition {
    /// Structured key, or `None` when the payload carries none.
    fn structured_key(&self) -> Option<&[String]>;
    fn group_info(&self) -> Option<GroupInfo>;
    fn size_hint(&self) -> Option<Size>;
    fn label(&self) -> String;
}

impl GraphDefinition for NodeDefinition {
    fn structured_key(&self) -> Option<&[String]> {
        match self {
            Self::Asset(asset) => asset.asset_key.as_ref().map(|key| key.path.as_slice()),
            Self::Op(op) if op.handle.is_empty() => None,
            Self::Op(op) => Some(op.handle.as_slice()),
        }
    }

    fn group_info(&self) -> Option<GroupInfo> {
        let (group_name, repository) = match self {
            Self::Asset(asset) => (asset.group_name.as_deref(), asset.repository.as_ref()),
            Self::Op(op) => (Some(DEFAULT_GROUP_NAME), op.repository.as_ref()),
        };
        let repository = repository?;
        Some(GroupInfo {
            group_name: group_name.unwrap_or(DEFAULT_GROUP_NAME).to_string(),
            repository_name: repository.name.clone(),
            repository_location_name: repository.location_name.clone(),
        })
    }

    fn size_hint(&self) -> Option<Size> {
        match self {
            Self::Asset(asset) => asset.size_hint,
            Self::Op(op) => op.size_hint,
        }
    }

    fn label(&self) -> String {
        self.structured_key()
            .and_then(|segments| segments.last())
            .cloned()
            .unwrap_or_default()
    }
}

/// A node record as delivered by the data layer, with its declared dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub definition: NodeDefinition,
    #[serde(default)]
    pub upstream: Vec<AssetKey>,
    #[serde(default)]
    pub downstream: Vec<AssetKey>,
}

impl RawNode {
    pub fn asset(path: &[&str]) -> Self {
        Self {
            definition: NodeDefinition::Asset(AssetDefinition {
                asset_key: Some(AssetKey::new(path.iter().copied())),
                group_name: None,
                repository: None,
                compute_kind: None,
                description: None,
                size_hint: None,
            }),
            upstream: Vec::new(),
            downstream: Vec::new(),
        }
    }

    pub fn in_group(mut self, group: &str, repository: &str, location: &str) -> Self {
        let repository = RepositoryRef {
            name: repository.to_string(),
            location_name: location.to_string(),
        };
        match &mut self.definition {
            NodeDefinition::Asset(asset) => {
                asset.group_name = Some(group.to_string());
                asset.repository = Some(repository);
            }
            NodeDefinition::Op(op) => op.repository = Some(repository),
        }
        self
    }

    pub fn with_downstream(mut self, path: &[&str]) -> Self {
        self.downstream.push(AssetKey::new(path.iter().copied()));
        self
    }

    pub fn with_upstream(mut self, path: &[&str]) -> Self {
        self.upstream.push(AssetKey::new(path.iter().copied()));
        self
    }
}
