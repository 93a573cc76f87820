//! Tagged statistics tree

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Untyped view of a statistics record used by the structural merge.
///
/// Leaves and mapping nodes are distinct variants; only two `Node`s are ever
/// merged recursively, every other pairing is an overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatTree {
    Absent,
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<StatTree>),
    Node(BTreeMap<String, StatTree>),
}

impl Default for StatTree {
    fn default() -> Self {
        StatTree::Node(BTreeMap::new())
    }
}

impl StatTree {
    /// Convert a typed record into a tree
    pub fn from_model<T: Serialize>(model: &T) -> Result<Self> {
        let value = serde_json::to_value(model)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Convert the tree back into a typed record
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn as_node(&self) -> Option<&BTreeMap<String, StatTree>> {
        match self {
            StatTree::Node(children) => Some(children),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&StatTree> {
        self.as_node().and_then(|children| children.get(key))
    }

    pub fn is_node(&self) -> bool {
        matches!(self, StatTree::Node(_))
    }
}
