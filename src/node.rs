//! The opaque value tree stored at a path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar payload of a leaf node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// Presence leaf with no value (YANG `empty`).
    Empty,
}

/// Immutable, possibly-composite value at a [`PathAddress`].
///
/// The broker treats nodes as opaque beyond structural equality and child
/// lookup; interpretation against a schema happens in other layers.
///
/// [`PathAddress`]: crate::path::PathAddress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataNode {
    Leaf(ScalarValue),
    Container(BTreeMap<String, DataNode>),
}

impl DataNode {
    pub fn leaf(value: impl Into<ScalarValue>) -> Self {
        DataNode::Leaf(value.into())
    }

    /// An empty container node.
    pub fn container() -> Self {
        DataNode::Container(BTreeMap::new())
    }

    pub fn is_container(&self) -> bool {
        matches!(self, DataNode::Container(_))
    }

    /// Look up a direct child by name. Leaves have no children.
    pub fn child(&self, name: &str) -> Option<&DataNode> {
        match self {
            DataNode::Container(children) => children.get(name),
            DataNode::Leaf(_) => None,
        }
    }

    /// Insert or replace a child, consuming and returning the node.
    /// A leaf is returned unchanged; only containers hold children.
    pub fn with_child(mut self, name: impl Into<String>, node: DataNode) -> Self {
        if let DataNode::Container(children) = &mut self {
            children.insert(name.into(), node);
        }
        self
    }

    /// Overlay `other` onto this node: containers merge recursively,
    /// anything else is replaced by `other`.
    pub fn merged_with(self, other: DataNode) -> DataNode {
        match (self, other) {
            (DataNode::Container(mut base), DataNode::Container(overlay)) => {
                for (name, node) in overlay {
                    let merged = match base.remove(&name) {
                        Some(existing) => existing.merged_with(node),
                        None => node,
                    };
                    base.insert(name, merged);
                }
                DataNode::Container(base)
            }
            (_, other) => other,
        }
    }

    /// Decode a node from the JSON shape protocol codecs produce.
    ///
    /// Floats have no leaf representation here and are rejected by returning
    /// `None`; the broker never fabricates values.
    pub fn from_json(value: &serde_json::Value) -> Option<DataNode> {
        match value {
            serde_json::Value::Null => Some(DataNode::Leaf(ScalarValue::Empty)),
            serde_json::Value::Bool(b) => Some(DataNode::Leaf(ScalarValue::Bool(*b))),
            serde_json::Value::Number(n) => n.as_i64().map(|i| DataNode::Leaf(ScalarValue::Int(i))),
            serde_json::Value::String(s) => Some(DataNode::Leaf(ScalarValue::Str(s.clone()))),
            serde_json::Value::Object(map) => {
                let mut children = BTreeMap::new();
                for (name, child) in map {
                    children.insert(name.clone(), DataNode::from_json(child)?);
                }
                Some(DataNode::Container(children))
            }
            serde_json::Value::Array(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DataNode::Leaf(ScalarValue::Empty) => serde_json::Value::Null,
            DataNode::Leaf(ScalarValue::Bool(b)) => serde_json::Value::Bool(*b),
            DataNode::Leaf(ScalarValue::Int(i)) => serde_json::Value::from(*i),
            DataNode::Leaf(ScalarValue::Str(s)) => serde_json::Value::String(s.clone()),
            DataNode::Container(children) => serde_json::Value::Object(
                children
                    .iter()
                    .map(|(name, node)| (name.clone(), node.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Str(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Str(v)
    }
}
