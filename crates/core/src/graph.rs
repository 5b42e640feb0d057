//! Workflow graph template: node id -> `{class_type, inputs}`.
//!
//! The graph is kept as an ordered JSON object so that a template written
//! back to disk (redux) keeps its node order and any fields this crate
//! does not understand.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::CoreError;

/// A parsed workflow graph, mutated in place by the binder.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    nodes: Map<String, Value>,
}

impl WorkflowGraph {
    /// Validate and wrap a workflow JSON value.
    ///
    /// Every node must be an object carrying a string `class_type`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(nodes) = value else {
            return Err(CoreError::Validation(
                "Workflow JSON must be an object".to_string(),
            ));
        };
        if nodes.is_empty() {
            return Err(CoreError::Validation(
                "Workflow JSON must contain at least one node".to_string(),
            ));
        }
        for (node_id, node) in &nodes {
            if node.get("class_type").and_then(Value::as_str).is_none() {
                return Err(CoreError::Validation(format!(
                    "Node '{node_id}' is missing required 'class_type' field"
                )));
            }
        }
        Ok(Self { nodes })
    }

    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::Template {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|e| CoreError::Template {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Write the graph back to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let text = serde_json::to_string_pretty(&self.nodes)?;
        std::fs::write(path, text).map_err(|e| CoreError::Template {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Class type of a node, if present.
    pub fn class_type(&self, node_id: &str) -> Option<&str> {
        self.nodes
            .get(node_id)
            .and_then(|n| n.get("class_type"))
            .and_then(Value::as_str)
    }

    /// Current value of `node_id.inputs.<input>`.
    pub fn input(&self, node_id: &str, input: &str) -> Option<&Value> {
        self.nodes
            .get(node_id)
            .and_then(|n| n.get("inputs"))
            .and_then(|i| i.get(input))
    }

    /// Mutable access to a node's `inputs` object, creating it if absent.
    ///
    /// Returns `None` when the node does not exist.
    pub fn inputs_mut(&mut self, node_id: &str) -> Option<&mut Map<String, Value>> {
        let node = self.nodes.get_mut(node_id)?.as_object_mut()?;
        let inputs = node
            .entry("inputs")
            .or_insert_with(|| Value::Object(Map::new()));
        if !inputs.is_object() {
            *inputs = Value::Object(Map::new());
        }
        inputs.as_object_mut()
    }

    /// Set `node_id.inputs.<input> = value`. Returns `false` if the node is missing.
    pub fn set_input(&mut self, node_id: &str, input: &str, value: impl Into<Value>) -> bool {
        match self.inputs_mut(node_id) {
            Some(inputs) => {
                inputs.insert(input.to_string(), value.into());
                true
            }
            None => false,
        }
    }

    /// Borrow the graph as the JSON object submitted to the engine.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.nodes
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}
