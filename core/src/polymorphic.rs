#![deny(missing_docs)]

//! # Polymorphic Trees
//!
//! Discovers the subtypes of a discriminator-bearing definition by scanning
//! every definition's `allOf` list for a link to it, recursively.
//!
//! Nodes are memoized by name and inserted before their children are
//! visited, so a shared descendant is built once and a malformed cyclic
//! hierarchy cannot recurse forever.

use crate::pointer::{parse_reference, ref_of, DefRef, ReferenceKind};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

/// Extension naming a subtype's discriminator value.
pub const DISCRIMINATOR_VALUE: &str = "x-ms-discriminator-value";

/// One definition in a polymorphic hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Definition name.
    pub name: String,
    /// Discriminator property governing this node.
    pub discriminator: String,
    /// Direct subtypes, in document order.
    pub children: IndexSet<String>,
}

impl TreeNode {
    /// Reference to the node's definition.
    pub fn def_ref(&self) -> DefRef {
        DefRef::definition(&self.name)
    }
}

/// Builder and memo for the trees of one resolution pass.
pub struct PolymorphicTree<'a> {
    definitions: &'a Map<String, Value>,
    nodes: IndexMap<String, TreeNode>,
}

impl<'a> PolymorphicTree<'a> {
    /// Creates a builder over the `definitions` table.
    pub fn new(definitions: &'a Map<String, Value>) -> Self {
        Self {
            definitions,
            nodes: IndexMap::new(),
        }
    }

    /// Builds the tree rooted at `root`. Returns `None` when the definition
    /// is missing or declares no discriminator.
    pub fn build(&mut self, root: &str) -> Option<&TreeNode> {
        let discriminator = self
            .definitions
            .get(root)?
            .get("discriminator")?
            .as_str()?
            .to_string();
        self.build_node(root, &discriminator);
        self.nodes.get(root)
    }

    fn build_node(&mut self, name: &str, inherited: &str) {
        if self.nodes.contains_key(name) {
            return;
        }
        let discriminator = self
            .definitions
            .get(name)
            .and_then(|d| d.get("discriminator"))
            .and_then(Value::as_str)
            .unwrap_or(inherited)
            .to_string();

        self.nodes.insert(
            name.to_string(),
            TreeNode {
                name: name.to_string(),
                discriminator: discriminator.clone(),
                children: IndexSet::new(),
            },
        );

        let children = children_of(self.definitions, name);
        for child in &children {
            self.build_node(child, &discriminator);
        }
        if let Some(node) = self.nodes.get_mut(name) {
            node.children = children;
        }
    }

    /// A node built earlier in this pass.
    pub fn node(&self, name: &str) -> Option<&TreeNode> {
        self.nodes.get(name)
    }

    /// Every node built so far.
    pub fn nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// The node itself plus all of its descendants, de-duplicated.
    pub fn alternatives(&self, name: &str) -> IndexSet<DefRef> {
        let mut out = IndexSet::new();
        self.collect_alternatives(name, &mut out);
        out
    }

    fn collect_alternatives(&self, name: &str, out: &mut IndexSet<DefRef>) {
        if !out.insert(DefRef::definition(name)) {
            return;
        }
        if let Some(node) = self.nodes.get(name) {
            for child in &node.children {
                self.collect_alternatives(child, out);
            }
        }
    }

    /// Names of `name` and its descendants.
    pub fn descendants(&self, name: &str) -> IndexSet<String> {
        self.alternatives(name)
            .iter()
            .filter_map(DefRef::definition_name)
            .collect()
    }

    /// Discriminator value for a definition: its `x-ms-discriminator-value`
    /// or, by default, its name.
    pub fn wire_name(&self, name: &str) -> String {
        wire_name(self.definitions, name)
    }
}

/// Definitions whose `allOf` links to `parent`, in document order.
pub fn children_of(definitions: &Map<String, Value>, parent: &str) -> IndexSet<String> {
    let target = DefRef::definition(parent);
    definitions
        .iter()
        .filter(|(_, schema)| composition_parents(schema).contains(&target))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Local definition references in a schema's `allOf` list.
pub fn composition_parents(schema: &Value) -> Vec<DefRef> {
    schema
        .get("allOf")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(ref_of)
                .filter(|r| parse_reference(r).kind == ReferenceKind::Local)
                .map(DefRef::from_fragment)
                .collect()
        })
        .unwrap_or_default()
}

/// See [`PolymorphicTree::wire_name`].
pub fn wire_name(definitions: &Map<String, Value>, name: &str) -> String {
    definitions
        .get(name)
        .and_then(|d| d.get(DISCRIMINATOR_VALUE))
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions(yaml: &str) -> Map<String, Value> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        value.as_object().unwrap().clone()
    }

    const ZOO: &str = r##"
Animal:
  type: object
  discriminator: kind
  properties:
    kind: {type: string}
Cat:
  allOf: [{$ref: "#/definitions/Animal"}]
Dog:
  x-ms-discriminator-value: dog
  allOf: [{$ref: "#/definitions/Animal"}]
Lion:
  allOf: [{$ref: "#/definitions/Cat"}]
Plain:
  type: object
"##;

    #[test]
    fn test_build_discovers_descendants() {
        let defs = definitions(ZOO);
        let mut tree = PolymorphicTree::new(&defs);
        let root = tree.build("Animal").unwrap();
        assert_eq!(root.discriminator, "kind");
        assert_eq!(
            root.children.iter().cloned().collect::<Vec<_>>(),
            vec!["Cat", "Dog"]
        );
        let cat = tree.node("Cat").unwrap();
        assert_eq!(cat.discriminator, "kind");
        assert!(cat.children.contains("Lion"));
    }

    #[test]
    fn test_alternatives_cover_whole_subtree() {
        let defs = definitions(ZOO);
        let mut tree = PolymorphicTree::new(&defs);
        tree.build("Animal");
        let alts: Vec<String> = tree
            .alternatives("Animal")
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();
        assert_eq!(
            alts,
            vec![
                "#/definitions/Animal",
                "#/definitions/Cat",
                "#/definitions/Lion",
                "#/definitions/Dog"
            ]
        );
    }

    #[test]
    fn test_build_without_discriminator_is_none() {
        let defs = definitions(ZOO);
        let mut tree = PolymorphicTree::new(&defs);
        assert!(tree.build("Plain").is_none());
        assert!(tree.build("Missing").is_none());
    }

    #[test]
    fn test_cyclic_composition_terminates() {
        let defs = definitions(
            r##"
A:
  discriminator: k
  allOf: [{$ref: "#/definitions/B"}]
B:
  allOf: [{$ref: "#/definitions/A"}]
"##,
        );
        let mut tree = PolymorphicTree::new(&defs);
        tree.build("A");
        assert_eq!(tree.alternatives("A").len(), 2);
    }

    #[test]
    fn test_wire_name_defaults_to_definition_name() {
        let defs = definitions(ZOO);
        assert_eq!(wire_name(&defs, "Cat"), "Cat");
        assert_eq!(wire_name(&defs, "Dog"), "dog");
    }
}
