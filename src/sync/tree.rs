//! Collection hierarchy reconstruction.
//!
//! The library lists its collections flat, each naming its parent. The tree is
//! rebuilt into an arena of nodes addressed by index, rooted at a synthetic
//! node standing for the library itself, so walking it never needs recursion.

use super::types::TreeError;
use crate::zotero::{CollectionRecord, ParentRef};

use std::collections::HashMap;

/// Index of a node in a [`CollectionTree`].
pub type NodeId = usize;

/// One collection in the rebuilt hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNode {
	pub key: String,
	pub parent: ParentRef,
	pub name: String,
	/// Children in listing order.
	pub children: Vec<NodeId>,
}

/// Rooted collection hierarchy backed by an arena.
#[derive(Debug, Clone)]
pub struct CollectionTree {
	nodes: Vec<CollectionNode>,
}

impl CollectionTree {
	/// The synthetic library root always lives at index 0.
	pub const ROOT: NodeId = 0;

	/// Rebuild the hierarchy from a flat listing.
	///
	/// Children keep their listing order. When two records share a key the later
	/// one replaces the earlier node's name and parent, and the node is attached
	/// once per record.
	///
	/// # Errors
	/// `MissingKey` / `MissingData` for malformed records, `DanglingParent` when
	/// a parent key names no listed collection.
	pub fn build(root_name: &str, records: &[CollectionRecord]) -> Result<Self, TreeError> {
		let mut nodes = vec![CollectionNode {
			key: String::new(),
			parent: ParentRef::Root,
			name: root_name.to_string(),
			children: Vec::new(),
		}];
		let mut index: HashMap<&str, NodeId> = HashMap::with_capacity(records.len());

		// Pass 1: index every record by key.
		let mut resolved = Vec::with_capacity(records.len());
		for (position, record) in records.iter().enumerate() {
			let key = record.key.as_deref().ok_or(TreeError::MissingKey(position))?;
			let missing = || TreeError::MissingData(key.to_string());
			let data = record.data.as_ref().ok_or_else(missing)?;
			let name = data.name.as_ref().ok_or_else(missing)?;
			let parent = data.parent_collection.as_ref().ok_or_else(missing)?;

			let node = CollectionNode {
				key: key.to_string(),
				parent: parent.clone(),
				name: name.clone(),
				children: Vec::new(),
			};
			let id = match index.get(key) {
				Some(&existing) => {
					nodes[existing] = node;
					existing
				}
				None => {
					nodes.push(node);
					let id = nodes.len() - 1;
					index.insert(key, id);
					id
				}
			};
			resolved.push((id, key, parent));
		}

		// Pass 2: attach each record's node under its parent.
		for (id, key, parent) in resolved {
			let parent_id = match parent {
				ParentRef::Root => Self::ROOT,
				ParentRef::Collection(parent_key) => {
					*index
						.get(parent_key.as_str())
						.ok_or_else(|| TreeError::DanglingParent {
							key: key.to_string(),
							parent: parent_key.clone(),
						})?
				}
			};
			nodes[parent_id].children.push(id);
		}

		Ok(Self { nodes })
	}

	pub fn root(&self) -> &CollectionNode {
		&self.nodes[Self::ROOT]
	}

	pub fn node(&self, id: NodeId) -> Option<&CollectionNode> {
		self.nodes.get(id)
	}

	pub fn is_root(&self, id: NodeId) -> bool {
		id == Self::ROOT
	}

	/// Keys of every node reachable from the root, depth first, once per
	/// attachment. The root itself is not included.
	#[cfg(test)]
	pub fn walk_keys(&self) -> Vec<&str> {
		let mut keys = Vec::new();
		let mut stack: Vec<NodeId> = self.root().children.iter().rev().copied().collect();
		while let Some(id) = stack.pop() {
			let node = &self.nodes[id];
			keys.push(node.key.as_str());
			stack.extend(node.children.iter().rev().copied());
		}
		keys
	}
}
