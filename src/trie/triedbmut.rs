// Copyright 2015-2019 Parity Technologies (UK) Ltd.
// This file is part of Parity Ethereum.

// Parity Ethereum is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity Ethereum is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity Ethereum.  If not, see <http://www.gnu.org/licenses/>.

//! In-place Merkle-Patricia trie mutation.
//!
//! Every operation rewrites the path from the root down to the affected
//! entry: nodes along it are resolved, rebuilt and re-inserted, and the
//! replaced versions removed. Node reference counts in the backing `HashDB`
//! keep subtrees shared with other tries alive.

use ethereum_types::H256;
use keccak_hash::KECCAK_NULL_RLP;
use parity_bytes::Bytes;

use super::node::{self, Node};
use super::{TrieDB, TrieError, Verification};
use crate::hashdb::{DBValue, HashDB};
use crate::nibbleslice::{encode_nibbles, NibbleSlice};

/// Reference to a node as embedded in its parent: either the node RLP itself
/// (when shorter than a hash) or the RLP of its Keccak-256 hash.
type NodeHandle = Bytes;

/// A mutable Merkle-Patricia trie over a generic `HashDB` backing database.
pub struct TrieDBMut<'db> {
	db: &'db mut dyn HashDB,
	root: &'db mut H256,
}

impl<'db> TrieDBMut<'db> {
	/// Create a new trie with backing database `db` and empty `root`.
	pub fn new(db: &'db mut dyn HashDB, root: &'db mut H256) -> Self {
		*root = KECCAK_NULL_RLP;
		TrieDBMut { db, root }
	}

	/// Create a new trie with the backing database `db` and `root`.
	/// Returns an error if `root` does not exist.
	pub fn from_existing(db: &'db mut dyn HashDB, root: &'db mut H256) -> super::Result<Self> {
		if !db.contains(root) {
			return Err(Box::new(TrieError::InvalidStateRoot(*root)));
		}
		Ok(TrieDBMut { db, root })
	}

	/// Get the backing database.
	pub fn db(&self) -> &dyn HashDB {
		&*self.db
	}

	/// Get the backing database mutably.
	pub fn db_mut(&mut self) -> &mut dyn HashDB {
		&mut *self.db
	}

	/// The root of the trie.
	pub fn root(&self) -> &H256 {
		&*self.root
	}

	/// Is the trie the empty trie?
	pub fn is_empty(&self) -> bool {
		*self.root == KECCAK_NULL_RLP
	}

	/// What is the value of the given key in this trie?
	pub fn get(&self, key: &[u8]) -> super::Result<Option<DBValue>> {
		let t = TrieDB::open(&*self.db, &*self.root, Verification::Skip)?;
		t.get(key)
	}

	/// Does the trie contain a given key?
	pub fn contains(&self, key: &[u8]) -> super::Result<bool> {
		Ok(self.get(key)?.is_some())
	}

	/// Insert a `key`/`value` pair into the trie. An empty value is a regular
	/// value here; removal is only ever explicit.
	pub fn insert(&mut self, key: &[u8], value: &[u8]) -> super::Result<()> {
		let root_handle = self.root_handle();
		let new = self.update_at(root_handle.as_deref(), NibbleSlice::new(key), Some(value))?;
		self.bind_root(new);
		Ok(())
	}

	/// Remove a `key` from the trie. A no-op if the key is absent.
	pub fn remove(&mut self, key: &[u8]) -> super::Result<()> {
		let root_handle = self.root_handle();
		let new = self.update_at(root_handle.as_deref(), NibbleSlice::new(key), None)?;
		self.bind_root(new);
		Ok(())
	}

	fn root_handle(&self) -> Option<NodeHandle> {
		if self.is_empty() {
			None
		} else {
			Some(rlp::encode(&*self.root).to_vec())
		}
	}

	/// Re-bind the root to a new top node handle. The root node always lives
	/// in the database under its hash, however short its RLP.
	fn bind_root(&mut self, handle: Option<NodeHandle>) {
		*self.root = match handle {
			None => KECCAK_NULL_RLP,
			Some(h) => match Node::try_decode_hash(&h) {
				Some(hash) => hash,
				None => self.db.insert(&h),
			},
		};
	}

	/// Resolve a handle into the full node RLP.
	fn resolve(&self, handle: &[u8]) -> super::Result<DBValue> {
		match Node::try_decode_hash(handle) {
			Some(hash) => self
				.db
				.get(&hash)
				.ok_or_else(|| Box::new(TrieError::IncompleteDatabase(hash))),
			None => Ok(handle.to_vec()),
		}
	}

	/// Store a freshly encoded node, returning the handle its parent embeds.
	fn emit(&mut self, node_rlp: Bytes) -> NodeHandle {
		if node_rlp.len() >= 32 {
			let hash = self.db.insert(&node_rlp);
			rlp::encode(&hash).to_vec()
		} else {
			node_rlp
		}
	}

	/// Drop one reference to a replaced node.
	fn free(&mut self, handle: &[u8]) {
		if let Some(hash) = Node::try_decode_hash(handle) {
			self.db.remove(&hash);
		}
	}

	fn decode<'x>(node_rlp: &'x [u8]) -> super::Result<Node<'x>> {
		Node::decoded(node_rlp).map_err(|e| Box::new(TrieError::DecoderError(e)))
	}

	/// Apply an insertion (`value` is `Some`) or removal (`None`) of `partial`
	/// beneath the node referenced by `handle`, returning the handle of the
	/// replacement subtree, or `None` when the subtree vanishes.
	fn update_at(
		&mut self,
		handle: Option<&[u8]>,
		partial: NibbleSlice,
		value: Option<&[u8]>,
	) -> super::Result<Option<NodeHandle>> {
		let handle = match handle {
			Some(h) => h,
			None => {
				return Ok(value.map(|v| self.emit(node::leaf_node(&partial.encoded(true), v))));
			}
		};
		let node_rlp = self.resolve(handle)?;
		match Self::decode(&node_rlp)? {
			Node::Empty => Ok(value.map(|v| self.emit(node::leaf_node(&partial.encoded(true), v)))),
			Node::Leaf(existing_key, existing_value) => {
				self.update_leaf(handle, existing_key, existing_value, partial, value)
			}
			Node::Extension(existing_key, child) => {
				self.update_extension(handle, existing_key, child, partial, value)
			}
			Node::Branch(children, branch_value) => {
				let children: Vec<Option<Bytes>> =
					children.iter().map(|c| c.map(|c| c.to_vec())).collect();
				let branch_value = branch_value.map(|v| v.to_vec());
				self.update_branch(handle, children, branch_value, partial, value)
			}
		}
	}

	fn update_leaf(
		&mut self,
		handle: &[u8],
		existing_key: NibbleSlice,
		existing_value: &[u8],
		partial: NibbleSlice,
		value: Option<&[u8]>,
	) -> super::Result<Option<NodeHandle>> {
		let cp = partial.common_prefix(&existing_key);
		if cp == existing_key.len() && cp == partial.len() {
			// exact match
			return match value {
				None => {
					self.free(handle);
					Ok(None)
				}
				Some(v) if v == existing_value => Ok(Some(handle.to_vec())),
				Some(v) => {
					let new = self.emit(node::leaf_node(&existing_key.encoded(true), v));
					self.free(handle);
					Ok(Some(new))
				}
			};
		}

		let v = match value {
			Some(v) => v,
			// removing a key this leaf does not hold
			None => return Ok(Some(handle.to_vec())),
		};

		// keys diverge: make a branch at the fork point, with an extension
		// above it when a prefix is shared.
		let mut children: [Option<NodeHandle>; 16] = Default::default();
		let mut branch_value: Option<Bytes> = None;

		let existing_mid = existing_key.mid(cp);
		if existing_mid.is_empty() {
			branch_value = Some(existing_value.to_vec());
		} else {
			let child = self.emit(node::leaf_node(&existing_mid.mid(1).encoded(true), existing_value));
			children[existing_mid.at(0) as usize] = Some(child);
		}

		let new_mid = partial.mid(cp);
		if new_mid.is_empty() {
			branch_value = Some(v.to_vec());
		} else {
			let child = self.emit(node::leaf_node(&new_mid.mid(1).encoded(true), v));
			children[new_mid.at(0) as usize] = Some(child);
		}

		let branch = self.emit(node::branch_node(&children, branch_value.as_deref()));
		let new = if cp > 0 {
			self.emit(node::ext_node(&partial.encoded_leftmost(cp, false), &branch))
		} else {
			branch
		};
		self.free(handle);
		Ok(Some(new))
	}

	fn update_extension(
		&mut self,
		handle: &[u8],
		existing_key: NibbleSlice,
		child: &[u8],
		partial: NibbleSlice,
		value: Option<&[u8]>,
	) -> super::Result<Option<NodeHandle>> {
		let cp = partial.common_prefix(&existing_key);
		if cp == existing_key.len() {
			// wholly shared prefix - descend into the child
			let old_child = child.to_vec();
			let new_child = self.update_at(Some(&old_child[..]), partial.mid(cp), value)?;
			if new_child.as_deref() == Some(&old_child[..]) {
				return Ok(Some(handle.to_vec()));
			}
			let new = match new_child {
				None => None,
				Some(c) => Some(self.join_extension(&existing_key.encoded(false), &c)?),
			};
			self.free(handle);
			return Ok(new);
		}

		let v = match value {
			Some(v) => v,
			// removing a key outside this extension's subtree
			None => return Ok(Some(handle.to_vec())),
		};

		// partially shared prefix - fork with a branch, pushing the unshared
		// tail of the extension below it.
		let mut children: [Option<NodeHandle>; 16] = Default::default();
		let mut branch_value: Option<Bytes> = None;

		let existing_mid = existing_key.mid(cp);
		let idx = existing_mid.at(0) as usize;
		let tail = existing_mid.mid(1);
		children[idx] = Some(if tail.is_empty() {
			child.to_vec()
		} else {
			self.emit(node::ext_node(&tail.encoded(false), child))
		});

		let new_mid = partial.mid(cp);
		if new_mid.is_empty() {
			branch_value = Some(v.to_vec());
		} else {
			let leaf = self.emit(node::leaf_node(&new_mid.mid(1).encoded(true), v));
			children[new_mid.at(0) as usize] = Some(leaf);
		}

		let branch = self.emit(node::branch_node(&children, branch_value.as_deref()));
		let new = if cp > 0 {
			self.emit(node::ext_node(&partial.encoded_leftmost(cp, false), &branch))
		} else {
			branch
		};
		self.free(handle);
		Ok(Some(new))
	}

	fn update_branch(
		&mut self,
		handle: &[u8],
		mut children: Vec<Option<NodeHandle>>,
		branch_value: Option<Bytes>,
		partial: NibbleSlice,
		value: Option<&[u8]>,
	) -> super::Result<Option<NodeHandle>> {
		if partial.is_empty() {
			let unchanged = match value {
				Some(v) => branch_value.as_deref() == Some(v),
				None => branch_value.is_none(),
			};
			if unchanged {
				return Ok(Some(handle.to_vec()));
			}
			let new = self.collapse_branch(children, value.map(|v| v.to_vec()))?;
			self.free(handle);
			return Ok(new);
		}

		let idx = partial.at(0) as usize;
		let old_child = children[idx].take();
		let new_child = self.update_at(old_child.as_deref(), partial.mid(1), value)?;
		if new_child == old_child {
			children[idx] = old_child;
			return Ok(Some(handle.to_vec()));
		}
		children[idx] = new_child;
		let new = self.collapse_branch(children, branch_value)?;
		self.free(handle);
		Ok(new)
	}

	/// Rebuild a branch from its surviving entries, degrading it to a leaf or
	/// an extension when removal has left too few.
	fn collapse_branch(
		&mut self,
		mut children: Vec<Option<NodeHandle>>,
		value: Option<Bytes>,
	) -> super::Result<Option<NodeHandle>> {
		let occupied: Vec<usize> = children
			.iter()
			.enumerate()
			.filter_map(|(i, c)| c.as_ref().map(|_| i))
			.collect();

		match (occupied.len(), &value) {
			(0, None) => Ok(None),
			(0, Some(v)) => Ok(Some(self.emit(node::leaf_node(&encode_nibbles(&[], true), v)))),
			(1, None) => {
				// a single child left: merge its nibble into it
				let idx = occupied[0];
				let child = children[idx].take().expect("index from occupied; qed");
				let child_rlp = self.resolve(&child)?;
				let merged = match Self::decode(&child_rlp)? {
					Node::Leaf(k, v) => {
						let mut nibbles = vec![idx as u8];
						nibbles.extend(k.iter());
						let new = self.emit(node::leaf_node(&encode_nibbles(&nibbles, true), v));
						self.free(&child);
						new
					}
					Node::Extension(k, grandchild) => {
						let mut nibbles = vec![idx as u8];
						nibbles.extend(k.iter());
						let new = self.emit(node::ext_node(&encode_nibbles(&nibbles, false), grandchild));
						self.free(&child);
						new
					}
					Node::Branch(..) => {
						self.emit(node::ext_node(&encode_nibbles(&[idx as u8], false), &child))
					}
					Node::Empty => {
						return Err(Box::new(TrieError::DecoderError(rlp::DecoderError::Custom(
							"empty node as branch child",
						))))
					}
				};
				Ok(Some(merged))
			}
			_ => {
				let mut fixed: [Option<NodeHandle>; 16] = Default::default();
				for (i, c) in children.into_iter().enumerate() {
					fixed[i] = c;
				}
				Ok(Some(self.emit(node::branch_node(&fixed, value.as_deref()))))
			}
		}
	}

	/// Place `child` underneath an extension with the given encoded partial,
	/// fusing leaves and extensions rather than stacking them.
	fn join_extension(&mut self, prefix_encoded: &[u8], child: &[u8]) -> super::Result<NodeHandle> {
		let child_rlp = self.resolve(child)?;
		let (prefix, _) = NibbleSlice::from_encoded(prefix_encoded);
		match Self::decode(&child_rlp)? {
			Node::Leaf(k, v) => {
				let mut nibbles: Vec<u8> = prefix.iter().collect();
				nibbles.extend(k.iter());
				let new = self.emit(node::leaf_node(&encode_nibbles(&nibbles, true), v));
				self.free(child);
				Ok(new)
			}
			Node::Extension(k, grandchild) => {
				let mut nibbles: Vec<u8> = prefix.iter().collect();
				nibbles.extend(k.iter());
				let new = self.emit(node::ext_node(&encode_nibbles(&nibbles, false), grandchild));
				self.free(child);
				Ok(new)
			}
			Node::Branch(..) => Ok(self.emit(node::ext_node(prefix_encoded, child))),
			Node::Empty => Err(Box::new(TrieError::DecoderError(rlp::DecoderError::Custom(
				"empty node as extension child",
			)))),
		}
	}
}
