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

use std::collections::HashSet;
use std::{fmt, io};

use ethereum_types::H256;
use keccak_hash::KECCAK_NULL_RLP;
use parity_bytes::Bytes;

use super::node::{Node, OwnedNode};
use super::{TrieError, TrieItem, Verification};
use crate::hashdb::{DBValue, HashDB};
use crate::nibbleslice::NibbleSlice;

/// A Merkle-Patricia trie reader over a generic `HashDB` backing database.
///
/// Use `get` and `contains` to query values associated with keys in the trie,
/// `iter` for an ordered walk over all entries.
pub struct TrieDB<'db> {
	db: &'db dyn HashDB,
	root: &'db H256,
}

impl<'db> TrieDB<'db> {
	/// Create a new trie with the backing database `db` and `root`.
	/// Returns an error if `root` does not exist.
	pub fn new(db: &'db dyn HashDB, root: &'db H256) -> super::Result<Self> {
		Self::open(db, root, Verification::Full)
	}

	/// Create a new trie, optionally skipping the root presence check for
	/// roots this process already trusts.
	pub fn open(db: &'db dyn HashDB, root: &'db H256, verification: Verification) -> super::Result<Self> {
		if verification == Verification::Full && !db.contains(root) {
			return Err(Box::new(TrieError::InvalidStateRoot(*root)));
		}
		Ok(TrieDB { db, root })
	}

	/// Get the backing database.
	pub fn db(&self) -> &dyn HashDB {
		self.db
	}

	/// The root of the trie.
	pub fn root(&self) -> &H256 {
		self.root
	}

	/// Is the trie the empty trie?
	pub fn is_empty(&self) -> bool {
		*self.root == KECCAK_NULL_RLP
	}

	/// What is the value of the given key in this trie?
	pub fn get(&self, key: &[u8]) -> super::Result<Option<DBValue>> {
		let mut partial = NibbleSlice::new(key);
		let mut node_data = self.root_data()?;
		loop {
			let next = {
				match Node::decoded(&node_data).map_err(|e| Box::new(TrieError::DecoderError(e)))? {
					Node::Empty => return Ok(None),
					Node::Leaf(slice, value) => {
						return Ok(if slice == partial { Some(value.to_vec()) } else { None });
					}
					Node::Extension(slice, item) => {
						if partial.starts_with(&slice) {
							let item = item.to_vec();
							partial = partial.mid(slice.len());
							item
						} else {
							return Ok(None);
						}
					}
					Node::Branch(children, value) => {
						if partial.is_empty() {
							return Ok(value.map(|v| v.to_vec()));
						}
						match children[partial.at(0) as usize] {
							Some(child) => {
								let child = child.to_vec();
								partial = partial.mid(1);
								child
							}
							None => return Ok(None),
						}
					}
				}
			};
			node_data = self.get_raw_or_lookup(&next)?;
		}
	}

	/// Does the trie contain a given key?
	pub fn contains(&self, key: &[u8]) -> super::Result<bool> {
		Ok(self.get(key)?.is_some())
	}

	/// An ordered iterator over all (key, value) pairs.
	pub fn iter<'a>(&'a self) -> super::Result<TrieDBIterator<'a>> {
		TrieDBIterator::new(self)
	}

	/// Nodes present in the backing database but unreachable from the current
	/// root. Only meaningful when this trie is the sole occupant of its
	/// database; other tries and non-node entries show up as left-overs.
	pub fn left_overs(&self) -> super::Result<Vec<H256>> {
		let reachable = self.reachable_nodes()?;
		Ok(self
			.db
			.keys()
			.into_iter()
			.filter(|&(ref key, rc)| rc > 0 && !reachable.contains(key) && *key != KECCAK_NULL_RLP)
			.map(|(key, _)| key)
			.collect())
	}

	/// Collect the hashes of every node reachable from the root.
	pub fn reachable_nodes(&self) -> super::Result<HashSet<H256>> {
		let mut reachable = HashSet::new();
		if self.is_empty() {
			return Ok(reachable);
		}
		reachable.insert(*self.root);
		let root_data = self.root_data()?;
		self.walk(&root_data, &mut reachable)?;
		Ok(reachable)
	}

	fn walk(&self, node_data: &[u8], reachable: &mut HashSet<H256>) -> super::Result<()> {
		let descend = |child: &[u8], reachable: &mut HashSet<H256>| -> super::Result<()> {
			if let Some(hash) = Node::try_decode_hash(child) {
				reachable.insert(hash);
			}
			let data = self.get_raw_or_lookup(child)?;
			self.walk(&data, reachable)
		};
		match Node::decoded(node_data).map_err(|e| Box::new(TrieError::DecoderError(e)))? {
			Node::Extension(_, item) => descend(item, reachable)?,
			Node::Branch(children, _) => {
				for child in children.iter().flatten() {
					descend(child, reachable)?;
				}
			}
			Node::Empty | Node::Leaf(..) => {}
		}
		Ok(())
	}

	/// Emit a structural dump of the trie to `out`.
	pub fn debug_structure<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
		writeln!(out, "{:#?}", self)
	}

	/// Get the data of the root node.
	fn root_data(&self) -> super::Result<DBValue> {
		self.db
			.get(self.root)
			.ok_or_else(|| Box::new(TrieError::InvalidStateRoot(*self.root)))
	}

	/// Given some node-describing data `node`, return the actual node RLP.
	/// This could be a simple identity operation in the case that the node is
	/// sufficiently small, but may require a database lookup.
	fn get_raw_or_lookup(&self, node: &[u8]) -> super::Result<DBValue> {
		match Node::try_decode_hash(node) {
			Some(key) => self
				.db
				.get(&key)
				.ok_or_else(|| Box::new(TrieError::IncompleteDatabase(key))),
			None => Ok(node.to_vec()),
		}
	}
}

// Recursive pretty-printer for the node structure, resolving hash references
// as it descends.
struct TrieAwareDebugNode<'db, 'a> {
	trie: &'db TrieDB<'db>,
	key: &'a [u8],
}

impl<'db, 'a> fmt::Debug for TrieAwareDebugNode<'db, 'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if let Ok(node) = self.trie.get_raw_or_lookup(self.key) {
			match Node::decoded(&node) {
				Ok(Node::Leaf(slice, value)) => f
					.debug_struct("Node::Leaf")
					.field("slice", &slice)
					.field("value", &value)
					.finish(),
				Ok(Node::Extension(slice, item)) => f
					.debug_struct("Node::Extension")
					.field("slice", &slice)
					.field("item", &TrieAwareDebugNode { trie: self.trie, key: item })
					.finish(),
				Ok(Node::Branch(ref nodes, ref value)) => {
					let nodes: Vec<TrieAwareDebugNode> = nodes
						.iter()
						.flatten()
						.map(|n| TrieAwareDebugNode { trie: self.trie, key: n })
						.collect();
					f.debug_struct("Node::Branch")
						.field("nodes", &nodes)
						.field("value", value)
						.finish()
				}
				Ok(Node::Empty) => f.debug_struct("Node::Empty").finish(),
				Err(e) => f
					.debug_struct("BROKEN_NODE")
					.field("key", &self.key)
					.field("error", &format!("error decoding node rlp: {}", e))
					.finish(),
			}
		} else {
			f.debug_struct("BROKEN_NODE")
				.field("key", &self.key)
				.field("error", &"not found")
				.finish()
		}
	}
}

impl<'db> fmt::Debug for TrieDB<'db> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let root_rlp = rlp::encode(self.root).to_vec();
		f.debug_struct("TrieDB")
			.field("root", &TrieAwareDebugNode { trie: self, key: &root_rlp[..] })
			.finish()
	}
}

#[derive(Clone, Eq, PartialEq)]
enum Status {
	Entering,
	At,
	AtChild(usize),
	Exiting,
}

#[derive(Eq, PartialEq)]
struct Crumb {
	node: OwnedNode,
	status: Status,
}

impl Crumb {
	/// Move on to the next status in the node's sequence.
	fn increment(&mut self) {
		self.status = match (&self.status, &self.node) {
			(_, &OwnedNode::Empty) => Status::Exiting,
			(&Status::Entering, _) => Status::At,
			(&Status::At, &OwnedNode::Branch(..)) => Status::AtChild(0),
			(&Status::AtChild(x), &OwnedNode::Branch(..)) if x < 15 => Status::AtChild(x + 1),
			_ => Status::Exiting,
		}
	}
}

fn partial_len(encoded: &[u8]) -> usize {
	NibbleSlice::from_encoded(encoded).0.len()
}

/// Iterator for going through all values in the trie in lexicographic key order.
pub struct TrieDBIterator<'a> {
	db: &'a TrieDB<'a>,
	trail: Vec<Crumb>,
	key_nibbles: Bytes,
}

impl<'a> TrieDBIterator<'a> {
	/// Create a new iterator.
	pub fn new(db: &'a TrieDB) -> super::Result<TrieDBIterator<'a>> {
		let mut r = TrieDBIterator {
			db,
			trail: vec![],
			key_nibbles: Vec::new(),
		};

		let root = db.root_data()?;
		r.descend(&root)?;
		Ok(r)
	}

	/// Descend into a payload.
	fn descend(&mut self, d: &[u8]) -> super::Result<()> {
		let data = self.db.get_raw_or_lookup(d)?;
		let node = Node::decoded(&data).map_err(|e| Box::new(TrieError::DecoderError(e)))?;
		self.descend_into_node(node.into());
		Ok(())
	}

	fn descend_into_node(&mut self, node: OwnedNode) {
		self.trail.push(Crumb {
			status: Status::Entering,
			node,
		});
		match &self.trail.last().expect("just pushed item; qed").node {
			OwnedNode::Leaf(ref partial, _) | OwnedNode::Extension(ref partial, _) => {
				let (slice, _) = NibbleSlice::from_encoded(partial);
				self.key_nibbles.extend(slice.iter());
			}
			_ => {}
		}
	}

	/// The present key.
	fn key(&self) -> Bytes {
		// collapse the key_nibbles down to bytes.
		let nibbles = &self.key_nibbles;
		let mut result = Bytes::with_capacity(nibbles.len() / 2);
		let mut i = 1;
		while i < nibbles.len() {
			result.push(nibbles[i - 1] * 16 + nibbles[i]);
			i += 2;
		}
		result
	}
}

impl<'a> Iterator for TrieDBIterator<'a> {
	type Item = super::Result<TrieItem>;

	fn next(&mut self) -> Option<Self::Item> {
		enum IterStep {
			Continue,
			PopTrail,
			Descend(Bytes),
		}

		loop {
			let iter_step = {
				self.trail.last_mut()?.increment();
				let b = self.trail.last().expect("trail.last_mut().is_some(); qed");

				match (b.status.clone(), &b.node) {
					(Status::Exiting, n) => {
						match *n {
							OwnedNode::Leaf(ref partial, _) | OwnedNode::Extension(ref partial, _) => {
								let l = self.key_nibbles.len();
								self.key_nibbles.truncate(l - partial_len(partial));
							}
							OwnedNode::Branch(..) => {
								self.key_nibbles.pop();
							}
							_ => {}
						}
						IterStep::PopTrail
					}
					(Status::At, &OwnedNode::Leaf(_, ref v))
					| (Status::At, &OwnedNode::Branch(_, Some(ref v))) => {
						return Some(Ok((self.key(), v.clone())));
					}
					(Status::At, &OwnedNode::Extension(_, ref d)) => IterStep::Descend(d.clone()),
					(Status::At, &OwnedNode::Branch(..)) => IterStep::Continue,
					(Status::AtChild(i), &OwnedNode::Branch(ref children, _)) if !children[i].is_empty() => {
						match i {
							0 => self.key_nibbles.push(0),
							i => {
								*self
									.key_nibbles
									.last_mut()
									.expect("pushed as 0; moves sequentially; removed afterwards; qed") = i as u8
							}
						}
						IterStep::Descend(children[i].clone())
					}
					(Status::AtChild(i), &OwnedNode::Branch(..)) => {
						if i == 0 {
							self.key_nibbles.push(0);
						}
						IterStep::Continue
					}
					_ => panic!("Entering or AtChild without a Branch here; qed"),
				}
			};

			match iter_step {
				IterStep::PopTrail => {
					self.trail.pop();
				}
				IterStep::Descend(d) => {
					if let Err(e) = self.descend(&d) {
						return Some(Err(e));
					}
				}
				IterStep::Continue => {}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::super::triedbmut::TrieDBMut;
	use super::*;
	use crate::memorydb::MemoryDB;

	#[test]
	fn iterator() {
		let d = vec![b"A".to_vec(), b"AA".to_vec(), b"AB".to_vec(), b"B".to_vec()];

		let mut memdb = MemoryDB::new();
		let mut root = H256::zero();
		{
			let mut t = TrieDBMut::new(&mut memdb, &mut root);
			for x in &d {
				t.insert(x, x).unwrap();
			}
		}

		let t = TrieDB::new(&memdb, &root).unwrap();
		assert_eq!(
			d,
			t.iter().unwrap().map(|x| x.unwrap().0).collect::<Vec<_>>()
		);
		assert_eq!(
			d,
			t.iter().unwrap().map(|x| x.unwrap().1).collect::<Vec<_>>()
		);
	}

	#[test]
	fn invalid_state_root_is_reported() {
		let memdb = MemoryDB::new();
		let root = H256::repeat_byte(1);
		match TrieDB::new(&memdb, &root) {
			Err(e) => assert_eq!(*e, TrieError::InvalidStateRoot(root)),
			Ok(_) => panic!("accepted a root that is not in the database"),
		}
	}

	#[test]
	fn left_overs_after_removal() {
		let mut memdb = MemoryDB::new();
		let mut root = H256::zero();
		{
			let mut t = TrieDBMut::new(&mut memdb, &mut root);
			t.insert(b"doe", b"reindeer").unwrap();
			t.insert(b"dog", b"puppy").unwrap();
			t.insert(b"dogglesworth", b"cat").unwrap();
			t.remove(b"dogglesworth").unwrap();
		}
		let t = TrieDB::new(&memdb, &root).unwrap();
		assert_eq!(t.left_overs().unwrap(), Vec::<H256>::new());
	}

	#[test]
	fn debug_structure_mentions_values() {
		let mut memdb = MemoryDB::new();
		let mut root = H256::zero();
		{
			let mut t = TrieDBMut::new(&mut memdb, &mut root);
			t.insert(b"A", b"leaf-a").unwrap();
			t.insert(b"B", b"leaf-b").unwrap();
		}
		let t = TrieDB::new(&memdb, &root).unwrap();
		let mut out = Vec::new();
		t.debug_structure(&mut out).unwrap();
		let dump = String::from_utf8(out).unwrap();
		assert!(dump.contains("Node::Branch"));
		assert!(dump.contains("Node::Leaf"));
	}
}
