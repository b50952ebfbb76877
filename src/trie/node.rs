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

//! RLP codec for trie nodes.
//!
//! A node referenced from its parent is either embedded inline (when its RLP
//! is shorter than a hash) or replaced by the RLP of its Keccak-256 hash.

use ethereum_types::H256;
use parity_bytes::Bytes;
use rlp::{DecoderError, Rlp, RlpStream};

use crate::nibbleslice::NibbleSlice;

/// Type of node in the trie and essential information thereof.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Node<'a> {
	/// Null trie node; could be an empty root or an empty branch entry.
	Empty,
	/// Leaf node; has key slice and value. Value may not be empty.
	Leaf(NibbleSlice<'a>, &'a [u8]),
	/// Extension node; has key slice and node data. Data may not be null.
	Extension(NibbleSlice<'a>, &'a [u8]),
	/// Branch node; has array of 16 child nodes (each possibly null) and an optional immediate node data.
	Branch([Option<&'a [u8]>; 16], Option<&'a [u8]>),
}

impl<'a> Node<'a> {
	/// Decode the `node_rlp` and return the Node.
	pub fn decoded(node_rlp: &'a [u8]) -> Result<Self, DecoderError> {
		let r = Rlp::new(node_rlp);
		if r.is_data() && r.is_empty() {
			return Ok(Node::Empty);
		}
		match r.item_count()? {
			// either leaf or extension - decode first item with NibbleSlice
			// and use the is_leaf flag to figure out which.
			// if leaf, second item is a value (is_data())
			// if extension, second item is a node (either hash to be looked up or
			// inline RLP which can be fed back into this function).
			2 => match NibbleSlice::from_encoded(r.at(0)?.data()?) {
				(slice, true) => Ok(Node::Leaf(slice, r.at(1)?.data()?)),
				(slice, false) => Ok(Node::Extension(slice, r.at(1)?.as_raw())),
			},
			// branch - first 16 are nodes, 17th is a value (or empty).
			17 => {
				let mut nodes = [None as Option<&[u8]>; 16];
				for i in 0..16 {
					let v = r.at(i)?;
					if !v.is_empty() {
						nodes[i] = Some(v.as_raw());
					}
				}
				let value = r.at(16)?;
				Ok(Node::Branch(
					nodes,
					if value.is_empty() { None } else { Some(value.data()?) },
				))
			}
			_ => Err(DecoderError::Custom("invalid trie node rlp")),
		}
	}

	/// If `node` is the RLP of a node hash rather than an inline node, return the hash.
	pub fn try_decode_hash(node: &[u8]) -> Option<H256> {
		let r = Rlp::new(node);
		if r.is_data() && r.size() == 32 {
			r.as_val().ok()
		} else {
			None
		}
	}
}

/// Encode a leaf node from its hex-prefix encoded partial key and value.
pub fn leaf_node(partial: &[u8], value: &[u8]) -> Bytes {
	let mut stream = RlpStream::new_list(2);
	stream.append(&partial);
	stream.append(&value);
	stream.out().to_vec()
}

/// Encode an extension node; `child` must be a valid reference (inline node
/// RLP or encoded hash).
pub fn ext_node(partial: &[u8], child: &[u8]) -> Bytes {
	let mut stream = RlpStream::new_list(2);
	stream.append(&partial);
	stream.append_raw(child, 1);
	stream.out().to_vec()
}

/// Encode a branch node from 16 optional child references and an optional value.
pub fn branch_node(children: &[Option<Bytes>; 16], value: Option<&[u8]>) -> Bytes {
	let mut stream = RlpStream::new_list(17);
	for child in children.iter() {
		match child {
			Some(c) => {
				stream.append_raw(c, 1);
			}
			None => {
				stream.append_empty_data();
			}
		}
	}
	match value {
		Some(v) => {
			stream.append(&v);
		}
		None => {
			stream.append_empty_data();
		}
	}
	stream.out().to_vec()
}

/// An owning node type. Useful for trie iterators.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum OwnedNode {
	/// Empty trie node.
	Empty,
	/// Leaf node: hex-prefix encoded partial key and value.
	Leaf(Bytes, Bytes),
	/// Extension node: hex-prefix encoded partial key and child reference.
	Extension(Bytes, Bytes),
	/// Branch node: 16 child references (empty bytes mean no child) and an optional value.
	Branch([Bytes; 16], Option<Bytes>),
}

impl<'a> From<Node<'a>> for OwnedNode {
	fn from(node: Node<'a>) -> Self {
		match node {
			Node::Empty => OwnedNode::Empty,
			Node::Leaf(k, v) => OwnedNode::Leaf(k.encoded(true), v.to_vec()),
			Node::Extension(k, child) => OwnedNode::Extension(k.encoded(false), child.to_vec()),
			Node::Branch(c, val) => {
				let mut children: [Bytes; 16] = Default::default();
				for (owned, borrowed) in children.iter_mut().zip(c.iter()) {
					if let Some(child) = borrowed {
						*owned = child.to_vec();
					}
				}
				OwnedNode::Branch(children, val.map(|v| v.to_vec()))
			}
		}
	}
}
