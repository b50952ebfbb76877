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

use ethereum_types::H256;
use keccak_hash::keccak;

use super::triedbmut::TrieDBMut;
use crate::hashdb::{DBValue, HashDB};

/// A mutable trie which hashes keys and uses a generic `HashDB` backing
/// database.
///
/// With the `fat-db` feature the key preimages are recorded through the
/// database's auxiliary channel, so enumeration can map hashed keys back to
/// the originals.
pub struct SecTrieDBMut<'db> {
	raw: TrieDBMut<'db>,
}

impl<'db> SecTrieDBMut<'db> {
	/// Create a new trie with the backing database `db` and empty `root`.
	pub fn new(db: &'db mut dyn HashDB, root: &'db mut H256) -> Self {
		SecTrieDBMut { raw: TrieDBMut::new(db, root) }
	}

	/// Create a new trie with the backing database `db` and `root`.
	/// Returns an error if root does not exist.
	pub fn from_existing(db: &'db mut dyn HashDB, root: &'db mut H256) -> super::Result<Self> {
		Ok(SecTrieDBMut { raw: TrieDBMut::from_existing(db, root)? })
	}

	/// The root of the trie.
	pub fn root(&self) -> &H256 {
		self.raw.root()
	}

	/// Is the trie the empty trie?
	pub fn is_empty(&self) -> bool {
		self.raw.is_empty()
	}

	/// What is the value of the given key in this trie?
	pub fn get(&self, key: &[u8]) -> super::Result<Option<DBValue>> {
		self.raw.get(keccak(key).as_bytes())
	}

	/// Does the trie contain a given key?
	pub fn contains(&self, key: &[u8]) -> super::Result<bool> {
		self.raw.contains(keccak(key).as_bytes())
	}

	/// Insert a `key`/`value` pair into the trie.
	pub fn insert(&mut self, key: &[u8], value: &[u8]) -> super::Result<()> {
		let hash = keccak(key);
		self.raw.insert(hash.as_bytes(), value)?;
		#[cfg(feature = "fat-db")]
		self.raw
			.db_mut()
			.insert_aux(hash.as_bytes().to_vec(), key.to_vec());
		Ok(())
	}

	/// Remove a `key` from the trie.
	pub fn remove(&mut self, key: &[u8]) -> super::Result<()> {
		let hash = keccak(key);
		self.raw.remove(hash.as_bytes())?;
		#[cfg(feature = "fat-db")]
		self.raw.db_mut().remove_aux(hash.as_bytes());
		Ok(())
	}
}
