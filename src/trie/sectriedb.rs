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
use parity_bytes::Bytes;

use super::triedb::{TrieDB, TrieDBIterator};
use super::Verification;
use crate::hashdb::{DBValue, HashDB};

/// A trie reader which hashes keys and uses a generic `HashDB` backing
/// database. External keys never touch the trie directly; tree depth stays
/// balanced and keys are obfuscated.
pub struct SecTrieDB<'db> {
	raw: TrieDB<'db>,
}

impl<'db> SecTrieDB<'db> {
	/// Create a new trie with the backing database `db` and `root`.
	/// Returns an error if root does not exist.
	pub fn new(db: &'db dyn HashDB, root: &'db H256) -> super::Result<Self> {
		Ok(SecTrieDB { raw: TrieDB::new(db, root)? })
	}

	/// Create a new trie, optionally skipping the root presence check.
	pub fn open(db: &'db dyn HashDB, root: &'db H256, verification: Verification) -> super::Result<Self> {
		Ok(SecTrieDB { raw: TrieDB::open(db, root, verification)? })
	}

	/// Get a reference to the underlying raw `TrieDB`.
	pub fn raw(&self) -> &TrieDB<'db> {
		&self.raw
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

	/// An ordered iterator over all entries. Keys yielded are the hashed
	/// keys as stored; use `key_preimage` to map them back when preimages
	/// were recorded.
	pub fn iter<'a>(&'a self) -> super::Result<TrieDBIterator<'a>> {
		self.raw.iter()
	}

	/// Resolve a hashed key back to the original, if its preimage was
	/// recorded at insertion time.
	pub fn key_preimage(&self, hashed_key: &[u8]) -> Option<Bytes> {
		self.raw.db().get_aux(hashed_key)
	}
}

#[cfg(test)]
mod tests {
	use super::super::sectriedbmut::SecTrieDBMut;
	use super::super::triedb::TrieDB;
	use super::*;
	use crate::memorydb::MemoryDB;

	#[test]
	fn trie_to_sectrie() {
		let mut db = MemoryDB::new();
		let mut root = H256::zero();
		{
			let mut t = SecTrieDBMut::new(&mut db, &mut root);
			t.insert(&[0x01u8, 0x23], &[0x01u8, 0x23]).unwrap();
		}
		let t = TrieDB::new(&db, &root).unwrap();
		assert_eq!(
			t.get(keccak(&[0x01u8, 0x23]).as_bytes()).unwrap().unwrap(),
			vec![0x01u8, 0x23]
		);
		let s = SecTrieDB::new(&db, &root).unwrap();
		assert_eq!(s.get(&[0x01u8, 0x23]).unwrap().unwrap(), vec![0x01u8, 0x23]);
	}
}
