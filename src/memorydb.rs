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

//! Reference-counted memory-based `HashDB` implementation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::mem;

use ethereum_types::H256;
use keccak_hash::{keccak, KECCAK_NULL_RLP};
use parity_bytes::Bytes;

use crate::hashdb::{DBValue, HashDB};

/// The RLP of the null string, the content of an empty trie root.
pub const NULL_RLP: [u8; 1] = [0x80];

/// Reference-counted memory-based `HashDB` implementation.
///
/// Use `new()` to create a new database. Insert items with `insert()`, remove
/// items with `remove()`, check for existence with `contains()` and look up a
/// hash to derive the data with `get()`. Keys may be removed before they are
/// inserted, leaving a negative reference count until the owed insertions
/// arrive; `purge()` drops the portions of the data with no references.
#[derive(Default, Clone, PartialEq)]
pub struct MemoryDB {
	data: HashMap<H256, (DBValue, i32)>,
	aux: HashMap<Bytes, Bytes>,
}

impl MemoryDB {
	/// Create a new instance of the memory DB.
	pub fn new() -> MemoryDB {
		MemoryDB::default()
	}

	/// Clear all data from the database.
	pub fn clear(&mut self) {
		self.data.clear();
		self.aux.clear();
	}

	/// Purge all zero-referenced data from the database.
	pub fn purge(&mut self) {
		self.data.retain(|_, &mut (_, rc)| rc != 0);
	}

	/// Return the internal map of hashes to data, clearing the current state.
	pub fn drain(&mut self) -> HashMap<H256, (DBValue, i32)> {
		mem::replace(&mut self.data, HashMap::new())
	}

	/// Return the internal map of auxiliary data, clearing the current state.
	pub fn drain_aux(&mut self) -> HashMap<Bytes, Bytes> {
		mem::replace(&mut self.aux, HashMap::new())
	}

	/// Grab the raw information associated with a key. Returns None if the key
	/// doesn't exist.
	///
	/// Even when Some is returned, the data is only guaranteed to be useful
	/// when the refs > 0.
	pub fn raw(&self, key: &H256) -> Option<(&[u8], i32)> {
		if key == &KECCAK_NULL_RLP {
			return Some((&NULL_RLP[..], 1));
		}
		self.data.get(key).map(|(value, rc)| (&value[..], *rc))
	}

	/// Consolidate all the entries of `other` into `self`.
	pub fn consolidate(&mut self, mut other: Self) {
		for (key, (value, rc)) in other.drain() {
			match self.data.entry(key) {
				Entry::Occupied(mut entry) => {
					if entry.get().1 < 0 {
						entry.get_mut().0 = value;
					}
					entry.get_mut().1 += rc;
				}
				Entry::Vacant(entry) => {
					entry.insert((value, rc));
				}
			}
		}
		for (key, value) in other.drain_aux() {
			self.aux.insert(key, value);
		}
	}
}

impl HashDB for MemoryDB {
	fn get(&self, key: &H256) -> Option<DBValue> {
		if key == &KECCAK_NULL_RLP {
			return Some(NULL_RLP.to_vec());
		}

		match self.data.get(key) {
			Some(&(ref d, rc)) if rc > 0 => Some(d.clone()),
			_ => None,
		}
	}

	fn keys(&self) -> HashMap<H256, i32> {
		self.data
			.iter()
			.filter_map(|(k, v)| if v.1 != 0 { Some((*k, v.1)) } else { None })
			.collect()
	}

	fn contains(&self, key: &H256) -> bool {
		if key == &KECCAK_NULL_RLP {
			return true;
		}

		matches!(self.data.get(key), Some(&(_, x)) if x > 0)
	}

	fn insert(&mut self, value: &[u8]) -> H256 {
		if value == &NULL_RLP[..] {
			return KECCAK_NULL_RLP;
		}
		let key = keccak(value);
		match self.data.entry(key) {
			Entry::Occupied(mut entry) => {
				let &mut (ref mut old_value, ref mut rc) = entry.get_mut();
				if *rc <= 0 {
					*old_value = value.to_vec();
				}
				*rc += 1;
			}
			Entry::Vacant(entry) => {
				entry.insert((value.to_vec(), 1));
			}
		}
		key
	}

	fn emplace(&mut self, key: H256, value: DBValue) {
		if value == NULL_RLP {
			return;
		}

		match self.data.entry(key) {
			Entry::Occupied(mut entry) => {
				let &mut (ref mut old_value, ref mut rc) = entry.get_mut();
				if *rc <= 0 {
					*old_value = value;
				}
				*rc += 1;
			}
			Entry::Vacant(entry) => {
				entry.insert((value, 1));
			}
		}
	}

	fn remove(&mut self, key: &H256) {
		if key == &KECCAK_NULL_RLP {
			return;
		}

		match self.data.entry(*key) {
			Entry::Occupied(mut entry) => entry.get_mut().1 -= 1,
			Entry::Vacant(entry) => {
				entry.insert((Bytes::new(), -1));
			}
		}
	}

	fn insert_aux(&mut self, key: Bytes, value: Bytes) {
		self.aux.insert(key, value);
	}

	fn get_aux(&self, key: &[u8]) -> Option<Bytes> {
		self.aux.get(key).cloned()
	}

	fn remove_aux(&mut self, key: &[u8]) {
		self.aux.remove(key);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_get_remove() {
		let mut m = MemoryDB::new();
		let d = b"Hello world!";

		let k = m.insert(d);
		assert!(m.contains(&k));
		assert_eq!(m.get(&k).unwrap(), d);

		m.insert(d);
		assert!(m.contains(&k));

		m.remove(&k);
		assert!(m.contains(&k));

		m.remove(&k);
		assert!(!m.contains(&k));

		m.remove(&k);
		assert!(!m.contains(&k));

		m.insert(d);
		assert!(!m.contains(&k));

		m.insert(d);
		assert!(m.contains(&k));
		assert_eq!(m.get(&k).unwrap(), d);
	}

	#[test]
	fn purge_drops_zero_referenced() {
		let hello_bytes = b"Hello world!";
		let hello_key = keccak(hello_bytes);

		let mut m = MemoryDB::new();
		m.remove(&hello_key);
		assert_eq!(m.raw(&hello_key).unwrap().1, -1);
		m.purge();
		assert_eq!(m.raw(&hello_key).unwrap().1, -1);
		m.insert(hello_bytes);
		assert_eq!(m.raw(&hello_key).unwrap().1, 0);
		m.purge();
		assert_eq!(m.raw(&hello_key), None);
	}

	#[test]
	fn null_rlp_is_always_present() {
		let m = MemoryDB::new();
		assert!(m.contains(&KECCAK_NULL_RLP));
		assert_eq!(m.get(&KECCAK_NULL_RLP).unwrap(), NULL_RLP.to_vec());
	}

	#[test]
	fn consolidate() {
		let mut main = MemoryDB::new();
		let mut other = MemoryDB::new();
		let remove_key = other.insert(b"doggo");
		main.remove(&remove_key);

		let insert_key = other.insert(b"arf");
		main.emplace(insert_key, b"arf".to_vec());

		main.consolidate(other);

		let overlay = main.drain();

		assert_eq!(overlay.get(&remove_key).unwrap(), &(b"doggo".to_vec(), 0));
		assert_eq!(overlay.get(&insert_key).unwrap(), &(b"arf".to_vec(), 2));
	}
}
