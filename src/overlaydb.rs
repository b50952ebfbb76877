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

//! Disk-backed `HashDB` implementation.

use std::cell::Cell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::H256;
use kvdb::KeyValueDB;
use log::{trace, warn};
use parity_bytes::Bytes;
use rlp::{Rlp, RlpStream};

use crate::error::Error;
use crate::hashdb::{DBValue, HashDB};
use crate::memorydb::MemoryDB;

/// Suffix appended to auxiliary keys when they are written through to the
/// backing store, keeping them clear of the node hash keyspace.
const AUX_FLAG: u8 = 255;

/// Implementation of the `HashDB` trait for a disk-backed database with a memory overlay.
///
/// The operations `insert()` and `remove()` take place on the memory overlay; batches of
/// such operations may be flushed to the disk-backed DB with `commit()` or discarded with
/// `revert()`.
///
/// `lookup()` and `contains()` maintain normal behaviour - all `insert()` and `remove()`
/// queries have an immediate effect. Rather than a double lookup, the value is cached in
/// the overlay's reference count.
pub struct OverlayDB {
	overlay: MemoryDB,
	backing: Arc<dyn KeyValueDB>,
	column: u32,
	enforce_refs: Cell<bool>,
}

impl Clone for OverlayDB {
	fn clone(&self) -> Self {
		OverlayDB {
			overlay: self.overlay.clone(),
			backing: self.backing.clone(),
			column: self.column,
			enforce_refs: self.enforce_refs.clone(),
		}
	}
}

impl OverlayDB {
	/// Create a new instance of OverlayDB given a `backing` database.
	pub fn new(backing: Arc<dyn KeyValueDB>, column: u32) -> OverlayDB {
		OverlayDB {
			overlay: MemoryDB::new(),
			backing,
			column,
			enforce_refs: Cell::new(true),
		}
	}

	/// Create a new instance of OverlayDB with an anonymous temporary backing store.
	pub fn new_temp() -> OverlayDB {
		Self::new(Arc::new(kvdb_memorydb::create(1)), 0)
	}

	/// When disabled, lookups hand out data held under a non-positive reference
	/// count rather than treating it as dead. Used by the consistency checker to
	/// distinguish structural corruption from reference miscounts.
	pub fn set_enforce_refs(&self, enforce: bool) {
		self.enforce_refs.set(enforce);
	}

	/// Commit all overlay operations to the backing database, returning the
	/// number of entries written.
	///
	/// Keys whose total reference count drops to zero are deleted from the
	/// backing store. A key more heavily removed than inserted is an error.
	pub fn commit(&mut self) -> Result<u32, Error> {
		let mut ret = 0u32;
		let mut deletes = 0u32;
		let mut tx = self.backing.transaction();
		for (key, (value, rc)) in self.overlay.drain() {
			if rc == 0 {
				continue;
			}
			match self.payload(&key) {
				Some((back_value, back_rc)) => {
					let total = back_rc as i32 + rc;
					if total < 0 {
						return Err(Error::NegativelyReferencedHash(key));
					}
					if total == 0 {
						tx.delete(self.column, key.as_bytes());
						deletes += 1;
					} else {
						tx.put(self.column, key.as_bytes(), &Self::encode_payload(&back_value, total as u32));
						ret += 1;
					}
				}
				None => {
					if rc < 0 {
						return Err(Error::NegativelyReferencedHash(key));
					}
					tx.put(self.column, key.as_bytes(), &Self::encode_payload(&value, rc as u32));
					ret += 1;
				}
			}
		}
		for (key, value) in self.overlay.drain_aux() {
			let mut aux_key = key;
			aux_key.push(AUX_FLAG);
			tx.put(self.column, &aux_key, &value);
		}
		self.backing.write(tx)?;
		trace!(target: "overlaydb", "OverlayDB::commit() deleted {} nodes, wrote {}", deletes, ret);
		Ok(ret)
	}

	/// Revert all operations on this object since the last commit.
	pub fn revert(&mut self) {
		self.overlay.clear();
	}

	/// Get the refs and value of the given key from the backing store.
	fn payload(&self, key: &H256) -> Option<(DBValue, u32)> {
		let raw = self
			.backing
			.get(self.column, key.as_bytes())
			.unwrap_or_else(|e| {
				warn!(target: "overlaydb", "Low-level database error on {}: {}", key, e);
				None
			})?;
		Self::decode_payload(&raw)
	}

	fn encode_payload(value: &[u8], rc: u32) -> Bytes {
		let mut s = RlpStream::new_list(2);
		s.append(&rc);
		s.append(&value);
		s.out().to_vec()
	}

	fn decode_payload(raw: &[u8]) -> Option<(DBValue, u32)> {
		let rlp = Rlp::new(raw);
		let rc: u32 = rlp.val_at(0).ok()?;
		let value: Vec<u8> = rlp.val_at(1).ok()?;
		Some((value, rc))
	}
}

impl HashDB for OverlayDB {
	fn keys(&self) -> HashMap<H256, i32> {
		let mut ret: HashMap<H256, i32> = HashMap::new();
		for kv in self.backing.iter(self.column) {
			let (key, value) = match kv {
				Ok(kv) => kv,
				Err(e) => {
					warn!(target: "overlaydb", "Low-level database iteration error: {}", e);
					break;
				}
			};
			if key.len() != 32 {
				// aux entry
				continue;
			}
			if let Some((_, rc)) = Self::decode_payload(&value) {
				ret.insert(H256::from_slice(&key), rc as i32);
			}
		}

		for (key, refs) in self.overlay.keys() {
			match ret.entry(key) {
				Entry::Occupied(mut entry) => *entry.get_mut() += refs,
				Entry::Vacant(entry) => {
					entry.insert(refs);
				}
			}
		}
		ret.retain(|_, rc| *rc != 0);
		ret
	}

	fn get(&self, key: &H256) -> Option<DBValue> {
		match self.overlay.raw(key) {
			Some((d, rc)) if rc > 0 => Some(d.to_vec()),
			overlay_entry => {
				let memrc = overlay_entry.map_or(0, |(_, rc)| rc);
				match self.payload(key) {
					Some((d, rc)) if rc as i32 + memrc > 0 => Some(d),
					payload => {
						if self.enforce_refs.get() {
							None
						} else {
							overlay_entry
								.filter(|(d, _)| !d.is_empty())
								.map(|(d, _)| d.to_vec())
								.or(payload.map(|(d, _)| d))
						}
					}
				}
			}
		}
	}

	fn contains(&self, key: &H256) -> bool {
		self.get(key).is_some()
	}

	fn insert(&mut self, value: &[u8]) -> H256 {
		self.overlay.insert(value)
	}

	fn emplace(&mut self, key: H256, value: DBValue) {
		self.overlay.emplace(key, value);
	}

	fn remove(&mut self, key: &H256) {
		self.overlay.remove(key);
	}

	fn insert_aux(&mut self, key: Bytes, value: Bytes) {
		self.overlay.insert_aux(key, value);
	}

	fn get_aux(&self, key: &[u8]) -> Option<Bytes> {
		if let Some(value) = self.overlay.get_aux(key) {
			return Some(value);
		}
		let mut aux_key = key.to_vec();
		aux_key.push(AUX_FLAG);
		self.backing
			.get(self.column, &aux_key)
			.unwrap_or_else(|e| {
				warn!(target: "overlaydb", "Low-level database error on aux lookup: {}", e);
				None
			})
	}

	fn remove_aux(&mut self, key: &[u8]) {
		self.overlay.remove_aux(key);
	}
}
