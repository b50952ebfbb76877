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

//! Single account in the system.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ethereum_types::{BigEndianHash, H256, U256};
use keccak_hash::{keccak, KECCAK_EMPTY, KECCAK_NULL_RLP};
use log::{trace, warn};
use lru_cache::LruCache;
use parity_bytes::Bytes;
use rlp::{DecoderError, Rlp, RlpStream};

use crate::hashdb::HashDB;
use crate::trie::{self, SecTrieDB, SecTrieDBMut};

const STORAGE_CACHE_ITEMS: usize = 8192;

/// Cache-liveness status of an account: whether it carries uncommitted
/// changes, and whether it is scheduled for deletion at the next commit.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Filth {
	/// Loaded from the backing trie and not changed since.
	Clean,
	/// Changed and awaiting a commit into the trie.
	Dirty,
	/// Scheduled for deletion from the trie; treated as absent by readers.
	Killed,
}

impl Filth {
	/// Whether a commit has anything to do for this account.
	pub fn is_dirty(&self) -> bool {
		!matches!(self, Filth::Clean)
	}

	/// Whether readers should see this account at all.
	pub fn is_alive(&self) -> bool {
		!matches!(self, Filth::Killed)
	}
}

/// Single account in the system.
/// Keeps track of changes to the code and storage.
/// The changes are applied in `commit_storage` and `commit_code`.
pub struct Account {
	// Balance of the account.
	balance: U256,
	// Nonce of the account.
	nonce: U256,
	// Trie-backed storage, as persisted.
	storage_root: H256,
	// LRU cache of the trie-backed storage.
	// This is limited to `STORAGE_CACHE_ITEMS` recent queries.
	storage_cache: RefCell<LruCache<H256, H256>>,
	// Modified storage. Accumulates changes to storage made in `set_storage`.
	// Takes precedence over `storage_cache`. A zero value marks a deletion.
	storage_changes: HashMap<H256, H256>,
	// Code hash of the account.
	code_hash: H256,
	// Size of the account code.
	code_size: Option<usize>,
	// Code cache of the account.
	code_cache: Arc<Bytes>,
	// Account code is new and not yet persisted to the code store.
	code_fresh: bool,
	// Dirty/liveness status.
	filth: Filth,
}

impl Account {
	/// General constructor. Mostly used to seed states in tests and genesis
	/// maps; the result is dirty with fresh code and pending storage writes.
	pub fn new(balance: U256, nonce: U256, storage: HashMap<H256, H256>, code: Bytes) -> Account {
		Account {
			balance,
			nonce,
			storage_root: KECCAK_NULL_RLP,
			storage_cache: Self::empty_storage_cache(),
			storage_changes: storage,
			code_hash: keccak(&code),
			code_size: Some(code.len()),
			code_cache: Arc::new(code),
			code_fresh: true,
			filth: Filth::Dirty,
		}
	}

	/// Create a new account with the given balance and nonce.
	pub fn new_basic(balance: U256, nonce: U256) -> Account {
		Account {
			balance,
			nonce,
			storage_root: KECCAK_NULL_RLP,
			storage_cache: Self::empty_storage_cache(),
			storage_changes: HashMap::new(),
			code_hash: KECCAK_EMPTY,
			code_size: Some(0),
			code_cache: Arc::new(vec![]),
			code_fresh: false,
			filth: Filth::Dirty,
		}
	}

	/// Create a new contract account.
	/// NOTE: make sure you use `init_code` on this before `commit`ing.
	pub fn new_contract(balance: U256, nonce: U256) -> Account {
		Account {
			balance,
			nonce,
			storage_root: KECCAK_NULL_RLP,
			storage_cache: Self::empty_storage_cache(),
			storage_changes: HashMap::new(),
			code_hash: KECCAK_EMPTY,
			code_size: None,
			code_cache: Arc::new(vec![]),
			code_fresh: false,
			filth: Filth::Dirty,
		}
	}

	/// Create a dormant account from database RLP; clean until touched.
	pub fn from_rlp(rlp: &[u8]) -> Result<Account, DecoderError> {
		let r = Rlp::new(rlp);
		Ok(Account {
			nonce: r.val_at(0)?,
			balance: r.val_at(1)?,
			storage_root: r.val_at(2)?,
			storage_cache: Self::empty_storage_cache(),
			storage_changes: HashMap::new(),
			code_hash: r.val_at(3)?,
			code_size: None,
			code_cache: Arc::new(vec![]),
			code_fresh: false,
			filth: Filth::Clean,
		})
	}

	fn empty_storage_cache() -> RefCell<LruCache<H256, H256>> {
		RefCell::new(LruCache::new(STORAGE_CACHE_ITEMS))
	}

	/// Set this account's code to the given code.
	/// NOTE: Account should have been created with `new_contract()`.
	pub fn init_code(&mut self, code: Bytes) {
		self.code_hash = keccak(&code);
		self.code_size = Some(code.len());
		self.code_cache = Arc::new(code);
		self.code_fresh = true;
		self.filth = Filth::Dirty;
	}

	/// Reset this account's code to the given code.
	pub fn reset_code(&mut self, code: Bytes) {
		self.init_code(code);
	}

	/// Set (and cache) the contents of the trie's storage at `key` to `value`.
	/// A zero value marks the key for deletion.
	pub fn set_storage(&mut self, key: H256, value: H256) {
		self.storage_changes.insert(key, value);
		self.filth = Filth::Dirty;
	}

	/// Memoize a value read from the persisted storage trie. Does not make
	/// the account dirty.
	pub fn cache_storage(&self, key: H256, value: H256) {
		self.storage_cache.borrow_mut().insert(key, value);
	}

	/// Get cached storage value if any. Returns `None` if the
	/// key is not in the cache.
	pub fn cached_storage_at(&self, key: &H256) -> Option<H256> {
		if let Some(value) = self.storage_changes.get(key) {
			return Some(*value);
		}
		if let Some(value) = self.storage_cache.borrow_mut().get_mut(key) {
			return Some(*value);
		}
		None
	}

	/// Get (and cache) the contents of the trie's storage at `key`.
	/// Takes modified storage into account.
	pub fn storage_at(&self, db: &dyn HashDB, key: &H256) -> trie::Result<H256> {
		if let Some(value) = self.cached_storage_at(key) {
			return Ok(value);
		}
		let t = SecTrieDB::new(db, &self.storage_root)?;
		let item: U256 = match t.get(key.as_bytes())? {
			Some(payload) => Rlp::new(&payload).as_val().map_err(|e| Box::new(trie::TrieError::DecoderError(e)))?,
			None => U256::zero(),
		};
		let value: H256 = BigEndianHash::from_uint(&item);
		self.cache_storage(*key, value);
		Ok(value)
	}

	/// return the balance associated with this account.
	pub fn balance(&self) -> &U256 {
		&self.balance
	}

	/// return the nonce associated with this account.
	pub fn nonce(&self) -> &U256 {
		&self.nonce
	}

	/// return the code hash associated with this account.
	pub fn code_hash(&self) -> H256 {
		self.code_hash
	}

	/// returns the account's code. If `None` then the code cache isn't
	/// available - get someone who knows to call `note_code`.
	pub fn code(&self) -> Option<Arc<Bytes>> {
		if self.code_hash != KECCAK_EMPTY && self.code_cache.is_empty() {
			return None;
		}
		Some(self.code_cache.clone())
	}

	/// returns the account's code size. If `None` then the code cache isn't
	/// available - get someone who knows to call `note_code`.
	pub fn code_size(&self) -> Option<usize> {
		self.code_size
	}

	/// Provide a byte array which hashes to the `code_hash`. returns the hash as a result.
	pub fn note_code(&mut self, code: Bytes) -> Result<(), H256> {
		let h = keccak(&code);
		if self.code_hash == h {
			self.code_size = Some(code.len());
			self.code_cache = Arc::new(code);
			Ok(())
		} else {
			Err(h)
		}
	}

	/// Is `code_cache` valid; such that code is going to return Some?
	pub fn is_cached(&self) -> bool {
		!self.code_cache.is_empty() || (self.code_cache.is_empty() && self.code_hash == KECCAK_EMPTY)
	}

	/// Provide a database to get `code_hash`. Should not be called if it is a contract without code.
	pub fn cache_code(&mut self, db: &dyn HashDB) -> Option<Arc<Bytes>> {
		trace!(target: "account", "Account::cache_code: ic={}; self.code_hash={:?}", self.is_cached(), self.code_hash);

		if self.is_cached() {
			return Some(self.code_cache.clone());
		}

		match db.get(&self.code_hash) {
			Some(x) => {
				self.code_size = Some(x.len());
				self.code_cache = Arc::new(x);
				Some(self.code_cache.clone())
			}
			_ => {
				warn!(target: "account", "Failed reverse get of {}", self.code_hash);
				None
			}
		}
	}

	/// Determine whether there are any un-`commit()`-ed storage-setting operations.
	pub fn storage_is_clean(&self) -> bool {
		self.storage_changes.is_empty()
	}

	/// Check if the account has zero nonce and balance, no code and no
	/// pending writes.
	pub fn is_empty(&self) -> bool {
		self.nonce.is_zero()
			&& self.balance.is_zero()
			&& self.code_hash == KECCAK_EMPTY
			&& !self.code_fresh
			&& self.storage_changes.is_empty()
	}

	/// Whether readers should see this account.
	pub fn is_alive(&self) -> bool {
		self.filth.is_alive()
	}

	/// Whether a commit has anything to do for this account.
	pub fn is_dirty(&self) -> bool {
		self.filth.is_dirty()
	}

	/// Whether the account code was set during this transaction and has not
	/// been persisted yet.
	pub fn is_fresh_code(&self) -> bool {
		self.code_fresh
	}

	/// Whether the account carries code: persisted or fresh.
	pub fn code_bearing(&self) -> bool {
		self.code_fresh || self.code_hash != KECCAK_EMPTY
	}

	/// The dirty/liveness status of the account.
	pub fn filth(&self) -> Filth {
		self.filth
	}

	/// Mark the account as carrying uncommitted changes. Killed accounts
	/// stay killed.
	pub fn mark_dirty(&mut self) {
		if self.filth == Filth::Clean {
			self.filth = Filth::Dirty;
		}
	}

	/// Schedule the account for deletion at the next commit and clear its
	/// content. Readers treat the account as absent from here on; the cache
	/// entry survives so that the commit deletes the trie row.
	pub fn kill(&mut self) {
		self.filth = Filth::Killed;
		self.balance = U256::zero();
		self.nonce = U256::zero();
		self.storage_root = KECCAK_NULL_RLP;
		self.storage_changes.clear();
		self.storage_cache.borrow_mut().clear();
		self.code_hash = KECCAK_EMPTY;
		self.code_size = Some(0);
		self.code_cache = Arc::new(vec![]);
		self.code_fresh = false;
	}

	/// return the storage root associated with this account, as persisted.
	pub fn base_root(&self) -> &H256 {
		&self.storage_root
	}

	/// return the storage root associated with this account or None if it has
	/// been altered via pending writes.
	pub fn storage_root(&self) -> Option<&H256> {
		if self.storage_is_clean() {
			Some(&self.storage_root)
		} else {
			None
		}
	}

	/// return the pending storage writes.
	pub fn storage_changes(&self) -> &HashMap<H256, H256> {
		&self.storage_changes
	}

	/// Increment the nonce of the account by one.
	pub fn inc_nonce(&mut self) {
		self.nonce = self.nonce + U256::one();
		self.filth = Filth::Dirty;
	}

	/// Increase account balance.
	pub fn add_balance(&mut self, x: &U256) {
		self.balance = self.balance + *x;
		self.filth = Filth::Dirty;
	}

	/// Decrease account balance.
	/// Panics if balance is less than `x`; callers check first.
	pub fn sub_balance(&mut self, x: &U256) {
		assert!(self.balance >= *x);
		self.balance = self.balance - *x;
		self.filth = Filth::Dirty;
	}

	/// Commit the pending storage writes to the backing DB and update
	/// `storage_root`. A zero value removes the key.
	pub fn commit_storage(&mut self, db: &mut dyn HashDB) -> trie::Result<()> {
		let mut t = SecTrieDBMut::from_existing(db, &mut self.storage_root)?;
		for (k, v) in self.storage_changes.drain() {
			if v.is_zero() {
				t.remove(k.as_bytes())?;
			} else {
				t.insert(k.as_bytes(), &rlp::encode(&v.into_uint()))?;
			}
			self.storage_cache.borrow_mut().insert(k, v);
		}
		Ok(())
	}

	/// Commit any unsaved code. `code_hash` will always return the hash of
	/// the `code_cache` after this.
	pub fn commit_code(&mut self, db: &mut dyn HashDB) {
		trace!(target: "account", "Commiting code of {:?} - {:?}, {:?}", self, self.code_fresh, self.code_cache.is_empty());
		match (self.code_fresh, self.code_cache.is_empty()) {
			(true, true) => {
				self.code_size = Some(0);
				self.code_fresh = false;
			}
			(true, false) => {
				db.emplace(self.code_hash, (*self.code_cache).clone());
				self.code_size = Some(self.code_cache.len());
				self.code_fresh = false;
			}
			(false, _) => {}
		}
	}

	/// Export to RLP.
	pub fn rlp(&self) -> Bytes {
		let mut stream = RlpStream::new_list(4);
		stream.append(&self.nonce);
		stream.append(&self.balance);
		stream.append(&self.storage_root);
		stream.append(&self.code_hash);
		stream.out().to_vec()
	}

	/// Clone account data, pending writes and the storage read cache.
	pub fn clone_all(&self) -> Account {
		let storage_cache = Self::empty_storage_cache();
		for (k, v) in self.storage_cache.borrow().iter() {
			storage_cache.borrow_mut().insert(*k, *v);
		}
		Account {
			balance: self.balance,
			nonce: self.nonce,
			storage_root: self.storage_root,
			storage_cache,
			storage_changes: self.storage_changes.clone(),
			code_hash: self.code_hash,
			code_size: self.code_size,
			code_cache: self.code_cache.clone(),
			code_fresh: self.code_fresh,
			filth: self.filth,
		}
	}
}

impl fmt::Debug for Account {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Account")
			.field("balance", &self.balance)
			.field("nonce", &self.nonce)
			.field("storage_root", &self.storage_root)
			.field("code_hash", &self.code_hash)
			.field("filth", &self.filth)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::overlaydb::OverlayDB;
	use rustc_hex::ToHex;

	#[test]
	fn storage_at() {
		let mut db = OverlayDB::new_temp();
		let rlp = {
			let mut a = Account::new_contract(69.into(), 0.into());
			a.set_storage(H256::from_low_u64_be(0x00), H256::from_low_u64_be(0x1234));
			a.commit_storage(&mut db).unwrap();
			a.init_code(vec![]);
			a.commit_code(&mut db);
			a.rlp()
		};

		let a = Account::from_rlp(&rlp).unwrap();
		assert_eq!(
			*a.storage_root().unwrap(),
			"c57e1afb758b07f8d2c8f13a3b6e44fa5ff94ab266facc5a4fd3f062426e50b2"
				.parse()
				.unwrap()
		);
		assert_eq!(
			a.storage_at(&db, &H256::from_low_u64_be(0x00)).unwrap(),
			H256::from_low_u64_be(0x1234)
		);
		assert_eq!(
			a.storage_at(&db, &H256::from_low_u64_be(0x01)).unwrap(),
			H256::zero()
		);
	}

	#[test]
	fn note_code() {
		let mut db = OverlayDB::new_temp();

		let rlp = {
			let mut a = Account::new_contract(69.into(), 0.into());
			a.init_code(vec![0x55, 0x44, 0xffu8]);
			a.commit_code(&mut db);
			a.rlp()
		};

		let mut a = Account::from_rlp(&rlp).unwrap();
		assert!(a.cache_code(&db).is_some());

		let mut a = Account::from_rlp(&rlp).unwrap();
		assert_eq!(a.note_code(vec![0x55, 0x44, 0xffu8]), Ok(()));
		assert_eq!(a.note_code(vec![0x55]), Err(keccak(&[0x55u8][..])));
	}

	#[test]
	fn commit_storage() {
		let mut a = Account::new_contract(69.into(), 0.into());
		let mut db = OverlayDB::new_temp();
		a.set_storage(H256::from_low_u64_be(0), H256::from_low_u64_be(0x1234));
		assert_eq!(a.storage_root(), None);
		a.commit_storage(&mut db).unwrap();
		assert_eq!(
			*a.storage_root().unwrap(),
			"c57e1afb758b07f8d2c8f13a3b6e44fa5ff94ab266facc5a4fd3f062426e50b2"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn commit_remove_commit_storage() {
		let mut a = Account::new_contract(69.into(), 0.into());
		let mut db = OverlayDB::new_temp();
		a.set_storage(H256::from_low_u64_be(0), H256::from_low_u64_be(0x1234));
		a.commit_storage(&mut db).unwrap();
		a.set_storage(H256::from_low_u64_be(1), H256::from_low_u64_be(0x1234));
		a.commit_storage(&mut db).unwrap();
		a.set_storage(H256::from_low_u64_be(1), H256::zero());
		a.commit_storage(&mut db).unwrap();
		assert_eq!(
			*a.storage_root().unwrap(),
			"c57e1afb758b07f8d2c8f13a3b6e44fa5ff94ab266facc5a4fd3f062426e50b2"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn commit_code() {
		let mut a = Account::new_contract(69.into(), 0.into());
		let mut db = OverlayDB::new_temp();
		a.init_code(vec![0x55, 0x44, 0xffu8]);
		assert!(a.is_fresh_code());
		assert_eq!(a.code_size(), Some(3));
		a.commit_code(&mut db);
		assert!(!a.is_fresh_code());
		assert_eq!(
			a.code_hash(),
			"af231e631776a517ca23125370d542873eca1fb4d613ed9b5d5335a46ae5b7eb"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn rlpio() {
		let a = Account::new(69u8.into(), 0u8.into(), HashMap::new(), Bytes::new());
		let b = Account::from_rlp(&a.rlp()).unwrap();
		assert_eq!(a.balance(), b.balance());
		assert_eq!(a.nonce(), b.nonce());
		assert_eq!(a.code_hash(), b.code_hash());
		assert_eq!(a.storage_root(), b.storage_root());
	}

	#[test]
	fn new_account() {
		let a = Account::new(69u8.into(), 0u8.into(), HashMap::new(), Bytes::new());
		assert_eq!(a.rlp().to_hex::<String>(), "f8448045a056e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421a0c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");
		assert_eq!(*a.balance(), 69u8.into());
		assert_eq!(*a.nonce(), 0u8.into());
		assert_eq!(a.code_hash(), KECCAK_EMPTY);
		assert_eq!(a.storage_root().unwrap(), &KECCAK_NULL_RLP);
	}

	#[test]
	fn empty_and_killed() {
		let mut a = Account::new_basic(0.into(), 0.into());
		assert!(a.is_empty());
		assert!(a.is_alive());
		a.add_balance(&1.into());
		assert!(!a.is_empty());
		a.kill();
		assert!(!a.is_alive());
		assert!(a.is_dirty());
		assert!(a.balance().is_zero());
	}
}
