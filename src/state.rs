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

//! Representation of the entire state of all accounts in the system.
//!
//! Reads fall through a per-address account cache into the backing trie;
//! writes accumulate in the cache until `commit` folds them back into the
//! trie and produces a new root. `execute` wraps one transaction worth of
//! work with commit-or-discard semantics.

use std::cell::{RefCell, RefMut};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use ethereum_types::{Address, BigEndianHash, H256, U256};
use keccak_hash::{KECCAK_EMPTY, KECCAK_NULL_RLP};
use log::{trace, warn};
use parity_bytes::{Bytes, ToPretty};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rlp::Rlp;

use crate::account::{Account, Filth};
use crate::code_size_cache::CodeSizeCache;
use crate::engine::Engine;
use crate::env_info::EnvInfo;
use crate::error::Error;
use crate::executive::{ExecutionResult, Executive, OnOp, Permanence};
use crate::overlaydb::OverlayDB;
use crate::receipt::Receipt;
use crate::transaction::SignedTransaction;
use crate::trie::{self, SecTrieDB, SecTrieDBMut, TrieDB, TrieDBMut, TrieError, Verification};

/// Bound on the number of clean entries the account cache retains. Dirty
/// entries are exempt; they must survive until the next commit.
pub const MAX_UNCHANGED_CACHE_ENTRIES: usize = 1000;

/// What `commit` does with accounts a transaction touched but left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitBehaviour {
	/// Write empty accounts into the trie like any other.
	KeepEmptyAccounts,
	/// Delete dirty empty accounts instead of writing them.
	RemoveEmptyAccounts,
}

/// Representation of the entire state of all accounts in the system.
pub struct State {
	db: OverlayDB,
	root: H256,
	cache: RefCell<HashMap<Address, Account>>,
	// Clean cache entries eligible for random eviction. Every address in
	// here is in `cache` with a `Clean` status; dirty entries are delisted
	// the moment they are handed out for mutation.
	unchanged: RefCell<Vec<Address>>,
	// Addresses ever dirtied through this state, accumulated across commits.
	touched: HashSet<Address>,
	account_start_nonce: Option<U256>,
	rng: RefCell<StdRng>,
}

impl State {
	/// Creates new state with empty state root.
	pub fn new(mut db: OverlayDB, account_start_nonce: U256) -> State {
		let mut root = H256::zero();
		{
			// init trie and reset root to null
			let _ = TrieDBMut::new(&mut db, &mut root);
		}

		let state = State {
			db,
			root,
			cache: RefCell::new(HashMap::new()),
			unchanged: RefCell::new(Vec::new()),
			touched: HashSet::new(),
			account_start_nonce: Some(account_start_nonce),
			rng: RefCell::new(StdRng::from_entropy()),
		};
		let _ = state.paranoia("end of normal construction", true);
		state
	}

	/// Creates new state with an existing state root.
	pub fn from_existing(db: OverlayDB, root: H256, account_start_nonce: U256) -> Result<State, Error> {
		let mut state = Self::restore(db, root)?;
		state.account_start_nonce = Some(account_start_nonce);
		Ok(state)
	}

	/// Creates a state bound to an existing root whose account start nonce is
	/// not yet known. `note_account_start_nonce` supplies it once the chain
	/// spec has been loaded; operations that create accounts fail until then.
	pub fn restore(db: OverlayDB, root: H256) -> Result<State, Error> {
		{
			let _ = TrieDB::open(&db, &root, Verification::Full)?;
		}
		let state = State {
			db,
			root,
			cache: RefCell::new(HashMap::new()),
			unchanged: RefCell::new(Vec::new()),
			touched: HashSet::new(),
			account_start_nonce: None,
			rng: RefCell::new(StdRng::from_entropy()),
		};
		state.paranoia("end of restoration", true)?;
		Ok(state)
	}

	/// Create a temporary, memory-backed state. Mostly for tests.
	pub fn new_temp() -> State {
		Self::new(OverlayDB::new_temp(), U256::zero())
	}

	/// Return reference to root.
	pub fn root(&self) -> &H256 {
		&self.root
	}

	/// Expose the underlying database; good to use for calling
	/// `state.db().commit()` once a batch of transactions is folded in.
	pub fn db(&mut self) -> &mut OverlayDB {
		&mut self.db
	}

	/// Destroy the current object and return root and database.
	pub fn drop(self) -> (H256, OverlayDB) {
		(self.root, self.db)
	}

	/// Addresses ever dirtied through this state.
	pub fn touched(&self) -> &HashSet<Address> {
		&self.touched
	}

	/// The nonce newly created accounts start from, zero when not yet noted.
	pub fn account_start_nonce(&self) -> U256 {
		self.account_start_nonce.unwrap_or_default()
	}

	/// Record the network-wide account start nonce. May be called any number
	/// of times with the same value; changing a noted value is an error.
	pub fn note_account_start_nonce(&mut self, actual: U256) -> Result<(), Error> {
		match self.account_start_nonce {
			None => {
				self.account_start_nonce = Some(actual);
				Ok(())
			}
			Some(nonce) if nonce == actual => Ok(()),
			Some(_) => Err(Error::IncorrectAccountStartNonceInState),
		}
	}

	/// The account start nonce, or an error if it was never noted.
	pub fn require_account_start_nonce(&self) -> Result<U256, Error> {
		self.account_start_nonce
			.ok_or(Error::InvalidAccountStartNonceInState)
	}

	/// Rebind the state to a different root, dropping the cache.
	///
	/// The cache must be quiescent: changes that have not been committed are
	/// discarded here, so feeding a dirty state is a caller bug.
	pub fn set_root(&mut self, r: H256) {
		debug_assert!(
			self.cache.get_mut().values().all(|account| !account.is_dirty()),
			"set_root called with uncommitted changes in the cache"
		);
		self.clear();
		self.root = r;
		let _ = self.paranoia("begin set_root", true);
	}

	/// Drop every cached entry, clean or dirty.
	pub fn clear(&mut self) {
		self.cache.get_mut().clear();
		self.unchanged.get_mut().clear();
	}

	/// Determine whether an account exists and is alive.
	pub fn address_in_use(&self, a: &Address) -> Result<bool, Error> {
		self.ensure_cached(a, false, |a| a.is_some())
	}

	/// Determine whether an account exists and if not empty.
	pub fn account_nonempty_and_existing(&self, a: &Address) -> Result<bool, Error> {
		self.ensure_cached(a, false, |a| a.map_or(false, |a| !a.is_empty()))
	}

	/// Determine whether an account has code, persisted or fresh.
	pub fn address_has_code(&self, a: &Address) -> Result<bool, Error> {
		self.ensure_cached(a, false, |a| a.map_or(false, |a| a.code_bearing()))
	}

	/// Get the balance of account `a`.
	pub fn balance(&self, a: &Address) -> Result<U256, Error> {
		self.ensure_cached(a, false, |a| {
			a.map_or(U256::zero(), |account| *account.balance())
		})
	}

	/// Get the nonce of account `a`.
	pub fn nonce(&self, a: &Address) -> Result<U256, Error> {
		let start_nonce = self.account_start_nonce();
		self.ensure_cached(a, false, |a| {
			a.map_or(start_nonce, |account| *account.nonce())
		})
	}

	/// Get the effective storage value of account `a` at `key`: pending
	/// writes first, then the persisted storage trie. Trie reads are
	/// memoized in the account without marking it dirty.
	pub fn storage_at(&self, a: &Address, key: &H256) -> Result<H256, Error> {
		let result = self.ensure_cached(a, false, |acc| match acc {
			Some(account) => account.storage_at(&self.db, key),
			None => Ok(H256::zero()),
		})?;
		Ok(result?)
	}

	/// Get the whole effective storage of account `a`: the persisted storage
	/// trie with the pending writes merged over it; pending zeroes erase.
	///
	/// Trie-sourced keys are only recoverable where preimages were recorded
	/// (the fat database option); otherwise the hashed keys stand in.
	pub fn storage(&self, a: &Address) -> Result<BTreeMap<H256, H256>, Error> {
		let mut ret = BTreeMap::new();
		let result: trie::Result<()> = self.ensure_cached(a, false, |acc| {
			let account = match acc {
				Some(account) => account,
				None => return Ok(()),
			};
			if *account.base_root() != KECCAK_NULL_RLP {
				let t = SecTrieDB::new(&self.db, account.base_root())?;
				for item in t.iter()? {
					let (hashed_key, value) = item?;
					let key = match t.key_preimage(&hashed_key) {
						Some(ref preimage) if preimage.len() == 32 => H256::from_slice(preimage),
						_ => H256::from_slice(&hashed_key),
					};
					let value: U256 = Rlp::new(&value)
						.as_val()
						.map_err(|e| Box::new(TrieError::DecoderError(e)))?;
					ret.insert(key, BigEndianHash::from_uint(&value));
				}
			}
			for (k, v) in account.storage_changes() {
				if v.is_zero() {
					ret.remove(k);
				} else {
					ret.insert(*k, *v);
				}
			}
			Ok(())
		})?;
		result?;
		Ok(ret)
	}

	/// Get the storage root of account `a` as persisted in the trie; pending
	/// writes are not reflected.
	pub fn storage_root(&self, a: &Address) -> Result<H256, Error> {
		let trie = self.trie()?;
		match trie.get(a.as_bytes())? {
			Some(raw) => Ok(Rlp::new(&raw)
				.val_at(2)
				.map_err(|e| Error::Trie(TrieError::DecoderError(e)))?),
			None => Ok(KECCAK_NULL_RLP),
		}
	}

	/// Get the code of account `a`, loading it from the code store if needed.
	pub fn code(&self, a: &Address) -> Result<Option<Arc<Bytes>>, Error> {
		self.ensure_cached(a, true, |a| a.and_then(|a| a.code()))
	}

	/// Get the code hash of account `a`.
	pub fn code_hash(&self, a: &Address) -> Result<H256, Error> {
		self.ensure_cached(a, false, |a| a.map_or(KECCAK_EMPTY, |a| a.code_hash()))
	}

	/// Get the code size of account `a`, via the process-wide size memo when
	/// possible so the code bytes need not be re-read just to be measured.
	pub fn code_size(&self, a: &Address) -> Result<usize, Error> {
		let cached = self.ensure_cached(a, false, |acc| {
			acc.map(|account| (account.code_hash(), account.code_size(), account.is_fresh_code()))
		})?;
		let (code_hash, size, fresh) = match cached {
			Some(x) => x,
			None => return Ok(0),
		};
		if fresh {
			return Ok(size.unwrap_or(0));
		}
		if let Some(size) = CodeSizeCache::instance().get(&code_hash) {
			return Ok(size);
		}
		let size = self.code(a)?.map_or(0, |code| code.len());
		CodeSizeCache::instance().store(code_hash, size);
		Ok(size)
	}

	/// Enumerate every account with its balance. Requires key preimages, so
	/// it is only available when the fat database option is compiled in.
	pub fn addresses(&self) -> Result<HashMap<Address, U256>, Error> {
		#[cfg(feature = "fat-db")]
		{
			let mut ret = HashMap::new();
			{
				let trie = self.trie()?;
				for item in trie.iter()? {
					let (hashed_key, value) = item?;
					let address = match trie.key_preimage(&hashed_key) {
						Some(ref preimage) if preimage.len() == 20 => Address::from_slice(preimage),
						_ => Address::from_slice(&hashed_key[12..]),
					};
					let balance: U256 = Rlp::new(&value)
						.val_at(1)
						.map_err(|e| Error::Trie(TrieError::DecoderError(e)))?;
					ret.insert(address, balance);
				}
			}
			for (address, account) in self.cache.borrow().iter() {
				if account.is_alive() {
					ret.insert(*address, *account.balance());
				} else {
					ret.remove(address);
				}
			}
			Ok(ret)
		}
		#[cfg(not(feature = "fat-db"))]
		{
			Err(Error::InterfaceNotSupported("State::addresses()"))
		}
	}

	/// Increment the nonce of account `a` by 1, creating it at
	/// `account_start_nonce + 1` if it does not exist.
	pub fn inc_nonce(&mut self, a: &Address) -> Result<(), Error> {
		self.require(a, false)?.inc_nonce();
		Ok(())
	}

	/// Add `incr` to the balance of account `a`, creating it if it does not
	/// exist.
	pub fn add_balance(&mut self, a: &Address, incr: &U256) -> Result<(), Error> {
		trace!(target: "state", "add_balance({:x}, {})", a, incr);
		self.require(a, false)?.add_balance(incr);
		Ok(())
	}

	/// Subtract `decr` from the balance of account `a`. A zero `decr` is a
	/// no-op; an absent account or one with a lower balance fails.
	pub fn sub_balance(&mut self, a: &Address, decr: &U256) -> Result<(), Error> {
		trace!(target: "state", "sub_balance({:x}, {})", a, decr);
		if decr.is_zero() {
			return Ok(());
		}
		let balance = self.balance(a)?;
		if balance < *decr {
			return Err(Error::NotEnoughCash {
				required: *decr,
				got: balance,
			});
		}
		self.require(a, false)?.sub_balance(decr);
		Ok(())
	}

	/// Subtracts `by` from the balance of `from` and adds it to that of `to`.
	pub fn transfer_balance(&mut self, from: &Address, to: &Address, by: &U256) -> Result<(), Error> {
		self.sub_balance(from, by)?;
		self.add_balance(to, by)
	}

	/// Mutate storage of account `a` so that it is `value` for `key`. A zero
	/// value marks the key for deletion at commit.
	pub fn set_storage(&mut self, a: &Address, key: H256, value: H256) -> Result<(), Error> {
		self.require(a, false)?.set_storage(key, value);
		Ok(())
	}

	/// Replace whatever occupies `a` with a brand-new contract account
	/// awaiting code, keeping the funds already at the address.
	pub fn create_contract(&mut self, a: &Address, increment_nonce: bool) -> Result<(), Error> {
		let mut nonce = self.require_account_start_nonce()?;
		if increment_nonce {
			nonce = nonce + U256::one();
		}
		let balance = self.balance(a)?;
		self.cache.get_mut().insert(*a, Account::new_contract(balance, nonce));
		self.note_dirty(a);
		Ok(())
	}

	/// Initialise the code of account `a` so that it is `code`.
	/// NOTE: Account should have been created with `create_contract`.
	pub fn init_code(&mut self, a: &Address, code: Bytes) -> Result<(), Error> {
		let start_nonce = self.require_account_start_nonce()?;
		self.require_or_from(
			a,
			true,
			|| Account::new_contract(U256::zero(), start_nonce),
			|_| {},
		)?
		.init_code(code);
		Ok(())
	}

	/// Reset the code of account `a` so that it is `code`.
	pub fn reset_code(&mut self, a: &Address, code: Bytes) -> Result<(), Error> {
		let start_nonce = self.require_account_start_nonce()?;
		self.require_or_from(
			a,
			true,
			|| Account::new_contract(U256::zero(), start_nonce),
			|_| {},
		)?
		.reset_code(code);
		Ok(())
	}

	/// Create an empty account at `a` if there is none yet. No-op otherwise.
	pub fn ensure_account_exists(&mut self, a: &Address) -> Result<(), Error> {
		if !self.address_in_use(a)? {
			let nonce = self.require_account_start_nonce()?;
			self.cache
				.get_mut()
				.insert(*a, Account::new_basic(U256::zero(), nonce));
			self.note_dirty(a);
		}
		Ok(())
	}

	/// Mark the account at `a` for deletion at the next commit. An account
	/// present only in the trie is pulled into the cache first so the commit
	/// really deletes its row; an address absent everywhere is a no-op.
	pub fn kill_account(&mut self, a: &Address) -> Result<(), Error> {
		let exists = self.ensure_cached(a, false, |acc| acc.is_some())?;
		if exists {
			self.cache
				.get_mut()
				.get_mut(a)
				.expect("account cached by ensure_cached above; qed")
				.kill();
			self.note_dirty(a);
		}
		Ok(())
	}

	/// Bulk-install an address to account map and fold it into the trie,
	/// keeping accounts that happen to be empty. Used to seed a genesis
	/// state or restore a snapshot.
	pub fn populate_from(&mut self, accounts: HashMap<Address, Account>) -> Result<(), Error> {
		for (address, mut account) in accounts {
			account.mark_dirty();
			self.cache.get_mut().insert(address, account);
		}
		self.commit(CommitBehaviour::KeepEmptyAccounts)
	}

	/// Commits our cached account changes into the trie, producing the new
	/// root. With `RemoveEmptyAccounts`, dirty accounts that ended the
	/// transaction empty are deleted instead of written. Durability is
	/// separate: flush the overlay database when a batch is done.
	pub fn commit(&mut self, behaviour: CommitBehaviour) -> Result<(), Error> {
		if behaviour == CommitBehaviour::RemoveEmptyAccounts {
			for account in self.cache.get_mut().values_mut() {
				if account.is_dirty() && account.is_alive() && account.is_empty() {
					account.kill();
				}
			}
		}

		{
			let cache = self.cache.get_mut();
			// first, commit the sub trees.
			for account in cache.values_mut() {
				if account.is_dirty() && account.is_alive() {
					account.commit_code(&mut self.db);
					account.commit_storage(&mut self.db)?;
				}
			}

			{
				let mut trie = SecTrieDBMut::from_existing(&mut self.db, &mut self.root)?;
				for (address, account) in cache.iter() {
					match account.filth() {
						Filth::Killed => {
							trace!(target: "state", "commit: deleting {:x}", address);
							trie.remove(address.as_bytes())?;
						}
						Filth::Dirty => {
							trie.insert(address.as_bytes(), &account.rlp())?;
						}
						Filth::Clean => {}
					}
				}
			}

			self.touched.extend(
				cache
					.iter()
					.filter(|(_, account)| account.is_dirty())
					.map(|(address, _)| *address),
			);
			cache.clear();
		}
		self.unchanged.get_mut().clear();
		self.paranoia("after commit", true)?;
		Ok(())
	}

	/// Execute a given transaction, folding or discarding its effects.
	///
	/// The engine supplies the executor; the executor borrows this state for
	/// the duration and performs all its reads and writes through it. With
	/// `Permanence::Reverted` the cache is discarded afterwards and the root
	/// stays where it was; otherwise the cache is committed, deleting
	/// touched-but-empty accounts from the fork block onwards.
	pub fn execute(
		&mut self,
		env_info: &EnvInfo,
		engine: &dyn Engine,
		t: &SignedTransaction,
		p: Permanence,
		on_op: Option<OnOp>,
	) -> Result<(ExecutionResult, Receipt), Error> {
		#[cfg(feature = "vm-trace")]
		let on_op: Option<OnOp> = {
			// the compiled-in tracer overrides any caller observer
			let _ = on_op;
			Some(Box::new(|steps: u64, instruction: u8, gas: U256| {
				trace!(target: "vm", "[{}] {:#04x} gas={}", steps, instruction, gas);
			}))
		};

		self.paranoia("start of execution", true)?;

		let (gas_used, output, logs) = {
			let mut e = engine.executive(self, env_info);
			e.initialize(t)?;
			if !e.execute()? {
				e.go(on_op)?;
			}
			e.finalize()?;
			(e.gas_used(), e.output().to_vec(), e.logs().to_vec())
		};

		if p == Permanence::Reverted {
			// the trie was never touched; dropping the cache reverts everything
			self.clear();
		} else {
			let remove_empty = env_info.number >= engine.params().eip158_fork_block;
			self.commit(if remove_empty {
				CommitBehaviour::RemoveEmptyAccounts
			} else {
				CommitBehaviour::KeepEmptyAccounts
			})?;
			self.paranoia("after execution commit", true)?;
		}

		let receipt = Receipt::new(self.root, env_info.gas_used + gas_used, logs);
		Ok((ExecutionResult { gas_used, output }, receipt))
	}

	/// Run a full iteration over the state trie, optionally twice: once with
	/// reference counts ignored and once with them enforced. Returns false on
	/// structural corruption, or when `require_no_leftovers` is set and
	/// unreachable nodes are present.
	pub fn is_trie_good(&self, enforce_refs: bool, require_no_leftovers: bool) -> bool {
		let passes = if enforce_refs { 2 } else { 1 };
		let mut good = true;
		for pass in 0..passes {
			self.db.set_enforce_refs(pass == 1);
			let result: trie::Result<bool> = (|| {
				let trie = TrieDB::open(&self.db, &self.root, Verification::Skip)?;
				for item in trie.iter()? {
					item?;
				}
				if require_no_leftovers {
					let left_overs = trie.left_overs()?;
					if !left_overs.is_empty() {
						warn!(
							target: "state",
							"{} left-over nodes [{} refs]",
							left_overs.len(),
							if pass == 1 { "enforced" } else { "unenforced" }
						);
						return Ok(false);
					}
				}
				Ok(true)
			})();
			match result {
				Ok(true) => {}
				Ok(false) => {
					good = false;
					break;
				}
				Err(e) => {
					warn!(
						target: "state",
						"BAD TRIE [{} refs]: {}",
						if pass == 1 { "enforced" } else { "unenforced" },
						e
					);
					good = false;
					break;
				}
			}
		}
		self.db.set_enforce_refs(true);
		good
	}

	#[cfg(feature = "paranoia")]
	fn paranoia(&self, when: &str, enforce_refs: bool) -> Result<(), Error> {
		if !self.is_trie_good(enforce_refs, false) {
			warn!(target: "state", "BAD TRIE {}", when);
			return Err(Error::InvalidTrie);
		}
		Ok(())
	}

	#[cfg(not(feature = "paranoia"))]
	fn paranoia(&self, _when: &str, _enforce_refs: bool) -> Result<(), Error> {
		Ok(())
	}

	/// The state trie, bound to the current root. The root is trusted from
	/// construction onwards, so reopening skips verification.
	fn trie(&self) -> trie::Result<SecTrieDB> {
		SecTrieDB::open(&self.db, &self.root, Verification::Skip)
	}

	/// Check caches for required data; populate the cache from the trie if
	/// absent. The closure observes the account without references escaping.
	/// Accounts marked killed are reported as absent.
	fn ensure_cached<F, U>(&self, a: &Address, require_code: bool, f: F) -> Result<U, Error>
	where
		F: FnOnce(Option<&Account>) -> U,
	{
		let cached = self.cache.borrow().contains_key(a);
		if cached {
			let mut cache = self.cache.borrow_mut();
			let account = cache.get_mut(a).expect("key checked above; qed");
			if !account.is_alive() {
				return Ok(f(None));
			}
			if require_code {
				self.cache_code_for(account)?;
			}
			return Ok(f(Some(account)));
		}

		// load from trie
		let maybe_acc = {
			let trie = self.trie()?;
			match trie.get(a.as_bytes())? {
				Some(raw) => Some(
					Account::from_rlp(&raw).map_err(|e| Error::Trie(TrieError::DecoderError(e)))?,
				),
				None => None,
			}
		};
		let mut account = match maybe_acc {
			Some(account) => account,
			None => return Ok(f(None)),
		};
		self.clear_cache_if_too_large();
		if require_code {
			self.cache_code_for(&mut account)?;
		}
		let result = f(Some(&account));
		self.cache.borrow_mut().insert(*a, account);
		self.unchanged.borrow_mut().push(*a);
		Ok(result)
	}

	/// Materialise the account's code from the code store and note its size
	/// in the shared memo.
	fn cache_code_for(&self, account: &mut Account) -> Result<(), Error> {
		if account.is_fresh_code() || account.is_cached() {
			return Ok(());
		}
		match account.cache_code(&self.db) {
			Some(code) => {
				CodeSizeCache::instance().store(account.code_hash(), code.len());
				Ok(())
			}
			None => Err(Error::Trie(TrieError::IncompleteDatabase(account.code_hash()))),
		}
	}

	/// Pull account `a` into our cache from the trie DB and hand it out for
	/// mutation. `require_code` requires that the code be cached, too.
	fn require<'a>(&'a self, a: &Address, require_code: bool) -> Result<RefMut<'a, Account>, Error> {
		let start_nonce = self.require_account_start_nonce()?;
		self.require_or_from(
			a,
			require_code,
			|| Account::new_basic(U256::zero(), start_nonce),
			|_| {},
		)
	}

	/// Pull account `a` into our cache from the trie DB and hand it out for
	/// mutation. If it doesn't exist, make the account equal the evaluation
	/// of `default`; killed entries are replaced the same way.
	fn require_or_from<'a, F, G>(
		&'a self,
		a: &Address,
		require_code: bool,
		default: F,
		not_default: G,
	) -> Result<RefMut<'a, Account>, Error>
	where
		F: FnOnce() -> Account,
		G: FnOnce(&mut Account),
	{
		let cached = self.cache.borrow().contains_key(a);
		if !cached {
			let maybe_acc = {
				let trie = self.trie()?;
				match trie.get(a.as_bytes())? {
					Some(raw) => Some(
						Account::from_rlp(&raw)
							.map_err(|e| Error::Trie(TrieError::DecoderError(e)))?,
					),
					None => None,
				}
			};
			if let Some(account) = maybe_acc {
				self.clear_cache_if_too_large();
				// not listed as unchanged: it is about to be dirtied
				self.cache.borrow_mut().insert(*a, account);
			}
		}

		{
			let mut cache = self.cache.borrow_mut();
			match cache.entry(*a) {
				Entry::Occupied(mut e) => {
					if e.get().is_alive() {
						not_default(e.get_mut());
						e.get_mut().mark_dirty();
					} else {
						// killed entries are re-created, not resurrected
						*e.get_mut() = default();
					}
				}
				Entry::Vacant(e) => {
					e.insert(default());
				}
			}
		}
		self.note_dirty(a);

		let mut account = RefMut::map(self.cache.borrow_mut(), |c| {
			c.get_mut(a).expect("entry ensured above; qed")
		});
		if require_code {
			self.cache_code_for(&mut account)?;
		}
		Ok(account)
	}

	/// Strike an address off the clean-entry list; it is no longer a
	/// candidate for eviction.
	fn note_dirty(&self, a: &Address) {
		let mut unchanged = self.unchanged.borrow_mut();
		if let Some(position) = unchanged.iter().position(|x| x == a) {
			unchanged.swap_remove(position);
		}
	}

	/// Reseed the eviction RNG for reproducible runs.
	#[cfg(test)]
	fn set_rng_seed(&mut self, seed: u64) {
		self.rng = RefCell::new(StdRng::seed_from_u64(seed));
	}

	/// Evict uniformly random clean entries until the clean list is back
	/// under its bound. Swap-and-pop keeps eviction O(1); randomness avoids
	/// pathological sweeps for address-ordered workloads.
	fn clear_cache_if_too_large(&self) {
		let mut unchanged = self.unchanged.borrow_mut();
		if unchanged.len() <= MAX_UNCHANGED_CACHE_ENTRIES {
			return;
		}
		let mut cache = self.cache.borrow_mut();
		let mut rng = self.rng.borrow_mut();
		while unchanged.len() > MAX_UNCHANGED_CACHE_ENTRIES {
			let index = rng.gen_range(0..unchanged.len());
			let address = unchanged.swap_remove(index);
			if cache.get(&address).map_or(false, |account| !account.is_dirty()) {
				cache.remove(&address);
			}
		}
	}
}

impl Clone for State {
	fn clone(&self) -> State {
		// the clone duplicates the cache and shares the backing store; the
		// root was produced by this process so it is not re-verified
		let state = State {
			db: self.db.clone(),
			root: self.root,
			cache: RefCell::new(
				self.cache
					.borrow()
					.iter()
					.map(|(address, account)| (*address, account.clone_all()))
					.collect(),
			),
			unchanged: RefCell::new(self.unchanged.borrow().clone()),
			touched: self.touched.clone(),
			account_start_nonce: self.account_start_nonce,
			rng: RefCell::new(StdRng::from_entropy()),
		};
		let _ = state.paranoia("after state cloning", true);
		state
	}
}

impl fmt::Display for State {
	/// One line per address: a prefix encoding how the cached entry relates
	/// to the trie row, the nonce, `#:` balance, and for code-bearing
	/// accounts the storage root (`???` while storage writes are pending),
	/// the code hash or pending code, and the storage entries.
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "--- {:x}", self.root)?;

		let trie = match self.trie() {
			Ok(trie) => trie,
			Err(_) => return Err(fmt::Error),
		};

		// union of the trie rows and the cache
		let mut trie_rows: BTreeMap<Address, Bytes> = BTreeMap::new();
		if let Ok(iter) = trie.iter() {
			for item in iter.flatten() {
				let (hashed_key, value) = item;
				let address = match trie.key_preimage(&hashed_key) {
					Some(ref preimage) if preimage.len() == 20 => Address::from_slice(preimage),
					_ => Address::from_slice(&hashed_key[12..]),
				};
				trie_rows.insert(address, value);
			}
		}
		let cache = self.cache.borrow();
		let mut addresses: BTreeSet<Address> = trie_rows.keys().cloned().collect();
		addresses.extend(cache.keys().cloned());

		for address in addresses {
			let account = cache.get(&address);
			let row = trie_rows.get(&address).map(|raw| Rlp::new(raw));

			if let Some(account) = account {
				if !account.is_alive() {
					writeln!(f, "XXX  {:x}", address)?;
					continue;
				}
			}

			let row_nonce: Option<U256> = row.as_ref().and_then(|r| r.val_at(0).ok());
			let row_balance: Option<U256> = row.as_ref().and_then(|r| r.val_at(1).ok());
			let row_storage_root: Option<H256> = row.as_ref().and_then(|r| r.val_at(2).ok());
			let row_code_hash: Option<H256> = row.as_ref().and_then(|r| r.val_at(3).ok());

			let mut lead = match (account.is_some(), row.is_some()) {
				(true, true) => " *   ",
				(true, false) => " +   ",
				(false, _) => "     ",
			};
			if let (Some(account), Some(nonce), Some(balance)) = (account, row_nonce, row_balance) {
				if *account.nonce() == nonce && *account.balance() == balance {
					lead = " .   ";
				}
			}

			let mut contout = String::new();
			let code_bearing = account.map_or(false, |a| a.code_bearing())
				|| row_code_hash.map_or(false, |h| h != KECCAK_EMPTY);
			if code_bearing {
				// persisted storage, with the pending writes classified
				// against it
				let mut mem: BTreeMap<U256, U256> = BTreeMap::new();
				let mut back: BTreeSet<U256> = BTreeSet::new();
				let mut delta: BTreeSet<U256> = BTreeSet::new();
				let mut cached_keys: BTreeSet<U256> = BTreeSet::new();
				if let Some(root) = row_storage_root {
					if let Ok(storage_trie) = SecTrieDB::open(&self.db, &root, Verification::Skip) {
						if let Ok(iter) = storage_trie.iter() {
							for item in iter.flatten() {
								let (hashed_key, value) = item;
								let key = match storage_trie.key_preimage(&hashed_key) {
									Some(ref preimage) if preimage.len() == 32 => {
										H256::from_slice(preimage).into_uint()
									}
									_ => H256::from_slice(&hashed_key).into_uint(),
								};
								if let Ok(value) = Rlp::new(&value).as_val::<U256>() {
									mem.insert(key, value);
									back.insert(key);
								}
							}
						}
					}
				}
				if let Some(account) = account {
					for (k, v) in account.storage_changes() {
						let k = k.into_uint();
						let v = v.into_uint();
						let differs = match mem.get(&k) {
							Some(existing) => *existing != v,
							None => !v.is_zero(),
						};
						if differs {
							mem.insert(k, v);
							delta.insert(k);
						} else if !v.is_zero() {
							cached_keys.insert(k);
						}
					}
				}
				if !delta.is_empty() {
					lead = if lead == " .   " { "*.*  " } else { "***  " };
				}

				contout.push_str(" @:");
				if !delta.is_empty() {
					contout.push_str("???");
				} else {
					let root = row_storage_root
						.or_else(|| account.map(|a| *a.base_root()))
						.unwrap_or(KECCAK_NULL_RLP);
					contout.push_str(&format!("{:x}", root));
				}
				match account {
					Some(account) if account.is_fresh_code() => {
						let code = account.code().expect("fresh code is always cached; qed");
						contout.push_str(&format!(" ${}", code.pretty()));
					}
					Some(account) => {
						contout.push_str(&format!(" ${:x}", account.code_hash()));
					}
					None => {
						contout.push_str(&format!(
							" ${:x}",
							row_code_hash.unwrap_or(KECCAK_EMPTY)
						));
					}
				}

				for (k, v) in &mem {
					let key = format!("{:0>64}", format!("{:x}", k));
					if v.is_zero() {
						contout.push_str(&format!("\nXXX    {}", key));
					} else {
						let prefix = if delta.contains(k) {
							if back.contains(k) {
								" *     "
							} else {
								" +     "
							}
						} else if cached_keys.contains(k) {
							" .     "
						} else {
							"       "
						};
						contout.push_str(&format!("\n{}{}: {:x}", prefix, key, v));
					}
				}
			}

			let nonce = account
				.map(|a| *a.nonce())
				.or(row_nonce)
				.unwrap_or_default();
			let balance = account
				.map(|a| *a.balance())
				.or(row_balance)
				.unwrap_or_default();
			writeln!(f, "{}{:x}: {} #:{}{}", lead, address, nonce, balance, contout)?;
		}
		Ok(())
	}
}

impl fmt::Debug for State {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:?}", self.cache.borrow())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{ChainParams, Engine};
	use crate::executive::Executive;
	use crate::log_entry::LogEntry;
	use crate::test_helpers::init_log;
	use crate::transaction::{Action, SignedTransaction};

	fn address_from_u64(value: u64) -> Address {
		Address::from_low_u64_be(value)
	}

	// An engine whose executor transfers value and charges a flat fee of
	// 21000 gas; enough machinery to drive the execution protocol.
	struct TestEngine {
		params: ChainParams,
	}

	impl TestEngine {
		fn new(eip158_fork_block: u64) -> TestEngine {
			TestEngine {
				params: ChainParams {
					eip158_fork_block,
					account_start_nonce: U256::zero(),
				},
			}
		}
	}

	impl Engine for TestEngine {
		fn params(&self) -> &ChainParams {
			&self.params
		}

		fn executive<'a>(
			&'a self,
			state: &'a mut State,
			env_info: &'a EnvInfo,
		) -> Box<dyn Executive + 'a> {
			Box::new(TestExecutive {
				state,
				_env_info: env_info,
				t: None,
				gas_used: U256::zero(),
				logs: vec![],
			})
		}
	}

	struct TestExecutive<'a> {
		state: &'a mut State,
		_env_info: &'a EnvInfo,
		t: Option<SignedTransaction>,
		gas_used: U256,
		logs: Vec<LogEntry>,
	}

	impl<'a> Executive for TestExecutive<'a> {
		fn initialize(&mut self, t: &SignedTransaction) -> Result<(), Error> {
			let balance = self.state.balance(&t.sender)?;
			if balance < t.value {
				return Err(Error::NotEnoughCash {
					required: t.value,
					got: balance,
				});
			}
			self.t = Some(t.clone());
			Ok(())
		}

		fn execute(&mut self) -> Result<bool, Error> {
			let t = self.t.clone().expect("initialize is called first; qed");
			self.state.inc_nonce(&t.sender)?;
			match t.action {
				Action::Call(dest) => {
					self.state.transfer_balance(&t.sender, &dest, &t.value)?;
				}
				Action::Create => {
					let contract = address_from_u64(0xc0de);
					self.state.sub_balance(&t.sender, &t.value)?;
					self.state.create_contract(&contract, false)?;
					self.state.add_balance(&contract, &t.value)?;
					self.state.init_code(&contract, t.data.clone())?;
				}
			}
			self.gas_used = 21_000.into();
			Ok(true)
		}

		fn go(&mut self, _on_op: Option<OnOp>) -> Result<(), Error> {
			Ok(())
		}

		fn finalize(&mut self) -> Result<(), Error> {
			Ok(())
		}

		fn gas_used(&self) -> U256 {
			self.gas_used
		}

		fn logs(&self) -> &[LogEntry] {
			&self.logs
		}
	}

	fn call_transaction(sender: Address, dest: Address, value: U256) -> SignedTransaction {
		SignedTransaction {
			nonce: U256::zero(),
			gas_price: U256::zero(),
			gas: 100_000.into(),
			action: Action::Call(dest),
			value,
			data: vec![],
			sender,
		}
	}

	#[test]
	fn create_empty() {
		let mut state = State::new_temp();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(
			*state.root(),
			"56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn ensure_cached() {
		let mut state = State::new_temp();
		let a = Address::zero();
		state.require(&a, false).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(
			*state.root(),
			"0ce23f3c809de377b008a4a3ee94a0834aac8bec1f86e28ffe4fdb5a15b0c785"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn get_from_database() {
		let a = Address::zero();
		let (root, db) = {
			let mut state = State::new_temp();
			state.inc_nonce(&a).unwrap();
			state.add_balance(&a, &69.into()).unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			assert_eq!(state.balance(&a).unwrap(), 69.into());
			state.drop()
		};

		let state = State::from_existing(db, root, U256::zero()).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 69.into());
		assert_eq!(state.nonce(&a).unwrap(), 1.into());
	}

	#[test]
	fn nonce_of_missing_account_is_start_nonce() {
		let state = State::new(OverlayDB::new_temp(), 7.into());
		assert_eq!(state.nonce(&address_from_u64(1)).unwrap(), 7.into());
		assert!(!state.address_in_use(&address_from_u64(1)).unwrap());
	}

	#[test]
	fn balance_creation_changes_root_deterministically() {
		let a = address_from_u64(2);
		let mut state = State::new_temp();
		let empty_root = {
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			*state.root()
		};
		state.add_balance(&a, &100.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 100.into());
		assert_eq!(state.nonce(&a).unwrap(), state.account_start_nonce());
		assert_ne!(*state.root(), empty_root);

		let mut other = State::new_temp();
		other.add_balance(&a, &100.into()).unwrap();
		other.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(*other.root(), *state.root());
	}

	#[test]
	fn alter_balance() {
		let mut state = State::new_temp();
		let a = Address::zero();
		let b = address_from_u64(1);
		state.add_balance(&a, &69.into()).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 69.into());
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 69.into());
		state.sub_balance(&a, &42.into()).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 27.into());
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 27.into());
		state.transfer_balance(&a, &b, &18.into()).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 9.into());
		assert_eq!(state.balance(&b).unwrap(), 18.into());
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 9.into());
		assert_eq!(state.balance(&b).unwrap(), 18.into());
	}

	#[test]
	fn not_enough_cash_leaves_balance_untouched() {
		let mut state = State::new_temp();
		let a = Address::zero();
		state.add_balance(&a, &10.into()).unwrap();
		match state.sub_balance(&a, &11.into()) {
			Err(Error::NotEnoughCash { required, got }) => {
				assert_eq!(required, 11.into());
				assert_eq!(got, 10.into());
			}
			x => panic!("unexpected result: {:?}", x.map(|_| ())),
		}
		assert_eq!(state.balance(&a).unwrap(), 10.into());
		// withdrawing nothing from a missing account is fine
		state.sub_balance(&address_from_u64(9), &U256::zero()).unwrap();
	}

	#[test]
	fn alter_nonce() {
		let mut state = State::new_temp();
		let a = Address::zero();
		state.inc_nonce(&a).unwrap();
		assert_eq!(state.nonce(&a).unwrap(), 1.into());
		state.inc_nonce(&a).unwrap();
		assert_eq!(state.nonce(&a).unwrap(), 2.into());
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.nonce(&a).unwrap(), 2.into());
		state.inc_nonce(&a).unwrap();
		assert_eq!(state.nonce(&a).unwrap(), 3.into());
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.nonce(&a).unwrap(), 3.into());
	}

	#[test]
	fn balance_nonce() {
		let mut state = State::new_temp();
		let a = Address::zero();
		assert_eq!(state.balance(&a).unwrap(), 0.into());
		assert_eq!(state.nonce(&a).unwrap(), 0.into());
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 0.into());
		assert_eq!(state.nonce(&a).unwrap(), 0.into());
	}

	#[test]
	fn code_from_database() {
		let a = Address::zero();
		let (root, db) = {
			let mut state = State::new_temp();
			state.create_contract(&a, false).unwrap();
			state.init_code(&a, vec![1, 2, 3]).unwrap();
			assert_eq!(
				state.code(&a).unwrap().map(|c| (*c).clone()),
				Some(vec![1u8, 2, 3])
			);
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			assert_eq!(
				state.code(&a).unwrap().map(|c| (*c).clone()),
				Some(vec![1u8, 2, 3])
			);
			state.drop()
		};

		let state = State::from_existing(db, root, U256::zero()).unwrap();
		assert_eq!(
			state.code(&a).unwrap().map(|c| (*c).clone()),
			Some(vec![1u8, 2, 3])
		);
		assert_eq!(state.code_size(&a).unwrap(), 3);
		assert_eq!(
			state.code_hash(&a).unwrap(),
			keccak_hash::keccak(&[1u8, 2, 3][..])
		);
		assert!(state.address_has_code(&a).unwrap());
	}

	#[test]
	fn storage_at_from_database() {
		let a = Address::zero();
		let (root, db) = {
			let mut state = State::new_temp();
			state
				.set_storage(&a, H256::from_low_u64_be(1), H256::from_low_u64_be(69))
				.unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			state.drop()
		};

		let state = State::from_existing(db, root, U256::zero()).unwrap();
		assert_eq!(
			state.storage_at(&a, &H256::from_low_u64_be(1)).unwrap(),
			H256::from_low_u64_be(69)
		);
		// a second read is served from the memo without dirtying the account
		assert_eq!(
			state.storage_at(&a, &H256::from_low_u64_be(1)).unwrap(),
			H256::from_low_u64_be(69)
		);
		let root_before = *state.root();
		let mut state = state;
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(*state.root(), root_before);
	}

	#[test]
	fn storage_overlay_and_erasure() {
		let mut state = State::new_temp();
		let a = Address::zero();
		let k = H256::from_low_u64_be(0xb0);

		state.set_storage(&a, k, H256::from_low_u64_be(0xff)).unwrap();
		assert_eq!(state.storage_at(&a, &k).unwrap(), H256::from_low_u64_be(0xff));
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.storage_at(&a, &k).unwrap(), H256::from_low_u64_be(0xff));
		assert_ne!(state.storage_root(&a).unwrap(), KECCAK_NULL_RLP);

		// a zero write erases the key and the storage root returns to empty
		state.set_storage(&a, k, H256::zero()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.storage_at(&a, &k).unwrap(), H256::zero());
		assert_eq!(state.storage_root(&a).unwrap(), KECCAK_NULL_RLP);
	}

	#[test]
	fn storage_map_merges_pending_writes() {
		let mut state = State::new_temp();
		let a = Address::zero();
		let k1 = H256::from_low_u64_be(1);
		let k2 = H256::from_low_u64_be(2);
		state.set_storage(&a, k1, H256::from_low_u64_be(10)).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();

		state.set_storage(&a, k2, H256::from_low_u64_be(20)).unwrap();
		state.set_storage(&a, k1, H256::zero()).unwrap();
		let storage = state.storage(&a).unwrap();
		assert_eq!(storage.get(&k2), Some(&H256::from_low_u64_be(20)));
		if cfg!(feature = "fat-db") {
			// the persisted k1 row surfaces under its original key and is
			// erased by the pending zero
			assert_eq!(storage.get(&k1), None);
			assert_eq!(storage.len(), 1);
		}
	}

	#[test]
	fn remove() {
		let a = Address::zero();
		let mut state = State::new_temp();
		assert!(!state.address_in_use(&a).unwrap());
		state.inc_nonce(&a).unwrap();
		assert!(state.address_in_use(&a).unwrap());
		assert_eq!(state.nonce(&a).unwrap(), 1.into());
		state.kill_account(&a).unwrap();
		assert!(!state.address_in_use(&a).unwrap());
		assert_eq!(state.nonce(&a).unwrap(), 0.into());
	}

	#[test]
	fn remove_from_database() {
		let a = Address::zero();
		let (root, db) = {
			let mut state = State::new_temp();
			state.inc_nonce(&a).unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			assert!(state.address_in_use(&a).unwrap());
			state.drop()
		};

		let (root, db) = {
			// the account lives only in the trie here; killing it must load
			// it so the commit deletes the row
			let mut state = State::from_existing(db, root, U256::zero()).unwrap();
			assert!(state.address_in_use(&a).unwrap());
			state.clear();
			state.kill_account(&a).unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			assert!(!state.address_in_use(&a).unwrap());
			state.drop()
		};

		let state = State::from_existing(db, root, U256::zero()).unwrap();
		assert!(!state.address_in_use(&a).unwrap());
		assert_eq!(
			*state.root(),
			"56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn commit_is_idempotent() {
		let mut state = State::new_temp();
		state.add_balance(&address_from_u64(5), &37.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		// commit leaves nothing behind in the cache
		assert!(state.cache.borrow().is_empty());
		assert!(state.unchanged.borrow().is_empty());
		let root1 = *state.root();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(*state.root(), root1);
	}

	#[test]
	fn commit_removes_empty_accounts() {
		let mut state = State::new_temp();
		state.add_balance(&address_from_u64(1), &69.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		let root_before = *state.root();

		state.ensure_account_exists(&address_from_u64(2)).unwrap();
		state.commit(CommitBehaviour::RemoveEmptyAccounts).unwrap();
		assert_eq!(*state.root(), root_before);

		// while keeping them writes a different root
		state.ensure_account_exists(&address_from_u64(2)).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_ne!(*state.root(), root_before);
	}

	#[test]
	fn populate_from_reflects_accounts() {
		let mut state = State::new_temp();
		let a = address_from_u64(10);
		let mut accounts = HashMap::new();
		accounts.insert(a, Account::new_basic(69.into(), 3.into()));
		state.populate_from(accounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 69.into());
		assert_eq!(state.nonce(&a).unwrap(), 3.into());
		// the implicit commit folded everything into the trie
		assert_eq!(state.storage_root(&a).unwrap(), KECCAK_NULL_RLP);
		assert!(state.touched().contains(&a));
	}

	#[test]
	fn set_root_rebinds_view() {
		let a = Address::zero();
		let mut state = State::new_temp();
		state.add_balance(&a, &69.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		let root_with_69 = *state.root();
		state.add_balance(&a, &1.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 70.into());

		state.set_root(root_with_69);
		assert_eq!(*state.root(), root_with_69);
		assert_eq!(state.balance(&a).unwrap(), 69.into());
	}

	#[test]
	fn should_work_when_cloned() {
		init_log();

		let a = Address::zero();
		let mut state = {
			let mut state = State::new_temp();
			assert!(!state.address_in_use(&a).unwrap());
			state.inc_nonce(&a).unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			state.clone()
		};

		state.inc_nonce(&a).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert_eq!(state.nonce(&a).unwrap(), 2.into());
	}

	#[test]
	fn start_nonce_is_noted_once() {
		let (root, db) = {
			let mut state = State::new_temp();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			state.drop()
		};
		let mut state = State::restore(db, root).unwrap();
		assert!(matches!(
			state.require_account_start_nonce(),
			Err(Error::InvalidAccountStartNonceInState)
		));
		// creating accounts needs the start nonce
		assert!(state.inc_nonce(&Address::zero()).is_err());

		state.note_account_start_nonce(3.into()).unwrap();
		state.note_account_start_nonce(3.into()).unwrap();
		assert!(matches!(
			state.note_account_start_nonce(4.into()),
			Err(Error::IncorrectAccountStartNonceInState)
		));
		assert_eq!(state.require_account_start_nonce().unwrap(), 3.into());
		state.inc_nonce(&Address::zero()).unwrap();
		assert_eq!(state.nonce(&Address::zero()).unwrap(), 4.into());
	}

	#[test]
	fn eviction_keeps_cache_bounded() {
		let mut state = State::new_temp();
		state.set_rng_seed(17);
		let mut accounts = HashMap::new();
		for i in 0..(MAX_UNCHANGED_CACHE_ENTRIES as u64 + 100) {
			accounts.insert(
				address_from_u64(i + 1),
				Account::new_basic((i + 1).into(), 0.into()),
			);
		}
		state.populate_from(accounts).unwrap();

		let dirty = address_from_u64(500_000);
		state.add_balance(&dirty, &1.into()).unwrap();

		for i in 0..(MAX_UNCHANGED_CACHE_ENTRIES as u64 + 100) {
			assert_eq!(state.balance(&address_from_u64(i + 1)).unwrap(), (i + 1).into());
		}

		assert!(state.unchanged.borrow().len() <= MAX_UNCHANGED_CACHE_ENTRIES + 1);
		for address in state.unchanged.borrow().iter() {
			assert!(
				state.cache.borrow().get(address).map_or(false, |a| !a.is_dirty()),
				"clean list points at a missing or dirty entry"
			);
		}
		// dirty entries are never evicted
		assert!(state.cache.borrow().contains_key(&dirty));
		assert!(!state.unchanged.borrow().iter().any(|x| *x == dirty));
	}

	#[test]
	fn execute_transfers_and_reports_receipt() {
		init_log();

		let sender = address_from_u64(0xa);
		let dest = address_from_u64(0xb);
		let mut state = State::new_temp();
		state.add_balance(&sender, &100.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();

		let engine = TestEngine::new(u64::max_value());
		let mut env_info = EnvInfo::default();
		env_info.gas_used = 5.into();
		let t = call_transaction(sender, dest, 60.into());

		let (result, receipt) = state
			.execute(&env_info, &engine, &t, Permanence::Committed, None)
			.unwrap();
		assert_eq!(result.gas_used, 21_000.into());
		assert_eq!(receipt.gas_used, 21_005.into());
		assert_eq!(receipt.state_root, *state.root());
		assert_eq!(state.balance(&dest).unwrap(), 60.into());
		assert_eq!(state.balance(&sender).unwrap(), 40.into());
		assert_eq!(state.nonce(&sender).unwrap(), 1.into());
	}

	#[test]
	fn execute_reverted_discards_all_changes() {
		let sender = address_from_u64(0xa);
		let dest = address_from_u64(0xb);
		let mut state = State::new_temp();
		state.add_balance(&sender, &100.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		let root_before = *state.root();

		// uncommitted tinkering ahead of the execution is discarded with it
		for i in 0..10u64 {
			state.add_balance(&address_from_u64(100 + i), &1.into()).unwrap();
		}

		let engine = TestEngine::new(u64::max_value());
		let env_info = EnvInfo::default();
		let t = call_transaction(sender, dest, 60.into());

		let (_, receipt) = state
			.execute(&env_info, &engine, &t, Permanence::Reverted, None)
			.unwrap();
		assert_eq!(*state.root(), root_before);
		assert_eq!(receipt.state_root, root_before);
		assert_eq!(state.balance(&sender).unwrap(), 100.into());
		assert_eq!(state.balance(&dest).unwrap(), 0.into());
		assert_eq!(state.balance(&address_from_u64(105)).unwrap(), 0.into());
	}

	#[test]
	fn execute_prunes_empty_accounts_after_fork() {
		let sender = address_from_u64(0xa);
		let dest = address_from_u64(0xb);

		let run = |fork_block: u64| -> H256 {
			let mut state = State::new_temp();
			state.add_balance(&sender, &100.into()).unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();

			let engine = TestEngine::new(fork_block);
			let mut env_info = EnvInfo::default();
			env_info.number = 10;
			// a zero-value call touches the destination without funding it
			let t = call_transaction(sender, dest, U256::zero());
			state
				.execute(&env_info, &engine, &t, Permanence::Committed, None)
				.unwrap();
			// the sender row changed (nonce); the destination is the
			// interesting part
			assert_eq!(
				state.address_in_use(&dest).unwrap(),
				env_info.number < fork_block
			);
			*state.root()
		};

		let pruned = run(0);
		let kept = run(100);
		assert_ne!(pruned, kept);
	}

	#[test]
	fn dump_encodes_cache_against_trie() {
		let mut state = State::new_temp();
		let a = address_from_u64(1);
		let b = address_from_u64(2);
		let c = address_from_u64(3);
		state.add_balance(&a, &69.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		// a: cached and matching the trie row; b: cache-only; c: killed
		state.balance(&a).unwrap();
		state.add_balance(&b, &1.into()).unwrap();
		state.inc_nonce(&c).unwrap();
		state.kill_account(&c).unwrap();

		let dump = format!("{}", state);
		assert!(dump.starts_with("--- "), "dump was: {}", dump);
		assert!(
			dump.contains(&format!(" +   {:x}: 0 #:1", b)),
			"dump was: {}",
			dump
		);
		assert!(dump.contains(&format!("XXX  {:x}", c)), "dump was: {}", dump);
		if cfg!(feature = "fat-db") {
			assert!(
				dump.contains(&format!(" .   {:x}: 0 #:69", a)),
				"dump was: {}",
				dump
			);
		}
	}

	#[test]
	fn trie_stays_good_through_usage() {
		let mut state = State::new_temp();
		for i in 0..20u64 {
			state.add_balance(&address_from_u64(i), &(i + 1).into()).unwrap();
			state
				.set_storage(
					&address_from_u64(i),
					H256::from_low_u64_be(i),
					H256::from_low_u64_be(i * 2 + 1),
				)
				.unwrap();
		}
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert!(state.is_trie_good(true, false));
		for i in 0..20u64 {
			state.kill_account(&address_from_u64(i)).unwrap();
		}
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		assert!(state.is_trie_good(true, false));
		assert_eq!(
			*state.root(),
			"56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
				.parse()
				.unwrap()
		);
	}

	#[test]
	fn overlay_flush_survives_reopen() {
		let a = Address::zero();
		let backing = {
			let mut state = State::new_temp();
			state.add_balance(&a, &69.into()).unwrap();
			state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
			// make the overlay durable, then throw the state away
			state.db().commit().unwrap();
			let (root, db) = state.drop();
			(root, db)
		};
		let (root, db) = backing;
		let state = State::from_existing(db, root, U256::zero()).unwrap();
		assert_eq!(state.balance(&a).unwrap(), 69.into());
	}

	#[cfg(feature = "fat-db")]
	#[test]
	fn addresses_enumerates_trie_and_cache() {
		let mut state = State::new_temp();
		let a = address_from_u64(1);
		let b = address_from_u64(2);
		state.add_balance(&a, &69.into()).unwrap();
		state.commit(CommitBehaviour::KeepEmptyAccounts).unwrap();
		state.add_balance(&b, &42.into()).unwrap();

		let addresses = state.addresses().unwrap();
		assert_eq!(addresses.get(&a), Some(&69.into()));
		assert_eq!(addresses.get(&b), Some(&42.into()));
	}

	#[cfg(not(feature = "fat-db"))]
	#[test]
	fn addresses_requires_fat_db() {
		let state = State::new_temp();
		assert!(matches!(
			state.addresses(),
			Err(Error::InterfaceNotSupported(_))
		));
	}
}
