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

//! Process-wide memo of code sizes by code hash, so that measuring a
//! contract's code does not require re-reading the code bytes.

use ethereum_types::H256;
use lazy_static::lazy_static;
use lru_cache::LruCache;
use parking_lot::Mutex;

const CODE_SIZE_CACHE_ITEMS: usize = 50_000;

lazy_static! {
	static ref INSTANCE: CodeSizeCache = CodeSizeCache {
		sizes: Mutex::new(LruCache::new(CODE_SIZE_CACHE_ITEMS)),
	};
}

/// Shared cache of `code hash -> code size`. Safe for concurrent use;
/// the last writer for a hash wins, which is harmless as the mapping is
/// deterministic.
pub struct CodeSizeCache {
	sizes: Mutex<LruCache<H256, usize>>,
}

impl CodeSizeCache {
	/// The process-wide instance.
	pub fn instance() -> &'static CodeSizeCache {
		&INSTANCE
	}

	/// Look up the size recorded for a code hash.
	pub fn get(&self, hash: &H256) -> Option<usize> {
		self.sizes.lock().get_mut(hash).copied()
	}

	/// Whether the size of this code hash is known.
	pub fn contains(&self, hash: &H256) -> bool {
		self.sizes.lock().contains_key(hash)
	}

	/// Record the size of a piece of code.
	pub fn store(&self, hash: H256, size: usize) {
		self.sizes.lock().insert(hash, size);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use keccak_hash::keccak;

	#[test]
	fn store_and_get() {
		let cache = CodeSizeCache::instance();
		let hash = keccak(b"some code");
		assert_eq!(cache.get(&hash), None);
		cache.store(hash, 9);
		assert!(cache.contains(&hash));
		assert_eq!(cache.get(&hash), Some(9));
	}
}
