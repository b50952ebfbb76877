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

//! Merkle-Patricia trie over a `HashDB`, with key-hashing ("secure") wrappers.

use std::{error, fmt};

use ethereum_types::H256;
use rlp::DecoderError;

pub mod node;
pub mod sectriedb;
pub mod sectriedbmut;
pub mod triedb;
pub mod triedbmut;

pub use self::node::Node;
pub use self::sectriedb::SecTrieDB;
pub use self::sectriedbmut::SecTrieDBMut;
pub use self::triedb::{TrieDB, TrieDBIterator};
pub use self::triedbmut::TrieDBMut;

/// Trie Errors.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TrieError {
	/// Attempted to create a trie with a state root not in the DB.
	InvalidStateRoot(H256),
	/// Trie item not found in the database,
	IncompleteDatabase(H256),
	/// Corrupt Trie item.
	DecoderError(DecoderError),
}

impl fmt::Display for TrieError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			TrieError::InvalidStateRoot(ref root) => write!(f, "Invalid state root: {}", root),
			TrieError::IncompleteDatabase(ref missing) => {
				write!(f, "Database missing expected key: {}", missing)
			}
			TrieError::DecoderError(ref err) => write!(f, "Decoding failed with {}", err),
		}
	}
}

impl error::Error for TrieError {}

impl From<DecoderError> for Box<TrieError> {
	fn from(e: DecoderError) -> Self {
		Box::new(TrieError::DecoderError(e))
	}
}

/// Trie result type. Boxed to avoid copying around extra space for `H256`s on successful queries.
pub type Result<T> = ::std::result::Result<T, Box<TrieError>>;

/// Description of what kind of integrity verification a reopened trie root
/// gets. Roots that were produced by this process need not be re-checked.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Verification {
	/// Check that the root node is present in the database.
	Full,
	/// Trust the caller; bind to the root without touching the database.
	Skip,
}

/// A key-value pair yielded by trie iteration.
pub type TrieItem = (Vec<u8>, Vec<u8>);
