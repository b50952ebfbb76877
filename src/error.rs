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

//! State error chain.

use std::{error, io};

use derive_more::{Display, From};
use ethereum_types::{H256, U256};

use crate::trie::TrieError;

/// Error type for operations on the state.
#[derive(Debug, Display, From)]
pub enum Error {
	/// The account start nonce was needed before it was noted.
	#[display(fmt = "Account start nonce was never set")]
	#[from(ignore)]
	InvalidAccountStartNonceInState,
	/// An attempt was made to overwrite an already fixed account start nonce.
	#[display(fmt = "Attempt to change a fixed account start nonce")]
	#[from(ignore)]
	IncorrectAccountStartNonceInState,
	/// Withdrawing more than the account holds.
	#[display(fmt = "Not enough cash: required {}, got {}", required, got)]
	#[from(ignore)]
	NotEnoughCash {
		/// Balance the operation needed.
		required: U256,
		/// Balance the account actually held.
		got: U256,
	},
	/// The trie failed a consistency check.
	#[display(fmt = "Invalid trie")]
	#[from(ignore)]
	InvalidTrie,
	/// The disk holding the database has run out of space.
	#[display(fmt = "Not enough space left on the database volume")]
	#[from(ignore)]
	NotEnoughAvailableSpace,
	/// Another instance holds the database directory lock.
	#[display(fmt = "Database is already open in another instance")]
	#[from(ignore)]
	DatabaseAlreadyOpen,
	/// A key was committed more times than it was inserted.
	#[display(fmt = "Negatively referenced hash: {}", _0)]
	#[from(ignore)]
	NegativelyReferencedHash(H256),
	/// The requested interface was not compiled in.
	#[display(fmt = "Interface {} is not supported by this build", _0)]
	#[from(ignore)]
	InterfaceNotSupported(&'static str),
	/// Error concerning the underlying trie.
	#[display(fmt = "Trie error: {}", _0)]
	Trie(TrieError),
	/// Io error, e.g. from the backing key-value store.
	#[display(fmt = "Io error: {}", _0)]
	Io(io::Error),
	/// Error produced by the transaction executor.
	#[display(fmt = "Execution error: {}", _0)]
	#[from(ignore)]
	Execution(String),
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::Trie(e) => Some(e),
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<Box<TrieError>> for Error {
	fn from(err: Box<TrieError>) -> Self {
		Error::Trie(*err)
	}
}
