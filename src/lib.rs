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

//! World-state engine for an account-based chain.
//!
//! The state of all accounts is kept in a secure Merkle-Patricia trie whose
//! nodes live in a reference-counted overlay database. `State` provides a
//! mutable view over that trie: reads fall through a per-address account
//! cache into the trie, writes accumulate in the cache until `commit` folds
//! them back in and produces a new state root. Transaction execution is
//! driven through the `Engine`/`Executive` seam and either commits or
//! discards the cached changes wholesale.

pub mod account;
pub mod code_size_cache;
pub mod db;
pub mod engine;
pub mod env_info;
pub mod error;
pub mod executive;
pub mod hashdb;
pub mod log_entry;
pub mod memorydb;
pub mod nibbleslice;
pub mod overlaydb;
pub mod receipt;
pub mod state;
pub mod transaction;
pub mod trie;

pub use crate::account::{Account, Filth};
pub use crate::code_size_cache::CodeSizeCache;
pub use crate::db::{open_db, WithExisting, DATABASE_VERSION};
pub use crate::engine::{ChainParams, Engine};
pub use crate::env_info::EnvInfo;
pub use crate::error::Error;
pub use crate::executive::{ExecutionResult, Executive, OnOp, Permanence};
pub use crate::hashdb::{AsHashDB, HashDB, DBValue};
pub use crate::log_entry::LogEntry;
pub use crate::memorydb::MemoryDB;
pub use crate::overlaydb::OverlayDB;
pub use crate::receipt::Receipt;
pub use crate::state::{CommitBehaviour, State, MAX_UNCHANGED_CACHE_ENTRIES};
pub use crate::transaction::{Action, SignedTransaction};
