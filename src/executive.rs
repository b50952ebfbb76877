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

//! The seam between the state and an external virtual-machine executor.

use ethereum_types::U256;
use parity_bytes::Bytes;

use crate::error::Error;
use crate::log_entry::LogEntry;
use crate::transaction::SignedTransaction;

/// Whether the effects of an execution stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permanence {
	/// Fold the cached changes into the trie and keep them.
	Committed,
	/// Fold the cached changes into the trie; the caller tracks their fate.
	Uncommitted,
	/// Discard every cached change; the root stays where it was.
	Reverted,
}

/// Per-opcode observer invoked while the VM runs: steps taken, instruction,
/// remaining gas.
pub type OnOp<'a> = Box<dyn FnMut(u64, u8, U256) + 'a>;

/// Transaction execution result as reported by the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
	/// Gas consumed by the transaction.
	pub gas_used: U256,
	/// Return data, if any.
	pub output: Bytes,
}

/// One in-flight transaction execution, bound to a state for its lifetime.
/// All reads and writes the VM performs flow through the borrowed state.
pub trait Executive {
	/// Validate the transaction: signature sanity, nonce, gas limits,
	/// intrinsic gas and the up-front gas purchase. Nothing is allowed to
	/// persist when this fails.
	fn initialize(&mut self, t: &SignedTransaction) -> Result<(), Error>;

	/// The cheap pre-VM path: value transfers and calls to code-less
	/// accounts. Returns true when the transaction is already finished.
	fn execute(&mut self) -> Result<bool, Error>;

	/// Drive the VM to completion, reporting each opcode to `on_op`.
	fn go(&mut self, on_op: Option<OnOp>) -> Result<(), Error>;

	/// Refund unused gas, pay the author and apply the self-destruct list.
	fn finalize(&mut self) -> Result<(), Error>;

	/// Gas consumed so far.
	fn gas_used(&self) -> U256;

	/// Logs emitted so far.
	fn logs(&self) -> &[LogEntry];

	/// Return data of the outermost call, if any.
	fn output(&self) -> &[u8] {
		&[]
	}
}
