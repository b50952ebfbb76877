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

//! Transaction type consumed by the executor seam. Decoding and signature
//! recovery happen upstream; by the time a transaction reaches the state
//! layer its sender is known.

use ethereum_types::{Address, U256};
use parity_bytes::Bytes;

/// Transaction action: create a contract or message-call an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	/// Create creates new contract.
	Create,
	/// Calls contract at given address.
	Call(Address),
}

impl Default for Action {
	fn default() -> Action {
		Action::Create
	}
}

/// A transaction with a recovered sender, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedTransaction {
	/// Nonce.
	pub nonce: U256,
	/// Gas price.
	pub gas_price: U256,
	/// Gas paid up front for transaction execution.
	pub gas: U256,
	/// Action, see `Action`.
	pub action: Action,
	/// Transferred value.
	pub value: U256,
	/// Transaction data.
	pub data: Bytes,
	/// The recovered sender of the transaction.
	pub sender: Address,
}
