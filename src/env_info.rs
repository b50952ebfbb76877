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

//! Environment information for transaction execution.

use ethereum_types::{Address, H256, U256};

/// Information concerning the execution environment for a transaction.
#[derive(Debug, Clone, Default)]
pub struct EnvInfo {
	/// The block number.
	pub number: u64,
	/// The block author.
	pub author: Address,
	/// The block timestamp.
	pub timestamp: u64,
	/// The block difficulty.
	pub difficulty: U256,
	/// The block gas limit.
	pub gas_limit: U256,
	/// The gas used in the block prior to this transaction.
	pub gas_used: U256,
	/// The hashes of the most recent blocks, latest first.
	pub last_hashes: Vec<H256>,
}
