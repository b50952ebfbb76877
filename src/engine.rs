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

//! Consensus engine seam: chain parameters and the executor factory.

use ethereum_types::U256;

use crate::env_info::EnvInfo;
use crate::executive::Executive;
use crate::state::State;

/// Parameters of the chain the engine seals for, as far as the state layer
/// is concerned.
#[derive(Debug, Clone)]
pub struct ChainParams {
	/// Number of the block at which empty accounts touched by a transaction
	/// start being deleted at commit.
	pub eip158_fork_block: u64,
	/// Nonce newly created accounts start from.
	pub account_start_nonce: U256,
}

impl Default for ChainParams {
	fn default() -> ChainParams {
		ChainParams {
			eip158_fork_block: 0,
			account_start_nonce: U256::zero(),
		}
	}
}

/// A consensus engine. The state layer only needs its chain parameters and
/// its ability to produce an executor bound to a state.
pub trait Engine {
	/// The chain parameters.
	fn params(&self) -> &ChainParams;

	/// Produce an executor borrowing `state` for the duration of one
	/// transaction.
	fn executive<'a>(&'a self, state: &'a mut State, env_info: &'a EnvInfo) -> Box<dyn Executive + 'a>;
}
