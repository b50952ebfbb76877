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

//! Log entry type emitted by contract executions.

use ethereum_types::{Address, H256};
use parity_bytes::Bytes;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// A single log emitted during execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
	/// The address of the contract emitting the log.
	pub address: Address,
	/// The topics of the log.
	pub topics: Vec<H256>,
	/// The abstract data of the log.
	pub data: Bytes,
}

impl Encodable for LogEntry {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(3);
		s.append(&self.address);
		s.append_list(&self.topics);
		s.append(&self.data);
	}
}

impl Decodable for LogEntry {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		Ok(LogEntry {
			address: rlp.val_at(0)?,
			topics: rlp.list_at(1)?,
			data: rlp.val_at(2)?,
		})
	}
}
