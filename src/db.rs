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

//! Opening of the on-disk state database.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use ethereum_types::H256;
use kvdb::KeyValueDB;
use kvdb_rocksdb::{Database, DatabaseConfig};
use log::{info, trace, warn};
use rustc_hex::ToHex;

use crate::error::Error;

/// Version of the database layout. Bumped when the on-disk format changes;
/// each version lives in its own subdirectory.
pub const DATABASE_VERSION: u32 = 1;

/// Below this much free space the database volume is considered full.
const MIN_AVAILABLE_SPACE: u64 = 1024;

/// What to do with a pre-existing state database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithExisting {
	/// Reopen whatever is there.
	Use,
	/// Delete the state directory and start afresh.
	Kill,
}

fn default_db_path() -> PathBuf {
	env::temp_dir().join("account-state")
}

/// Open the state database under `base_path` (a default location when
/// `None`), keyed into a per-chain directory by the genesis hash:
/// `<base>/<first-4-genesis-bytes-hex>/<database-version>/state`.
pub fn open_db(
	base_path: Option<&Path>,
	genesis_hash: &H256,
	with_existing: WithExisting,
) -> Result<Arc<dyn KeyValueDB>, Error> {
	let base = base_path.map(Path::to_path_buf).unwrap_or_else(default_db_path);

	if with_existing == WithExisting::Kill {
		info!(target: "db", "Killing state database.");
		let _ = fs::remove_dir_all(base.join("state"));
	}

	let path = base
		.join(genesis_hash.as_bytes()[0..4].to_hex::<String>())
		.join(DATABASE_VERSION.to_string());
	fs::create_dir_all(&path)?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o700));
	}

	let mut config = DatabaseConfig::with_columns(1);
	config.max_open_files = 256;

	match Database::open(&config, path.join("state")) {
		Ok(db) => {
			trace!(target: "db", "Opened state DB.");
			Ok(Arc::new(db))
		}
		Err(e) => {
			if fs2::available_space(&path).unwrap_or(0) < MIN_AVAILABLE_SPACE {
				warn!(target: "db", "Not enough available space found on hard drive.");
				Err(Error::NotEnoughAvailableSpace)
			} else {
				warn!(
					target: "db",
					"Database {:?} already open: {}. You appear to have another instance running.",
					path, e
				);
				Err(Error::DatabaseAlreadyOpen)
			}
		}
	}
}
