use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::cache::Cache;
use super::options::CacheOptions;
use super::shard::{Shard, ShardInner};
use super::timer::Timer;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("dump io: {0}")]
    Io(#[from] io::Error),

    #[error("dump codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error("dump corrupt: {0}")]
    Corrupt(String),
}

/// Serialized view of a running cache. Borrows the shards; the dumping flag
/// must be keeping mutators out while this is encoded.
#[derive(Serialize)]
struct Snapshot<'a> {
    shard_count: usize,
    shards: Vec<&'a ShardInner>,
    options: &'a CacheOptions,
}

/// Owned counterpart of [`Snapshot`], produced by recovery. The two must
/// keep the same field order for the encoding to line up.
#[derive(Deserialize)]
struct OwnedSnapshot {
    shard_count: usize,
    shards: Vec<ShardInner>,
    options: CacheOptions,
}

/// Encodes the whole cache and replaces `options.dump_file` atomically:
/// write `dump_file.<timestamp>`, unlink the old dump, rename. The rename is
/// the atomicity boundary; on any earlier failure the temp file is unlinked
/// and the previous dump survives.
pub(crate) async fn write(cache: &Cache) -> Result<(), DumpError> {
    let encoded = {
        let guards: Vec<_> = cache.shards().iter().map(|shard| shard.read_inner()).collect();
        let snapshot = Snapshot {
            shard_count: guards.len(),
            shards: guards.iter().map(|guard| &**guard).collect(),
            options: cache.options().as_ref(),
        };
        bincode::serialize(&snapshot)?
    };

    let dump_file = &cache.options().dump_file;
    let temp_file = temp_path(dump_file, cache.timer().timestamp());

    if let Err(err) = tokio::fs::write(&temp_file, &encoded).await {
        let _ = tokio::fs::remove_file(&temp_file).await;
        return Err(err.into());
    }
    match tokio::fs::remove_file(dump_file).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            let _ = tokio::fs::remove_file(&temp_file).await;
            return Err(err.into());
        }
    }
    if let Err(err) = tokio::fs::rename(&temp_file, dump_file).await {
        let _ = tokio::fs::remove_file(&temp_file).await;
        return Err(err.into());
    }
    Ok(())
}

fn temp_path(dump_file: &Path, timestamp: u64) -> PathBuf {
    let mut raw: OsString = dump_file.as_os_str().to_os_string();
    raw.push(format!(".{}", timestamp));
    PathBuf::from(raw)
}

/// Rebuilds a cache from `options.dump_file`.
///
/// Data and shard layout come from the dump; tunables come from the current
/// configuration. The dump's own options are decoded (the file is
/// self-describing) but only its shard layout is kept, since key placement
/// depends on it.
pub(crate) fn recover(options: &CacheOptions, timer: Arc<dyn Timer>) -> Result<Cache, DumpError> {
    let raw = std::fs::read(&options.dump_file)?;
    let snapshot: OwnedSnapshot = bincode::deserialize(&raw)?;

    if snapshot.shard_count != snapshot.shards.len() {
        return Err(DumpError::Corrupt(format!(
            "shard count {} does not match {} serialized shards",
            snapshot.shard_count,
            snapshot.shards.len()
        )));
    }
    if snapshot.shard_count == 0 || !snapshot.shard_count.is_power_of_two() {
        return Err(DumpError::Corrupt(format!(
            "dumped shard count {} is not a power of two",
            snapshot.shard_count
        )));
    }

    let mut effective = options.clone();
    if effective.shard_count != snapshot.shard_count {
        warn!(
            "configured shard_count {} differs from dumped {}; keeping the dumped layout",
            effective.shard_count, snapshot.shard_count
        );
        effective.shard_count = snapshot.shard_count;
    }

    let effective = Arc::new(effective);
    let shards = snapshot
        .shards
        .into_iter()
        .map(|inner| Arc::new(Shard::from_inner(inner, effective.clone(), timer.clone())))
        .collect();
    Ok(Cache::from_parts(shards, effective, timer))
}
