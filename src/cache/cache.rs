use bytes::Bytes;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use super::dump::{self, DumpError};
use super::error::Result;
use super::options::CacheOptions;
use super::shard::Shard;
use super::status::Status;
use super::timer::{SystemTimer, Timer};
use super::value::NEVER_DIE;

/// The cache engine: a fixed power-of-two number of shards plus the dumping
/// flag that quiesces mutators while a snapshot is encoded.
///
/// Shard selection uses the 32-bit digest below, which is part of the
/// deployment contract: reimplementations must place keys identically.
pub struct Cache {
    shards: Vec<Arc<Shard>>,
    options: Arc<CacheOptions>,
    dumping: AtomicBool,
    timer: Arc<dyn Timer>,
}

impl Cache {
    pub fn new() -> Result<Cache> {
        Cache::with_options(CacheOptions::default())
    }

    /// Builds a cache from `options`, recovering wholesale from
    /// `options.dump_file` when a readable snapshot exists there.
    pub fn with_options(options: CacheOptions) -> Result<Cache> {
        Cache::with_options_and_timer(options, Arc::new(SystemTimer::new()))
    }

    pub(crate) fn with_options_and_timer(
        options: CacheOptions,
        timer: Arc<dyn Timer>,
    ) -> Result<Cache> {
        options.validate()?;
        if options.dump_file.exists() {
            match dump::recover(&options, timer.clone()) {
                Ok(cache) => {
                    info!(
                        "recovered {} entries from {}",
                        cache.quick_status().count,
                        options.dump_file.display()
                    );
                    return Ok(cache);
                }
                Err(err) => {
                    warn!(
                        "failed to recover from {}, starting fresh: {}",
                        options.dump_file.display(),
                        err
                    );
                }
            }
        }
        Ok(Cache::empty(options, timer))
    }

    fn empty(options: CacheOptions, timer: Arc<dyn Timer>) -> Cache {
        let options = Arc::new(options);
        let shards = (0..options.shard_count)
            .map(|_| Arc::new(Shard::new(options.clone(), timer.clone())))
            .collect();
        Cache {
            shards,
            options,
            dumping: AtomicBool::new(false),
            timer,
        }
    }

    pub(crate) fn from_parts(
        shards: Vec<Arc<Shard>>,
        options: Arc<CacheOptions>,
        timer: Arc<dyn Timer>,
    ) -> Cache {
        Cache {
            shards,
            options,
            dumping: AtomicBool::new(false),
            timer,
        }
    }

    /// The shard-placement digest. Matches the Java-style string hash with a
    /// final spread of the high bits into the low ones, so the low bits used
    /// by the mask depend on the whole key.
    pub fn index(key: &[u8]) -> u32 {
        let mut hash: u32 = 0;
        for &byte in key {
            hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
        }
        hash ^ (hash >> 16)
    }

    fn shard_of(&self, key: &[u8]) -> &Arc<Shard> {
        &self.shards[Cache::index(key) as usize & (self.shards.len() - 1)]
    }

    /// Spins until no snapshot is being encoded. Every public operation goes
    /// through here first; wake latency is bounded by `cas_sleep_micros`.
    async fn wait_for_dumping(&self) {
        while self.dumping.load(Ordering::Acquire) {
            tokio::time::sleep(Duration::from_micros(self.options.cas_sleep_micros)).await;
        }
    }

    pub async fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.wait_for_dumping().await;
        self.shard_of(key).get(key)
    }

    /// Stores `value` under `key` without an expiry.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.set_with_ttl(key, value, NEVER_DIE).await
    }

    pub async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: u64) -> Result<()> {
        self.wait_for_dumping().await;
        self.shard_of(key).set(key, value, ttl)
    }

    pub async fn delete(&self, key: &[u8]) {
        self.wait_for_dumping().await;
        self.shard_of(key).delete(key);
    }

    /// Sums the per-shard counters. The copies are taken one shard at a time,
    /// so the result is a best-effort snapshot, not a cross-shard instant.
    pub async fn status(&self) -> Status {
        self.wait_for_dumping().await;
        self.quick_status()
    }

    fn quick_status(&self) -> Status {
        let mut total = Status::new();
        for shard in &self.shards {
            total.merge(&shard.status());
        }
        total
    }

    /// Runs one gc pass over every shard in parallel and joins the results.
    pub async fn gc(&self) -> usize {
        self.wait_for_dumping().await;
        let passes: Vec<_> = self
            .shards
            .iter()
            .cloned()
            .map(|shard| tokio::spawn(async move { shard.gc() }))
            .collect();
        join_all(passes)
            .await
            .into_iter()
            .map(|removed| removed.unwrap_or(0))
            .sum()
    }

    /// Writes a snapshot of the whole cache to `options.dump_file`, replacing
    /// any previous one atomically. Mutators are quiesced for the duration of
    /// the in-memory encode; file I/O happens after the shard reads finish.
    pub async fn dump(&self) -> std::result::Result<(), DumpError> {
        self.dumping.store(true, Ordering::SeqCst);
        let result = dump::write(self).await;
        self.dumping.store(false, Ordering::SeqCst);
        result
    }

    /// Starts the periodic gc task. It runs for the life of the process.
    pub fn auto_gc(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        let period = Duration::from_secs(cache.options.gc_interval_mins * 60);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let removed = cache.gc().await;
                debug!("background gc removed {} expired entries", removed);
            }
        });
    }

    /// Starts the periodic snapshot task. Dump failures are logged and the
    /// loop keeps going; the previous dump file stays in place.
    pub fn auto_dump(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        let period = Duration::from_secs(cache.options.dump_interval_mins * 60);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match cache.dump().await {
                    Ok(()) => debug!("background dump finished"),
                    Err(err) => warn!("background dump failed: {}", err),
                }
            }
        });
    }

    pub(crate) fn shards(&self) -> &[Arc<Shard>] {
        &self.shards
    }

    pub(crate) fn options(&self) -> &Arc<CacheOptions> {
        &self.options
    }

    pub(crate) fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    #[cfg(test)]
    pub(crate) fn set_dumping(&self, dumping: bool) {
        self.dumping.store(dumping, Ordering::SeqCst);
    }
}
