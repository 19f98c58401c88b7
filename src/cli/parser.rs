use byte_unit::Byte;
use clap::Parser;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::cache::CacheOptions;
use crate::server::options::{ServerOptions, ServerType};

const DEFAULT_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5837;
const DEFAULT_MAX_ENTRY_SIZE: &str = "4GiB";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
/// Distributed in-memory key/value cache server
pub struct RcachedConfig {
    #[arg(long, value_name = "ADDRESS", default_value = DEFAULT_ADDRESS)]
    /// interface to listen on
    pub address: String,

    #[arg(long, value_name = "PORT", value_parser = port_in_range, default_value_t = DEFAULT_PORT)]
    /// TCP port to listen on
    pub port: u16,

    #[arg(long, value_name = "SERVER-TYPE", value_enum, default_value_t = ServerType::Tcp)]
    /// transport to serve (tcp: binary protocol, http: /v1 REST)
    pub server_type: ServerType,

    #[arg(long, value_name = "VIRTUAL-NODE-COUNT", default_value_t = 1024)]
    /// virtual nodes per member on the consistent-hash ring
    pub virtual_node_count: usize,

    #[arg(long, value_name = "SECONDS", default_value_t = 3)]
    /// seconds between ring refreshes from the membership list
    pub update_ring_interval: u64,

    #[arg(long, value_name = "HOST:PORT,...", value_delimiter = ',')]
    /// cluster seed addresses; one living node is enough
    pub cluster: Vec<String>,

    #[arg(long, value_name = "MAX-ENTRY-SIZE", value_parser = parse_size, default_value = DEFAULT_MAX_ENTRY_SIZE)]
    /// ceiling for key+value bytes across the whole cache
    pub max_entry_size: u64,

    #[arg(long, value_name = "COUNT", default_value_t = 1000)]
    /// max entries each shard may drop in one gc pass
    pub max_gc_count: usize,

    #[arg(long, value_name = "MINUTES", default_value_t = 60)]
    /// minutes between background gc passes
    pub gc_interval: u64,

    #[arg(long, value_name = "FILE", default_value = "rcache.dump")]
    /// file the cache is snapshotted to
    pub dump_file: PathBuf,

    #[arg(long, value_name = "MINUTES", default_value_t = 30)]
    /// minutes between background snapshots
    pub dump_interval: u64,

    #[arg(long, value_name = "CAPACITY", default_value_t = 256)]
    /// initial map capacity of each shard
    pub shard_map_capacity: usize,

    #[arg(long, value_name = "COUNT", value_parser = power_of_two, default_value_t = 256)]
    /// number of shards; must be a power of two
    pub shard_count: usize,

    #[arg(long, value_name = "MICROSECONDS", default_value_t = 1000)]
    /// sleep between checks while a snapshot quiesces mutators
    pub cas_sleep: u64,

    #[arg(short, long, action = clap::ArgAction::Count, default_value_t = 1)]
    /// sets the level of verbosity
    pub verbose: u8,
}

const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a port number"))?;
    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

fn parse_size(s: &str) -> Result<u64, String> {
    match Byte::parse_str(s, true) {
        Ok(bytes) => Ok(bytes.as_u64()),
        Err(byte_error) => Err(format!("{}", byte_error)),
    }
}

fn power_of_two(s: &str) -> Result<usize, String> {
    let count: usize = s.parse().map_err(|_| format!("`{s}` isn't a number"))?;
    if count > 0 && count.is_power_of_two() {
        Ok(count)
    } else {
        Err(format!("`{s}` is not a power of two"))
    }
}

impl RcachedConfig {
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            max_entry_size: self.max_entry_size,
            max_gc_per_cycle: self.max_gc_count,
            gc_interval_mins: self.gc_interval,
            dump_file: self.dump_file.clone(),
            dump_interval_mins: self.dump_interval,
            shard_map_capacity: self.shard_map_capacity,
            shard_count: self.shard_count,
            cas_sleep_micros: self.cas_sleep,
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            address: self.address.clone(),
            port: self.port,
            server_type: self.server_type,
            virtual_node_count: self.virtual_node_count,
            update_ring_interval_secs: self.update_ring_interval,
            cluster: self.cluster.clone(),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

pub fn parse(args: Vec<String>) -> Result<RcachedConfig, String> {
    Ok(RcachedConfig::parse_from(args.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        RcachedConfig::command().debug_assert()
    }

    #[test]
    fn defaults_line_up_with_the_option_structs() {
        let config = parse(vec!["rcached".to_string()]).unwrap();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.server_type, ServerType::Tcp);
        assert_eq!(config.max_entry_size, 4 << 30);
        assert_eq!(config.cache_options(), CacheOptions::default());
        assert_eq!(config.server_options().self_address(), "127.0.0.1:5837");
        assert!(config.cluster.is_empty());
    }

    #[test]
    fn cluster_flag_splits_on_commas() {
        let config = parse(
            ["rcached", "--cluster", "10.0.0.1:5837,10.0.0.2:5837"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        assert_eq!(
            config.cluster,
            vec!["10.0.0.1:5837".to_string(), "10.0.0.2:5837".to_string()]
        );
    }

    #[test]
    fn human_readable_entry_size_is_parsed() {
        let config = parse(
            ["rcached", "--max-entry-size", "64MiB"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        assert_eq!(config.max_entry_size, 64 << 20);
    }

    #[test]
    fn shard_count_must_be_a_power_of_two() {
        let result = RcachedConfig::try_parse_from(["rcached", "--shard-count", "100"]);
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        let result = RcachedConfig::try_parse_from(["rcached", "--port", "70000"]);
        assert!(result.is_err());
    }

    #[test]
    fn http_server_type_is_accepted() {
        let config = parse(
            ["rcached", "--server-type", "http"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        assert_eq!(config.server_type, ServerType::Http);
    }
}
