use clap::ValueEnum;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ServerType {
    /// Length-prefixed binary protocol over TCP.
    Tcp,
    /// Same operations over HTTP (`/v1/...`).
    Http,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Tcp => "tcp",
            ServerType::Http => "http",
        }
    }
}

/// Transport and cluster settings, separate from the engine's
/// [`CacheOptions`](crate::cache::CacheOptions).
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub address: String,
    pub port: u16,
    pub server_type: ServerType,
    pub virtual_node_count: usize,
    pub update_ring_interval_secs: u64,
    /// Seed addresses of the cluster to join; empty means a standalone node.
    pub cluster: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> ServerOptions {
        ServerOptions {
            address: "127.0.0.1".to_string(),
            port: 5837,
            server_type: ServerType::Tcp,
            virtual_node_count: 1024,
            update_ring_interval_secs: 3,
            cluster: Vec::new(),
        }
    }
}

impl ServerOptions {
    /// This node's member name, `host:port`. The same string is what peers
    /// see in the ring, so it must be stable across the cluster.
    pub fn self_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
