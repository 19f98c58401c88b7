use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use rcache::cache::{Cache, CacheOptions};
use rcache::client::Client;
use rcache::cluster::{ClusterNode, SeedMembership};
use rcache::server::tcp::TcpCacheServer;

#[allow(dead_code)]
pub const SELF_ADDR: &str = "127.0.0.1:5837";

/// One spawned TCP cache server on an ephemeral port. Dropping it cancels
/// the acceptor; the dump directory lives as long as the server.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    _dump_dir: tempfile::TempDir,
}

impl TestServer {
    #[allow(dead_code)]
    pub async fn spawn() -> TestServer {
        TestServer::spawn_with(|options| options).await
    }

    /// Spawns a single-node server with adjusted cache options.
    #[allow(dead_code)]
    pub async fn spawn_with<F>(adjust: F) -> TestServer
    where
        F: FnOnce(CacheOptions) -> CacheOptions,
    {
        TestServer::spawn_cluster_view(adjust, Vec::new()).await
    }

    /// Spawns a server that believes the given peers are also cluster
    /// members, without those peers existing. Used to exercise redirects.
    pub async fn spawn_cluster_view<F>(adjust: F, peers: Vec<String>) -> TestServer
    where
        F: FnOnce(CacheOptions) -> CacheOptions,
    {
        let dump_dir = tempfile::tempdir().unwrap();
        let options = adjust(CacheOptions {
            dump_file: dump_dir.path().join("rcache.dump"),
            ..CacheOptions::default()
        });

        let cache = Arc::new(Cache::with_options(options).unwrap());
        let membership = Arc::new(SeedMembership::new(SELF_ADDR.to_string(), &peers));
        let node = ClusterNode::new(SELF_ADDR.to_string(), 128, 3, membership);

        let shutdown = CancellationToken::new();
        let server = TcpCacheServer::bind(cache, node, "127.0.0.1:0", shutdown.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());

        TestServer {
            addr,
            shutdown,
            _dump_dir: dump_dir,
        }
    }

    pub async fn client(&self) -> Client {
        Client::connect(self.addr).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[allow(dead_code)]
pub fn create_value_with_size(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}
