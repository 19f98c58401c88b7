use std::env;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rcache::cache::Cache;
use rcache::cli::parser;
use rcache::cluster::{ClusterNode, SeedMembership};
use rcache::server::http::{self, AppState};
use rcache::server::options::ServerType;
use rcache::server::tcp::TcpCacheServer;
use rcache::version::RCACHE_VERSION;

#[tokio::main]
async fn main() {
    let config = match parser::parse(env::args().collect()) {
        Ok(config) => config,
        Err(err) => {
            eprint!("{}", err);
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    let cache_options = config.cache_options();
    let server_options = config.server_options();

    info!("rcached {}", RCACHE_VERSION);
    info!("Listen address: {}", server_options.self_address());
    info!("Server type: {}", server_options.server_type.as_str());
    info!("Shard count: {}", cache_options.shard_count);
    info!("Max entry size: {} bytes", cache_options.max_entry_size);
    info!("Dump file: {}", cache_options.dump_file.display());
    if server_options.cluster.is_empty() {
        info!("Cluster seeds: none (standalone node)");
    } else {
        info!("Cluster seeds: {}", server_options.cluster.join(","));
    }

    let cache = match Cache::with_options(cache_options) {
        Ok(cache) => Arc::new(cache),
        Err(err) => {
            error!("cannot build the cache: {}", err);
            process::exit(1);
        }
    };
    cache.auto_gc();
    cache.auto_dump();

    let membership = Arc::new(SeedMembership::new(
        server_options.self_address(),
        &server_options.cluster,
    ));
    let node = ClusterNode::new(
        server_options.self_address(),
        server_options.virtual_node_count,
        server_options.update_ring_interval_secs,
        membership,
    );
    node.auto_update_ring();

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down...");
            ctrlc_token.cancel();
        }
    });

    let listen = server_options.self_address();
    let served = match server_options.server_type {
        ServerType::Tcp => {
            match TcpCacheServer::bind(cache, node, &listen, shutdown.clone()).await {
                Ok(server) => {
                    info!("rcached is serving tcp on {}", listen);
                    server.serve().await
                }
                Err(err) => Err(err),
            }
        }
        ServerType::Http => {
            info!("rcached is serving http on {}", listen);
            http::serve(AppState { cache, node }, &listen, shutdown.clone()).await
        }
    };

    if let Err(err) = served {
        error!("server terminated: {}", err);
        process::exit(1);
    }
}
