pub const RCACHE_VERSION: &str = env!("CARGO_PKG_VERSION");
