mod common;

use rcache::client::ClientError;

#[tokio::test]
async fn a_full_cache_rejects_new_entries() {
    // One byte of capacity over a single shard.
    let server = common::TestServer::spawn_with(|options| rcache::cache::CacheOptions {
        max_entry_size: 1,
        shard_count: 1,
        ..options
    })
    .await;
    let mut client = server.client().await;

    client.set(b"a", b"").await.unwrap();

    match client.set(b"b", b"").await {
        Err(ClientError::Server(message)) => {
            assert_eq!(message, "the entry size will exceed if you set this entry")
        }
        other => panic!("expected a capacity error, got {:?}", other),
    }

    match client.get(b"b").await {
        Err(ClientError::Server(message)) => assert_eq!(message, "not found"),
        other => panic!("expected a not-found error, got {:?}", other.map(|b| b.len())),
    }
    assert_eq!(client.status().await.unwrap().count, 1);
}

#[tokio::test]
async fn deleting_frees_capacity() {
    let server = common::TestServer::spawn_with(|options| rcache::cache::CacheOptions {
        max_entry_size: 1,
        shard_count: 1,
        ..options
    })
    .await;
    let mut client = server.client().await;

    client.set(b"a", b"").await.unwrap();
    client.delete(b"a").await.unwrap();
    client.set(b"b", b"").await.unwrap();
    assert_eq!(client.status().await.unwrap().count, 1);
}
