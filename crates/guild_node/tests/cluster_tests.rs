//! End-to-end checks for the relay tier and the bus endpoint: handshake,
//! fan-out with sender exclusion, channel isolation, and the full
//! publish-to-remote-cache path through a real service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use guild_node::bus::BusEndpoint;
use guild_node::config::ClusterSettings;
use guild_node::headless;
use guild_node::relay::GuildRelay;
use guild_service::{BusPublisher, Collaborators, GuildConfig, GuildService};
use guild_store::GuildStore;
use guild_types::{GuildId, PlayerId};
use guild_wire::{read_frame, write_frame, BusMessage};
use tokio::net::TcpStream;
use tokio::time::timeout;

async fn join_relay(addr: SocketAddr, node_id: &str, channel: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let hello = BusMessage::Hello {
        node_id: node_id.to_string(),
        channel: channel.to_string(),
    }
    .encode()
    .unwrap();
    write_frame(&mut stream, &hello).await.unwrap();
    stream
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_forwards_to_other_nodes_only() {
    let relay = GuildRelay::bind("127.0.0.1:0").await.unwrap();
    let addr = relay.local_addr();
    let relay_task = tokio::spawn(relay.clone().run());

    let mut alpha = join_relay(addr, "alpha", "guilds").await;
    let mut beta = join_relay(addr, "beta", "guilds").await;
    settle().await;
    assert_eq!(relay.peer_count(), 2);

    let sent = BusMessage::Chat {
        guild: GuildId(7),
        sender: "Ada".to_string(),
        text: "anyone on?".to_string(),
    };
    write_frame(&mut alpha, &sent.encode().unwrap()).await.unwrap();

    let forwarded = timeout(Duration::from_secs(1), read_frame(&mut beta))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(BusMessage::decode(&forwarded).unwrap(), sent);

    // The sender must not hear its own frame back.
    let echo = timeout(Duration::from_millis(200), read_frame(&mut alpha)).await;
    assert!(echo.is_err());

    relay_task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_keeps_channels_apart() {
    let relay = GuildRelay::bind("127.0.0.1:0").await.unwrap();
    let addr = relay.local_addr();
    let relay_task = tokio::spawn(relay.clone().run());

    let mut alpha = join_relay(addr, "alpha", "guilds").await;
    let mut beta = join_relay(addr, "beta", "guilds").await;
    let mut stranger = join_relay(addr, "gamma", "parties").await;
    settle().await;

    let sent = BusMessage::ClearGuild { guild: GuildId(3) };
    write_frame(&mut alpha, &sent.encode().unwrap()).await.unwrap();

    let forwarded = timeout(Duration::from_secs(1), read_frame(&mut beta))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(BusMessage::decode(&forwarded).unwrap(), sent);

    let crossed = timeout(Duration::from_millis(200), read_frame(&mut stranger)).await;
    assert!(crossed.is_err());

    relay_task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_drops_peers_that_skip_the_handshake() {
    let relay = GuildRelay::bind("127.0.0.1:0").await.unwrap();
    let addr = relay.local_addr();
    let relay_task = tokio::spawn(relay.clone().run());

    let mut rude = TcpStream::connect(addr).await.unwrap();
    let not_hello = BusMessage::ClearGuild { guild: GuildId(1) }.encode().unwrap();
    write_frame(&mut rude, &not_hello).await.unwrap();
    settle().await;

    assert_eq!(relay.peer_count(), 0);

    // The relay closed the connection; the next read reports EOF.
    let closed = timeout(Duration::from_secs(1), read_frame(&mut rude))
        .await
        .unwrap();
    assert!(closed.is_err());

    relay_task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_speaks_both_directions() {
    let relay = GuildRelay::bind("127.0.0.1:0").await.unwrap();
    let addr = relay.local_addr();
    let relay_task = tokio::spawn(relay.clone().run());

    let mut observer = join_relay(addr, "observer", "guilds").await;

    let cluster = ClusterSettings {
        enabled: true,
        relay_addr: addr.to_string(),
        channel: "guilds".to_string(),
        reconnect_ms: 50,
    };
    let endpoint = BusEndpoint::new("alpha", &cluster);
    let store = Arc::new(GuildStore::open_in_memory().unwrap());
    let services = headless::host_services();
    let service = GuildService::new(
        "alpha",
        GuildConfig::default(),
        store,
        Collaborators {
            economy: services.economy,
            directory: services.directory,
            vault: services.vault,
            host: services.host,
            bus: endpoint.clone(),
        },
    );
    let bus_task = endpoint.start(service.clone());
    settle().await;

    // Outbound: a published message crosses the relay to the observer.
    let sent = BusMessage::MemberJoin {
        guild: GuildId(4),
        player_name: "Ada".to_string(),
    };
    endpoint.publish(sent.clone()).await;
    let forwarded = timeout(Duration::from_secs(1), read_frame(&mut observer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(BusMessage::decode(&forwarded).unwrap(), sent);

    // Inbound: a cache-clear frame from another node lands in the
    // service's cache.
    let player = PlayerId::new();
    service.cache().set(player, GuildId(4));
    let clear = BusMessage::SyncCache {
        player,
        guild: None,
    }
    .encode()
    .unwrap();
    write_frame(&mut observer, &clear).await.unwrap();
    settle().await;
    assert_eq!(service.cache().get(player), None);

    bus_task.abort();
    relay_task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_flushes_messages_queued_before_start() {
    let relay = GuildRelay::bind("127.0.0.1:0").await.unwrap();
    let addr = relay.local_addr();
    let relay_task = tokio::spawn(relay.clone().run());
    let mut observer = join_relay(addr, "observer", "guilds").await;
    settle().await;

    let cluster = ClusterSettings {
        enabled: true,
        relay_addr: addr.to_string(),
        channel: "guilds".to_string(),
        reconnect_ms: 50,
    };
    let endpoint = BusEndpoint::new("alpha", &cluster);
    let store = Arc::new(GuildStore::open_in_memory().unwrap());
    let services = headless::host_services();
    let service = GuildService::new(
        "alpha",
        GuildConfig::default(),
        store,
        Collaborators {
            economy: services.economy,
            directory: services.directory,
            vault: services.vault,
            host: services.host,
            bus: endpoint.clone(),
        },
    );

    // Published before the connection task exists: must queue, not drop.
    let sent = BusMessage::DeleteSync { guild: GuildId(9) };
    endpoint.publish(sent.clone()).await;

    let bus_task = endpoint.start(service.clone());

    let forwarded = timeout(Duration::from_secs(2), read_frame(&mut observer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(BusMessage::decode(&forwarded).unwrap(), sent);

    bus_task.abort();
    relay_task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_retries_until_the_relay_appears() {
    // Reserve an address, then free it so the endpoint's first attempts
    // fail before the relay binds it.
    let placeholder = GuildRelay::bind("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr();
    drop(placeholder);

    let cluster = ClusterSettings {
        enabled: true,
        relay_addr: addr.to_string(),
        channel: "guilds".to_string(),
        reconnect_ms: 50,
    };
    let endpoint = BusEndpoint::new("alpha", &cluster);
    let store = Arc::new(GuildStore::open_in_memory().unwrap());
    let services = headless::host_services();
    let service = GuildService::new(
        "alpha",
        GuildConfig::default(),
        store,
        Collaborators {
            economy: services.economy,
            directory: services.directory,
            vault: services.vault,
            host: services.host,
            bus: endpoint.clone(),
        },
    );
    let bus_task = endpoint.start(service.clone());

    // Let a few connection attempts fail.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let relay = GuildRelay::bind(&addr.to_string()).await.unwrap();
    let relay_task = tokio::spawn(relay.clone().run());
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(relay.peer_count(), 1);

    bus_task.abort();
    relay_task.abort();
}
