//! End-to-end tests: a real relay on an ephemeral port, driven by raw sockets and by `ShareClient`.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};

use crate::client::{LocalObservation, LocalObserver, PartyMember, ShareClient};
use crate::config::ClientConfig;
use crate::identity::derive_id;
use crate::protocol::{MapIdentifier, ShareData};
use crate::server::start_relay;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn key(c: char) -> String {
    std::iter::repeat(c).take(64).collect()
}

async fn relay() -> SocketAddr {
    let (server, addrs, _registry) = start_relay("127.0.0.1:0").expect("bind relay");
    actix_web::rt::spawn(server);
    addrs[0]
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}", addr)).await.expect("connect");
    socket
}

async fn send<S>(socket: &mut S, value: serde_json::Value)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    socket.send(Message::Text(value.to_string().into())).await.expect("send");
}

/// Next share record within `within`, or `None` on timeout or close.
async fn next_share<S>(socket: &mut S, within: Duration) -> Option<ShareData>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let deadline = Instant::now() + within;
    loop {
        match tokio::time::timeout_at(deadline, socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).expect("share record")),
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) | Err(_) => return None,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

/// First record matching `pred` within `within`.
async fn wait_for<S>(socket: &mut S, within: Duration, pred: impl Fn(&ShareData) -> bool) -> Option<ShareData>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let deadline = Instant::now() + within;
    while let Some(data) = next_share(socket, deadline.saturating_duration_since(Instant::now())).await {
        if pred(&data) {
            return Some(data);
        }
    }
    None
}

/// Drains whatever arrives during `within`.
async fn drain(socket: &mut Socket, within: Duration) {
    while next_share(socket, within).await.is_some() {}
}

/// True if the relay closes the socket without sending any record first.
async fn closed_without_reply(socket: &mut Socket) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        match tokio::time::timeout_at(deadline, socket.next()).await {
            Ok(Some(Ok(Message::Text(_)))) => return false,
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => return true,
            Ok(Some(Ok(_))) => continue,
            Err(_) => return false,
        }
    }
}

fn party_of(data: &ShareData, id: &str) -> Option<MapIdentifier> {
    data.party.get(id).copied().flatten()
}

#[actix_web::test]
async fn new_connection_receives_empty_heartbeat() {
    let addr = relay().await;
    let mut a = connect(addr).await;
    let first = next_share(&mut a, Duration::from_secs(3)).await;
    assert_eq!(first, Some(ShareData::empty()));
}

#[actix_web::test]
async fn reciprocal_update_reaches_peer_and_fades_on_close() {
    let (h1, h2) = (key('1'), key('2'));
    let addr = relay().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    next_share(&mut a, Duration::from_secs(3)).await;
    next_share(&mut b, Duration::from_secs(3)).await;

    send(&mut a, json!({"user": h1, "mapType": 5, "mapSpot": 3, "party": { h2.clone(): null }})).await;
    send(&mut b, json!({"user": h2, "mapType": 7, "mapSpot": 2, "party": { h1.clone(): null }})).await;

    let seen_by_b = wait_for(&mut b, Duration::from_secs(4), |d| party_of(d, &h1) == Some(MapIdentifier::new(5, 3))).await;
    let seen_by_b = seen_by_b.expect("b learns a's map");
    assert_eq!(seen_by_b.user, h2);
    assert_eq!(seen_by_b.own(), MapIdentifier::new(7, 2));

    let seen_by_a = wait_for(&mut a, Duration::from_secs(4), |d| party_of(d, &h2) == Some(MapIdentifier::new(7, 2))).await;
    assert!(seen_by_a.is_some(), "a learns b's map");

    b.close(None).await.expect("close b");
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Re-publishing forces a heartbeat on A, which no longer has a live peer for h2.
    send(&mut a, json!({"user": h1, "mapType": 5, "mapSpot": 3, "party": { h2.clone(): null }})).await;
    let faded = wait_for(&mut a, Duration::from_secs(4), |d| party_of(d, &h2) == Some(MapIdentifier::NONE)).await;
    assert!(faded.is_some(), "closed peer reads as zeros");
}

#[actix_web::test]
async fn non_reciprocal_listing_reports_zero_and_forces_nobody() {
    let (h1, h2, h3) = (key('1'), key('2'), key('3'));
    let addr = relay().await;
    let mut a = connect(addr).await;
    let mut c = connect(addr).await;
    next_share(&mut a, Duration::from_secs(3)).await;
    next_share(&mut c, Duration::from_secs(3)).await;

    // C lists h1 but A does not list h3 back.
    send(&mut c, json!({"user": h3, "mapType": 1, "mapSpot": 1, "party": { h1.clone(): null }})).await;
    drain(&mut c, Duration::from_millis(1500)).await;

    send(&mut a, json!({"user": h1, "mapType": 5, "mapSpot": 3, "party": { h2.clone(): null }})).await;
    let beat = wait_for(&mut a, Duration::from_secs(3), |d| d.user == h1).await.expect("a heartbeat");
    assert_eq!(party_of(&beat, &h2), Some(MapIdentifier::NONE));

    assert_eq!(next_share(&mut c, Duration::from_millis(1500)).await, None);
}

#[actix_web::test]
async fn sentinel_resets_state_without_forcing_heartbeat() {
    let (h1, h2) = (key('1'), key('2'));
    let addr = relay().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    next_share(&mut a, Duration::from_secs(3)).await;
    next_share(&mut b, Duration::from_secs(3)).await;

    send(&mut a, json!({"user": h1, "mapType": 5, "mapSpot": 3, "party": { h2.clone(): null }})).await;
    send(&mut b, json!({"user": h2, "mapType": 0, "mapSpot": 0, "party": { h1.clone(): null }})).await;
    wait_for(&mut b, Duration::from_secs(4), |d| party_of(d, &h1) == Some(MapIdentifier::new(5, 3)))
        .await
        .expect("b learns a's map");
    drain(&mut a, Duration::from_millis(1500)).await;

    send(&mut a, json!({"user": "", "mapType": 5, "mapSpot": 3, "party": { h2.clone(): null }})).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    send(&mut b, json!({"user": h2, "mapType": 0, "mapSpot": 1, "party": { h1.clone(): null }})).await;

    let reset = wait_for(&mut b, Duration::from_secs(3), |d| d.map_spot == 1).await.expect("b heartbeat");
    assert_eq!(party_of(&reset, &h1), Some(MapIdentifier::NONE));
    assert_eq!(next_share(&mut a, Duration::from_millis(500)).await, None);
}

#[actix_web::test]
async fn eight_party_entries_close_the_connection() {
    let addr = relay().await;
    let mut a = connect(addr).await;
    next_share(&mut a, Duration::from_secs(3)).await;

    let party: serde_json::Map<String, serde_json::Value> =
        "abcdefgh".chars().map(|c| (key(c), serde_json::Value::Null)).collect();
    send(&mut a, json!({"user": key('z'), "mapType": 1, "mapSpot": 1, "party": party})).await;
    assert!(closed_without_reply(&mut a).await);
}

#[actix_web::test]
async fn malformed_records_close_the_connection() {
    let addr = relay().await;
    for bad in [
        json!({"user": "h1", "mapType": 1, "mapSpot": 1, "party": {}}),
        json!({"user": "", "mapType": 100, "mapSpot": 1, "party": {}}),
        json!({"user": "", "mapType": 1, "mapSpot": 1, "party": "nope"}),
        json!({"user": "", "mapType": 1}),
    ] {
        let mut socket = connect(addr).await;
        next_share(&mut socket, Duration::from_secs(3)).await;
        send(&mut socket, bad.clone()).await;
        assert!(closed_without_reply(&mut socket).await, "expected close for {}", bad);
    }
}

struct FixedObserver(LocalObservation);

impl LocalObserver for FixedObserver {
    fn observe(&self) -> LocalObservation {
        self.0.clone()
    }
}

fn observation(me: u64, other: u64) -> Arc<FixedObserver> {
    Arc::new(FixedObserver(LocalObservation {
        player_id: me,
        name: format!("Player {}", me),
        group_id: 77,
        group_id2: 88,
        members: vec![
            PartyMember { player_id: me, name: format!("Player {}", me) },
            PartyMember { player_id: other, name: format!("Player {}", other) },
        ],
    }))
}

#[actix_web::test]
async fn share_clients_learn_each_others_maps() {
    let addr = relay().await;
    let config = ClientConfig::insecure(addr.to_string());

    let mut alice = ShareClient::new(observation(1001, 1002), Arc::new(|| MapIdentifier::new(5, 3)))
        .with_tick_interval(Duration::from_millis(200));
    let mut bob = ShareClient::new(observation(1002, 1001), Arc::new(|| MapIdentifier::NONE))
        .with_tick_interval(Duration::from_millis(200));
    alice.start(config.clone());
    bob.start(config);

    let alice_id = derive_id(1001, 77, 88);
    let bob_id = derive_id(1002, 77, 88);
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        let bob_knows = bob.party_view().get(&alice_id).copied().flatten() == Some(MapIdentifier::new(5, 3));
        let alice_knows = alice.party_view().get(&bob_id).copied().flatten() == Some(MapIdentifier::NONE);
        if bob_knows && alice_knows {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(alice.is_connected());
    assert_eq!(bob.party_view().get(&alice_id).copied().flatten(), Some(MapIdentifier::new(5, 3)));
    assert_eq!(alice.party_view().get(&bob_id).copied().flatten(), Some(MapIdentifier::NONE));

    let players = bob.players();
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].player_id, 1002);
    assert_eq!(players[0].pseudonym.as_deref(), Some(bob_id.as_str()));
    assert_eq!(players[1].pseudonym.as_deref(), Some(alice_id.as_str()));
    assert!(players[1].has_map());
    assert_eq!(players[1].map(), MapIdentifier::new(5, 3));

    alice.stop().await;
    bob.stop().await;
    assert!(!alice.is_connected());
    assert!(!alice.is_started());
}

#[actix_web::test]
async fn client_without_relay_stays_offline_and_stops_promptly() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut config = ClientConfig::insecure(addr.to_string());
    config.error_reconnect_timeout_secs = 1;
    let mut client = ShareClient::new(observation(1, 2), Arc::new(|| MapIdentifier::NONE));
    client.start(config);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(client.is_started());
    assert!(!client.is_connected());
    assert!(!client.update(&key('1'), MapIdentifier::new(1, 1), &[]));

    tokio::time::timeout(Duration::from_secs(2), client.stop())
        .await
        .expect("stop does not hang");
    assert!(!client.is_started());
}

#[actix_web::test]
async fn launch_honours_connect_on_startup() {
    let mut config = ClientConfig::insecure("127.0.0.1:9");
    config.connect_on_startup = false;
    let client = ShareClient::launch(config, observation(1, 2), Arc::new(|| MapIdentifier::NONE));
    assert!(!client.is_started());
}

/// Stand-in relay: accepts the next client socket on `listener`.
async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client connects in time")
        .expect("accept");
    accept_async(stream).await.expect("handshake")
}

#[actix_web::test]
async fn reconnect_republishes_unchanged_state() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let mut config = ClientConfig::insecure(listener.local_addr().expect("addr").to_string());
    config.lost_reconnect_timeout_secs = 1;
    let mut client = ShareClient::new(observation(1001, 1002), Arc::new(|| MapIdentifier::new(5, 3)))
        .with_tick_interval(Duration::from_millis(100));
    client.start(config);

    let me = derive_id(1001, 77, 88);
    let mut first = accept(&listener).await;
    let published = wait_for(&mut first, Duration::from_secs(3), |d| d.user == me)
        .await
        .expect("first publish");
    first.close(None).await.expect("close from relay side");
    drop(first);

    // Same local state, well inside the resend window: only the memo reset makes it go out again.
    let mut second = accept(&listener).await;
    let republished = wait_for(&mut second, Duration::from_secs(3), |d| d.user == me)
        .await
        .expect("republish after reconnect");
    assert_eq!(republished, published);
    assert!(client.is_connected());

    client.stop().await;
}

#[actix_web::test]
async fn bad_inbound_payloads_are_dropped_without_disconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let config = ClientConfig::insecure(listener.local_addr().expect("addr").to_string());
    let mut client = ShareClient::new(observation(1001, 1002), Arc::new(|| MapIdentifier::NONE))
        .with_tick_interval(Duration::from_millis(100));
    client.start(config);

    let (me, peer) = (derive_id(1001, 77, 88), derive_id(1002, 77, 88));
    let mut socket = accept(&listener).await;
    wait_for(&mut socket, Duration::from_secs(3), |d| d.user == me)
        .await
        .expect("client publishes");

    socket.send(Message::Text("not json".to_string().into())).await.expect("send");
    let short_user = json!({"user": "h1", "mapType": 0, "mapSpot": 0, "party": { peer.clone(): {"mapType": 1, "mapSpot": 1} }});
    send(&mut socket, short_user).await;
    let valid = json!({"user": me, "mapType": 0, "mapSpot": 0, "party": { peer.clone(): {"mapType": 9, "mapSpot": 4} }});
    send(&mut socket, valid).await;

    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline && client.party_view().get(&peer).copied().flatten().is_none() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(client.is_connected());
    assert_eq!(client.party_view().get(&peer).copied().flatten(), Some(MapIdentifier::new(9, 4)));

    client.stop().await;
}
