/// End-to-end: real relay on loopback, real clients, files through both
/// storage backends.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use courier_client::{Client, ClientEvent};
use courier_gateway::{GatewayConfig, Supervisor};
use courier_transfer::{DiskStorage, MemoryStorage, TransferError};
use courier_types::{ChatMessage, Envelope, FileChunk};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_relay() -> (SocketAddr, Supervisor, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let supervisor = Supervisor::new(GatewayConfig::default());
    let shutdown = CancellationToken::new();
    tokio::spawn(supervisor.clone().run(listener, shutdown.clone()));
    (addr, supervisor, shutdown)
}

async fn wait_for_clients(supervisor: &Supervisor, n: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while supervisor.registry().len().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("registry never reached {} clients", n));
}

async fn next_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

fn scratch_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("courier_client_{}_{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Connect alice, then bob, and consume bob's join on alice's side.
async fn alice_and_bob(
    addr: SocketAddr,
    supervisor: &Supervisor,
    storage: MemoryStorage,
    download_dir: &str,
) -> (
    (Client, mpsc::Receiver<ClientEvent>),
    (Client, mpsc::Receiver<ClientEvent>),
) {
    let (alice, mut alice_events) =
        Client::connect(addr, "alice", MemoryStorage::new(), "downloads")
            .await
            .unwrap();
    wait_for_clients(supervisor, 1).await;
    let (bob, bob_events) = Client::connect(addr, "bob", storage, download_dir)
        .await
        .unwrap();
    wait_for_clients(supervisor, 2).await;

    match next_event(&mut alice_events).await {
        ClientEvent::PeerJoined(identity) => assert_eq!(identity.id, bob.id()),
        other => panic!("expected bob's join, got {:?}", other),
    }
    ((alice, alice_events), (bob, bob_events))
}

#[tokio::test]
async fn chat_between_two_clients() {
    let (addr, supervisor, _shutdown) = start_relay().await;
    let ((alice, mut alice_events), (bob, mut bob_events)) =
        alice_and_bob(addr, &supervisor, MemoryStorage::new(), "downloads").await;

    alice.broadcast("hello everyone").await.unwrap();
    match next_event(&mut bob_events).await {
        ClientEvent::Chat(chat) => {
            assert_eq!(chat, ChatMessage::broadcast(alice.id(), "hello everyone"));
        }
        other => panic!("expected chat, got {:?}", other),
    }

    bob.send_chat(alice.id(), "hi alice").await.unwrap();
    match next_event(&mut alice_events).await {
        ClientEvent::Chat(chat) => {
            assert_eq!(chat.from_id, bob.id());
            assert_eq!(chat.recipient(), Some(alice.id()));
            assert_eq!(chat.message, "hi alice");
        }
        other => panic!("expected chat, got {:?}", other),
    }
}

#[tokio::test]
async fn file_lands_in_memory_storage() {
    let (addr, supervisor, _shutdown) = start_relay().await;
    let storage = MemoryStorage::new();
    let ((alice, _alice_events), (bob, mut bob_events)) =
        alice_and_bob(addr, &supervisor, storage.clone(), "inbox").await;

    let dir = scratch_dir("memory");
    let source = dir.join("notes.bin");
    let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source, &data).unwrap();

    let sent = alice.send_file(&source, Some(bob.id())).await.unwrap();
    assert_eq!(sent, 2500);

    match next_event(&mut bob_events).await {
        ClientEvent::FileIncoming(announce) => {
            assert_eq!(announce.name, "notes.bin");
            assert_eq!(announce.size, 2500);
        }
        other => panic!("expected announcement, got {:?}", other),
    }
    let received = match next_event(&mut bob_events).await {
        ClientEvent::FileReceived(received) => received,
        other => panic!("expected finished file, got {:?}", other),
    };

    let expected_path = PathBuf::from("inbox").join(format!("{}_notes.bin", alice.id()));
    assert_eq!(received.path, expected_path);
    assert_eq!(received.bytes, 2500);
    assert_eq!(storage.read(&expected_path).unwrap(), data);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn broadcast_file_lands_on_disk() {
    let (addr, supervisor, _shutdown) = start_relay().await;
    let dir = scratch_dir("disk");
    let downloads = dir.join("received_files");

    let (alice, _alice_events) = Client::connect(addr, "alice", MemoryStorage::new(), "unused")
        .await
        .unwrap();
    wait_for_clients(&supervisor, 1).await;
    let (_bob, mut bob_events) = Client::connect(addr, "bob", DiskStorage, &downloads)
        .await
        .unwrap();
    wait_for_clients(&supervisor, 2).await;

    let source = dir.join("hello.txt");
    std::fs::write(&source, b"hello").unwrap();
    alice.send_file(&source, None).await.unwrap();

    let received = loop {
        match next_event(&mut bob_events).await {
            ClientEvent::FileIncoming(announce) => assert_eq!(announce.to_id, None),
            ClientEvent::FileReceived(received) => break received,
            other => panic!("unexpected {:?}", other),
        }
    };
    assert_eq!(
        received.sha256,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(tokio::fs::read(&received.path).await.unwrap(), b"hello");
    assert!(received.path.starts_with(&downloads));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unannounced_chunk_is_reported_and_ignored() {
    let (addr, supervisor, _shutdown) = start_relay().await;
    let ((alice, _alice_events), (bob, mut bob_events)) =
        alice_and_bob(addr, &supervisor, MemoryStorage::new(), "downloads").await;

    let stray = Envelope::FileChunk(FileChunk {
        from_id: alice.id().to_string(),
        to_id: Some(bob.id().to_string()),
        file_name: "ghost.bin".into(),
        seq: 3,
        data_b64: "AAAA".into(),
        is_last: true,
    });
    alice.send(&stray).await.unwrap();

    match next_event(&mut bob_events).await {
        ClientEvent::TransferFailed(TransferError::UnregisteredChunk { seq, .. }) => {
            assert_eq!(seq, 3)
        }
        other => panic!("expected a dropped chunk, got {:?}", other),
    }

    alice.broadcast("still fine").await.unwrap();
    assert!(matches!(next_event(&mut bob_events).await, ClientEvent::Chat(_)));
    assert!(bob.is_connected());
}

#[tokio::test]
async fn shutdown_surfaces_connection_lost() {
    let (addr, supervisor, shutdown) = start_relay().await;
    let (_client, mut events) = Client::connect(addr, "carol", MemoryStorage::new(), "downloads")
        .await
        .unwrap();
    wait_for_clients(&supervisor, 1).await;

    shutdown.cancel();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ConnectionLost(_)
    ));
}

#[tokio::test]
async fn close_ends_the_session() {
    let (addr, supervisor, _shutdown) = start_relay().await;
    let (client, mut events) = Client::connect(addr, "dave", MemoryStorage::new(), "downloads")
        .await
        .unwrap();
    wait_for_clients(&supervisor, 1).await;

    client.close().await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ConnectionLost(None)
    ));
    wait_for_clients(&supervisor, 0).await;
}

#[tokio::test]
async fn dropping_the_client_stops_its_receive_loop() {
    let (addr, supervisor, _shutdown) = start_relay().await;
    let (client, mut events) = Client::connect(addr, "erin", MemoryStorage::new(), "downloads")
        .await
        .unwrap();
    wait_for_clients(&supervisor, 1).await;

    drop(client);
    let next = tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .expect("event stream stayed open");
    assert!(next.is_none(), "expected the stream to end, got {:?}", next);
    wait_for_clients(&supervisor, 0).await;
}
