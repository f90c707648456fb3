//! Delivery and discovery against a local mock collector.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::routing::put;
use tagpost_core::{
    CardId, CollectorEndpoint, Event, EventContext, QueueState, ScanRecord, SignatureSuffix,
    Timestamp,
};
use tagpost_network::{Deliverer, DelivererConfig, DeliveryError, DiscoveryListener, LinkState};
use tagpost_storage::{EventQueue, FileQueue};
use tempfile::TempDir;
use tokio::net::{TcpListener, UdpSocket};
use uuid::Uuid;

#[derive(Clone)]
struct Collector {
    status: Arc<AtomicU16>,
    delay: Arc<Mutex<Duration>>,
    received: Arc<Mutex<Vec<(String, Event)>>>,
}

impl Collector {
    fn received(&self) -> Vec<(String, Event)> {
        self.received.lock().unwrap().clone()
    }

    fn respond_with(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

async fn receive_event(
    State(collector): State<Collector>,
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    let delay = *collector.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let event: Event = serde_json::from_str(&form["data"]).unwrap();
    collector.received.lock().unwrap().push((id, event));
    StatusCode::from_u16(collector.status.load(Ordering::SeqCst)).unwrap()
}

async fn spawn_collector() -> (SocketAddr, Collector) {
    let collector = Collector {
        status: Arc::new(AtomicU16::new(200)),
        delay: Arc::new(Mutex::new(Duration::ZERO)),
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/event/{id}", put(receive_event))
        .with_state(collector.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, collector)
}

fn endpoint(addr: SocketAddr) -> CollectorEndpoint {
    CollectorEndpoint::new(addr.ip().to_string(), addr.port()).unwrap()
}

fn deliverer() -> Deliverer {
    Deliverer::new(DelivererConfig {
        timeout: Duration::from_millis(500),
    })
    .unwrap()
}

fn capture(queue: &mut FileQueue, card: u64, owner: &str) -> Event {
    let record = ScanRecord::new(
        CardId::new(card),
        owner,
        SignatureSuffix::new("c0ffee").unwrap(),
        true,
    )
    .unwrap();
    let context = EventContext {
        device_id: "door-1".to_string(),
        location: "lobby".to_string(),
    };
    let event = Event::capture(&record, &context, Uuid::new_v4(), Timestamp::now());
    queue.store(QueueState::New, &event).unwrap();
    event
}

#[tokio::test]
async fn test_accepted_event_moves_to_sent() {
    let (addr, collector) = spawn_collector().await;
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let event = capture(&mut queue, 123, "alice");
    assert!(event.verify());

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    let delivered = deliverer.deliver_one(&mut queue).await.unwrap();

    assert_eq!(delivered, Some(event.event_id));
    assert_eq!(deliverer.link_state(), LinkState::Connected);
    assert_eq!(queue.count(QueueState::New).unwrap(), 0);
    assert_eq!(queue.list(QueueState::Sent).unwrap(), vec![event.event_id]);

    let received = collector.received();
    assert_eq!(received.len(), 1);
    let (path_id, body) = &received[0];
    assert_eq!(path_id, &event.event_id.to_string());
    assert_eq!(body.owner, "alice");
    assert_eq!(body.card_id, CardId::new(123));
    assert!(body.transferred_timestamp.is_some());
    // The transfer stamp is not covered by the signature.
    assert!(body.verify());
}

#[tokio::test]
async fn test_stored_copy_has_no_transfer_stamp() {
    let (addr, _collector) = spawn_collector().await;
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let event = capture(&mut queue, 1, "alice");

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    deliverer.deliver_one(&mut queue).await.unwrap();

    let sent = queue.read(QueueState::Sent, &event.event_id).unwrap();
    assert_eq!(sent, event);
    assert!(sent.transferred_timestamp.is_none());
}

#[tokio::test]
async fn test_rejection_disconnects_and_keeps_event() {
    let (addr, collector) = spawn_collector().await;
    collector.respond_with(500);
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let event = capture(&mut queue, 9, "bob");

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    let err = deliverer.deliver_one(&mut queue).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Rejected { status: 500 }));
    assert!(!err.is_fatal());
    assert_eq!(deliverer.link_state(), LinkState::Disconnected);
    assert_eq!(queue.list(QueueState::New).unwrap(), vec![event.event_id]);
    assert_eq!(queue.count(QueueState::Sent).unwrap(), 0);

    // Disconnected: nothing more is attempted until the next announcement.
    assert_eq!(deliverer.deliver_one(&mut queue).await.unwrap(), None);
    assert_eq!(collector.received().len(), 1);
}

#[tokio::test]
async fn test_retry_after_reconnect_delivers_once() {
    let (addr, collector) = spawn_collector().await;
    collector.respond_with(503);
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let event = capture(&mut queue, 77, "carol");

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    assert!(deliverer.deliver_one(&mut queue).await.is_err());

    collector.respond_with(200);
    deliverer.connect(endpoint(addr));
    assert_eq!(
        deliverer.deliver_one(&mut queue).await.unwrap(),
        Some(event.event_id)
    );
    assert_eq!(deliverer.deliver_one(&mut queue).await.unwrap(), None);

    let ids: Vec<String> = collector.received().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![event.event_id.to_string(); 2]);
    assert_eq!(queue.list(QueueState::Sent).unwrap(), vec![event.event_id]);
}

#[tokio::test]
async fn test_unreachable_collector() {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let event = capture(&mut queue, 2, "dave");

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    let err = deliverer.deliver_one(&mut queue).await.unwrap_err();

    assert!(matches!(err, DeliveryError::Transport(_)));
    assert_eq!(deliverer.link_state(), LinkState::Disconnected);
    assert_eq!(queue.list(QueueState::New).unwrap(), vec![event.event_id]);
}

#[tokio::test]
async fn test_slow_collector_times_out() {
    let (addr, collector) = spawn_collector().await;
    collector.delay_by(Duration::from_secs(2));
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let event = capture(&mut queue, 3, "erin");

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    let started = std::time::Instant::now();
    let err = deliverer.deliver_one(&mut queue).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(err, DeliveryError::Transport(_)));
    assert_eq!(deliverer.link_state(), LinkState::Disconnected);
    assert_eq!(queue.list(QueueState::New).unwrap(), vec![event.event_id]);
}

#[tokio::test]
async fn test_queue_drains_in_order_of_calls() {
    let (addr, collector) = spawn_collector().await;
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    for card in 0..5 {
        capture(&mut queue, card, "frank");
    }

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    let mut delivered = 0;
    while deliverer.deliver_one(&mut queue).await.unwrap().is_some() {
        delivered += 1;
    }

    assert_eq!(delivered, 5);
    assert_eq!(collector.received().len(), 5);
    assert_eq!(queue.count(QueueState::Sent).unwrap(), 5);
}

#[tokio::test]
async fn test_undecodable_record_does_not_block_queue() {
    let (addr, collector) = spawn_collector().await;
    let dir = TempDir::new().unwrap();
    let mut queue = FileQueue::open(dir.path()).unwrap();
    let broken = Uuid::new_v4();
    std::fs::write(dir.path().join("new").join(format!("{broken}.json")), b"{trunc").unwrap();
    let event = capture(&mut queue, 4, "gina");

    let mut deliverer = deliverer();
    deliverer.connect(endpoint(addr));
    let mut delivered = Vec::new();
    while let Some(id) = deliverer.deliver_one(&mut queue).await.unwrap() {
        delivered.push(id);
    }

    assert_eq!(delivered, vec![event.event_id]);
    assert!(deliverer.is_connected());
    assert_eq!(queue.count(QueueState::New).unwrap(), 0);
    assert_eq!(queue.list(QueueState::Sent).unwrap(), vec![event.event_id]);
    assert_eq!(collector.received().len(), 1);
    assert!(dir.path().join("corrupt").join(format!("{broken}.json")).exists());
}

#[tokio::test]
async fn test_announcement_connects_deliverer() {
    let mut listener = DiscoveryListener::bind_addr("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let target = listener.local_addr().unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    sender.send_to(b"not an announcement", target).await.unwrap();
    sender.send_to(b"HELLO 10.0.0.5:9000", target).await.unwrap();

    let mut deliverer = deliverer();
    assert_eq!(deliverer.link_state(), LinkState::Disconnected);

    assert!(listener.recv_announcement().await.unwrap().is_none());
    let announcement = listener.recv_announcement().await.unwrap().unwrap();
    deliverer.connect(announcement.endpoint);

    assert_eq!(deliverer.link_state(), LinkState::Connected);
    assert_eq!(
        deliverer.endpoint(),
        Some(&CollectorEndpoint::new("10.0.0.5", 9000).unwrap())
    );
    assert_eq!(listener.malformed(), 1);
}
