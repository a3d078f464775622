use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusty_rooms::core::{ChannelSink, Client, Event, EventSink, Payload, RoomManager, RoomName};
use rusty_rooms::metrics::ChatMetrics;
use rusty_rooms::ChatroomError;
use tokio::sync::mpsc::UnboundedReceiver;

fn manager() -> RoomManager {
    RoomManager::new("lobby", 100, ChatMetrics::in_memory())
}

fn client(nickname: &str, room: &str) -> (Arc<Client>, UnboundedReceiver<Event>) {
    let (sink, rx) = ChannelSink::new();
    let client = Client::new(nickname, "🙂", RoomName::new(room), Box::new(sink));
    (Arc::new(client), rx)
}

/// Sink whose second write fails; every attempt and delivery is recorded
struct FlakySink {
    attempts: Arc<Mutex<usize>>,
    delivered: Arc<Mutex<Vec<Event>>>,
}

#[async_trait]
impl EventSink for FlakySink {
    async fn send(&mut self, event: &Event) -> rusty_rooms::Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };
        if attempt == 2 {
            return Err(ChatroomError::SystemError("write failed".to_string()));
        }
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn close(&mut self) -> rusty_rooms::Result<()> {
        Ok(())
    }
}

fn drain(rx: &mut UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.kind().to_string()).collect()
}

#[tokio::test]
async fn test_room_created_on_join_and_destroyed_on_leave() {
    let rooms = manager();
    let (alice, _rx) = client("alice", "den");

    rooms.join_client(alice.clone(), "").await.unwrap();
    assert!(rooms.room_exists(&RoomName::new("den")).await);
    assert_eq!(rooms.member_count(&RoomName::new("den")).await, 1);

    let left = rooms.unregister_client(&alice).await;
    assert_eq!(left, "den");
    assert!(!rooms.room_exists(&RoomName::new("den")).await);
    assert_eq!(rooms.client_count().await, 0);
}

#[tokio::test]
async fn test_first_creator_sets_password() {
    let rooms = manager();
    let (alice, _a) = client("alice", "vault");
    let (bob, _b) = client("bob", "vault");
    let (carol, _c) = client("carol", "vault");
    let (dave, _d) = client("dave", "vault");

    rooms.join_client(alice, "s3cret").await.unwrap();
    assert!(rooms.has_password(&RoomName::new("vault")).await);

    let wrong = rooms.join_client(bob, "guess").await.unwrap_err();
    assert!(matches!(wrong, ChatroomError::WrongPassword));

    let missing = rooms.join_client(carol, "").await.unwrap_err();
    assert!(matches!(missing, ChatroomError::PasswordRequired));

    rooms.join_client(dave, "s3cret").await.unwrap();
    assert_eq!(rooms.member_count(&RoomName::new("vault")).await, 2);
}

#[tokio::test]
async fn test_later_joiner_cannot_set_password() {
    let rooms = manager();
    let (alice, _a) = client("alice", "open");
    let (bob, _b) = client("bob", "open");

    rooms.join_client(alice, "").await.unwrap();
    rooms.join_client(bob, "late").await.unwrap();
    assert!(!rooms.has_password(&RoomName::new("open")).await);
}

#[tokio::test]
async fn test_password_cleared_when_room_empties() {
    let rooms = manager();
    let (alice, _a) = client("alice", "vault");
    rooms.join_client(alice.clone(), "s3cret").await.unwrap();
    rooms.unregister_client(&alice).await;
    assert!(!rooms.has_password(&RoomName::new("vault")).await);

    let (bob, _b) = client("bob", "vault");
    rooms.join_client(bob, "").await.unwrap();
}

#[tokio::test]
async fn test_default_room_never_protected() {
    let rooms = manager();
    let (alice, _a) = client("alice", "lobby");
    rooms.join_client(alice, "s3cret").await.unwrap();
    assert!(!rooms.has_password(&RoomName::new("lobby")).await);
}

#[tokio::test]
async fn test_room_list_includes_default_and_hides_system_rooms() {
    let rooms = manager();
    let (artist, _a) = client("artist", "_draw_game_");
    let (alice, _b) = client("alice", "vault");
    rooms.join_client(artist, "").await.unwrap();
    rooms.join_client(alice, "pw").await.unwrap();

    let list = rooms.room_list().await;
    assert_eq!(list.get("lobby"), Some(&false));
    assert_eq!(list.get("vault"), Some(&true));
    assert!(!list.contains_key("_draw_game_"));
}

#[tokio::test]
async fn test_broadcast_reaches_only_room_members() {
    let rooms = manager();
    let (alice, mut a_rx) = client("alice", "den");
    let (bob, mut b_rx) = client("bob", "den");
    let (carol, mut c_rx) = client("carol", "attic");
    for c in [alice, bob, carol] {
        rooms.join_client(c, "").await.unwrap();
    }
    drain(&mut a_rx);
    drain(&mut b_rx);
    drain(&mut c_rx);

    let delivered = rooms.broadcast_to_room(&Event::chat("den", "alice", "hello")).await;
    assert_eq!(delivered, 2);
    assert_eq!(kinds(&drain(&mut a_rx)), vec!["chat"]);
    assert_eq!(kinds(&drain(&mut b_rx)), vec!["chat"]);
    assert!(drain(&mut c_rx).is_empty());
}

#[tokio::test]
async fn test_closed_client_does_not_block_others() {
    let rooms = manager();
    let (alice, a_rx) = client("alice", "den");
    let (bob, mut b_rx) = client("bob", "den");
    rooms.join_client(alice, "").await.unwrap();
    rooms.join_client(bob, "").await.unwrap();
    drop(a_rx);
    drain(&mut b_rx);

    let delivered = rooms.broadcast_to_room(&Event::chat("den", "bob", "still here")).await;
    assert_eq!(delivered, 1);
    assert_eq!(kinds(&drain(&mut b_rx)), vec!["chat"]);
}

#[tokio::test]
async fn test_switch_announces_leave_to_old_room() {
    let rooms = manager();
    let (alice, _a) = client("alice", "den");
    let (bob, mut b_rx) = client("bob", "den");
    rooms.join_client(alice.clone(), "").await.unwrap();
    rooms.join_client(bob, "").await.unwrap();
    drain(&mut b_rx);

    let old = rooms.switch_room(&alice, &RoomName::new("attic"), "").await.unwrap();
    assert_eq!(old, "den");
    assert_eq!(alice.room().await, "attic");

    let events = drain(&mut b_rx);
    let leave = events.iter().find(|e| e.kind() == "leave").unwrap();
    assert_eq!(leave.content(), Some("alice left the room"));
    assert!(events.iter().any(|e| e.kind() == "online_count"));

    let history = rooms.history_of(&RoomName::new("den")).await;
    assert_eq!(history.last().map(|e| e.kind()), Some("leave"));
}

#[tokio::test]
async fn test_switch_refused_leaves_client_in_place() {
    let rooms = manager();
    let (owner, _o) = client("owner", "vault");
    let (alice, _a) = client("alice", "den");
    rooms.join_client(owner, "s3cret").await.unwrap();
    rooms.join_client(alice.clone(), "").await.unwrap();

    let err = rooms.switch_room(&alice, &RoomName::new("vault"), "nope").await.unwrap_err();
    assert!(matches!(err, ChatroomError::WrongPassword));
    assert_eq!(alice.room().await, "den");
    assert_eq!(rooms.member_count(&RoomName::new("vault")).await, 1);
}

#[tokio::test]
async fn test_switch_to_same_room_is_noop() {
    let rooms = manager();
    let (alice, mut a_rx) = client("alice", "den");
    rooms.join_client(alice.clone(), "").await.unwrap();
    drain(&mut a_rx);

    let old = rooms.switch_room(&alice, &RoomName::new("den"), "").await.unwrap();
    assert_eq!(old, "den");
    assert!(drain(&mut a_rx).is_empty());
}

#[tokio::test]
async fn test_history_capped_and_skips_system_rooms() {
    let rooms = RoomManager::new("lobby", 3, ChatMetrics::in_memory());
    for i in 0..5 {
        rooms.add_history(&Event::chat("den", "alice", format!("line {}", i))).await;
    }
    rooms.add_history(&Event::chat("_game_", "alice", "secret")).await;

    let history = rooms.history_of(&RoomName::new("den")).await;
    let lines: Vec<_> = history.iter().filter_map(|e| e.content()).collect();
    assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    assert!(rooms.history_of(&RoomName::new("_game_")).await.is_empty());
}

#[tokio::test]
async fn test_online_count_is_per_room() {
    let rooms = manager();
    let (alice, mut a_rx) = client("alice", "den");
    let (bob, _b) = client("bob", "den");
    let (carol, _c) = client("carol", "attic");
    for c in [alice, bob, carol] {
        rooms.join_client(c, "").await.unwrap();
    }
    drain(&mut a_rx);

    rooms.broadcast_online_count().await;
    let counts: Vec<_> = drain(&mut a_rx)
        .into_iter()
        .filter_map(|e| match e.payload {
            Payload::OnlineCount { count } => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![2]);
}

#[tokio::test]
async fn test_switch_into_new_room_claims_password() {
    let rooms = manager();
    let (alice, _a) = client("alice", "den");
    let (bob, _b) = client("bob", "den");
    rooms.join_client(alice.clone(), "").await.unwrap();
    rooms.join_client(bob.clone(), "").await.unwrap();

    rooms.switch_room(&alice, &RoomName::new("vault"), "s3cret").await.unwrap();
    assert!(rooms.has_password(&RoomName::new("vault")).await);
    assert_eq!(rooms.room_list().await.get("vault"), Some(&true));

    let err = rooms.switch_room(&bob, &RoomName::new("vault"), "").await.unwrap_err();
    assert!(matches!(err, ChatroomError::PasswordRequired));
    assert_eq!(bob.room().await, "den");

    rooms.switch_room(&bob, &RoomName::new("vault"), "s3cret").await.unwrap();
    assert_eq!(rooms.member_count(&RoomName::new("vault")).await, 2);
}

#[tokio::test]
async fn test_switch_into_existing_room_does_not_claim_password() {
    let rooms = manager();
    let (alice, _a) = client("alice", "den");
    let (bob, _b) = client("bob", "attic");
    rooms.join_client(alice.clone(), "").await.unwrap();
    rooms.join_client(bob, "").await.unwrap();

    rooms.switch_room(&alice, &RoomName::new("attic"), "late").await.unwrap();
    assert!(!rooms.has_password(&RoomName::new("attic")).await);
}

#[tokio::test]
async fn test_history_replay_stops_at_first_failed_write() {
    let rooms = manager();
    for i in 0..3 {
        rooms.add_history(&Event::chat("den", "alice", format!("line {}", i))).await;
    }

    let attempts = Arc::new(Mutex::new(0));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = FlakySink { attempts: attempts.clone(), delivered: delivered.clone() };
    let late = Client::new("late", "", RoomName::new("den"), Box::new(sink));

    rooms.send_history(&late).await;

    assert_eq!(*attempts.lock().unwrap(), 2);
    let lines: Vec<String> = delivered
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.content().map(str::to_string))
        .collect();
    assert_eq!(lines, vec!["line 0"]);
}
