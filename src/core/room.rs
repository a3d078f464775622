//! Room registry and fan-out
//!
//! Lock order when more than one is needed: `rooms` → `passwords` →
//! `Client::room`, and `rooms` → draw state for the emptied-room cascade.
//! History and other game state are locked on their own. Member
//! lists are copied out under the read lock and every write happens after
//! it is released, so a slow client never stalls the registry.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use futures_util::future::join_all;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::core::client::Client;
use crate::core::event::{Event, Payload, RoomName};
use crate::core::games::{DrawStates, QuizBook, VoteBook};
use crate::error::{ChatroomError, Result};
use crate::metrics::ChatMetrics;

/// Members of one room, keyed by client id
type Members = HashMap<String, Arc<Client>>;

/// Outcome of removing a client from its room under the registry lock
struct Departure {
    removed: bool,
    room_emptied: bool,
}

pub struct RoomManager {
    rooms: RwLock<HashMap<RoomName, Members>>,
    history: RwLock<HashMap<RoomName, VecDeque<Event>>>,
    passwords: RwLock<HashMap<RoomName, String>>,
    pub draws: DrawStates,
    pub quizzes: QuizBook,
    pub votes: VoteBook,
    default_room: RoomName,
    history_max_size: usize,
    metrics: ChatMetrics,
}

impl RoomManager {
    pub fn new(default_room: impl Into<RoomName>, history_max_size: usize, metrics: ChatMetrics) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            passwords: RwLock::new(HashMap::new()),
            draws: DrawStates::new(),
            quizzes: QuizBook::new(),
            votes: VoteBook::new(),
            default_room: default_room.into(),
            history_max_size,
            metrics,
        }
    }

    /// Public room that is always listed and receives announcements
    pub fn default_room(&self) -> &RoomName {
        &self.default_room
    }

    pub fn metrics(&self) -> &ChatMetrics {
        &self.metrics
    }

    /// Insert `client` into `room`, creating the room when absent.
    /// Returns true when the room was created.
    fn insert_member(rooms: &mut HashMap<RoomName, Members>, room: &RoomName, client: &Arc<Client>) -> bool {
        let created = !rooms.contains_key(room.as_str());
        rooms
            .entry(room.clone())
            .or_default()
            .insert(client.id.clone(), client.clone());
        created
    }

    /// Remove `client` from `room`; an emptied room and its password go too
    fn remove_member(
        rooms: &mut HashMap<RoomName, Members>,
        passwords: &mut HashMap<RoomName, String>,
        room: &RoomName,
        client_id: &str,
    ) -> Departure {
        let Some(members) = rooms.get_mut(room.as_str()) else {
            return Departure { removed: false, room_emptied: false };
        };

        let removed = members.remove(client_id).is_some();
        let room_emptied = members.is_empty();
        if room_emptied {
            rooms.remove(room.as_str());
            passwords.remove(room.as_str());
        }
        Departure { removed, room_emptied }
    }

    /// Validate `password` for entering `room`. A room nobody has protected
    /// accepts anything.
    fn verify_password(passwords: &HashMap<RoomName, String>, room: &RoomName, password: &str) -> Result<()> {
        match passwords.get(room.as_str()) {
            Some(_) if password.is_empty() => Err(ChatroomError::PasswordRequired),
            Some(required) if required != password => Err(ChatroomError::WrongPassword),
            _ => Ok(()),
        }
    }

    /// The first client creating a public room may protect it. The default
    /// room never carries a password.
    fn claim_password(
        &self,
        rooms: &HashMap<RoomName, Members>,
        passwords: &mut HashMap<RoomName, String>,
        room: &RoomName,
        password: &str,
    ) {
        if password.is_empty() || *room == self.default_room || rooms.contains_key(room.as_str()) {
            return;
        }
        if !passwords.contains_key(room.as_str()) {
            passwords.insert(room.clone(), password.to_string());
            info!("Room password set for {}", room);
        }
    }

    async fn destroyed(&self, room: &RoomName) {
        {
            // Holding the read lock keeps the room from being re-created
            // while its round is dropped
            let rooms = self.rooms.read().await;
            if rooms.contains_key(room.as_str()) {
                debug!("Room {} re-created before cleanup, keeping its round", room);
            } else {
                self.draws.remove(room).await;
            }
        }
        self.metrics.room_destroyed().await;
        debug!("Room {} destroyed", room);
    }

    /// Add a client to the room it declares, creating the room if needed.
    /// Performs no password check.
    pub async fn register_client(&self, client: Arc<Client>) {
        let room = client.room().await;
        let created = {
            let mut rooms = self.rooms.write().await;
            Self::insert_member(&mut rooms, &room, &client)
        };

        if created {
            self.metrics.room_created().await;
        }
        info!("Client {} ({}) registered in {}", client.nickname, client.id, room);

        if !room.is_system() {
            self.broadcast_room_list().await;
        }
    }

    /// Register a client after checking the declared room's password. A new
    /// public room takes `password` as its password. On failure the client
    /// is not registered.
    pub async fn join_client(&self, client: Arc<Client>, password: &str) -> Result<()> {
        let room = client.room().await;
        let created = {
            let mut rooms = self.rooms.write().await;
            let mut passwords = self.passwords.write().await;
            Self::verify_password(&passwords, &room, password)?;
            self.claim_password(&rooms, &mut passwords, &room, password);
            Self::insert_member(&mut rooms, &room, &client)
        };

        if created {
            self.metrics.room_created().await;
        }
        info!("Client {} ({}) joined {}", client.nickname, client.id, room);

        if !room.is_system() {
            self.broadcast_room_list().await;
        }
        Ok(())
    }

    /// Remove a client from its room and return that room. An emptied room
    /// loses its password and draw state. Public rooms get a leave notice
    /// and refreshed listings.
    pub async fn unregister_client(&self, client: &Client) -> RoomName {
        let room = client.room().await;
        let departure = {
            let mut rooms = self.rooms.write().await;
            let mut passwords = self.passwords.write().await;
            Self::remove_member(&mut rooms, &mut passwords, &room, &client.id)
        };

        if departure.room_emptied {
            self.destroyed(&room).await;
        }
        if !departure.removed {
            return room;
        }
        info!("Client {} ({}) unregistered from {}", client.nickname, client.id, room);

        if !room.is_system() {
            self.announce(Event::notice(room.clone(), "leave", format!("{} left the room", client.nickname)))
                .await;
            self.broadcast_room_list().await;
            self.broadcast_online_count().await;
        }
        room
    }

    /// Move a client to `target`. Returns the room it left. On a password
    /// failure nothing changes. Switching to the current room is a no-op.
    pub async fn switch_room(&self, client: &Arc<Client>, target: &RoomName, password: &str) -> Result<RoomName> {
        let old = client.room().await;
        if old == *target {
            return Ok(old);
        }

        let (departure, created) = {
            let mut rooms = self.rooms.write().await;
            let mut passwords = self.passwords.write().await;

            Self::verify_password(&passwords, target, password).map_err(|e| {
                warn!("Client {} refused entry to {}: {}", client.nickname, target, e);
                e
            })?;
            self.claim_password(&rooms, &mut passwords, target, password);

            let departure = Self::remove_member(&mut rooms, &mut passwords, &old, &client.id);
            let created = Self::insert_member(&mut rooms, target, client);
            client.set_room(target.clone()).await;
            (departure, created)
        };

        if departure.room_emptied {
            self.destroyed(&old).await;
        }
        if created {
            self.metrics.room_created().await;
        }
        info!("Client {} switched from {} to {}", client.nickname, old, target);

        if !old.is_system() {
            self.announce(Event::notice(old.clone(), "leave", format!("{} left the room", client.nickname)))
                .await;
        }
        if !(old.is_system() && target.is_system()) {
            self.broadcast_room_list().await;
            self.broadcast_online_count().await;
        }
        Ok(old)
    }

    /// Append to the room's bounded history; system rooms keep none
    pub async fn add_history(&self, event: &Event) {
        if event.room.is_system() || event.room.is_empty() {
            return;
        }

        let mut history = self.history.write().await;
        let entries = history.entry(event.room.clone()).or_default();
        entries.push_back(event.clone());
        while entries.len() > self.history_max_size {
            entries.pop_front();
        }
    }

    pub async fn history_of(&self, room: &RoomName) -> Vec<Event> {
        self.history
            .read()
            .await
            .get(room.as_str())
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replay the client's room history in order, stopping at the first
    /// failed write
    pub async fn send_history(&self, client: &Client) {
        let room = client.room().await;
        let entries = self.history_of(&room).await;

        let mut sent = 0;
        for event in &entries {
            if !self.send_to(client, event).await {
                break;
            }
            sent += 1;
        }
        debug!("Replayed {}/{} history entries of {} to {}", sent, entries.len(), room, client.nickname);
    }

    /// Write one event to one client. Failures stay with that client:
    /// routine disconnects are logged at debug, anything else at warn.
    pub async fn send_to(&self, client: &Client, event: &Event) -> bool {
        match client.send(event).await {
            Ok(()) => {
                self.metrics.message_sent(event.kind()).await;
                true
            }
            Err(e) => {
                self.metrics.message_failed(event.kind()).await;
                if e.is_disconnect() {
                    debug!("Skipping closed connection of {}: {}", client.nickname, e);
                } else {
                    warn!("Failed to send {} to {}: {}", event.kind(), client.nickname, e);
                }
                false
            }
        }
    }

    async fn fan_out(&self, recipients: &[Arc<Client>], event: &Event) -> usize {
        let results = join_all(recipients.iter().map(|client| self.send_to(client, event))).await;
        results.into_iter().filter(|delivered| *delivered).count()
    }

    /// Current members of `room`
    pub async fn members(&self, room: &RoomName) -> Vec<Arc<Client>> {
        self.rooms
            .read()
            .await
            .get(room.as_str())
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn member_count(&self, room: &RoomName) -> usize {
        self.rooms.read().await.get(room.as_str()).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn room_exists(&self, room: &RoomName) -> bool {
        self.rooms.read().await.contains_key(room.as_str())
    }

    pub async fn has_password(&self, room: &RoomName) -> bool {
        self.passwords.read().await.contains_key(room.as_str())
    }

    /// Deliver to every member of the event's room. Returns how many writes
    /// succeeded.
    pub async fn broadcast_to_room(&self, event: &Event) -> usize {
        let recipients = self.members(&event.room).await;
        self.fan_out(&recipients, event).await
    }

    /// Deliver to every member of the event's room except `excluded_id`
    pub async fn broadcast_to_room_except(&self, event: &Event, excluded_id: &str) -> usize {
        let recipients: Vec<Arc<Client>> = self
            .members(&event.room)
            .await
            .into_iter()
            .filter(|client| client.id != excluded_id)
            .collect();
        self.fan_out(&recipients, event).await
    }

    /// Record to history, then broadcast
    pub async fn announce(&self, event: Event) -> usize {
        self.add_history(&event).await;
        self.broadcast_to_room(&event).await
    }

    /// Public rooms and whether each is password protected.
    /// The default room is always listed.
    pub async fn room_list(&self) -> BTreeMap<String, bool> {
        let rooms = self.rooms.read().await;
        let passwords = self.passwords.read().await;

        let mut listing: BTreeMap<String, bool> = rooms
            .keys()
            .filter(|room| !room.is_system())
            .map(|room| (room.to_string(), passwords.contains_key(room.as_str())))
            .collect();
        listing.entry(self.default_room.to_string()).or_insert(false);
        listing
    }

    /// Push the room listing to every client in a public room
    pub async fn broadcast_room_list(&self) {
        let listing = self.room_list().await;
        let recipients: Vec<(RoomName, Vec<Arc<Client>>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .filter(|(room, _)| !room.is_system())
                .map(|(room, members)| (room.clone(), members.values().cloned().collect()))
                .collect()
        };

        for (room, clients) in recipients {
            let event = Event::new(room, Payload::RoomList { rooms: listing.clone() });
            self.fan_out(&clients, &event).await;
        }
    }

    /// Tell every public room how many members it has
    pub async fn broadcast_online_count(&self) {
        let recipients: Vec<(RoomName, Vec<Arc<Client>>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .filter(|(room, _)| !room.is_system())
                .map(|(room, members)| (room.clone(), members.values().cloned().collect()))
                .collect()
        };

        for (room, clients) in recipients {
            let event = Event::new(room, Payload::OnlineCount { count: clients.len() });
            self.fan_out(&clients, &event).await;
        }
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of registered clients across all rooms
    pub async fn client_count(&self) -> usize {
        self.rooms.read().await.values().map(|m| m.len()).sum()
    }

    /// Every registered client
    pub async fn all_clients(&self) -> Vec<Arc<Client>> {
        self.rooms
            .read()
            .await
            .values()
            .flat_map(|members| members.values().cloned())
            .collect()
    }
}
