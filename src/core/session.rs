//! Per-connection session: join handshake, read loop and teardown

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::core::client::Client;
use crate::core::connection::{EventSink, EventStream};
use crate::core::event::{Event, Payload, RoomName};
use crate::core::server::SharedServerManager;
use crate::error::ChatroomError;

const RATE_LIMIT_NOTICE: &str = "You are sending messages too fast, please try again later";

/// Event telling a client why it was refused entry to `room`
fn refusal(room: RoomName, err: &ChatroomError) -> Event {
    let payload = match err {
        ChatroomError::WrongPassword => Payload::WrongPassword,
        ChatroomError::PasswordRequired => Payload::PasswordRequired,
        other => Payload::Error { content: other.to_string() },
    };
    Event::new(room, payload)
}

fn join_notice(room: RoomName, nickname: &str) -> Event {
    Event::notice(room, "join", format!("{} joined the room", nickname))
}

/// Drive one connection from its init frame to disconnect.
///
/// The first frame names the nickname, avatar and room (plus an optional
/// password). Every later frame is admission-checked, stamped with the
/// session's identity and queued for routing; `switch` is handled here.
pub async fn run_session<S: EventStream>(server: SharedServerManager, mut sink: Box<dyn EventSink>, mut stream: S) {
    let metrics = server.metrics().clone();
    metrics.connection_opened().await;

    let init = match stream.receive().await {
        Ok(Some(init)) => init,
        Ok(None) => {
            debug!("Connection closed before the init frame");
            close_sink(&mut sink).await;
            metrics.connection_closed().await;
            return;
        }
        Err(e) => {
            warn!("Failed to read init frame: {}", e);
            close_sink(&mut sink).await;
            metrics.connection_closed().await;
            return;
        }
    };

    let client = admit(&server, init, sink).await;
    let ping = start_ping_task(&server, client.clone());

    read_loop(&server, &client, &mut stream).await;

    ping.abort();
    server.rooms().unregister_client(&client).await;
    if let Err(e) = client.close().await {
        if !e.is_disconnect() {
            debug!("Closing connection of {} failed: {}", client.nickname, e);
        }
    }
    metrics.connection_closed().await;
    info!(
        "Session of {} ended after {:?}",
        client.nickname,
        client.connection_duration()
    );
}

async fn close_sink(sink: &mut Box<dyn EventSink>) {
    if let Err(e) = sink.close().await {
        if !e.is_disconnect() {
            debug!("Closing connection before admission failed: {}", e);
        }
    }
}

/// Register the client in its declared room, falling back to the default
/// room when the password check fails
async fn admit(server: &SharedServerManager, init: Event, sink: Box<dyn EventSink>) -> Arc<Client> {
    let rooms = server.rooms();
    let declared = if init.room.is_empty() { server.default_room() } else { init.room.clone() };
    let client = Arc::new(Client::new(init.nickname.clone(), init.avatar.clone(), declared.clone(), sink));

    if let Err(e) = rooms.join_client(client.clone(), init.password()).await {
        info!("{} refused entry to {} ({}), joining {} instead", client.nickname, declared, e.wire_code(), rooms.default_room());
        client.set_room(server.default_room()).await;
        rooms.register_client(client.clone()).await;
        rooms.send_to(&client, &refusal(declared, &e)).await;
    }

    let room = client.room().await;
    if !room.is_system() {
        rooms.send_history(&client).await;
        rooms.announce(join_notice(room, &client.nickname)).await;
        rooms.broadcast_online_count().await;
    }
    client
}

fn start_ping_task(server: &SharedServerManager, client: Arc<Client>) -> JoinHandle<()> {
    let period = server.config().ping_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = client.ping().await {
                if !e.is_disconnect() {
                    warn!("Ping to {} failed: {}", client.nickname, e);
                }
                break;
            }
        }
    })
}

async fn read_loop<S: EventStream>(server: &SharedServerManager, client: &Arc<Client>, stream: &mut S) {
    loop {
        let mut event = match stream.receive().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("{} closed the connection", client.nickname);
                return;
            }
            Err(ChatroomError::MessageParseError(e)) => {
                warn!("Malformed frame from {}, closing: {}", client.nickname, e);
                return;
            }
            Err(e) => {
                if !e.is_disconnect() {
                    warn!("Read from {} failed: {}", client.nickname, e);
                }
                return;
            }
        };
        server.metrics().message_received().await;

        // Keyed on the connection, never on anything the frame claims
        if !server.check_rate_limit(&client.id).await {
            server.rooms().send_to(client, &Event::error(RATE_LIMIT_NOTICE)).await;
            continue;
        }

        event.nickname = client.nickname.clone();
        event.avatar = client.avatar.clone();

        if let Payload::Switch { password } = &event.payload {
            let target = if event.room.is_empty() { server.default_room() } else { event.room.clone() };
            let password = password.clone();
            switch(server, client, target, &password).await;
            continue;
        }

        event.room = client.room().await;
        if let Err(e) = server.submit(Some(client.clone()), event).await {
            debug!("Stopping session of {}: {}", client.nickname, e);
            return;
        }
    }
}

async fn switch(server: &SharedServerManager, client: &Arc<Client>, target: RoomName, password: &str) {
    let rooms = server.rooms();
    match rooms.switch_room(client, &target, password).await {
        Err(e) => {
            rooms.send_to(client, &refusal(target, &e)).await;
        }
        Ok(old) => {
            let moved = old != target;
            let confirm = Event::new(target.clone(), Payload::SwitchSuccess { previous_room: old.to_string() });
            rooms.send_to(client, &confirm).await;
            if moved {
                rooms.send_history(client).await;
                if !target.is_system() {
                    rooms.announce(join_notice(target, &client.nickname)).await;
                }
            }
        }
    }
}
