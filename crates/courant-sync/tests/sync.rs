//! End-to-end session tests over the in-memory link.
//!
//! The [`MemoryLink`] plays the server: tests script connectivity, inject
//! pushes, and inspect what reached the wire.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use courant_net::{spawn_connection, MemoryLink, ReconnectPolicy};
use courant_queue::ActionQueue;
use courant_shared::protocol::{ClientCommand, ServerEvent};
use courant_shared::types::{ChannelId, ConnectionStatus, MessageId, UserId};
use courant_store::{MessageStore, SyncState};
use courant_sync::{ChatSession, SyncError};

struct Harness {
    link: MemoryLink,
    session: Arc<ChatSession>,
    store: Arc<MessageStore>,
    queue: Arc<ActionQueue>,
}

fn init_logs() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial: Duration::from_millis(5),
        multiplier: 2.0,
        max: Duration::from_millis(20),
        jitter: 0.0,
    }
}

fn harness() -> Harness {
    init_logs();

    let link = MemoryLink::new();
    let (connection, events) = spawn_connection(Arc::new(link.connector()), fast_policy());
    let store = Arc::new(MessageStore::open_in_memory().unwrap());
    let queue = Arc::new(ActionQueue::open_in_memory().unwrap());
    let session = ChatSession::start(
        UserId::new(),
        Arc::clone(&store),
        Arc::clone(&queue),
        connection,
        events,
    );

    Harness {
        link,
        session,
        store,
        queue,
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_status(h: &Harness, want: ConnectionStatus) {
    let session = Arc::clone(&h.session);
    wait_until(&format!("status {want}"), move || {
        session.connection_status() == want
    })
    .await;
}

// ---------------------------------------------------------------------------
// Offline behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_send_is_optimistic_and_queued() {
    let h = harness();
    let channel = ChannelId::new();

    let id = h.session.send_message(&channel, "hello", None).unwrap();

    // Visible immediately, before any network round-trip.
    let rows = h.session.messages_for_channel(&channel).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].content, "hello");
    assert_eq!(rows[0].sync, SyncState::Optimistic);

    assert_eq!(h.session.pending_count().unwrap(), 1);
    assert!(h.link.sent_frames().is_empty());
}

#[tokio::test]
async fn enqueue_never_blocks_while_disconnected() {
    let h = harness();
    let channel = ChannelId::new();

    for i in 0..50 {
        h.session
            .send_message(&channel, &format!("message {i}"), None)
            .unwrap();
    }

    assert_eq!(h.session.pending_count().unwrap(), 50);
    assert_eq!(h.session.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn empty_and_oversized_content_are_rejected() {
    let h = harness();
    let channel = ChannelId::new();

    assert!(matches!(
        h.session.send_message(&channel, "", None),
        Err(SyncError::EmptyContent)
    ));

    let huge = "x".repeat(300_000);
    assert!(matches!(
        h.session.send_message(&channel, &huge, None),
        Err(SyncError::ContentTooLarge(_))
    ));

    assert_eq!(h.session.pending_count().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Drain on connect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connecting_drains_the_queue_and_keeps_cache_unchanged() {
    let h = harness();
    let channel = ChannelId::new();

    let id = h.session.send_message(&channel, "hello", None).unwrap();
    h.session.connect().await;

    let queue = Arc::clone(&h.queue);
    wait_until("queue to drain", move || queue.len().unwrap() == 0).await;

    let commands = h.link.sent_commands();
    assert_eq!(commands.len(), 1);
    match &commands[0] {
        ClientCommand::SendMessage {
            message_id,
            content,
            ..
        } => {
            assert_eq!(*message_id, id);
            assert_eq!(content, "hello");
        }
        other => panic!("unexpected command {other:?}"),
    }

    // The cache is unchanged by the drain.
    let rows = h.session.messages_for_channel(&channel).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content, "hello");
}

#[tokio::test]
async fn send_and_edit_drain_in_enqueue_order_across_reconnects() {
    let h = harness();
    let channel = ChannelId::new();

    // Stay in Connecting: dials are refused.
    h.link.refuse_dials(true);
    h.session.connect().await;

    let id = h.session.send_message(&channel, "draft", None).unwrap();
    h.session.edit_message(id, "final").unwrap();
    assert_eq!(h.session.pending_count().unwrap(), 2);

    h.link.refuse_dials(false);
    let queue = Arc::clone(&h.queue);
    wait_until("queue to drain", move || queue.len().unwrap() == 0).await;

    let commands = h.link.sent_commands();
    assert_eq!(commands.len(), 2);
    assert!(
        matches!(&commands[0], ClientCommand::SendMessage { message_id, .. } if *message_id == id),
        "the send must be transmitted before its edit"
    );
    assert!(
        matches!(&commands[1], ClientCommand::EditMessage { message_id, new_content, .. }
            if *message_id == id && new_content == "final")
    );
}

#[tokio::test]
async fn link_loss_is_supervised_and_pending_work_resumes() {
    let h = harness();
    let channel = ChannelId::new();

    h.session.connect().await;
    wait_for_status(&h, ConnectionStatus::Connected).await;

    // Break transmissions, queue a message, then lose the link entirely.
    h.link.fail_sends(true);
    h.session.send_message(&channel, "stranded", None).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.session.pending_count().unwrap(), 1);

    h.link.fail_sends(false);
    h.link.drop_connection();

    // The supervisor reconnects and replays the stranded action.
    let queue = Arc::clone(&h.queue);
    wait_until("queue to drain after reconnect", move || {
        queue.len().unwrap() == 0
    })
    .await;
    assert_eq!(h.session.connection_status(), ConnectionStatus::Connected);
}

// ---------------------------------------------------------------------------
// Inbound pushes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn foreign_message_and_edit_pushes_update_the_cache() {
    let h = harness();
    let channel = ChannelId::new();

    h.session.connect().await;
    wait_for_status(&h, ConnectionStatus::Connected).await;

    let id = MessageId::new();
    h.link.push_event(&ServerEvent::MessageCreated {
        message_id: id,
        channel_id: channel.clone(),
        sender_id: UserId::new(),
        content: "hi".to_string(),
        reply_to: None,
        sent_at: chrono::Utc::now(),
        attachments: Vec::new(),
    });

    let store = Arc::clone(&h.store);
    wait_until("push to land", move || {
        store.count_for_channel(&channel).unwrap() == 1
    })
    .await;
    assert_eq!(h.store.get(id).unwrap().sync, SyncState::Confirmed);

    h.link.push_event(&ServerEvent::MessageEdited {
        message_id: id,
        channel_id: h.store.get(id).unwrap().channel_id.clone(),
        new_content: "bye".to_string(),
    });

    let store = Arc::clone(&h.store);
    wait_until("edit to land", move || {
        store.get(id).unwrap().content == "bye"
    })
    .await;

    let row = h.store.get(id).unwrap();
    assert!(row.edited);
    assert_eq!(row.sync, SyncState::Confirmed);
}

#[tokio::test]
async fn duplicate_send_delivery_yields_exactly_one_live_message() {
    let h = harness();
    let channel = ChannelId::new();

    let id = h.session.send_message(&channel, "once", None).unwrap();
    h.session.connect().await;

    let queue = Arc::clone(&h.queue);
    wait_until("queue to drain", move || queue.len().unwrap() == 0).await;

    // The server processed the send twice (at-least-once delivery) and
    // echoes the same push twice.
    let echo = ServerEvent::MessageCreated {
        message_id: id,
        channel_id: channel.clone(),
        sender_id: UserId::new(),
        content: "once".to_string(),
        reply_to: None,
        sent_at: chrono::Utc::now(),
        attachments: Vec::new(),
    };
    h.link.push_event(&echo);
    h.link.push_event(&echo);

    let store = Arc::clone(&h.store);
    let confirmed_channel = channel.clone();
    wait_until("echo to confirm", move || {
        let rows = store.messages_for_channel(&confirmed_channel).unwrap();
        rows.len() == 1 && rows[0].sync == SyncState::Confirmed
    })
    .await;

    assert_eq!(h.store.count_for_channel(&channel).unwrap(), 1);
}

#[tokio::test]
async fn diverging_echo_reconciles_to_the_server_version() {
    let h = harness();
    let channel = ChannelId::new();

    let id = h.session.send_message(&channel, "mine", None).unwrap();
    h.session.connect().await;
    wait_for_status(&h, ConnectionStatus::Connected).await;

    // Another participant's edit won on the server before our echo.
    h.link.push_event(&ServerEvent::MessageCreated {
        message_id: id,
        channel_id: channel.clone(),
        sender_id: UserId::new(),
        content: "theirs".to_string(),
        reply_to: None,
        sent_at: chrono::Utc::now(),
        attachments: Vec::new(),
    });

    let store = Arc::clone(&h.store);
    wait_until("reconciliation", move || {
        let row = store.get(id).unwrap();
        row.content == "theirs" && row.sync == SyncState::Reconciled
    })
    .await;
}

#[tokio::test]
async fn concurrent_local_and_remote_delete_converge_once() {
    let h = harness();
    let channel = ChannelId::new();

    let id = h.session.send_message(&channel, "short-lived", None).unwrap();
    h.session.connect().await;
    let queue = Arc::clone(&h.queue);
    wait_until("send to drain", move || queue.len().unwrap() == 0).await;

    // Transmissions start failing, so our delete stays queued...
    h.link.fail_sends(true);
    h.session.delete_message(id).unwrap();
    assert_eq!(h.session.pending_count().unwrap(), 1);

    // ...and the server's own delete push for the same message arrives first.
    h.link.push_event(&ServerEvent::MessageDeleted {
        message_id: id,
        channel_id: channel.clone(),
    });

    let store = Arc::clone(&h.store);
    wait_until("tombstone", move || store.get(id).unwrap().deleted).await;
    assert!(h.store.messages_for_channel(&channel).unwrap().is_empty());

    // Connectivity returns; the queued delete transmits as a duplicate with
    // no observable cache change.
    h.link.fail_sends(false);
    h.link.drop_connection();
    let queue = Arc::clone(&h.queue);
    wait_until("delete to drain", move || queue.len().unwrap() == 0).await;

    assert!(h.store.get(id).unwrap().deleted);
    assert!(h.store.messages_for_channel(&channel).unwrap().is_empty());
    let deletes: Vec<_> = h
        .link
        .sent_commands()
        .into_iter()
        .filter(|c| matches!(c, ClientCommand::DeleteMessage { .. }))
        .collect();
    assert_eq!(deletes.len(), 1);
}

// ---------------------------------------------------------------------------
// Live views and restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_reflects_local_and_remote_writes() {
    let h = harness();
    let channel = ChannelId::new();

    let mut stream = h.session.stream_for(&channel);
    assert!(stream.next().await.unwrap().unwrap().is_empty());

    h.session.send_message(&channel, "local", None).unwrap();
    let snapshot = stream.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].content, "local");

    h.session.connect().await;
    wait_for_status(&h, ConnectionStatus::Connected).await;

    h.link.push_event(&ServerEvent::MessageCreated {
        message_id: MessageId::new(),
        channel_id: channel.clone(),
        sender_id: UserId::new(),
        content: "remote".to_string(),
        reply_to: None,
        sent_at: chrono::Utc::now(),
        attachments: Vec::new(),
    });

    // Snapshots keep coming until the remote write is in.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = tokio::time::timeout_at(deadline, stream.next())
            .await
            .expect("stream update timed out")
            .unwrap()
            .unwrap();
        if snapshot.iter().any(|m| m.content == "remote") {
            break;
        }
    }
}

#[tokio::test]
async fn queued_actions_survive_a_restart() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("messages.db");
    let queue_path = dir.path().join("outbox.db");
    let channel = ChannelId::new();
    let user = UserId::new();

    // First run: send offline, then go away without ever connecting.
    {
        let link = MemoryLink::new();
        let (connection, events) = spawn_connection(Arc::new(link.connector()), fast_policy());
        let store = Arc::new(MessageStore::open_at(&store_path).unwrap());
        let queue = Arc::new(ActionQueue::open_at(&queue_path).unwrap());
        let session = ChatSession::start(user.clone(), store, queue, connection, events);

        session.send_message(&channel, "from last run", None).unwrap();
        assert_eq!(session.pending_count().unwrap(), 1);
        session.shutdown().await;
    }

    // Second run: the action is still queued and drains on connect.
    let link = MemoryLink::new();
    let (connection, events) = spawn_connection(Arc::new(link.connector()), fast_policy());
    let store = Arc::new(MessageStore::open_at(&store_path).unwrap());
    let queue = Arc::new(ActionQueue::open_at(&queue_path).unwrap());
    let session = ChatSession::start(
        user,
        Arc::clone(&store),
        Arc::clone(&queue),
        connection,
        events,
    );

    assert_eq!(session.pending_count().unwrap(), 1);
    session.connect().await;

    let queue_watch = Arc::clone(&queue);
    wait_until("queue to drain after restart", move || {
        queue_watch.len().unwrap() == 0
    })
    .await;

    let commands = link.sent_commands();
    assert_eq!(commands.len(), 1);
    assert!(
        matches!(&commands[0], ClientCommand::SendMessage { content, .. } if content == "from last run")
    );
}
