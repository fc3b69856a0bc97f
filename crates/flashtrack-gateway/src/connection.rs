use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{error, info, trace};

use flashtrack_types::events::GatewayEvent;

use crate::dispatcher::{Dispatcher, Session};

/// Keepalive: server sends a Ping every 15 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one authenticated notification socket until either side closes it.
///
/// The channel is registered before anything is sent; the unread backlog is
/// flushed next, then live events are forwarded. Dropping the session's
/// registration on exit unregisters the channel.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, account_id: i64, name: String) {
    let (sender, receiver) = socket.split();

    let session = match dispatcher.connect(account_id).await {
        Ok(session) => session,
        Err(e) => {
            error!("{} ({}) could not attach to gateway: {}", name, account_id, e);
            return;
        }
    };

    info!(
        "{} ({}) connected to gateway, flushing {} unread",
        name,
        account_id,
        session.backlog.len()
    );

    serve_session(sender, receiver, session, account_id).await;
    info!("{} ({}) disconnected from gateway", name, account_id);
}

/// Ready, backlog, then live events until the client leaves or a newer
/// connection takes the channel over. The registration is released on return.
pub(crate) async fn serve_session<Tx, Rx, E>(mut sender: Tx, mut receiver: Rx, session: Session, account_id: i64)
where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Send + 'static,
{
    let Session {
        registration,
        backlog,
        mut rx,
    } = session;

    let ready = GatewayEvent::Ready {
        account_id,
        unread: backlog.len(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    let mut flushed = HashSet::with_capacity(backlog.len());
    for notification in backlog {
        flushed.insert(notification.id);
        if send_event(&mut sender, &GatewayEvent::Notification(notification))
            .await
            .is_err()
        {
            return;
        }
    }

    // Forward live events -> client, with keepalive
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    // None: a newer connection replaced this one
                    let Some(event) = event else { break };

                    if event.notification_id().is_some_and(|id| flushed.contains(&id)) {
                        continue;
                    }
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The client has nothing to say; read only to notice the close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(text) => {
                    let preview: String = text.as_str().chars().take(200).collect();
                    trace!("Ignoring client frame: {}", preview);
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(registration);
}

async fn send_event<S>(sender: &mut S, event: &GatewayEvent) -> anyhow::Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = serde_json::to_string(event)?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| anyhow::anyhow!("socket write failed: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use flashtrack_db::Database;
    use flashtrack_db::models::{NewAccount, NewAccountOutcome, NewNotification};
    use flashtrack_types::models::{Notification, Role, kind};

    use super::*;
    use crate::registry::Registry;

    const WAIT: Duration = Duration::from_secs(2);

    fn setup() -> (Dispatcher, Arc<Database>, i64) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let outcome = db
            .create_account(&NewAccount {
                name: "sam",
                email: "sam@x",
                password_hash: "x",
                role: Role::Staff,
                society_id: 1,
                push_token: None,
            })
            .unwrap();
        let NewAccountOutcome::Created(id) = outcome else {
            panic!("account not created");
        };
        (Dispatcher::new(Registry::new(), db.clone()), db, id)
    }

    fn store(db: &Database, account_id: i64, title: &str) -> Notification {
        db.insert_notification(&NewNotification {
            account_id,
            title: title.to_string(),
            message: String::new(),
            kind: kind::ASSIGNMENT,
            complaint_id: None,
        })
        .unwrap()
        .into_notification()
    }

    /// An in-memory socket: frames the server writes land in the returned
    /// receiver, frames pushed into the returned sender reach the server.
    #[allow(clippy::type_complexity)]
    fn socket() -> (
        impl Sink<Message, Error = mpsc::error::SendError<Message>> + Unpin + Send + 'static,
        impl Stream<Item = Result<Message, Infallible>> + Unpin + Send + 'static,
        mpsc::UnboundedReceiver<Message>,
        mpsc::UnboundedSender<Message>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Message>();

        let sink = Box::pin(futures_util::sink::unfold(out_tx, |tx, msg: Message| async move {
            tx.send(msg).map(|_| tx)
        }));
        let stream = Box::pin(futures_util::stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok(msg), rx))
        }));
        (sink, stream, out_rx, in_tx)
    }

    async fn next_frame(out: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        let msg = timeout(WAIT, out.recv()).await.unwrap().unwrap();
        let Message::Text(text) = msg else {
            panic!("expected a text frame, got {msg:?}");
        };
        serde_json::from_str(text.as_str()).unwrap()
    }

    #[tokio::test]
    async fn test_ready_then_backlog_then_live() {
        let (dispatcher, db, staff) = setup();
        let a = store(&db, staff, "a");
        let b = store(&db, staff, "b");

        let (sink, stream, mut out, _client) = socket();
        let session = dispatcher.connect(staff).await.unwrap();
        let serve = tokio::spawn(serve_session(sink, stream, session, staff));

        // b is already in the backlog; the live copy must not be sent twice
        dispatcher.dispatch(&b);
        let c = store(&db, staff, "c");
        dispatcher.dispatch(&c);

        let ready = next_frame(&mut out).await;
        assert_eq!(ready["type"], "Ready");
        assert_eq!(ready["data"]["account_id"], staff);
        assert_eq!(ready["data"]["unread"], 2);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let frame = next_frame(&mut out).await;
            assert_eq!(frame["type"], "Notification");
            ids.push(frame["data"]["id"].as_i64().unwrap());
        }
        assert_eq!(ids, vec![b.id, a.id, c.id]);

        // A newer connection takes the channel; this one tears down
        let newer = dispatcher.connect(staff).await.unwrap();
        timeout(WAIT, serve).await.unwrap().unwrap();
        assert_eq!(
            dispatcher.registry().connection_id(staff),
            Some(newer.registration.conn_id())
        );

        // Nothing else was written before the sink went away
        assert!(timeout(WAIT, out.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_close_unregisters() {
        let (dispatcher, _db, staff) = setup();
        let (sink, stream, mut out, client) = socket();
        let session = dispatcher.connect(staff).await.unwrap();
        let serve = tokio::spawn(serve_session(sink, stream, session, staff));

        let ready = next_frame(&mut out).await;
        assert_eq!(ready["data"]["unread"], 0);
        assert!(dispatcher.registry().is_connected(staff));

        client.send(Message::Text("hello".into())).unwrap();
        client.send(Message::Close(None)).unwrap();
        timeout(WAIT, serve).await.unwrap().unwrap();
        assert!(!dispatcher.registry().is_connected(staff));
    }
}
