use std::collections::HashMap;
use std::sync::Arc;

use tokio::io;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::db::MessageStore;
use crate::error::Result as StoreResult;
use crate::events::{
    CallAnswer, CallEnd, CallReject, CallRequest, CallSignal, ClientEvent, SendMessage,
    ServerEvent, UserId,
};
use crate::models::{Message, MessageView};
use crate::presence::{ConnId, Presence};
use crate::signaling::CallTable;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Chat server is not running")]
    Closed,
}

enum Command {
    Connect {
        user_id: UserId,
        event_tx: mpsc::Sender<ServerEvent>,
        res_tx: oneshot::Sender<ConnId>,
    },
    Event {
        conn_id: ConnId,
        user_id: UserId,
        event: ClientEvent,
    },
    Disconnect {
        conn_id: ConnId,
    },
    OnlineUsers {
        res_tx: oneshot::Sender<Vec<UserId>>,
    },
    Stored {
        conn_id: ConnId,
        sender_id: UserId,
        result: StoreResult<Message>,
    },
    MarkedRead {
        reader_id: UserId,
        sender_id: UserId,
        result: StoreResult<u64>,
    },
}

/// Store work queued by one connection, applied in arrival order.
enum Write {
    Insert(Message),
    MarkRead { sender_id: UserId },
}

struct Session {
    event_tx: mpsc::Sender<ServerEvent>,
    /// Token uid of the connection, known from the upgrade.
    user_id: UserId,
    joined: bool,
}

/// Owns every live connection, the presence registry and the call table.
/// Commands are handled one at a time, so none of this state needs a lock.
/// Store writes run on a per-connection writer task and come back as commands.
pub struct ChatServer {
    sessions: HashMap<ConnId, Session>,
    presence: Presence,
    calls: CallTable,
    writers: HashMap<ConnId, mpsc::UnboundedSender<Write>>,
    next_conn_id: ConnId,
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl ChatServer {
    pub fn new() -> (Self, ChatServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();

        (
            Self {
                sessions: HashMap::new(),
                presence: Presence::new(),
                calls: CallTable::new(),
                writers: HashMap::new(),
                next_conn_id: 1,
                cmd_tx: cmd_tx.downgrade(),
                cmd_rx,
            },
            ChatServerHandle { cmd_tx },
        )
    }

    pub async fn run<S: MessageStore>(mut self, store: S) -> io::Result<()> {
        let store = Arc::new(store);
        while let Some(command) = self.cmd_rx.recv().await {
            match command {
                Command::Connect {
                    user_id,
                    event_tx,
                    res_tx,
                } => {
                    let conn_id = self.next_conn_id;
                    self.next_conn_id += 1;
                    self.sessions.insert(
                        conn_id,
                        Session {
                            event_tx,
                            user_id,
                            joined: false,
                        },
                    );
                    log::debug!("Connection {} opened", conn_id);
                    let _ = res_tx.send(conn_id);
                }
                Command::Event {
                    conn_id,
                    user_id,
                    event,
                } => self.handle_event(&store, conn_id, user_id, event),
                Command::Disconnect { conn_id } => self.disconnect(conn_id),
                Command::OnlineUsers { res_tx } => {
                    let _ = res_tx.send(self.presence.users().cloned().collect());
                }
                Command::Stored {
                    conn_id,
                    sender_id,
                    result,
                } => self.message_stored(conn_id, sender_id, result),
                Command::MarkedRead {
                    reader_id,
                    sender_id,
                    result,
                } => self.marked_read(reader_id, sender_id, result),
            }
        }

        log::info!("Chat server command channel closed");
        Ok(())
    }

    fn handle_event<S: MessageStore>(
        &mut self,
        store: &Arc<S>,
        conn_id: ConnId,
        user_id: UserId,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::Join => self.join(conn_id, user_id),
            ClientEvent::SendMessage(msg) => self.send_message(store, conn_id, user_id, msg),
            ClientEvent::TypingStart(typing) => {
                self.push_to_user(&typing.receiver_id, ServerEvent::TypingStarted { user_id });
            }
            ClientEvent::TypingStop(typing) => {
                self.push_to_user(&typing.receiver_id, ServerEvent::TypingStopped { user_id });
            }
            ClientEvent::MarkRead(receipt) => self.write(
                store,
                conn_id,
                &user_id,
                Write::MarkRead {
                    sender_id: receipt.sender_id,
                },
            ),
            ClientEvent::CallRequest(request) => self.call_request(user_id, request),
            ClientEvent::CallAccepted(answer) => self.call_accepted(user_id, answer),
            ClientEvent::CallRejected(reject) => self.call_rejected(user_id, reject),
            ClientEvent::CallSignaling(signal) => self.call_signaling(user_id, signal),
            ClientEvent::CallEnd(end) => self.call_end(user_id, end),
            ClientEvent::Ping => self.push(conn_id, ServerEvent::Pong),
        }
    }

    fn join(&mut self, conn_id: ConnId, user_id: UserId) {
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            log::warn!("Join from unknown connection {}", conn_id);
            return;
        };
        session.joined = true;

        if let Some(previous) = self.presence.register(user_id.clone(), conn_id) {
            log::info!(
                "User {} moved from connection {} to {}",
                user_id,
                previous,
                conn_id
            );
        } else {
            log::info!("User {} joined on connection {}", user_id, conn_id);
        }

        self.broadcast(conn_id, ServerEvent::UserOnline(user_id));
    }

    fn disconnect(&mut self, conn_id: ConnId) {
        let Some(session) = self.sessions.remove(&conn_id) else {
            return;
        };
        log::debug!("Connection {} closed", conn_id);
        // Queued writes still finish; the writer exits once drained.
        self.writers.remove(&conn_id);

        let user_id = session.user_id;
        if session.joined && self.presence.unregister(&user_id, conn_id) {
            log::info!("User {} disconnected", user_id);
            self.broadcast(conn_id, ServerEvent::UserOffline(user_id.clone()));
        }
        // Another connection speaking for the user keeps the calls.
        if self.presence.lookup(&user_id).is_some() {
            return;
        }

        for partner in self.calls.detach(&user_id) {
            self.push_to_user(
                &partner,
                ServerEvent::CallEnded {
                    user_id: user_id.clone(),
                },
            );
        }
    }

    fn send_message<S: MessageStore>(
        &mut self,
        store: &Arc<S>,
        conn_id: ConnId,
        sender_id: UserId,
        msg: SendMessage,
    ) {
        match Message::compose(&sender_id, &msg.receiver_id, &msg.content, msg.message_type) {
            Ok(message) => self.write(store, conn_id, &sender_id, Write::Insert(message)),
            Err(err) => self.push(
                conn_id,
                ServerEvent::MessageError {
                    message: err.to_string(),
                },
            ),
        }
    }

    fn write<S: MessageStore>(&mut self, store: &Arc<S>, conn_id: ConnId, user_id: &UserId, write: Write) {
        let writer = self.writers.entry(conn_id).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(persist(
                Arc::clone(store),
                rx,
                self.cmd_tx.clone(),
                conn_id,
                user_id.clone(),
            ));
            tx
        });
        if writer.send(write).is_err() {
            log::warn!("Writer for connection {} is gone", conn_id);
        }
    }

    fn message_stored(&mut self, conn_id: ConnId, sender_id: UserId, result: StoreResult<Message>) {
        let stored = match result {
            Ok(stored) => MessageView::from(stored),
            Err(err) => {
                log::error!("Failed to save message from {}: {}", sender_id, err);
                self.push(
                    conn_id,
                    ServerEvent::MessageError {
                        message: "Failed to send message".to_string(),
                    },
                );
                return;
            }
        };

        log::debug!("Message from {} to {}", sender_id, stored.receiver_id);
        let receiver_id = stored.receiver_id.clone();
        self.push_to_user(&receiver_id, ServerEvent::MessageReceive(stored.clone()));
        self.push(conn_id, ServerEvent::MessageSent(stored));
    }

    fn marked_read(&mut self, reader_id: UserId, sender_id: UserId, result: StoreResult<u64>) {
        match result {
            Ok(updated) => {
                log::debug!("{} read {} messages from {}", reader_id, updated, sender_id);
                self.push_to_user(&sender_id, ServerEvent::MessagesRead { user_id: reader_id });
            }
            Err(err) => log::warn!("Failed to mark messages as read: {}", err),
        }
    }

    fn call_request(&mut self, caller_id: UserId, request: CallRequest) {
        if request.receiver_id == caller_id {
            log::debug!("Ignoring self-call from {}", caller_id);
            return;
        }
        // An absent callee simply never sees the call.
        if self.presence.lookup(&request.receiver_id).is_none() {
            log::debug!("Call from {} to offline user {}", caller_id, request.receiver_id);
            return;
        }

        self.calls.ring(&caller_id, &request.receiver_id);
        self.push_to_user(
            &request.receiver_id,
            ServerEvent::CallIncoming {
                caller_id,
                caller_name: request.caller_name,
                call_type: request.call_type,
                signal: request.signal,
            },
        );
    }

    fn call_accepted(&mut self, callee_id: UserId, answer: CallAnswer) {
        if !self.calls.accept(&callee_id, &answer.caller_id) {
            log::debug!("No ringing call from {} to {}", answer.caller_id, callee_id);
            return;
        }
        self.push_to_user(
            &answer.caller_id,
            ServerEvent::CallAccepted {
                receiver_id: callee_id,
                signal: answer.signal,
            },
        );
    }

    fn call_rejected(&mut self, callee_id: UserId, reject: CallReject) {
        if !self.calls.reject(&callee_id, &reject.caller_id) {
            log::debug!("No ringing call from {} to {}", reject.caller_id, callee_id);
            return;
        }
        self.push_to_user(
            &reject.caller_id,
            ServerEvent::CallRejected {
                receiver_id: callee_id,
            },
        );
    }

    fn call_signaling(&mut self, from: UserId, signal: CallSignal) {
        if !self.calls.is_connected(&from, &signal.to) {
            log::debug!("Dropping signaling from {} to {}: not connected", from, signal.to);
            return;
        }
        self.push_to_user(
            &signal.to,
            ServerEvent::CallSignaling {
                from,
                signal: signal.signal,
            },
        );
    }

    fn call_end(&mut self, user_id: UserId, end: CallEnd) {
        if !self.calls.end(&user_id, &end.to) {
            log::debug!("No call between {} and {} to end", user_id, end.to);
            return;
        }
        self.push_to_user(&end.to, ServerEvent::CallEnded { user_id });
    }

    fn push_to_user(&self, user_id: &str, event: ServerEvent) {
        if let Some(conn_id) = self.presence.lookup(user_id) {
            self.push(conn_id, event);
        }
    }

    /// Sends `event` to every registered connection except `skip`.
    fn broadcast(&self, skip: ConnId, event: ServerEvent) {
        for conn_id in self.presence.connections() {
            if conn_id != skip {
                self.push(conn_id, event.clone());
            }
        }
    }

    fn push(&self, conn_id: ConnId, event: ServerEvent) {
        match self.sessions.get(&conn_id) {
            Some(session) => deliver(conn_id, session, event),
            None => log::debug!("Dropping {} for closed connection {}", event.name(), conn_id),
        }
    }
}

/// Applies one connection's store writes in order and reports each result to the server.
async fn persist<S: MessageStore>(
    store: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<Write>,
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    conn_id: ConnId,
    user_id: UserId,
) {
    while let Some(write) = rx.recv().await {
        let command = match write {
            Write::Insert(message) => Command::Stored {
                conn_id,
                sender_id: user_id.clone(),
                result: store.insert(message).await,
            },
            Write::MarkRead { sender_id } => {
                let result = store.mark_read(&sender_id, &user_id).await;
                Command::MarkedRead {
                    reader_id: user_id.clone(),
                    sender_id,
                    result,
                }
            }
        };
        let Some(cmd_tx) = cmd_tx.upgrade() else {
            break;
        };
        if cmd_tx.send(command).is_err() {
            break;
        }
    }
}

// Best effort: a slow or closing session loses the event rather than stalling the server.
fn deliver(conn_id: ConnId, session: &Session, event: ServerEvent) {
    let name = event.name();
    match session.event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            log::warn!("Outbound queue full on connection {}, dropped {}", conn_id, name)
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("Connection {} already closed, dropped {}", conn_id, name)
        }
    }
}

#[derive(Clone)]
pub struct ChatServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ChatServerHandle {
    pub async fn connect(
        &self,
        user_id: UserId,
        event_tx: mpsc::Sender<ServerEvent>,
    ) -> Result<ConnId, RelayError> {
        let (res_tx, res_rx) = oneshot::channel();

        self.cmd_tx
            .send(Command::Connect {
                user_id,
                event_tx,
                res_tx,
            })
            .map_err(|_| RelayError::Closed)?;

        res_rx.await.map_err(|_| RelayError::Closed)
    }

    pub fn relay(&self, conn_id: ConnId, user_id: UserId, event: ClientEvent) -> Result<(), RelayError> {
        self.cmd_tx
            .send(Command::Event {
                conn_id,
                user_id,
                event,
            })
            .map_err(|_| RelayError::Closed)
    }

    pub fn disconnect(&self, conn_id: ConnId) -> Result<(), RelayError> {
        self.cmd_tx
            .send(Command::Disconnect { conn_id })
            .map_err(|_| RelayError::Closed)
    }

    /// Users with a registered connection, in no particular order.
    pub async fn online_users(&self) -> Result<Vec<UserId>, RelayError> {
        let (res_tx, res_rx) = oneshot::channel();

        self.cmd_tx
            .send(Command::OnlineUsers { res_tx })
            .map_err(|_| RelayError::Closed)?;

        res_rx.await.map_err(|_| RelayError::Closed)
    }
}
