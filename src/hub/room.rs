//! Room Hub: session state machine, fan-out, presence, heartbeats, and the
//! compaction protocol (spec §4.3, §5).
//!
//! Each Room owns a logical serialization point (spec §5): a single
//! mailbox task processes every command sequentially, so mutations to the
//! log, session set, and presence table never race. This is modeled on
//! the teacher's `Node::run` event loop, generalized from one static TCP
//! listener to a per-room command stream.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument, warn};

use crate::crdt::{Operation, Replica};
use crate::log::RoomLog;
use crate::persist;
use crate::wire::ServerMessage;

use super::session::{Session, SessionState};

#[derive(Debug, Clone)]
pub struct Presence {
    pub name: String,
    pub visible: bool,
}

/// Reserved site id for the room-creation greeting, never assigned to a
/// real connection.
const GREETING_SITE_ID: u64 = u64::MAX;

pub struct JoinInfo {
    pub site_id: u64,
}

enum RoomCommand {
    Join {
        outbound: flume::Sender<ServerMessage>,
        client_offset: usize,
        reply: oneshot::Sender<JoinInfo>,
    },
    Operations {
        site_id: u64,
        events: Vec<Operation>,
    },
    Presence {
        site_id: u64,
        name: String,
        visible: bool,
    },
    Heartbeat {
        site_id: u64,
    },
    Disconnect {
        site_id: u64,
    },
    Bootstrap {
        reply: oneshot::Sender<Vec<Operation>>,
    },
    Sweep {
        idle_ttl: Duration,
        max_age: Duration,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<(Vec<Operation>, u64)>,
    },
}

/// A cheap, cloneable handle to a live room's mailbox task. Never holds a
/// back-reference into the Registry — only a name and a command channel.
#[derive(Clone)]
pub struct RoomHandle {
    pub name: String,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn join(
        &self,
        outbound: flume::Sender<ServerMessage>,
        client_offset: usize,
    ) -> Option<JoinInfo> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join {
                outbound,
                client_offset,
                reply,
            })
            .ok()?;
        rx.await.ok()
    }

    pub fn submit_operations(&self, site_id: u64, events: Vec<Operation>) {
        let _ = self.tx.send(RoomCommand::Operations { site_id, events });
    }

    pub fn submit_presence(&self, site_id: u64, name: String, visible: bool) {
        let _ = self.tx.send(RoomCommand::Presence {
            site_id,
            name,
            visible,
        });
    }

    pub fn heartbeat(&self, site_id: u64) {
        let _ = self.tx.send(RoomCommand::Heartbeat { site_id });
    }

    pub fn disconnect(&self, site_id: u64) {
        let _ = self.tx.send(RoomCommand::Disconnect { site_id });
    }

    pub async fn bootstrap(&self) -> Vec<Operation> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(RoomCommand::Bootstrap { reply }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Asks the room to check its own idle/age thresholds. Returns true if
    /// the room evicted itself and the caller (the Registry) should drop
    /// it from the directory.
    pub async fn sweep(&self, idle_ttl: Duration, max_age: Duration) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RoomCommand::Sweep {
                idle_ttl,
                max_age,
                reply,
            })
            .is_err()
        {
            return true;
        }
        rx.await.unwrap_or(true)
    }

    pub async fn snapshot(&self) -> Option<(Vec<Operation>, u64)> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RoomCommand::Snapshot { reply }).ok()?;
        rx.await.ok()
    }
}

struct RoomState {
    name: String,
    log: RoomLog,
    sessions: HashMap<u64, Session>,
    presence: HashMap<u64, Presence>,
    next_site_id: u64,
    created_unix: u64,
    last_activity: Instant,
    persist_dir: PathBuf,
    heartbit_interval: Duration,
    log_bytes_threshold: usize,
}

impl RoomState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Removes a session (dropping its outbound sender closes the
    /// connection task's channel, which closes the socket) and tells
    /// everyone else it's gone.
    fn close_session(&mut self, site_id: u64) {
        if let Some(session) = self.sessions.get_mut(&site_id) {
            session.state = SessionState::Closed;
        }
        if self.sessions.remove(&site_id).is_some() {
            self.broadcast(ServerMessage::SiteDisconnected { site_id }, None);
        }
    }

    /// Sends to every live session except `except`. A send failure (full
    /// queue or a socket that already closed) closes that session as
    /// slow/dead; collected separately to avoid mutating the map while
    /// iterating it.
    fn broadcast(&mut self, msg: ServerMessage, except: Option<u64>) {
        let mut dead = Vec::new();
        for (&id, session) in self.sessions.iter() {
            if Some(id) == except {
                continue;
            }
            if session.send(msg.clone()).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.close_session(id);
        }
    }

    fn handle_join(&mut self, outbound: flume::Sender<ServerMessage>, client_offset: usize) -> JoinInfo {
        let site_id = self.next_site_id;
        self.next_site_id += 1;
        self.touch();

        let _ = outbound.try_send(ServerMessage::SetSiteId { site_id });
        for (&id, presence) in self.presence.iter() {
            let _ = outbound.try_send(ServerMessage::SitePresence {
                site_id: id,
                name: presence.name.clone(),
                visible: presence.visible,
            });
        }
        let catch_up = self.log.since(client_offset).to_vec();
        if !catch_up.is_empty() {
            let _ = outbound.try_send(ServerMessage::CrdtEvents { events: catch_up });
        }

        let join_offset = self.log.len();
        let mut session = Session::new(site_id, join_offset, outbound);
        session.state = SessionState::AwaitingHello;
        self.sessions.insert(site_id, session);
        JoinInfo { site_id }
    }

    /// A session earns `Active` on its first presence update or operation
    /// batch and stays there; re-entering this on every later message would
    /// just reset `last_seen` without changing anything meaningful.
    fn promote_active(&mut self, site_id: u64) {
        if let Some(session) = self.sessions.get_mut(&site_id) {
            if !session.is_active() {
                session.state = SessionState::Active;
            }
            session.last_seen = Instant::now();
        }
    }

    /// Appends to the log and fans out in append order, then checks the
    /// compaction trigger. The server does not re-run CRDT integration on
    /// the hot path — it only replays the log into a Replica during
    /// compaction (spec §4.1: "the server may hold only the log").
    async fn handle_operations(&mut self, site_id: u64, events: Vec<Operation>) {
        if events.is_empty() {
            return;
        }
        self.promote_active(site_id);
        self.touch();
        for op in &events {
            self.log.append(op.clone());
        }
        self.broadcast(ServerMessage::CrdtEvents { events }, Some(site_id));
        self.maybe_compact().await;
    }

    fn handle_presence(&mut self, site_id: u64, name: String, visible: bool) {
        self.promote_active(site_id);
        self.touch();
        self.presence.insert(
            site_id,
            Presence {
                name: name.clone(),
                visible,
            },
        );
        self.broadcast(
            ServerMessage::SitePresence {
                site_id,
                name,
                visible,
            },
            None,
        );
    }

    fn handle_heartbeat(&mut self, site_id: u64) {
        if let Some(session) = self.sessions.get_mut(&site_id) {
            session.last_seen = Instant::now();
        }
        self.touch();
    }

    fn handle_disconnect(&mut self, site_id: u64) {
        self.touch();
        self.presence.remove(&site_id);
        self.close_session(site_id);
    }

    fn heartbeat_tick(&mut self) {
        let deadline = self.heartbit_interval * 2;
        let mut dead = Vec::new();
        for (&id, session) in self.sessions.iter() {
            if session.last_seen.elapsed() > deadline {
                dead.push(id);
                continue;
            }
            if session.send(ServerMessage::Heartbit {}).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.close_session(id);
        }
    }

    /// Compaction protocol (spec §4.3): detect the threshold, force every
    /// session off, rebuild the minimal operation set, write it to stable
    /// storage, and only then leave the room ready for fresh joins — the
    /// write completes before this returns, so a Join popped from the
    /// mailbox afterward can never race it (spec §4.5: "writes the
    /// compacted log to stable storage before clients are allowed to
    /// reconnect").
    #[instrument(level = "info", skip(self), fields(room = %self.name))]
    async fn maybe_compact(&mut self) {
        if self.log.bytes() <= self.log_bytes_threshold {
            return;
        }

        info!(bytes = self.log.bytes(), "log crossed compaction threshold");
        self.broadcast(ServerMessage::CompactionRequired {}, None);
        let all_sessions: Vec<u64> = self.sessions.keys().copied().collect();
        for id in all_sessions {
            self.sessions.remove(&id);
        }

        let replica = match Replica::from_log(self.log.all()) {
            Ok(replica) => replica,
            Err(e) => {
                warn!(error = %e, "compaction aborted: log failed to replay");
                return;
            }
        };
        let minimal = replica.minimal_ops();

        let dir = self.persist_dir.clone();
        let room_name = self.name.clone();
        let created = self.created_unix;
        let events = minimal.clone();
        match tokio::task::spawn_blocking(move || persist::save_room(&dir, &room_name, &events, created)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist compacted log"),
            Err(e) => warn!(error = %e, "compaction persist task panicked"),
        }

        self.log.replace(minimal);
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Spawns a room's mailbox task and returns a handle to it.
pub fn spawn(
    name: String,
    persist_dir: PathBuf,
    heartbit_interval: Duration,
    log_bytes_threshold: usize,
    greeting: Option<String>,
    restored: Option<(Vec<Operation>, u64)>,
) -> RoomHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<RoomCommand>();

    let (log, created_unix) = match restored {
        Some((ops, created)) => (RoomLog::from_ops(ops), created),
        None => (RoomLog::new(), now_unix()),
    };

    let mut presence = HashMap::new();
    if let Some(greeting) = greeting {
        presence.insert(
            GREETING_SITE_ID,
            Presence {
                name: greeting,
                visible: true,
            },
        );
    }

    let mut state = RoomState {
        name: name.clone(),
        log,
        sessions: HashMap::new(),
        presence,
        next_site_id: 0,
        created_unix,
        last_activity: Instant::now(),
        persist_dir,
        heartbit_interval,
        log_bytes_threshold,
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbit_interval);
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        RoomCommand::Join { outbound, client_offset, reply } => {
                            let info = state.handle_join(outbound, client_offset);
                            let _ = reply.send(info);
                        }
                        RoomCommand::Operations { site_id, events } => {
                            state.handle_operations(site_id, events).await;
                        }
                        RoomCommand::Presence { site_id, name, visible } => {
                            state.handle_presence(site_id, name, visible);
                        }
                        RoomCommand::Heartbeat { site_id } => {
                            state.handle_heartbeat(site_id);
                        }
                        RoomCommand::Disconnect { site_id } => {
                            state.handle_disconnect(site_id);
                        }
                        RoomCommand::Bootstrap { reply } => {
                            let _ = reply.send(state.log.all().to_vec());
                        }
                        RoomCommand::Sweep { idle_ttl, max_age, reply } => {
                            let idle = state.sessions.is_empty() && state.last_activity.elapsed() > idle_ttl;
                            let age = Duration::from_secs(now_unix().saturating_sub(state.created_unix));
                            let evict = idle || age > max_age;
                            if evict {
                                let ids: Vec<u64> = state.sessions.keys().copied().collect();
                                for id in ids {
                                    state.close_session(id);
                                }
                            }
                            let _ = reply.send(evict);
                            if evict {
                                break;
                            }
                        }
                        RoomCommand::Snapshot { reply } => {
                            let _ = reply.send((state.log.all().to_vec(), state.created_unix));
                        }
                    }
                }
                _ = ticker.tick() => {
                    state.heartbeat_tick();
                }
            }
        }

        // Best-effort final snapshot on task exit (room evicted or process
        // shutting down); never fsync'd, never blocking the next room.
        let dir = state.persist_dir.clone();
        let room_name = state.name.clone();
        let events = state.log.all().to_vec();
        let created = state.created_unix;
        let _ = tokio::task::spawn_blocking(move || persist::save_room(&dir, &room_name, &events, created)).await;
    });

    RoomHandle { name, tx }
}
