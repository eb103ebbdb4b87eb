//! Room state and the per-room actor

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::ws::channel::{room_channel_name, ChannelManager, SessionId, LOBBY_CHANNEL};
use crate::ws::protocol::{FigureInfo, MoveAction, PlayerInfo, RoomId, RoomInfo, ServerMsg};

use super::board::Board;
use super::figure::{Figure, FigureKind};

/// The eight player colors (ARGB)
pub const PLAYER_COLORS: [u32; 8] = [
    0xFFFF_0000, // red
    0xFF00_FF00, // green
    0xFFFF_C800, // orange
    0xFF00_00FF, // blue
    0xFFFF_FF00, // yellow
    0xFFA2_00FF, // purple
    0xFFFF_FFFF, // white
    0xFFFF_00FF, // magenta
];

pub const MAX_ROOM_PLAYERS: usize = PLAYER_COLORS.len();

/// Spawn column of the first seat; each following seat is 4 columns right
const FIRST_SPAWN_COLUMN: i32 = 3;
const SPAWN_COLUMN_STEP: i32 = 4;

/// Room phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Seats open, owner may start
    Waiting,
    InProgress,
    /// Game over; the room stays open for chat until everyone leaves
    Ended,
}

/// A seated player
#[derive(Debug, Clone)]
pub struct Seat {
    pub session: SessionId,
    pub name: String,
    pub color: u32,
    pub spawn_column: i32,
    pub figure: Option<Figure>,
    /// Consecutive down attempts stopped by another player's live figure
    pub blocked: u32,
}

impl Seat {
    fn player_info(&self) -> PlayerInfo {
        PlayerInfo {
            name: self.name.clone(),
            color: self.color,
        }
    }
}

/// Why a join was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeatRefusal {
    #[error("room is full")]
    Full,
    #[error("match already started")]
    Started,
    #[error("already seated")]
    AlreadySeated,
}

/// Who receives an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Everyone in the room group
    Room,
    /// Everyone in the lobby group
    Lobby,
    /// Everyone in the lobby group except one session
    LobbyExcept(SessionId),
    Player(SessionId),
}

/// Side effect of a room mutation, applied by the actor in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Send { to: Recipient, msg: ServerMsg },
    /// Add a session to the room group
    EnterGroup(SessionId),
    /// Remove a session from the room group
    LeaveGroup(SessionId),
}

impl RoomEvent {
    fn send(to: Recipient, msg: ServerMsg) -> Self {
        RoomEvent::Send { to, msg }
    }
}

/// Room state (owned by the room task)
pub struct RoomState {
    pub id: RoomId,
    pub max_players: usize,
    pub phase: RoomPhase,
    seats: Vec<Seat>,
    colors: VecDeque<u32>,
    board: Option<Board>,
    rng: ChaCha8Rng,
    blocked_fix_threshold: u32,
}

impl RoomState {
    /// Empty room. `max_players` is clamped to `1..=8`; a zero
    /// `blocked_fix_threshold` never forces a blocked figure down.
    pub fn new(id: RoomId, max_players: i32, seed: u64, blocked_fix_threshold: u32) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut colors = PLAYER_COLORS.to_vec();
        colors.shuffle(&mut rng);

        Self {
            id,
            max_players: max_players.clamp(1, MAX_ROOM_PLAYERS as i32) as usize,
            phase: RoomPhase::Waiting,
            seats: Vec::new(),
            colors: colors.into(),
            board: None,
            rng,
            blocked_fix_threshold,
        }
    }

    /// New room with its creator in the first seat.
    ///
    /// Announces the room to the lobby; the creator is not echoed a roster.
    pub fn open(
        id: RoomId,
        max_players: i32,
        seed: u64,
        blocked_fix_threshold: u32,
        owner: SessionId,
        name: String,
    ) -> (Self, Vec<RoomEvent>) {
        let mut room = Self::new(id, max_players, seed, blocked_fix_threshold);
        let color = room.take_color();
        room.seats.push(Seat {
            session: owner,
            name: name.clone(),
            color,
            spawn_column: FIRST_SPAWN_COLUMN,
            figure: None,
            blocked: 0,
        });

        let events = vec![
            RoomEvent::send(
                Recipient::Lobby,
                ServerMsg::RoomCreated {
                    room_id: id,
                    max_players: room.max_players as i32,
                    color,
                    name,
                },
            ),
            RoomEvent::EnterGroup(owner),
        ];
        (room, events)
    }

    // a fresh room always has a color for its creator
    fn take_color(&mut self) -> u32 {
        self.colors.pop_front().unwrap_or(PLAYER_COLORS[0])
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn seat_of(&self, session: &SessionId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.session == *session)
    }

    fn seat_index(&self, session: &SessionId) -> Option<usize> {
        self.seats.iter().position(|s| s.session == *session)
    }

    pub fn owner(&self) -> Option<SessionId> {
        self.seats.first().map(|s| s.session)
    }

    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn available_colors(&self) -> impl Iterator<Item = u32> + '_ {
        self.colors.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.max_players
    }

    pub fn is_started(&self) -> bool {
        self.phase != RoomPhase::Waiting
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.seats.iter().map(Seat::player_info).collect()
    }

    /// Directory entry
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            max_players: self.max_players as i32,
            started: self.is_started(),
            players: self.player_infos(),
        }
    }

    // ========================================================================
    // Seating
    // ========================================================================

    /// Seat a player who asked to join from the lobby
    pub fn seat(&mut self, session: SessionId, name: String) -> Result<Vec<RoomEvent>, SeatRefusal> {
        if self.seat_index(&session).is_some() {
            return Err(SeatRefusal::AlreadySeated);
        }
        if self.is_started() {
            return Err(SeatRefusal::Started);
        }
        if self.is_full() {
            return Err(SeatRefusal::Full);
        }
        let color = self.colors.pop_front().ok_or(SeatRefusal::Full)?;

        let spawn_column = FIRST_SPAWN_COLUMN + SPAWN_COLUMN_STEP * self.seats.len() as i32;
        self.seats.push(Seat {
            session,
            name: name.clone(),
            color,
            spawn_column,
            figure: None,
            blocked: 0,
        });

        let joined = ServerMsg::RoomJoined {
            room_id: self.id,
            color,
            name,
        };
        Ok(vec![
            RoomEvent::send(Recipient::LobbyExcept(session), joined.clone()),
            RoomEvent::send(Recipient::Room, joined),
            RoomEvent::send(
                Recipient::Player(session),
                ServerMsg::RoomRoster {
                    room_id: self.id,
                    color,
                    players: self.player_infos(),
                },
            ),
            RoomEvent::EnterGroup(session),
        ])
    }

    /// Remove a player. When the last seat empties the caller tears the
    /// room down.
    pub fn unseat(&mut self, session: &SessionId) -> Vec<RoomEvent> {
        let Some(idx) = self.seat_index(session) else {
            return Vec::new();
        };
        let mut events = Vec::new();

        if self.phase == RoomPhase::Waiting && idx == 0 && self.seats.len() > 1 {
            events.push(RoomEvent::send(
                Recipient::Player(self.seats[1].session),
                ServerMsg::GameOwner,
            ));
        }

        let mut seat = self.seats.remove(idx);
        if self.seats.is_empty() {
            return events;
        }

        let figure = match (seat.figure.take(), self.board.as_mut()) {
            (Some(mut figure), Some(board)) => {
                let info = figure.info();
                figure.clear(board);
                info
            }
            (Some(figure), None) => figure.info(),
            (None, _) => FigureInfo::NONE,
        };

        events.push(RoomEvent::send(
            Recipient::Room,
            ServerMsg::RoomLeft {
                player: seat.player_info(),
                figure,
            },
        ));
        events.push(RoomEvent::LeaveGroup(seat.session));
        self.colors.push_back(seat.color);
        events
    }

    // ========================================================================
    // Match
    // ========================================================================

    /// Start the match. Only the owner of a waiting room may do this.
    pub fn start(&mut self, session: &SessionId) -> Vec<RoomEvent> {
        if self.phase != RoomPhase::Waiting || self.owner() != Some(*session) {
            return Vec::new();
        }

        let mut board = Board::for_players(self.seats.len());
        let mut figures = Vec::with_capacity(self.seats.len());
        for (i, seat) in self.seats.iter_mut().enumerate() {
            seat.spawn_column = FIRST_SPAWN_COLUMN + SPAWN_COLUMN_STEP * i as i32;
            seat.blocked = 0;
            let mut figure = Figure::new(FigureKind::random(&mut self.rng), seat.color);
            figure.attach(&mut board, seat.spawn_column);
            figures.push(figure.info());
            seat.figure = Some(figure);
        }

        let board_width = board.width();
        self.board = Some(board);
        self.phase = RoomPhase::InProgress;

        vec![
            RoomEvent::send(
                Recipient::Room,
                ServerMsg::GameStart {
                    board_width,
                    figures,
                },
            ),
            RoomEvent::send(Recipient::Lobby, ServerMsg::GameStarted { room_id: self.id }),
        ]
    }

    /// Seat index of a player allowed to act right now. `expected`, when
    /// given, must name the player's current figure.
    fn active_seat(&self, session: &SessionId, expected: Option<&FigureInfo>) -> Option<usize> {
        if self.phase != RoomPhase::InProgress || self.board.is_none() {
            return None;
        }
        let idx = self.seat_index(session)?;
        let figure = self.seats[idx].figure.as_ref()?;
        if let Some(expected) = expected {
            if !figure.matches(expected) {
                trace!(room_id = self.id, "Stale input ignored");
                return None;
            }
        }
        Some(idx)
    }

    /// Apply one figure input
    pub fn apply_move(
        &mut self,
        session: &SessionId,
        action: MoveAction,
        expected: Option<FigureInfo>,
    ) -> Vec<RoomEvent> {
        let Some(idx) = self.active_seat(session, expected.as_ref()) else {
            return Vec::new();
        };
        match action {
            MoveAction::Left => self.shift_sideways(idx, -1),
            MoveAction::Right => self.shift_sideways(idx, 1),
            MoveAction::Rotate => self.rotate(idx),
            MoveAction::Down => self.step_down(idx),
            MoveAction::AllWayDown => self.hard_drop(idx),
        }
    }

    /// Server-driven down step for every live figure
    pub fn gravity_tick(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        for idx in 0..self.seats.len() {
            if self.phase != RoomPhase::InProgress {
                break;
            }
            if self.seats[idx].figure.is_some() {
                events.extend(self.step_down(idx));
            }
        }
        events
    }

    fn shift_sideways(&mut self, idx: usize, dx: i32) -> Vec<RoomEvent> {
        let (Some(board), Some(figure)) = (self.board.as_mut(), self.seats[idx].figure.as_mut())
        else {
            return Vec::new();
        };
        let msg = if dx < 0 {
            if !figure.can_move_left(board) {
                return Vec::new();
            }
            figure.move_left(board);
            ServerMsg::MoveLeft(figure.info())
        } else {
            if !figure.can_move_right(board) {
                return Vec::new();
            }
            figure.move_right(board);
            ServerMsg::MoveRight(figure.info())
        };
        vec![RoomEvent::send(Recipient::Room, msg)]
    }

    fn rotate(&mut self, idx: usize) -> Vec<RoomEvent> {
        let (Some(board), Some(figure)) = (self.board.as_mut(), self.seats[idx].figure.as_mut())
        else {
            return Vec::new();
        };
        if !figure.can_rotate(board) {
            return Vec::new();
        }
        figure.rotate(board);
        vec![RoomEvent::send(Recipient::Room, ServerMsg::Rotate(figure.info()))]
    }

    fn step_down(&mut self, idx: usize) -> Vec<RoomEvent> {
        let (Some(board), Some(figure)) = (self.board.as_mut(), self.seats[idx].figure.as_mut())
        else {
            return Vec::new();
        };
        if figure.can_move_down(board) {
            figure.move_down(board);
            let info = figure.info();
            self.seats[idx].blocked = 0;
            return vec![RoomEvent::send(Recipient::Room, ServerMsg::MoveDown(info))];
        }
        if figure.is_resting(board) {
            return self.fix_and_respawn(idx);
        }
        self.blocked(idx)
    }

    fn hard_drop(&mut self, idx: usize) -> Vec<RoomEvent> {
        let (Some(board), Some(figure)) = (self.board.as_mut(), self.seats[idx].figure.as_mut())
        else {
            return Vec::new();
        };
        let before = figure.info();
        let rows = figure.drop_down(board);
        let resting = figure.is_resting(board);
        let after = figure.info();

        let mut events = Vec::new();
        if rows > 0 {
            self.seats[idx].blocked = 0;
            events.push(RoomEvent::send(
                Recipient::Room,
                ServerMsg::MoveAllWayDown { before, after },
            ));
        }
        if resting {
            events.extend(self.fix_and_respawn(idx));
        } else {
            events.extend(self.blocked(idx));
        }
        events
    }

    /// A figure that can neither fall nor rest is held up by another live
    /// figure. After enough consecutive attempts it is fixed where it is.
    fn blocked(&mut self, idx: usize) -> Vec<RoomEvent> {
        let seat = &mut self.seats[idx];
        seat.blocked += 1;
        trace!(room_id = self.id, name = %seat.name, blocked = seat.blocked, "Figure blocked");
        if self.blocked_fix_threshold > 0 && seat.blocked >= self.blocked_fix_threshold {
            debug!(room_id = self.id, name = %seat.name, "Blocked figure fixed in place");
            return self.fix_and_respawn(idx);
        }
        Vec::new()
    }

    /// Land the seat's figure, clear lines, and hand out the next figure
    /// unless the board has overflowed.
    fn fix_and_respawn(&mut self, idx: usize) -> Vec<RoomEvent> {
        let Some(board) = self.board.as_mut() else {
            return Vec::new();
        };
        let seat = &mut self.seats[idx];
        let Some(mut figure) = seat.figure.take() else {
            return Vec::new();
        };
        seat.blocked = 0;

        let was_visible = figure.is_all_visible();
        figure.fix(board);
        let fixed = figure.info();
        let lines = board.remove_full_lines();
        if lines > 0 {
            debug!(room_id = self.id, lines, "Lines removed");
        }

        let mut next = Figure::new(FigureKind::random(&mut self.rng), seat.color);
        let (x, y) = next.spawn_position(board, seat.spawn_column);
        let spawn_visible = next
            .cells_at(x, y, next.orientation())
            .iter()
            .all(|&(_, cy)| cy >= 0);

        if !was_visible || !spawn_visible {
            self.phase = RoomPhase::Ended;
            info!(room_id = self.id, name = %seat.name, "Game over");
            return vec![RoomEvent::send(Recipient::Room, ServerMsg::GameOver)];
        }

        next.attach(board, seat.spawn_column);
        let spawned = next.info();
        seat.figure = Some(next);
        vec![RoomEvent::send(
            Recipient::Room,
            ServerMsg::NewFigure { fixed, spawned },
        )]
    }

    /// Relay a chat line from a seated player
    pub fn chat(&self, session: &SessionId, text: &str) -> Vec<RoomEvent> {
        let Some(seat) = self.seat_of(session) else {
            return Vec::new();
        };
        vec![RoomEvent::send(
            Recipient::Room,
            ServerMsg::Chat {
                text: format!("{}: {}", seat.name, text),
            },
        )]
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Inputs accepted by a room task
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session: SessionId,
        name: String,
        reply: oneshot::Sender<Result<(), SeatRefusal>>,
    },
    Leave {
        session: SessionId,
    },
    /// The client confirmed it switched to the room screen
    EnterGroup {
        session: SessionId,
    },
    Start {
        session: SessionId,
    },
    Move {
        session: SessionId,
        action: MoveAction,
        expected: Option<FigureInfo>,
    },
    Chat {
        session: SessionId,
        text: String,
    },
}

/// Tunables shared by every room
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    /// Server-driven fall interval; `None` leaves falling to the clients
    pub gravity: Option<Duration>,
    pub blocked_fix_threshold: u32,
    pub queue_capacity: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            gravity: None,
            blocked_fix_threshold: 0,
            queue_capacity: 256,
        }
    }
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    pub input_tx: mpsc::Sender<RoomCommand>,
    summary: Arc<RwLock<RoomInfo>>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    /// Last published directory entry
    pub fn info(&self) -> RoomInfo {
        self.summary.read().clone()
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Queue a command; false if the room is gone
    pub async fn send(&self, command: RoomCommand) -> bool {
        self.input_tx.send(command).await.is_ok()
    }
}

/// Registry of all open rooms
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn insert(&self, handle: RoomHandle) {
        self.rooms.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|(_, h)| h)
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// Directory entries ordered by room id
    pub fn infos(&self) -> Vec<RoomInfo> {
        let mut infos: Vec<RoomInfo> = self.rooms.iter().map(|r| r.value().info()).collect();
        infos.sort_by_key(|r| r.id);
        infos
    }
}

/// Deliver room events through the channel layer
pub fn deliver(channels: &ChannelManager, room_id: RoomId, events: Vec<RoomEvent>) {
    let group = room_channel_name(room_id);
    for event in events {
        match event {
            RoomEvent::Send { to, msg } => {
                let frame = msg.encode();
                match to {
                    Recipient::Room => {
                        channels.broadcast(&group, frame, None);
                    }
                    Recipient::Lobby => {
                        channels.broadcast(LOBBY_CHANNEL, frame, None);
                    }
                    Recipient::LobbyExcept(session) => {
                        channels.broadcast(LOBBY_CHANNEL, frame, Some(session));
                    }
                    Recipient::Player(session) => {
                        channels.send_to(&session, frame);
                    }
                }
            }
            RoomEvent::EnterGroup(session) => {
                channels.join(&group, session);
            }
            RoomEvent::LeaveGroup(session) => {
                channels.leave(&group, &session);
            }
        }
    }
}

/// The room task: owns the state and applies commands one at a time
pub struct GameRoom {
    state: RoomState,
    input_rx: mpsc::Receiver<RoomCommand>,
    channels: Arc<ChannelManager>,
    summary: Arc<RwLock<RoomInfo>>,
    player_count: Arc<AtomicUsize>,
    gravity: Option<Duration>,
}

impl GameRoom {
    pub fn new(
        state: RoomState,
        settings: RoomSettings,
        channels: Arc<ChannelManager>,
    ) -> (Self, RoomHandle) {
        let (input_tx, input_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let summary = Arc::new(RwLock::new(state.info()));
        let player_count = Arc::new(AtomicUsize::new(state.seats().len()));

        let handle = RoomHandle {
            id: state.id,
            input_tx,
            summary: summary.clone(),
            player_count: player_count.clone(),
        };

        let room = Self {
            state,
            input_rx,
            channels,
            summary,
            player_count,
            gravity: settings.gravity.filter(|d| !d.is_zero()),
        };

        (room, handle)
    }

    /// Process commands until the last player leaves or every handle is gone
    pub async fn run(mut self) {
        let room_id = self.state.id;
        info!(room_id, max_players = self.state.max_players, "Room opened");

        let mut gravity = self.gravity.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            tokio::select! {
                command = self.input_rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle(command);
                }
                _ = next_tick(&mut gravity) => {
                    let events = self.state.gravity_tick();
                    deliver(&self.channels, room_id, events);
                }
            }

            if self.state.is_empty() {
                break;
            }
        }

        info!(room_id, "Room closed");
    }

    fn handle(&mut self, command: RoomCommand) {
        let room_id = self.state.id;
        let events = match command {
            RoomCommand::Join {
                session,
                name,
                reply,
            } => match self.state.seat(session, name) {
                Ok(events) => {
                    let _ = reply.send(Ok(()));
                    events
                }
                Err(SeatRefusal::AlreadySeated) => {
                    debug!(room_id, session_id = %session, "Already seated");
                    let _ = reply.send(Err(SeatRefusal::AlreadySeated));
                    Vec::new()
                }
                Err(refusal) => {
                    debug!(room_id, session_id = %session, %refusal, "Join refused");
                    let _ = reply.send(Err(refusal));
                    vec![RoomEvent::send(
                        Recipient::Player(session),
                        ServerMsg::RoomFull { room_id },
                    )]
                }
            },
            RoomCommand::Leave { session } => self.state.unseat(&session),
            RoomCommand::EnterGroup { session } => {
                if self.state.seat_of(&session).is_some() {
                    vec![RoomEvent::EnterGroup(session)]
                } else {
                    warn!(room_id, session_id = %session, "Room ack from a player without a seat");
                    Vec::new()
                }
            }
            RoomCommand::Start { session } => {
                let events = self.state.start(&session);
                if !events.is_empty() {
                    info!(room_id, players = self.state.seats().len(), "Match started");
                }
                events
            }
            RoomCommand::Move {
                session,
                action,
                expected,
            } => self.state.apply_move(&session, action, expected),
            RoomCommand::Chat { session, text } => self.state.chat(&session, &text),
        };

        deliver(&self.channels, room_id, events);
        self.publish();
    }

    fn publish(&self) {
        *self.summary.write() = self.state.info();
        self.player_count
            .store(self.state.seats().len(), Ordering::Relaxed);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
