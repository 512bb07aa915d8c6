//! Bridge between the local rule engine and the peer protocol.
//!
//! Local actions are applied to the [`RuleEngine`] first and then broadcast. Remote
//! envelopes are decoded, checked against the roster and applied through the
//! engine's trusted entry points. Divergence is only repaired by full-state sync:
//! the host pushes snapshots, any peer may ask for one.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use commonware_codec::{DecodeExt, Encode};
use ludo_execution::{MoveOutcome, RollOutcome, RuleEngine, RuleError};
use ludo_types::wire::{
    ColorAssignment, DieRollPayload, FullStatePayload, PieceMovePayload, ReconnectedPayload,
    SeatNotice, StartPayload,
};
use ludo_types::{Color, MatchPhase, MatchState, Payload, PlayerId, WireMessage, COLOR_COUNT};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sequence::{SenderWatermarks, SequenceCounter};
use crate::session::{Roster, Session};
use crate::timers::ReconnectTimers;
use crate::transport::{DeliveryMode, Transport, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("local identity holds no color")]
    NoLocalColor,
    #[error("only the host may {0}")]
    NotHost(&'static str),
    #[error("match already started")]
    AlreadyStarted,
    #[error("invalid color assignment: {0}")]
    InvalidAssignment(&'static str),
    #[error("controller stopped")]
    Stopped,
}

/// Everything observers are told about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    MatchStarted { roster: Roster },
    Rolled(RollOutcome),
    Moved(MoveOutcome),
    StateRestored { sequence: u32 },
    PlayerJoined { player_id: PlayerId, display_name: String },
    PlayerLeft { player_id: PlayerId },
    ReadyChanged { player_id: PlayerId, is_ready: bool },
    SeatDisconnected { color: Color, player_id: PlayerId },
    SeatReconnected { color: Color, player_id: PlayerId },
    SeatReplaced { color: Color, player_id: PlayerId },
    SessionClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    pub reconnect_timeout: Duration,
    /// Most automated actions (rolls and moves) per [`SyncController::run_automated_turns`].
    pub automated_turn_limit: usize,
    pub reject_stale_messages: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout: Duration::from_millis(crate::defaults::DEFAULT_RECONNECT_TIMEOUT_MS),
            automated_turn_limit: crate::defaults::DEFAULT_AUTOMATED_TURN_LIMIT,
            reject_stale_messages: crate::defaults::DEFAULT_REJECT_STALE_MESSAGES,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

pub struct SyncController<T: Transport, R: ReconnectTimers> {
    session: Session,
    engine: RuleEngine,
    transport: T,
    timers: R,
    config: ControllerConfig,
    sequence: SequenceCounter,
    watermarks: SenderWatermarks,
    turn_counter: u32,
    /// Generation of the live reconnect window per color.
    reconnect_windows: [Option<u64>; COLOR_COUNT],
    generation: u64,
    started: bool,
    /// Agreed roster, replayed to peers that join or return mid-match.
    start: Option<StartPayload>,
    /// Seats handed to automated play, replayed to their former holders.
    replaced: Vec<SeatNotice>,
    notifications: Vec<Notification>,
}

impl<T: Transport, R: ReconnectTimers> SyncController<T, R> {
    pub fn new(
        session: Session,
        engine: RuleEngine,
        transport: T,
        timers: R,
        config: ControllerConfig,
    ) -> Self {
        Self {
            session,
            engine,
            transport,
            timers,
            config,
            sequence: SequenceCounter::default(),
            watermarks: SenderWatermarks::default(),
            turn_counter: 0,
            reconnect_windows: [None; COLOR_COUNT],
            generation: 0,
            started: false,
            start: None,
            replaced: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> &MatchState {
        self.engine.state()
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn timers(&self) -> &R {
        &self.timers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Take every notification produced since the last drain.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn send(&mut self, payload: &Payload, mode: DeliveryMode) -> Result<(), SyncError> {
        let sequence = self.sequence.next();
        self.send_stamped(sequence, payload, mode)
    }

    fn send_stamped(
        &mut self,
        sequence: u32,
        payload: &Payload,
        mode: DeliveryMode,
    ) -> Result<(), SyncError> {
        let message = WireMessage::new(self.session.local_id().clone(), now_ms(), sequence, payload);
        let bytes = Bytes::from(message.encode().to_vec());
        self.transport.broadcast(bytes, mode).map_err(|err| {
            warn!(?err, kind = ?payload.kind(), sequence, "broadcast failed");
            SyncError::Transport(err)
        })
    }

    fn next_turn_number(&mut self) -> u32 {
        self.turn_counter = self.turn_counter.wrapping_add(1);
        self.turn_counter
    }

    // Session setup

    /// Agree colors and begin play. Host only.
    pub fn start_match(&mut self, assignments: Vec<ColorAssignment>) -> Result<(), SyncError> {
        if !self.session.is_host() {
            return Err(SyncError::NotHost("start the match"));
        }
        if self.started {
            return Err(SyncError::AlreadyStarted);
        }
        for (index, assignment) in assignments.iter().enumerate() {
            let earlier = &assignments[..index];
            if earlier.iter().any(|a| a.color == assignment.color) {
                return Err(SyncError::InvalidAssignment("color assigned twice"));
            }
            if earlier.iter().any(|a| a.player_id == assignment.player_id) {
                return Err(SyncError::InvalidAssignment("player assigned twice"));
            }
        }

        let mut ordered = assignments.clone();
        ordered.sort_by_key(|a| a.color);
        let start = StartPayload {
            player_order: ordered.into_iter().map(|a| a.player_id).collect(),
            assignments,
            host_id: self.session.host_id().clone(),
            initial_sequence: self.sequence.current(),
        };
        self.apply_start(&start)?;
        self.send(&Payload::Start(start), DeliveryMode::Reliable)
    }

    fn apply_start(&mut self, start: &StartPayload) -> Result<(), SyncError> {
        self.engine.start()?;
        self.started = true;
        self.adopt_roster(start);
        Ok(())
    }

    fn adopt_roster(&mut self, start: &StartPayload) {
        let roster = Roster::from_start(start);
        self.session.set_roster(roster.clone());
        self.start = Some(start.clone());
        info!(
            local = %self.session.local_id(),
            color = ?self.session.local_color(),
            "match started"
        );
        self.notify(Notification::MatchStarted { roster });
    }

    /// Announce the end of the session.
    pub fn close_session(&mut self) -> Result<(), SyncError> {
        self.notify(Notification::SessionClosed);
        self.send(&Payload::Close, DeliveryMode::Reliable)
    }

    // Local actions

    fn local_turn(&self) -> Result<Color, SyncError> {
        let color = self.session.local_color().ok_or(SyncError::NoLocalColor)?;
        let current = self.engine.current_color();
        if current != color {
            return Err(RuleError::NotYourTurn {
                current,
                got: color,
            }
            .into());
        }
        Ok(color)
    }

    /// Roll for the local color and broadcast the value.
    ///
    /// A transport failure is returned after the engine has already applied the roll.
    pub fn local_roll(&mut self) -> Result<RollOutcome, SyncError> {
        self.local_turn()?;
        self.roll_and_broadcast()
    }

    /// Move a local piece and broadcast the result.
    pub fn local_move(&mut self, slot: u8) -> Result<MoveOutcome, SyncError> {
        self.local_turn()?;
        self.move_and_broadcast(slot)
    }

    /// Release a move parked for presentation.
    pub fn complete_local_move(&mut self) -> Result<Color, SyncError> {
        Ok(self.engine.complete_move()?)
    }

    fn roll_and_broadcast(&mut self) -> Result<RollOutcome, SyncError> {
        let outcome = self.engine.roll()?;
        self.notify(Notification::Rolled(outcome));
        let payload = DieRollPayload {
            color: outcome.color,
            value: outcome.value,
            turn_number: self.next_turn_number(),
        };
        self.send(&Payload::DieRoll(payload), DeliveryMode::Reliable)?;
        Ok(outcome)
    }

    fn move_and_broadcast(&mut self, slot: u8) -> Result<MoveOutcome, SyncError> {
        let outcome = self.engine.move_piece(slot)?;
        self.notify(Notification::Moved(outcome));
        let payload = PieceMovePayload {
            color: outcome.color,
            slot: outcome.slot,
            from: outcome.from,
            to: outcome.to,
            captured: outcome.captured,
            turn_number: self.next_turn_number(),
        };
        self.send(&Payload::PieceMove(payload), DeliveryMode::Reliable)?;
        Ok(outcome)
    }

    /// Play every pending action for automated colors. Host only.
    ///
    /// Returns the number of actions taken; stops at a human color, at game over
    /// or after the configured limit.
    pub fn run_automated_turns(&mut self) -> Result<usize, SyncError> {
        if !self.session.is_host() {
            return Err(SyncError::NotHost("drive automated participants"));
        }
        let mut actions = 0;
        while self.started && actions < self.config.automated_turn_limit {
            let color = self.engine.current_color();
            if !self.session.roster().is_automated(color) {
                break;
            }
            match self.engine.phase() {
                MatchPhase::Rolling => {
                    self.roll_and_broadcast()?;
                }
                MatchPhase::SelectingPiece => {
                    let Some(slot) = self.engine.suggest_move() else {
                        break;
                    };
                    self.move_and_broadcast(slot)?;
                }
                MatchPhase::AnimatingMove => {
                    self.engine.complete_move()?;
                }
                MatchPhase::WaitingToStart | MatchPhase::GameOver => break,
            }
            actions += 1;
        }
        if actions > 0 {
            debug!(actions, "automated actions played");
        }
        Ok(actions)
    }

    // Full-state sync

    /// Push a snapshot of the local state to every peer. Host only.
    pub fn broadcast_full_state(&mut self, mode: DeliveryMode) -> Result<(), SyncError> {
        if !self.session.is_host() {
            return Err(SyncError::NotHost("broadcast full state"));
        }
        if !self.started {
            return Ok(());
        }
        let sequence = self.sequence.next();
        let snapshot = self.engine.snapshot(sequence);
        self.send_stamped(sequence, &Payload::FullState(snapshot), mode)
    }

    pub fn request_full_state(&mut self) -> Result<(), SyncError> {
        self.send(&Payload::SnapshotRequest, DeliveryMode::Reliable)
    }

    /// Ask the host to correct us, or correct everyone if we are the host.
    fn resync(&mut self) -> Result<(), SyncError> {
        if self.session.is_host() {
            self.broadcast_full_state(DeliveryMode::Reliable)
        } else {
            self.request_full_state()
        }
    }

    // Inbound

    /// Apply one envelope received from `sender`.
    ///
    /// Malformed, stale or unauthorized messages are logged and dropped; only
    /// failures of broadcasts triggered in response are returned.
    pub fn handle_inbound(&mut self, bytes: &[u8], sender: &PlayerId) -> Result<(), SyncError> {
        let message = match WireMessage::decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(?err, sender = %sender, "dropping undecodable envelope");
                return Ok(());
            }
        };
        if message.sender() != sender {
            warn!(
                sender = %sender,
                claimed = %message.sender(),
                "dropping envelope with mismatched sender"
            );
            return Ok(());
        }
        if sender == self.session.local_id() {
            return Ok(());
        }
        if self.config.reject_stale_messages && !self.watermarks.observe(sender, message.sequence()) {
            debug!(
                sender = %sender,
                sequence = message.sequence(),
                kind = ?message.kind(),
                "dropping stale envelope"
            );
            return Ok(());
        }
        let payload = match message.decode_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(?err, sender = %sender, kind = ?message.kind(), "dropping malformed payload");
                return Ok(());
            }
        };

        match payload {
            Payload::Join(join) => {
                debug!(player = %join.player_id, "player joined");
                self.notify(Notification::PlayerJoined {
                    player_id: join.player_id,
                    display_name: join.display_name,
                });
            }
            Payload::Leave(leave) => {
                self.notify(Notification::PlayerLeft {
                    player_id: leave.player_id,
                });
            }
            Payload::Ready(ready) => {
                self.session
                    .roster_mut()
                    .set_ready(&ready.player_id, ready.is_ready);
                self.notify(Notification::ReadyChanged {
                    player_id: ready.player_id,
                    is_ready: ready.is_ready,
                });
            }
            Payload::Close => {
                info!(sender = %sender, "session closed by peer");
                self.notify(Notification::SessionClosed);
            }
            Payload::Start(start) => self.on_remote_start(sender, &start)?,
            Payload::DieRoll(roll) => self.on_remote_roll(sender, &roll)?,
            Payload::PieceMove(piece_move) => self.on_remote_move(sender, &piece_move)?,
            Payload::FullState(snapshot) => self.on_full_state(sender, &snapshot),
            Payload::SnapshotRequest => {
                if self.session.is_host() {
                    debug!(sender = %sender, "answering snapshot request");
                    self.broadcast_full_state(DeliveryMode::Reliable)?;
                }
            }
            Payload::Disconnected(notice) => {
                if self.from_host(sender, "disconnected") {
                    self.session.roster_mut().set_connected(notice.color, false);
                    self.notify(Notification::SeatDisconnected {
                        color: notice.color,
                        player_id: notice.player_id,
                    });
                }
            }
            Payload::Replaced(notice) => {
                if self.from_host(sender, "replaced") {
                    let previous = self.session.roster_mut().replace_with_automated(notice.color);
                    if previous.is_some() {
                        self.notify(Notification::SeatReplaced {
                            color: notice.color,
                            player_id: notice.player_id,
                        });
                    }
                }
            }
            Payload::Reconnected(notice) => {
                if self.from_host(sender, "reconnected") {
                    self.session.roster_mut().set_connected(notice.color, true);
                    self.notify(Notification::SeatReconnected {
                        color: notice.color,
                        player_id: notice.player_id,
                    });
                }
            }
        }
        Ok(())
    }

    fn from_host(&self, sender: &PlayerId, kind: &'static str) -> bool {
        if sender != self.session.host_id() {
            warn!(sender = %sender, kind, "ignoring host-only message");
            return false;
        }
        true
    }

    fn on_remote_start(&mut self, sender: &PlayerId, start: &StartPayload) -> Result<(), SyncError> {
        if !self.from_host(sender, "start") || &start.host_id != self.session.host_id() {
            return Ok(());
        }
        if self.start.is_some() {
            debug!("ignoring repeated start");
            return Ok(());
        }
        if self.started {
            // Joined through a snapshot; only the roster is missing.
            self.adopt_roster(start);
            return Ok(());
        }
        if let Err(err) = self.apply_start(start) {
            warn!(?err, "start rejected; requesting state");
            return self.request_full_state();
        }
        Ok(())
    }

    /// Whether a gameplay message for `color` from `sender` may be applied.
    fn accepts_action(&self, sender: &PlayerId, color: Color) -> bool {
        if self.session.is_local(color) {
            debug!(?color, sender = %sender, "ignoring action for local color");
            return false;
        }
        if !self.session.controls(sender, color) {
            warn!(?color, sender = %sender, "ignoring action from peer that does not hold color");
            return false;
        }
        true
    }

    fn on_remote_roll(&mut self, sender: &PlayerId, roll: &DieRollPayload) -> Result<(), SyncError> {
        if !self.accepts_action(sender, roll.color) {
            return Ok(());
        }
        match self.engine.apply_remote_roll(roll.color, roll.value) {
            Ok(outcome) => {
                debug!(color = ?roll.color, value = roll.value, turn = roll.turn_number, "remote roll applied");
                self.notify(Notification::Rolled(outcome));
                Ok(())
            }
            Err(err) => {
                warn!(?err, color = ?roll.color, sender = %sender, "remote roll rejected");
                self.resync()
            }
        }
    }

    fn on_remote_move(&mut self, sender: &PlayerId, piece_move: &PieceMovePayload) -> Result<(), SyncError> {
        if !self.accepts_action(sender, piece_move.color) {
            return Ok(());
        }
        let result = self.engine.apply_remote_move(
            piece_move.color,
            piece_move.slot,
            piece_move.to,
            piece_move.captured,
        );
        match result {
            Ok(outcome) => {
                debug!(
                    color = ?piece_move.color,
                    slot = piece_move.slot,
                    to = ?piece_move.to,
                    turn = piece_move.turn_number,
                    "remote move applied"
                );
                self.notify(Notification::Moved(outcome));
                Ok(())
            }
            Err(RuleError::InvalidSlot(slot)) => {
                warn!(slot, sender = %sender, "ignoring move for unknown slot");
                Ok(())
            }
            Err(err) => {
                warn!(?err, color = ?piece_move.color, sender = %sender, "remote move rejected");
                self.resync()
            }
        }
    }

    fn on_full_state(&mut self, sender: &PlayerId, snapshot: &FullStatePayload) {
        if !self.from_host(sender, "full state") {
            return;
        }
        match self.engine.restore_snapshot(snapshot) {
            Ok(()) => {
                if self.engine.phase() != MatchPhase::WaitingToStart {
                    self.started = true;
                }
                self.notify(Notification::StateRestored {
                    sequence: snapshot.sequence,
                });
            }
            Err(err) => warn!(?err, sequence = snapshot.sequence, "full state rejected"),
        }
    }

    // Disconnect lifecycle

    /// The transport lost `player`. The host opens a reconnection window.
    pub fn handle_peer_disconnected(&mut self, player: &PlayerId) -> Result<(), SyncError> {
        if !self.session.is_host() {
            debug!(player = %player, "peer disconnected");
            return Ok(());
        }
        let Some(color) = self.session.roster().color_of(player) else {
            debug!(player = %player, "disconnected peer holds no color");
            return Ok(());
        };
        if !self.session.roster().is_connected(color) {
            return Ok(());
        }

        self.session.roster_mut().set_connected(color, false);
        self.generation += 1;
        self.reconnect_windows[color.index()] = Some(self.generation);
        self.timers
            .arm(color, self.generation, self.config.reconnect_timeout);
        info!(player = %player, ?color, timeout = ?self.config.reconnect_timeout, "participant disconnected");
        self.notify(Notification::SeatDisconnected {
            color,
            player_id: player.clone(),
        });
        self.send(
            &Payload::Disconnected(SeatNotice {
                player_id: player.clone(),
                color,
                at_ms: now_ms(),
            }),
            DeliveryMode::Reliable,
        )
    }

    /// The transport (re)connected `player`.
    pub fn handle_peer_connected(&mut self, player: &PlayerId) -> Result<(), SyncError> {
        self.watermarks.reset(player);
        if !self.session.is_host() {
            return Ok(());
        }
        let color = match self.session.roster().color_of(player) {
            Some(color) if self.reconnect_windows[color.index()].is_some() => color,
            _ => return self.resync_peer(player),
        };
        self.reconnect_windows[color.index()] = None;

        self.timers.cancel(color);
        self.session.roster_mut().set_connected(color, true);
        info!(player = %player, ?color, "participant reconnected");
        self.notify(Notification::SeatReconnected {
            color,
            player_id: player.clone(),
        });
        self.send(
            &Payload::Reconnected(ReconnectedPayload {
                player_id: player.clone(),
                color,
            }),
            DeliveryMode::Reliable,
        )?;
        self.broadcast_full_state(DeliveryMode::Reliable)
    }

    /// Bring a peer without a live window up to date: the agreed roster, every
    /// seat it lost while away, then the full state.
    fn resync_peer(&mut self, player: &PlayerId) -> Result<(), SyncError> {
        if !self.started {
            return Ok(());
        }
        let lost: Vec<SeatNotice> = self
            .replaced
            .iter()
            .filter(|notice| &notice.player_id == player)
            .cloned()
            .collect();
        info!(player = %player, lost = lost.len(), "resyncing connected peer");
        if let Some(start) = self.start.clone() {
            self.send(&Payload::Start(start), DeliveryMode::Reliable)?;
        }
        for notice in lost {
            self.send(&Payload::Replaced(notice), DeliveryMode::Reliable)?;
        }
        self.broadcast_full_state(DeliveryMode::Reliable)
    }

    /// A reconnection window closed. Stale generations are ignored.
    pub fn handle_reconnect_expired(&mut self, color: Color, generation: u64) -> Result<(), SyncError> {
        let window = &mut self.reconnect_windows[color.index()];
        if *window != Some(generation) {
            debug!(?color, generation, "ignoring stale reconnect expiry");
            return Ok(());
        }
        *window = None;

        let Some(player_id) = self.session.roster_mut().replace_with_automated(color) else {
            return Ok(());
        };
        info!(player = %player_id, ?color, "participant replaced by automated play");
        self.notify(Notification::SeatReplaced {
            color,
            player_id: player_id.clone(),
        });
        let notice = SeatNotice {
            player_id,
            color,
            at_ms: now_ms(),
        };
        self.replaced.push(notice.clone());
        self.send(&Payload::Replaced(notice), DeliveryMode::Reliable)
    }
}
