use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};

use crate::board::{Color, COLOR_COUNT, PIECES_PER_COLOR};
use crate::codec::{read_string, string_encode_size, write_string, PlayerId, MAX_DISPLAY_NAME_LEN};
use crate::piece::{PieceId, PieceLocation, MAX_DIE_VALUE};
use crate::state::MatchPhase;

/// Most members a session roster can list.
const MAX_ROSTER: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinPayload {
    pub player_id: PlayerId,
    pub display_name: String,
}

impl Write for JoinPayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_id.write(writer);
        write_string(&self.display_name, writer);
    }
}

impl Read for JoinPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            player_id: PlayerId::read(reader)?,
            display_name: read_string(reader, MAX_DISPLAY_NAME_LEN)?,
        })
    }
}

impl EncodeSize for JoinPayload {
    fn encode_size(&self) -> usize {
        self.player_id.encode_size() + string_encode_size(&self.display_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeavePayload {
    pub player_id: PlayerId,
}

impl Write for LeavePayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_id.write(writer);
    }
}

impl Read for LeavePayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            player_id: PlayerId::read(reader)?,
        })
    }
}

impl EncodeSize for LeavePayload {
    fn encode_size(&self) -> usize {
        self.player_id.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyPayload {
    pub player_id: PlayerId,
    pub is_ready: bool,
}

impl Write for ReadyPayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_id.write(writer);
        self.is_ready.write(writer);
    }
}

impl Read for ReadyPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            player_id: PlayerId::read(reader)?,
            is_ready: bool::read(reader)?,
        })
    }
}

impl EncodeSize for ReadyPayload {
    fn encode_size(&self) -> usize {
        self.player_id.encode_size() + self.is_ready.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorAssignment {
    pub player_id: PlayerId,
    pub color: Color,
}

impl Write for ColorAssignment {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_id.write(writer);
        self.color.write(writer);
    }
}

impl Read for ColorAssignment {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            player_id: PlayerId::read(reader)?,
            color: Color::read(reader)?,
        })
    }
}

impl EncodeSize for ColorAssignment {
    fn encode_size(&self) -> usize {
        self.player_id.encode_size() + self.color.encode_size()
    }
}

/// Color assignment and turn order agreed in the lobby before play begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartPayload {
    pub assignments: Vec<ColorAssignment>,
    pub player_order: Vec<PlayerId>,
    pub host_id: PlayerId,
    pub initial_sequence: u32,
}

impl StartPayload {
    pub fn color_of(&self, player_id: &PlayerId) -> Option<Color> {
        self.assignments
            .iter()
            .find(|a| &a.player_id == player_id)
            .map(|a| a.color)
    }
}

impl Write for StartPayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.assignments.write(writer);
        self.player_order.write(writer);
        self.host_id.write(writer);
        self.initial_sequence.write(writer);
    }
}

impl Read for StartPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let assignments = Vec::<ColorAssignment>::read_range(reader, 0..=COLOR_COUNT)?;
        for (index, assignment) in assignments.iter().enumerate() {
            if assignments[..index].iter().any(|a| a.color == assignment.color) {
                return Err(Error::Invalid("StartPayload", "color assigned twice"));
            }
        }
        Ok(Self {
            assignments,
            player_order: Vec::<PlayerId>::read_range(reader, 0..=MAX_ROSTER)?,
            host_id: PlayerId::read(reader)?,
            initial_sequence: u32::read(reader)?,
        })
    }
}

impl EncodeSize for StartPayload {
    fn encode_size(&self) -> usize {
        self.assignments.encode_size()
            + self.player_order.encode_size()
            + self.host_id.encode_size()
            + self.initial_sequence.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DieRollPayload {
    pub color: Color,
    pub value: u8,
    pub turn_number: u32,
}

impl Write for DieRollPayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.color.write(writer);
        self.value.write(writer);
        self.turn_number.write(writer);
    }
}

impl Read for DieRollPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let color = Color::read(reader)?;
        let value = u8::read(reader)?;
        if value == 0 || value > MAX_DIE_VALUE {
            return Err(Error::Invalid("DieRollPayload", "die value out of range"));
        }
        Ok(Self {
            color,
            value,
            turn_number: u32::read(reader)?,
        })
    }
}

impl EncodeSize for DieRollPayload {
    fn encode_size(&self) -> usize {
        self.color.encode_size() + self.value.encode_size() + self.turn_number.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceMovePayload {
    pub color: Color,
    pub slot: u8,
    pub from: PieceLocation,
    pub to: PieceLocation,
    pub captured: Option<PieceId>,
    pub turn_number: u32,
}

impl Write for PieceMovePayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.color.write(writer);
        self.slot.write(writer);
        self.from.write(writer);
        self.to.write(writer);
        self.captured.write(writer);
        self.turn_number.write(writer);
    }
}

impl Read for PieceMovePayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            color: Color::read(reader)?,
            slot: u8::read(reader)?,
            from: PieceLocation::read(reader)?,
            to: PieceLocation::read(reader)?,
            captured: Option::<PieceId>::read(reader)?,
            turn_number: u32::read(reader)?,
        })
    }
}

impl EncodeSize for PieceMovePayload {
    fn encode_size(&self) -> usize {
        self.color.encode_size()
            + self.slot.encode_size()
            + self.from.encode_size()
            + self.to.encode_size()
            + self.captured.encode_size()
            + self.turn_number.encode_size()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PieceSnapshot {
    pub slot: u8,
    pub location: PieceLocation,
}

impl Write for PieceSnapshot {
    fn write(&self, writer: &mut impl BufMut) {
        self.slot.write(writer);
        self.location.write(writer);
    }
}

impl Read for PieceSnapshot {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let slot = u8::read(reader)?;
        if slot as usize >= PIECES_PER_COLOR {
            return Err(Error::Invalid("PieceSnapshot", "slot out of range"));
        }
        Ok(Self {
            slot,
            location: PieceLocation::read(reader)?,
        })
    }
}

impl EncodeSize for PieceSnapshot {
    fn encode_size(&self) -> usize {
        self.slot.encode_size() + self.location.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub color: Color,
    pub pieces: Vec<PieceSnapshot>,
    pub finish_rank: Option<u8>,
}

impl Write for ParticipantSnapshot {
    fn write(&self, writer: &mut impl BufMut) {
        self.color.write(writer);
        self.pieces.write(writer);
        self.finish_rank.write(writer);
    }
}

impl Read for ParticipantSnapshot {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let color = Color::read(reader)?;
        let pieces = Vec::<PieceSnapshot>::read_range(reader, 0..=PIECES_PER_COLOR)?;
        let finish_rank = Option::<u8>::read(reader)?;
        if let Some(rank) = finish_rank {
            if rank == 0 || rank as usize > COLOR_COUNT {
                return Err(Error::Invalid("ParticipantSnapshot", "finish rank out of range"));
            }
        }
        Ok(Self {
            color,
            pieces,
            finish_rank,
        })
    }
}

impl EncodeSize for ParticipantSnapshot {
    fn encode_size(&self) -> usize {
        self.color.encode_size() + self.pieces.encode_size() + self.finish_rank.encode_size()
    }
}

/// Complete encoding of a match, used to overwrite a peer's local state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullStatePayload {
    pub participants: Vec<ParticipantSnapshot>,
    pub current_color: Color,
    pub phase: MatchPhase,
    pub die_value: Option<u8>,
    pub six_streak: u8,
    pub finish_order: Vec<Color>,
    /// Sender's sequence number at the moment the snapshot was taken.
    pub sequence: u32,
}

impl Write for FullStatePayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.participants.write(writer);
        self.current_color.write(writer);
        self.phase.write(writer);
        self.die_value.write(writer);
        self.six_streak.write(writer);
        self.finish_order.write(writer);
        self.sequence.write(writer);
    }
}

impl Read for FullStatePayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let participants = Vec::<ParticipantSnapshot>::read_range(reader, 0..=COLOR_COUNT)?;
        let current_color = Color::read(reader)?;
        let phase = MatchPhase::read(reader)?;
        let die_value = Option::<u8>::read(reader)?;
        if let Some(value) = die_value {
            if value == 0 || value > MAX_DIE_VALUE {
                return Err(Error::Invalid("FullStatePayload", "die value out of range"));
            }
        }
        Ok(Self {
            participants,
            current_color,
            phase,
            die_value,
            six_streak: u8::read(reader)?,
            finish_order: Vec::<Color>::read_range(reader, 0..=COLOR_COUNT)?,
            sequence: u32::read(reader)?,
        })
    }
}

impl EncodeSize for FullStatePayload {
    fn encode_size(&self) -> usize {
        self.participants.encode_size()
            + self.current_color.encode_size()
            + self.phase.encode_size()
            + self.die_value.encode_size()
            + self.six_streak.encode_size()
            + self.finish_order.encode_size()
            + self.sequence.encode_size()
    }
}

/// Shared shape of the `Disconnected` and `Replaced` notices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatNotice {
    pub player_id: PlayerId,
    pub color: Color,
    /// Wall-clock milliseconds when the host observed the change.
    pub at_ms: u64,
}

impl Write for SeatNotice {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_id.write(writer);
        self.color.write(writer);
        self.at_ms.write(writer);
    }
}

impl Read for SeatNotice {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            player_id: PlayerId::read(reader)?,
            color: Color::read(reader)?,
            at_ms: u64::read(reader)?,
        })
    }
}

impl EncodeSize for SeatNotice {
    fn encode_size(&self) -> usize {
        self.player_id.encode_size() + self.color.encode_size() + self.at_ms.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectedPayload {
    pub player_id: PlayerId,
    pub color: Color,
}

impl Write for ReconnectedPayload {
    fn write(&self, writer: &mut impl BufMut) {
        self.player_id.write(writer);
        self.color.write(writer);
    }
}

impl Read for ReconnectedPayload {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            player_id: PlayerId::read(reader)?,
            color: Color::read(reader)?,
        })
    }
}

impl EncodeSize for ReconnectedPayload {
    fn encode_size(&self) -> usize {
        self.player_id.encode_size() + self.color.encode_size()
    }
}
