//! Peer protocol.
//!
//! Every protocol event travels inside a [`WireMessage`] envelope. The envelope
//! records who sent it, when, and the sender's sequence number; the typed
//! [`Payload`] is encoded separately and carried as opaque bytes so a peer can
//! route on [`MessageKind`] before decoding the body.
//!
//! Envelope format:
//! `[kind:u8] [sender:u32 len + utf8] [timestamp_ms:u64 BE] [sequence:u32 BE] [has_payload:u8] [payload: len + bytes]?`

mod payloads;

pub use payloads::*;

use bytes::{Buf, BufMut};
use commonware_codec::{DecodeExt, Encode, EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};

use crate::codec::PlayerId;

/// Largest payload body accepted inside an envelope.
pub const MAX_PAYLOAD_LEN: usize = 4_096;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Join = 0,
    Leave = 1,
    Ready = 2,
    Start = 3,
    Close = 4,
    DieRoll = 5,
    PieceMove = 6,
    FullState = 7,
    SnapshotRequest = 8,
    Disconnected = 9,
    Replaced = 10,
    Reconnected = 11,
}

impl MessageKind {
    /// Lobby traffic the rule core only observes (everything but `Start`).
    pub fn is_lobby(&self) -> bool {
        matches!(
            self,
            MessageKind::Join | MessageKind::Leave | MessageKind::Ready | MessageKind::Close
        )
    }

    pub fn is_gameplay(&self) -> bool {
        matches!(self, MessageKind::DieRoll | MessageKind::PieceMove)
    }

    pub fn carries_payload(&self) -> bool {
        !matches!(self, MessageKind::Close | MessageKind::SnapshotRequest)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Join),
            1 => Ok(MessageKind::Leave),
            2 => Ok(MessageKind::Ready),
            3 => Ok(MessageKind::Start),
            4 => Ok(MessageKind::Close),
            5 => Ok(MessageKind::DieRoll),
            6 => Ok(MessageKind::PieceMove),
            7 => Ok(MessageKind::FullState),
            8 => Ok(MessageKind::SnapshotRequest),
            9 => Ok(MessageKind::Disconnected),
            10 => Ok(MessageKind::Replaced),
            11 => Ok(MessageKind::Reconnected),
            _ => Err(()),
        }
    }
}

impl Write for MessageKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for MessageKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        MessageKind::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for MessageKind {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// Typed body of a protocol event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Join(JoinPayload),
    Leave(LeavePayload),
    Ready(ReadyPayload),
    Start(StartPayload),
    Close,
    DieRoll(DieRollPayload),
    PieceMove(PieceMovePayload),
    FullState(FullStatePayload),
    SnapshotRequest,
    Disconnected(SeatNotice),
    Replaced(SeatNotice),
    Reconnected(ReconnectedPayload),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Join(_) => MessageKind::Join,
            Payload::Leave(_) => MessageKind::Leave,
            Payload::Ready(_) => MessageKind::Ready,
            Payload::Start(_) => MessageKind::Start,
            Payload::Close => MessageKind::Close,
            Payload::DieRoll(_) => MessageKind::DieRoll,
            Payload::PieceMove(_) => MessageKind::PieceMove,
            Payload::FullState(_) => MessageKind::FullState,
            Payload::SnapshotRequest => MessageKind::SnapshotRequest,
            Payload::Disconnected(_) => MessageKind::Disconnected,
            Payload::Replaced(_) => MessageKind::Replaced,
            Payload::Reconnected(_) => MessageKind::Reconnected,
        }
    }

    /// Encode the body on its own; `None` for kinds without a body.
    pub fn encode_body(&self) -> Option<Vec<u8>> {
        let body = match self {
            Payload::Join(p) => p.encode(),
            Payload::Leave(p) => p.encode(),
            Payload::Ready(p) => p.encode(),
            Payload::Start(p) => p.encode(),
            Payload::DieRoll(p) => p.encode(),
            Payload::PieceMove(p) => p.encode(),
            Payload::FullState(p) => p.encode(),
            Payload::Disconnected(p) | Payload::Replaced(p) => p.encode(),
            Payload::Reconnected(p) => p.encode(),
            Payload::Close | Payload::SnapshotRequest => return None,
        };
        Some(body.to_vec())
    }

    /// Decode `body` against the declared `kind`. Trailing bytes are rejected.
    pub fn decode_body(kind: MessageKind, body: Option<&[u8]>) -> Result<Self, Error> {
        let body = match (kind.carries_payload(), body) {
            (false, None) => {
                return Ok(match kind {
                    MessageKind::Close => Payload::Close,
                    _ => Payload::SnapshotRequest,
                })
            }
            (false, Some(_)) => return Err(Error::Invalid("Payload", "unexpected body")),
            (true, None) => return Err(Error::Invalid("Payload", "missing body")),
            (true, Some(body)) => body,
        };
        Ok(match kind {
            MessageKind::Join => Payload::Join(JoinPayload::decode(body)?),
            MessageKind::Leave => Payload::Leave(LeavePayload::decode(body)?),
            MessageKind::Ready => Payload::Ready(ReadyPayload::decode(body)?),
            MessageKind::Start => Payload::Start(StartPayload::decode(body)?),
            MessageKind::DieRoll => Payload::DieRoll(DieRollPayload::decode(body)?),
            MessageKind::PieceMove => Payload::PieceMove(PieceMovePayload::decode(body)?),
            MessageKind::FullState => Payload::FullState(FullStatePayload::decode(body)?),
            MessageKind::Disconnected => Payload::Disconnected(SeatNotice::decode(body)?),
            MessageKind::Replaced => Payload::Replaced(SeatNotice::decode(body)?),
            MessageKind::Reconnected => Payload::Reconnected(ReconnectedPayload::decode(body)?),
            MessageKind::Close | MessageKind::SnapshotRequest => {
                return Err(Error::Invalid("Payload", "unexpected body"))
            }
        })
    }
}

/// Immutable protocol envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireMessage {
    kind: MessageKind,
    sender: PlayerId,
    timestamp_ms: u64,
    sequence: u32,
    payload: Option<Vec<u8>>,
}

impl WireMessage {
    pub fn new(sender: PlayerId, timestamp_ms: u64, sequence: u32, payload: &Payload) -> Self {
        Self {
            kind: payload.kind(),
            sender,
            timestamp_ms,
            sequence,
            payload: payload.encode_body(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender(&self) -> &PlayerId {
        &self.sender
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn payload_bytes(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn decode_payload(&self) -> Result<Payload, Error> {
        Payload::decode_body(self.kind, self.payload_bytes())
    }
}

impl Write for WireMessage {
    fn write(&self, writer: &mut impl BufMut) {
        self.kind.write(writer);
        self.sender.write(writer);
        self.timestamp_ms.write(writer);
        self.sequence.write(writer);
        self.payload.is_some().write(writer);
        if let Some(payload) = &self.payload {
            payload.write(writer);
        }
    }
}

impl Read for WireMessage {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = MessageKind::read(reader)?;
        let sender = PlayerId::read(reader)?;
        let timestamp_ms = u64::read(reader)?;
        let sequence = u32::read(reader)?;
        let payload = if bool::read(reader)? {
            Some(Vec::<u8>::read_range(reader, 0..=MAX_PAYLOAD_LEN)?)
        } else {
            None
        };
        Ok(Self {
            kind,
            sender,
            timestamp_ms,
            sequence,
            payload,
        })
    }
}

impl EncodeSize for WireMessage {
    fn encode_size(&self) -> usize {
        self.kind.encode_size()
            + self.sender.encode_size()
            + self.timestamp_ms.encode_size()
            + self.sequence.encode_size()
            + bool::SIZE
            + self.payload.as_ref().map_or(0, |p| p.encode_size())
    }
}
