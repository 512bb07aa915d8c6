use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};
use ludo_execution::{MoveOutcome, RollOutcome};
use ludo_types::wire::ColorAssignment;
use ludo_types::MatchState;
use tokio::sync::broadcast;
use tracing::warn;

use crate::controller::{Notification, SyncError};
use crate::session::Roster;

/// Messages sent to the sync actor.
pub enum Message {
    StartMatch {
        assignments: Vec<ColorAssignment>,
        response: oneshot::Sender<Result<(), SyncError>>,
    },
    LocalRoll {
        response: oneshot::Sender<Result<RollOutcome, SyncError>>,
    },
    LocalMove {
        slot: u8,
        response: oneshot::Sender<Result<MoveOutcome, SyncError>>,
    },
    CompleteMove,
    RequestSync,
    Subscribe {
        response: oneshot::Sender<broadcast::Receiver<Notification>>,
    },
    State {
        response: oneshot::Sender<(MatchState, Roster)>,
    },
    Close,
}

/// Mailbox for the sync actor.
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(crate) fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &mut self,
        build: impl FnOnce(oneshot::Sender<R>) -> Message,
        what: &'static str,
    ) -> Result<R, SyncError> {
        let (response, receiver) = oneshot::channel();
        if self.sender.send(build(response)).await.is_err() {
            warn!(what, "sync mailbox closed");
            return Err(SyncError::Stopped);
        }
        receiver.await.map_err(|_| SyncError::Stopped)
    }

    pub async fn start_match(&mut self, assignments: Vec<ColorAssignment>) -> Result<(), SyncError> {
        self.request(
            |response| Message::StartMatch {
                assignments,
                response,
            },
            "start match",
        )
        .await?
    }

    pub async fn roll(&mut self) -> Result<RollOutcome, SyncError> {
        self.request(|response| Message::LocalRoll { response }, "roll")
            .await?
    }

    pub async fn move_piece(&mut self, slot: u8) -> Result<MoveOutcome, SyncError> {
        self.request(|response| Message::LocalMove { slot, response }, "move")
            .await?
    }

    pub async fn subscribe(&mut self) -> Result<broadcast::Receiver<Notification>, SyncError> {
        self.request(|response| Message::Subscribe { response }, "subscribe")
            .await
    }

    pub async fn state(&mut self) -> Result<(MatchState, Roster), SyncError> {
        self.request(|response| Message::State { response }, "state")
            .await
    }

    pub async fn complete_move(&mut self) {
        if self.sender.send(Message::CompleteMove).await.is_err() {
            warn!("sync mailbox closed; complete move dropped");
        }
    }

    pub async fn request_sync(&mut self) {
        if self.sender.send(Message::RequestSync).await.is_err() {
            warn!("sync mailbox closed; sync request dropped");
        }
    }

    pub async fn close(&mut self) {
        if self.sender.send(Message::Close).await.is_err() {
            warn!("sync mailbox closed; close dropped");
        }
    }
}
