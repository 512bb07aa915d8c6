//! Heuristic play for a seat reached through a [`Mailbox`].

use std::time::Duration;

use ludo_execution::heuristic;
use ludo_types::{MatchPhase, PlayerId};
use tracing::debug;

use crate::ingress::Mailbox;

pub const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Play `id`'s color whenever it is up, until the local view reaches game over
/// or the actor stops. Keeps polling (idle) after the seat is replaced.
pub async fn drive_seat(id: PlayerId, mut mailbox: Mailbox) {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let Ok((state, roster)) = mailbox.state().await else {
            return;
        };
        if state.is_game_over() {
            return;
        }
        let Some(color) = roster.color_of(&id) else {
            continue;
        };
        if state.current_color() != color {
            continue;
        }
        let result = match state.phase {
            MatchPhase::Rolling => mailbox.roll().await.map(|_| ()),
            MatchPhase::SelectingPiece => {
                let Some(slot) = state
                    .die_value
                    .and_then(|die| heuristic::suggest_move(&state, color, die))
                else {
                    continue;
                };
                mailbox.move_piece(slot).await.map(|_| ())
            }
            MatchPhase::AnimatingMove => {
                mailbox.complete_move().await;
                Ok(())
            }
            MatchPhase::WaitingToStart | MatchPhase::GameOver => continue,
        };
        if let Err(err) = result {
            debug!(player = %id, ?err, "seat action rejected");
        }
    }
}
