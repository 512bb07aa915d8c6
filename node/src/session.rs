//! Session context and roster.
//!
//! A [`Session`] is created per match and handed to the controller. It carries
//! the local identity, the host identity and the per-color [`Roster`].

use ludo_types::wire::StartPayload;
use ludo_types::{Color, PlayerId, COLOR_COUNT};

/// Who drives a color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Controller {
    Human(PlayerId),
    /// Driven by the host.
    Automated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seat {
    pub controller: Controller,
    pub ready: bool,
    pub connected: bool,
}

impl Seat {
    fn automated() -> Self {
        Self {
            controller: Controller::Automated,
            ready: true,
            connected: true,
        }
    }
}

/// Per-color view of the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    seats: [Seat; COLOR_COUNT],
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            seats: std::array::from_fn(|_| Seat::automated()),
        }
    }
}

impl Roster {
    /// Roster for an agreed start. Colors nobody was assigned are automated.
    pub fn from_start(start: &StartPayload) -> Self {
        let mut roster = Self::default();
        for assignment in &start.assignments {
            roster.seats[assignment.color.index()] = Seat {
                controller: Controller::Human(assignment.player_id.clone()),
                ready: true,
                connected: true,
            };
        }
        roster
    }

    pub fn seat(&self, color: Color) -> &Seat {
        &self.seats[color.index()]
    }

    pub fn controller(&self, color: Color) -> &Controller {
        &self.seat(color).controller
    }

    pub fn is_automated(&self, color: Color) -> bool {
        matches!(self.controller(color), Controller::Automated)
    }

    pub fn is_connected(&self, color: Color) -> bool {
        self.seat(color).connected
    }

    /// Color currently held by `player`, if any.
    pub fn color_of(&self, player: &PlayerId) -> Option<Color> {
        Color::ALL
            .into_iter()
            .find(|color| matches!(self.controller(*color), Controller::Human(id) if id == player))
    }

    /// Player currently holding `color`, if it is human-controlled.
    pub fn player_of(&self, color: Color) -> Option<&PlayerId> {
        match self.controller(color) {
            Controller::Human(id) => Some(id),
            Controller::Automated => None,
        }
    }

    pub fn set_ready(&mut self, player: &PlayerId, ready: bool) -> Option<Color> {
        let color = self.color_of(player)?;
        self.seats[color.index()].ready = ready;
        Some(color)
    }

    pub fn set_connected(&mut self, color: Color, connected: bool) {
        self.seats[color.index()].connected = connected;
    }

    /// Hand `color` to the host for good. Returns the identity that lost the seat.
    pub fn replace_with_automated(&mut self, color: Color) -> Option<PlayerId> {
        let previous = std::mem::replace(&mut self.seats[color.index()], Seat::automated());
        match previous.controller {
            Controller::Human(id) => Some(id),
            Controller::Automated => None,
        }
    }
}

/// Explicit session context: who we are, who hosts and who holds each color.
#[derive(Clone, Debug)]
pub struct Session {
    local_id: PlayerId,
    host_id: PlayerId,
    roster: Roster,
}

impl Session {
    pub fn new(local_id: PlayerId, host_id: PlayerId) -> Self {
        Self {
            local_id,
            host_id,
            roster: Roster::default(),
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local_id
    }

    pub fn host_id(&self) -> &PlayerId {
        &self.host_id
    }

    pub fn is_host(&self) -> bool {
        self.local_id == self.host_id
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn set_roster(&mut self, roster: Roster) {
        self.roster = roster;
    }

    pub fn local_color(&self) -> Option<Color> {
        self.roster.color_of(&self.local_id)
    }

    /// Whether `color` belongs to the local identity.
    pub fn is_local(&self, color: Color) -> bool {
        self.roster.player_of(color) == Some(&self.local_id)
    }

    /// Whether `sender` is allowed to act for `color`.
    ///
    /// Human colors are driven by their holder; automated colors only by the host.
    pub fn controls(&self, sender: &PlayerId, color: Color) -> bool {
        match self.roster.controller(color) {
            Controller::Human(id) => id == sender,
            Controller::Automated => sender == &self.host_id,
        }
    }
}
