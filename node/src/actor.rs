use std::time::Duration;

use futures::{channel::mpsc, Stream, StreamExt};
use ludo_execution::RuleEngine;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::controller::{Notification, SyncController, SyncError};
use crate::ingress::{Mailbox, Message};
use crate::session::Session;
use crate::timers::{TimerExpired, TokioTimers};
use crate::transport::{DeliveryMode, Transport, TransportEvent};
use crate::ValidatedConfig;

/// Owns a [`SyncController`] and serializes every input to it.
pub struct Actor<T: Transport> {
    controller: SyncController<T, TokioTimers>,
    mailbox: mpsc::Receiver<Message>,
    expiries: mpsc::UnboundedReceiver<TimerExpired>,
    notifications: broadcast::Sender<Notification>,
    snapshot_interval: Duration,
    automated_turn_limit: usize,
}

impl<T: Transport> Actor<T> {
    pub fn new(config: &ValidatedConfig, session: Session, transport: T) -> (Self, Mailbox) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_size);
        let (expiry_sender, expiries) = mpsc::unbounded();
        let (notifications, _) = broadcast::channel(config.notification_capacity);
        let engine = match config.rng_seed {
            Some(seed) => RuleEngine::with_seed(config.engine, seed),
            None => RuleEngine::new(config.engine),
        };
        let controller = SyncController::new(
            session,
            engine,
            transport,
            TokioTimers::new(expiry_sender),
            config.controller,
        );
        (
            Self {
                controller,
                mailbox,
                expiries,
                notifications,
                snapshot_interval: config.snapshot_interval,
                automated_turn_limit: config.controller.automated_turn_limit,
            },
            Mailbox::new(sender),
        )
    }

    /// Subscribe before the actor starts so no early notification is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn start<S>(self, events: S) -> JoinHandle<()>
    where
        S: Stream<Item = TransportEvent> + Unpin + Send + 'static,
    {
        tokio::spawn(self.run(events))
    }

    async fn run<S>(mut self, mut events: S)
    where
        S: Stream<Item = TransportEvent> + Unpin + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.snapshot_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let local = self.controller.session().local_id().clone();
        info!(peer = %local, host = self.controller.session().is_host(), "sync actor started");
        loop {
            tokio::select! {
                message = self.mailbox.next() => {
                    let Some(message) = message else {
                        debug!(peer = %local, "mailbox closed; stopping");
                        break;
                    };
                    if !self.handle_message(message) {
                        self.publish();
                        break;
                    }
                },
                event = events.next() => {
                    let Some(event) = event else {
                        info!(peer = %local, "transport closed; stopping");
                        break;
                    };
                    self.handle_event(event);
                },
                Some(expired) = self.expiries.next() => {
                    report(self.controller.handle_reconnect_expired(expired.color, expired.generation));
                },
                _ = ticker.tick() => {
                    if self.controller.session().is_host() {
                        report(self.controller.broadcast_full_state(DeliveryMode::BestEffort));
                    }
                },
            }
            self.drive_automated();
            self.publish();
        }
    }

    /// Returns `false` once the actor should stop.
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::StartMatch {
                assignments,
                response,
            } => {
                let _ = response.send(self.controller.start_match(assignments));
            }
            Message::LocalRoll { response } => {
                let _ = response.send(self.controller.local_roll());
            }
            Message::LocalMove { slot, response } => {
                let _ = response.send(self.controller.local_move(slot));
            }
            Message::CompleteMove => {
                report(self.controller.complete_local_move().map(|_| ()));
            }
            Message::RequestSync => {
                report(self.controller.request_full_state());
            }
            Message::Subscribe { response } => {
                let _ = response.send(self.notifications.subscribe());
            }
            Message::State { response } => {
                let _ = response.send((
                    self.controller.state().clone(),
                    self.controller.session().roster().clone(),
                ));
            }
            Message::Close => {
                report(self.controller.close_session());
                return false;
            }
        }
        true
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let result = match event {
            TransportEvent::Received { bytes, sender } => {
                self.controller.handle_inbound(&bytes, &sender)
            }
            TransportEvent::Connected(peer) => self.controller.handle_peer_connected(&peer),
            TransportEvent::Disconnected(peer) => self.controller.handle_peer_disconnected(&peer),
        };
        report(result);
    }

    /// Play automated colors until a human color is up.
    fn drive_automated(&mut self) {
        if !self.controller.session().is_host() || !self.controller.is_started() {
            return;
        }
        loop {
            match self.controller.run_automated_turns() {
                Ok(actions) if actions >= self.automated_turn_limit => continue,
                Ok(_) => break,
                Err(err) => {
                    warn!(?err, "automated play failed");
                    break;
                }
            }
        }
    }

    fn publish(&mut self) {
        for notification in self.controller.drain_notifications() {
            // No subscribers is fine.
            let _ = self.notifications.send(notification);
        }
    }
}

fn report(result: Result<(), SyncError>) {
    if let Err(err) = result {
        warn!(?err, "sync step failed");
    }
}
