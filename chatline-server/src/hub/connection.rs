use std::fmt::{Display, Formatter, Result as FmtResult};

use metrics::counter;
use shared::models::PushEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

/// Addressable end of a live connection.
///
/// The hub only ever pushes into a bounded queue; whatever transport drains
/// the receiving side (a WebSocket writer task, or a test) is invisible here.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<PushEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    QueueFull,
    Closed,
}

impl MissReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Missed(MissReason),
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<PushEvent>) -> Self {
        Self { id, sender }
    }

    /// Creates a handle plus the receiver its transport should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PushEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::new_v4(), sender), receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Enqueues `event` without waiting. A full or closed queue is a missed
    /// delivery; the recipient recovers on its next history fetch.
    pub fn deliver(&self, event: &PushEvent) -> Delivery {
        match self.sender.try_send(event.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Missed(MissReason::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Missed(MissReason::Closed),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub missed: usize,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.missed
    }

    pub fn merge(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.missed += other.missed;
    }

    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Missed(_) => self.missed += 1,
        }
    }
}

/// Delivers `event` to every target. A miss on one target is logged and
/// counted; the loop always continues with the rest.
pub fn fan_out<'a, I>(targets: I, event: &PushEvent) -> DeliveryReport
where
    I: IntoIterator<Item = &'a ConnectionHandle>,
{
    let mut report = DeliveryReport::default();
    let name = event.name();

    for target in targets {
        let delivery = target.deliver(event);
        match delivery {
            Delivery::Delivered => {
                counter!("chatline_push_delivered_total", "event" => name).increment(1);
            }
            Delivery::Missed(reason) => {
                counter!(
                    "chatline_push_missed_total",
                    "event" => name,
                    "reason" => reason.as_str()
                )
                .increment(1);
                warn!(
                    connection_id = %target.id(),
                    event = name,
                    reason = reason.as_str(),
                    "push delivery missed"
                );
            }
        }
        report.record(delivery);
    }

    debug!(
        event = name,
        delivered = report.delivered,
        missed = report.missed,
        "fan-out finished"
    );
    report
}
