use serde::{Deserialize, Serialize};

use crate::model::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Started,
    Long,
    Short,
    CloseLong,
    CloseShort,
}

impl PositionState {
    /// True where a new position may be opened.
    pub fn is_flat(self) -> bool {
        matches!(self, Self::Started | Self::CloseLong | Self::CloseShort)
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "Started"),
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
            Self::CloseLong => write!(f, "Close Long"),
            Self::CloseShort => write!(f, "Close Short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
        }
    }
}

/// One entry of the transaction log. The close half is filled exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub position_id: String,
    pub direction: Direction,
    pub opened_at_ms: u64,
    pub open_price: f64,
    pub closed_at_ms: Option<u64>,
    pub close_price: Option<f64>,
}

impl Transaction {
    pub fn is_closed(&self) -> bool {
        self.close_price.is_some()
    }

    /// Fractional gain of a closed position, sign-flipped for shorts.
    pub fn gain(&self) -> Option<f64> {
        let close = self.close_price?;
        let raw = (close - self.open_price) / self.open_price;
        Some(match self.direction {
            Direction::Long => raw,
            Direction::Short => -raw,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Opened {
        position_id: String,
        direction: Direction,
        price: f64,
        timestamp_ms: u64,
    },
    Closed {
        position_id: String,
        direction: Direction,
        open_price: f64,
        close_price: f64,
        gain: f64,
        timestamp_ms: u64,
    },
}

impl LifecycleEvent {
    /// Human-readable line sent to the notification channel.
    pub fn message(&self, symbol: &str) -> String {
        match self {
            Self::Opened {
                direction, price, ..
            } => format!("Entered {} position for {} at {}", direction, symbol, price),
            Self::Closed {
                direction,
                close_price,
                gain,
                ..
            } => format!(
                "Closed {} position for {} at {} - gain {:+.2}%",
                direction,
                symbol,
                close_price,
                gain * 100.0
            ),
        }
    }

    pub fn position_id(&self) -> &str {
        match self {
            Self::Opened { position_id, .. } | Self::Closed { position_id, .. } => position_id,
        }
    }
}

/// Deterministic position state machine over the discrete signal stream.
///
/// Owns the append-only transaction log; performs no I/O.
#[derive(Debug, Clone)]
pub struct PositionLifecycleEngine {
    state: PositionState,
    transactions: Vec<Transaction>,
    last_price: Option<f64>,
    last_timestamp_ms: Option<u64>,
}

impl Default for PositionLifecycleEngine {
    fn default() -> Self {
        Self {
            state: PositionState::Started,
            transactions: Vec::new(),
            last_price: None,
            last_timestamp_ms: None,
        }
    }
}

impl PositionLifecycleEngine {
    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn last_observation(&self) -> Option<(u64, f64)> {
        Some((self.last_timestamp_ms?, self.last_price?))
    }

    /// Apply one signal. Returns the event exactly when the state changes.
    pub fn on_signal(
        &mut self,
        signal: Signal,
        price: f64,
        timestamp_ms: u64,
    ) -> Option<LifecycleEvent> {
        self.last_price = Some(price);
        self.last_timestamp_ms = Some(timestamp_ms);

        match (self.state, signal) {
            (s, Signal::Long) if s.is_flat() => Some(self.open(Direction::Long, price, timestamp_ms)),
            (s, Signal::Short) if s.is_flat() => {
                Some(self.open(Direction::Short, price, timestamp_ms))
            }
            (PositionState::Long, Signal::Short) => self.close(price, timestamp_ms),
            (PositionState::Short, Signal::Long) => self.close(price, timestamp_ms),
            _ => None,
        }
    }

    fn open(&mut self, direction: Direction, price: f64, timestamp_ms: u64) -> LifecycleEvent {
        let position_id = format!("pos-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        self.transactions.push(Transaction {
            position_id: position_id.clone(),
            direction,
            opened_at_ms: timestamp_ms,
            open_price: price,
            closed_at_ms: None,
            close_price: None,
        });
        self.state = match direction {
            Direction::Long => PositionState::Long,
            Direction::Short => PositionState::Short,
        };
        LifecycleEvent::Opened {
            position_id,
            direction,
            price,
            timestamp_ms,
        }
    }

    fn close(&mut self, price: f64, timestamp_ms: u64) -> Option<LifecycleEvent> {
        let tx = self.transactions.last_mut().filter(|t| !t.is_closed())?;
        tx.closed_at_ms = Some(timestamp_ms);
        tx.close_price = Some(price);
        let gain = tx.gain().unwrap_or(0.0);
        self.state = match tx.direction {
            Direction::Long => PositionState::CloseLong,
            Direction::Short => PositionState::CloseShort,
        };
        Some(LifecycleEvent::Closed {
            position_id: tx.position_id.clone(),
            direction: tx.direction,
            open_price: tx.open_price,
            close_price: price,
            gain,
            timestamp_ms,
        })
    }
}
