use crate::error::{Result, ShadeError};
use crate::protocol::StatusEvent;
use crate::types::PositionState;
use tokio::sync::{broadcast, mpsc};

/// Raw status events routed to one integration id.
///
/// Returned by [`Connection::subscribe`](crate::Connection::subscribe);
/// events for other integration ids are never delivered here.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<StatusEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next status event for this integration id.
    ///
    /// Errors with [`ShadeError::ConnectionClosed`] once the connection has
    /// been dropped.
    pub async fn recv(&mut self) -> Result<StatusEvent> {
        self.rx.recv().await.ok_or(ShadeError::ConnectionClosed)
    }
}

/// One shade state mutation, pushed to the host-adapter boundary.
///
/// Every field change produces exactly one update carrying the new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadeUpdate {
    /// Last known position (0-100)
    CurrentPosition(u8),
    /// Target position (0-100)
    TargetPosition(u8),
    /// Motion state
    PositionState(PositionState),
    /// Current tilt angle in degrees (-90..90)
    CurrentTiltAngle(i16),
    /// Target tilt angle in degrees (-90..90)
    TargetTiltAngle(i16),
}

/// Receiver for shade state updates
pub struct UpdateReceiver {
    rx: broadcast::Receiver<ShadeUpdate>,
}

impl UpdateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ShadeUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    pub async fn recv(&mut self) -> Result<ShadeUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => ShadeError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                ShadeError::ChannelError(format!("Lagged by {} updates", n))
            }
        })
    }

    /// Try to receive a state update without blocking
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<ShadeUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(ShadeError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(ShadeError::ChannelError(format!("Lagged by {} updates", n)))
            }
        }
    }
}
