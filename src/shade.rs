//! Shade group state machine and controller.

use crate::connection::Connection;
use crate::error::{Result, ShadeError};
use crate::protocol::{
    Command, EventKind, StatusEvent, ACTION_LEVEL, ACTION_LOWERING, ACTION_MOTION_LEVEL,
    ACTION_RAISING, ACTION_STOPPED, ACTION_TILT,
};
use crate::registry::ConnectionRegistry;
use crate::subscription::{ShadeUpdate, UpdateReceiver};
use crate::tilt;
use crate::types::{PositionState, ShadeConfig, ShadeKind};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Cached state of one shade group.
///
/// Mutated only by inbound status events and local set-requests; all
/// values stay inside their declared ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadeState {
    pub integration_id: u32,
    pub kind: ShadeKind,
    /// Last known position, 0-100 (down by default)
    pub last_position: u8,
    /// Current tilt angle in degrees, -90..90 (flat by default)
    pub current_tilt_angle: i16,
    pub position_state: PositionState,
    /// Target position, 0-100
    pub target_position: u8,
    /// Target tilt angle in degrees, -90..90
    pub target_tilt_angle: i16,
}

impl ShadeState {
    fn new(integration_id: u32, kind: ShadeKind) -> Self {
        Self {
            integration_id,
            kind,
            last_position: 0,
            current_tilt_angle: 0,
            position_state: PositionState::Stopped,
            target_position: 0,
            target_tilt_angle: 0,
        }
    }

    /// Apply one status event, returning an update per field that changed.
    ///
    /// Unknown action ids and reports with missing or out-of-encoding
    /// parameters are ignored.
    pub fn apply(&mut self, event: &StatusEvent) -> Vec<ShadeUpdate> {
        let mut updates = Vec::new();

        match event.action_id {
            ACTION_LEVEL => {
                let Some(&raw) = event.parameters.first() else {
                    return updates;
                };
                let level = round_level(raw);
                if self.position_state == PositionState::Stopped {
                    if self.target_position != level {
                        self.target_position = level;
                        updates.push(ShadeUpdate::TargetPosition(level));
                    }
                } else if self.last_position != level {
                    self.last_position = level;
                    updates.push(ShadeUpdate::CurrentPosition(level));
                }
            }
            ACTION_RAISING => self.set_motion(PositionState::Increasing, &mut updates),
            ACTION_LOWERING => self.set_motion(PositionState::Decreasing, &mut updates),
            ACTION_STOPPED => self.set_motion(PositionState::Stopped, &mut updates),
            ACTION_TILT => {
                let Some(&raw) = event.parameters.first() else {
                    return updates;
                };
                let angle = tilt::device_to_consumer(raw);
                if self.current_tilt_angle != angle {
                    self.current_tilt_angle = angle;
                    updates.push(ShadeUpdate::CurrentTiltAngle(angle));
                }
            }
            ACTION_MOTION_LEVEL => {
                let Some(&raw_state) = event.parameters.first() else {
                    return updates;
                };
                let Some(state) = PositionState::from_raw(raw_state.round() as u8) else {
                    return updates;
                };
                self.set_motion(state, &mut updates);
                if state == PositionState::Stopped {
                    if let Some(&raw_level) = event.parameters.get(1) {
                        let level = round_level(raw_level);
                        if self.last_position != level {
                            self.last_position = level;
                            updates.push(ShadeUpdate::CurrentPosition(level));
                        }
                    }
                }
            }
            _ => {}
        }

        updates
    }

    fn set_motion(&mut self, state: PositionState, updates: &mut Vec<ShadeUpdate>) {
        if self.position_state != state {
            self.position_state = state;
            updates.push(ShadeUpdate::PositionState(state));
        }
    }
}

fn round_level(raw: f64) -> u8 {
    (raw.round() as i64).clamp(0, 100) as u8
}

/// Controller for one shade group.
///
/// Subscribes to the shared connection's events for its integration id,
/// maintains cached position/tilt/motion state, and translates
/// set-requests into outbound commands. Accessors return cached state
/// immediately and never wait on a device round-trip, so values may lag
/// the hardware until the next status push.
pub struct ShadeController {
    integration_id: u32,
    kind: ShadeKind,
    connection: Arc<Connection>,
    state: Arc<Mutex<ShadeState>>,
    update_tx: broadcast::Sender<ShadeUpdate>,
    event_task: tokio::task::JoinHandle<()>,
}

impl ShadeController {
    /// Create a controller on a shared connection.
    ///
    /// Issues a level query to seed state from the device, plus a tilt
    /// query when the kind supports tilt.
    pub fn new(connection: Arc<Connection>, integration_id: u32, kind: ShadeKind) -> Self {
        let state = Arc::new(Mutex::new(ShadeState::new(integration_id, kind)));
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let mut events = connection.subscribe(integration_id);
        let event_task = {
            let state = state.clone();
            let update_tx = update_tx.clone();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if event.kind != EventKind::ShadeGroup {
                        continue;
                    }
                    let updates = state.lock().unwrap().apply(&event);
                    for update in updates {
                        tracing::debug!(integration_id, ?update, "state changed");
                        let _ = update_tx.send(update);
                    }
                }
            })
        };

        connection.send_command(Command::query_level(integration_id));
        if kind.supports_tilt() {
            connection.send_command(Command::query_tilt(integration_id));
        }

        Self {
            integration_id,
            kind,
            connection,
            state,
            update_tx,
            event_task,
        }
    }

    /// Build a controller from configuration, sharing connections through
    /// the registry.
    pub fn from_config(config: &ShadeConfig, registry: &ConnectionRegistry) -> Self {
        let connection = registry.connection(&config.connection_config());
        Self::new(connection, config.integration_id, config.kind())
    }

    pub fn integration_id(&self) -> u32 {
        self.integration_id
    }

    pub fn kind(&self) -> ShadeKind {
        self.kind
    }

    /// The connection this controller issues commands on
    pub fn connection(&self) -> Arc<Connection> {
        self.connection.clone()
    }

    /// Get a snapshot of the complete shade state
    pub fn state_snapshot(&self) -> ShadeState {
        self.state.lock().unwrap().clone()
    }

    /// Last known position (0-100)
    pub fn current_position(&self) -> u8 {
        self.state.lock().unwrap().last_position
    }

    /// Motion state
    pub fn position_state(&self) -> PositionState {
        self.state.lock().unwrap().position_state
    }

    /// Target position (0-100)
    pub fn target_position(&self) -> u8 {
        self.state.lock().unwrap().target_position
    }

    /// Current tilt angle in degrees (-90..90)
    pub fn current_tilt_angle(&self) -> i16 {
        self.state.lock().unwrap().current_tilt_angle
    }

    /// Target tilt angle in degrees (-90..90)
    pub fn target_tilt_angle(&self) -> i16 {
        self.state.lock().unwrap().target_tilt_angle
    }

    /// Subscribe to state-change updates (the host-adapter seam)
    pub fn subscribe_updates(&self) -> UpdateReceiver {
        UpdateReceiver::new(self.update_tx.subscribe())
    }

    /// Request a new position (0-100).
    ///
    /// Validated locally before any command is emitted to the device.
    pub fn set_target_position(&self, position: u8) -> Result<()> {
        if position > 100 {
            return Err(ShadeError::InvalidPosition(i64::from(position)));
        }

        {
            let mut state = self.state.lock().unwrap();
            if state.target_position != position {
                state.target_position = position;
                let _ = self.update_tx.send(ShadeUpdate::TargetPosition(position));
            }
        }

        self.connection
            .send_command(Command::set_level(self.integration_id, position));
        Ok(())
    }

    /// Request a new tilt angle in degrees (-90..90).
    ///
    /// Rejected on kinds without tilt support; the angle is converted to
    /// the device's 0-100 scale before transmission.
    pub fn set_target_tilt_angle(&self, angle: i16) -> Result<()> {
        if !self.kind.supports_tilt() {
            return Err(ShadeError::TiltNotSupported);
        }
        if !(-90..=90).contains(&angle) {
            return Err(ShadeError::InvalidTiltAngle(i64::from(angle)));
        }

        let device_level = tilt::consumer_to_device(angle);

        {
            let mut state = self.state.lock().unwrap();
            if state.target_tilt_angle != angle {
                state.target_tilt_angle = angle;
                let _ = self.update_tx.send(ShadeUpdate::TargetTiltAngle(angle));
            }
        }

        self.connection
            .send_command(Command::set_tilt(self.integration_id, device_level));
        Ok(())
    }
}

impl Drop for ShadeController {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shadegrp(integration_id: u32, action_id: u8, parameters: Vec<f64>) -> StatusEvent {
        StatusEvent {
            kind: EventKind::ShadeGroup,
            integration_id,
            action_id,
            parameters,
        }
    }

    #[test]
    fn test_level_report_while_stopped_sets_target() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        let updates = state.apply(&shadegrp(3, ACTION_LEVEL, vec![75.0]));
        assert_eq!(state.target_position, 75);
        assert_eq!(state.last_position, 0);
        assert_eq!(updates, vec![ShadeUpdate::TargetPosition(75)]);
    }

    #[test]
    fn test_level_report_while_moving_sets_last_position() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        state.apply(&shadegrp(3, ACTION_RAISING, vec![]));
        let updates = state.apply(&shadegrp(3, ACTION_LEVEL, vec![42.4]));
        assert_eq!(state.last_position, 42);
        assert_eq!(state.target_position, 0);
        assert_eq!(updates, vec![ShadeUpdate::CurrentPosition(42)]);
    }

    #[test]
    fn test_motion_reports() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);

        let updates = state.apply(&shadegrp(3, ACTION_RAISING, vec![]));
        assert_eq!(state.position_state, PositionState::Increasing);
        assert_eq!(updates, vec![ShadeUpdate::PositionState(PositionState::Increasing)]);

        state.apply(&shadegrp(3, ACTION_LOWERING, vec![]));
        assert_eq!(state.position_state, PositionState::Decreasing);

        state.apply(&shadegrp(3, ACTION_STOPPED, vec![]));
        assert_eq!(state.position_state, PositionState::Stopped);
    }

    #[test]
    fn test_motion_report_is_idempotent() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        state.apply(&shadegrp(3, ACTION_LOWERING, vec![]));
        let updates = state.apply(&shadegrp(3, ACTION_LOWERING, vec![]));
        assert!(updates.is_empty());
    }

    #[test]
    fn test_motion_level_report_stops_and_records_position() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        state.apply(&shadegrp(3, ACTION_RAISING, vec![]));

        let updates = state.apply(&shadegrp(3, ACTION_MOTION_LEVEL, vec![2.0, 40.0]));
        assert_eq!(state.position_state, PositionState::Stopped);
        assert_eq!(state.last_position, 40);
        assert_eq!(
            updates,
            vec![
                ShadeUpdate::PositionState(PositionState::Stopped),
                ShadeUpdate::CurrentPosition(40),
            ]
        );
    }

    #[test]
    fn test_motion_level_report_while_moving_keeps_position() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        state.apply(&shadegrp(3, ACTION_MOTION_LEVEL, vec![1.0, 80.0]));
        assert_eq!(state.position_state, PositionState::Increasing);
        assert_eq!(state.last_position, 0);
    }

    #[test]
    fn test_motion_level_report_with_bad_state_is_ignored() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        let updates = state.apply(&shadegrp(3, ACTION_MOTION_LEVEL, vec![9.0, 40.0]));
        assert!(updates.is_empty());
        assert_eq!(state.position_state, PositionState::Stopped);
        assert_eq!(state.last_position, 0);
    }

    #[test]
    fn test_tilt_report_converts_to_degrees() {
        let mut state = ShadeState::new(3, ShadeKind::VenetianBlind);
        let updates = state.apply(&shadegrp(3, ACTION_TILT, vec![75.0]));
        assert_eq!(state.current_tilt_angle, 45);
        assert_eq!(updates, vec![ShadeUpdate::CurrentTiltAngle(45)]);
    }

    #[test]
    fn test_unknown_action_id_is_ignored() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        let before = state.clone();
        let updates = state.apply(&shadegrp(3, 99, vec![1.0, 2.0]));
        assert!(updates.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_level_report_clamps_out_of_range_values() {
        let mut state = ShadeState::new(3, ShadeKind::Generic);
        state.apply(&shadegrp(3, ACTION_LEVEL, vec![150.0]));
        assert_eq!(state.target_position, 100);
    }

    #[tokio::test]
    async fn test_set_target_position_rejects_out_of_range() {
        let controller = offline_controller(ShadeKind::Generic).await;
        assert!(matches!(
            controller.set_target_position(101),
            Err(ShadeError::InvalidPosition(101))
        ));
    }

    #[tokio::test]
    async fn test_set_target_tilt_rejects_out_of_range_and_non_tilt_kinds() {
        let blind = offline_controller(ShadeKind::VenetianBlind).await;
        assert!(matches!(
            blind.set_target_tilt_angle(91),
            Err(ShadeError::InvalidTiltAngle(91))
        ));
        assert!(matches!(
            blind.set_target_tilt_angle(-91),
            Err(ShadeError::InvalidTiltAngle(-91))
        ));
        assert!(blind.set_target_tilt_angle(45).is_ok());
        assert_eq!(blind.target_tilt_angle(), 45);

        let roller = offline_controller(ShadeKind::RollerShade).await;
        assert!(matches!(
            roller.set_target_tilt_angle(10),
            Err(ShadeError::TiltNotSupported)
        ));
    }

    /// Controller on a connection that never comes up; commands just queue.
    async fn offline_controller(kind: ShadeKind) -> ShadeController {
        let config = crate::types::ConnectionConfig {
            host: "127.0.0.1".to_string(),
            // Reserved port; connect attempts fail and the supervisor retries.
            port: 1,
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let connection = Arc::new(Connection::open(
            config,
            crate::connection::ConnectionOptions {
                reconnect_delay: Some(std::time::Duration::from_secs(60)),
                ..Default::default()
            },
        ));
        ShadeController::new(connection, 9, kind)
    }
}
