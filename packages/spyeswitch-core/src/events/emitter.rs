//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative delivery (status display, logs).

use super::{ControllerEvent, PlayerEvent, SensorEvent};

/// Trait for emitting domain events without knowledge of delivery.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn on_change(&self, state: SensorState) {
///         self.emitter.emit_sensor(SensorEvent::StateChanged { state, timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a player session event.
    fn emit_player(&self, event: PlayerEvent);

    /// Emits a sensor state event.
    fn emit_sensor(&self, event: SensorEvent);

    /// Emits a controller timer event.
    fn emit_controller(&self, event: ControllerEvent);
}

/// No-op emitter for tests or when nobody observes events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_player(&self, _event: PlayerEvent) {}

    fn emit_sensor(&self, _event: SensorEvent) {}

    fn emit_controller(&self, _event: ControllerEvent) {}
}

/// Logging emitter for debugging.
///
/// Logs all events at debug level. Without a `tracing` subscriber the
/// records go to the `log` facade, so `env_logger` picks them up.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_player(&self, event: PlayerEvent) {
        tracing::debug!(?event, "player_event");
    }

    fn emit_sensor(&self, event: SensorEvent) {
        tracing::debug!(?event, "sensor_event");
    }

    fn emit_controller(&self, event: ControllerEvent) {
        tracing::debug!(?event, "controller_event");
    }
}
