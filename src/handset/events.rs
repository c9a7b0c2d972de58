//! Callbacks into the binding and model-selection logic.

#[cfg(test)]
use mockall::automock;

/// Link events raised by the engine
///
/// All methods default to doing nothing so implementors only pick what they
/// need. They are called from the polling context.
#[cfg_attr(test, automock)]
pub trait HandsetEvents: Send {
    /// First valid frame after a disconnect
    fn on_connected(&mut self) {}

    /// Watchdog declared the handset gone
    fn on_disconnected(&mut self) {}

    /// Handset selected model `model_id`
    fn on_model_selected(&mut self, _model_id: u8) {}

    /// Handset asked the module to enter binding mode
    fn on_bind_command(&mut self) {}

    /// Fresh channel values were stored
    fn on_rc_data(&mut self) {}
}

/// Events sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvents;

impl HandsetEvents for NoEvents {}
