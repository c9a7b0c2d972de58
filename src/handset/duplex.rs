//! Line direction and polarity control for a single-wire half-duplex link.
//!
//! The handset idles the line high (normal) or low (inverted). Receive mode
//! biases the pad towards that idle level; transmit mode first cuts the
//! receiver off so our own bytes are not read back, parks the pad at the
//! idle level, and only then hands it to the UART transmitter.

use tracing::trace;

/// Which side of the UART a pin operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    Rx,
    Tx,
}

/// Pad bias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
    Floating,
}

/// Where the UART receiver takes its input from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxRoute {
    /// The line pad, optionally through an inverter
    Pad { inverted: bool },
    /// A constant level, disconnected from every pad
    Detached { level: bool },
}

/// Primitive pad operations provided by the board
pub trait LinePins: Send {
    fn set_input(&mut self, pin: Pin);
    fn set_output(&mut self, pin: Pin);
    fn set_pull(&mut self, pin: Pin, pull: Pull);
    fn set_level(&mut self, pin: Pin, high: bool);
    fn route_rx(&mut self, route: RxRoute);
    fn connect_tx(&mut self, inverted: bool);
}

/// Pins for lines whose direction is switched by external hardware
///
/// Used for full-duplex wiring and USB adapters with their own half-duplex
/// circuit; every operation is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedLine;

impl LinePins for FixedLine {
    fn set_input(&mut self, _pin: Pin) {}
    fn set_output(&mut self, _pin: Pin) {}
    fn set_pull(&mut self, _pin: Pin, _pull: Pull) {}
    fn set_level(&mut self, _pin: Pin, _high: bool) {}
    fn route_rx(&mut self, _route: RxRoute) {}
    fn connect_tx(&mut self, _inverted: bool) {}
}

/// Drives line direction for the engine
#[derive(Debug)]
pub struct DuplexController<L> {
    pins: L,
}

impl<L: LinePins> DuplexController<L> {
    pub fn new(pins: L) -> Self {
        Self { pins }
    }

    /// Listen on the line
    ///
    /// Pull-up when not inverted, pull-down when inverted, so an undriven
    /// line reads as idle.
    pub fn set_receive_mode(&mut self, inverted: bool) {
        trace!(inverted, "duplex: receive");
        self.pins.set_input(Pin::Rx);
        self.pins.route_rx(RxRoute::Pad { inverted });
        let pull = if inverted { Pull::Down } else { Pull::Up };
        self.pins.set_pull(Pin::Rx, pull);
    }

    /// Drive the line
    ///
    /// The receive path is broken before anything is driven; the pad is at
    /// idle level before it becomes an output.
    pub fn set_transmit_mode(&mut self, inverted: bool) {
        trace!(inverted, "duplex: transmit");
        let idle_high = !inverted;
        self.pins.set_pull(Pin::Tx, Pull::Floating);
        self.pins.set_pull(Pin::Rx, Pull::Floating);
        self.pins.route_rx(RxRoute::Detached { level: idle_high });
        self.pins.set_level(Pin::Tx, idle_high);
        self.pins.set_output(Pin::Tx);
        self.pins.connect_tx(inverted);
    }

    pub fn pins(&self) -> &L {
        &self.pins
    }
}
