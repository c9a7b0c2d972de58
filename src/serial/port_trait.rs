//! Trait abstraction for the handset byte line to enable testing

use std::io;

/// Non-blocking byte line to the handset
///
/// Reads never wait: callers ask how much is buffered and read at most that.
/// All timing is driven by the engine's clock, not by port timeouts.
pub trait HandsetPort: Send {
    /// Bytes received and waiting to be read
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read up to `buf.len()` already-buffered bytes
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Queue bytes for transmission
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Block until everything written has left the transmitter
    fn flush(&mut self) -> io::Result<()>;

    /// `true` once the transmit hardware queue is empty
    fn is_tx_idle(&mut self) -> io::Result<bool>;

    /// Reconfigure the line speed
    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()>;

    /// Drop any received but unread bytes
    fn discard_input(&mut self) -> io::Result<()>;
}
