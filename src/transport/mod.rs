//! Transport layer for actuator-bus I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Byte-stream transport to the actuator controller
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read (0 on read timeout)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write the whole buffer
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Independent handle to the same device, used by the background reader
    fn try_clone(&self) -> Result<Box<dyn Transport>>;

    /// Discard anything the device sent before we were ready to listen
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }
}
