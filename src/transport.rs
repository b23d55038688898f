//! The control-transfer seam between the engine and the USB driver.

/// Largest data packet the engine buffers for replies and blank-check scans.
/// A [`ControlPipe`] implementation may use any packet size up to this.
pub const MAX_PACKET_SIZE: usize = 64;

/// Access to the control endpoint a bootloader request arrived on.
///
/// [`handle_request`](crate::class::DfuBootloader::handle_request) drives the
/// whole control transfer through this trait: it consumes the data stage
/// packet by packet for writes, emits reply packets for reads, and completes
/// the status stage last. Memory programming happens between packets, so the
/// `receive`/`consumed` pair lets the endpoint NAK the host while a page is
/// being committed.
///
/// All methods block until the bus delivers. The engine applies no timeout
/// of its own; an implementation that detects a detach or bus reset
/// mid-transfer is expected to abandon the session by resetting the device.
pub trait ControlPipe {
    /// Packet size of the control endpoint, at most [`MAX_PACKET_SIZE`].
    fn packet_size(&self) -> usize;

    /// Waits for the next OUT data packet and returns its contents. The
    /// returned slice stays valid until [`consumed`](Self::consumed)
    /// releases the packet buffer.
    fn receive(&mut self) -> &[u8];

    /// Releases the buffer returned by the last [`receive`](Self::receive)
    /// and re-arms the endpoint for the next packet.
    fn consumed(&mut self);

    /// Sends one IN data packet and waits for it to go out. `data` never
    /// exceeds [`packet_size`](Self::packet_size) bytes; a short packet ends
    /// the data stage early.
    fn send(&mut self, data: &[u8]);

    /// Completes the status stage, acknowledging the transfer.
    fn complete_status(&mut self);
}
