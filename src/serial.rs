//! USB virtual serial side: paces host-bound bytes onto the IN endpoint on
//! every bus tick and keeps the OUT endpoint armed.

use core::sync::atomic::{AtomicBool, Ordering};

use defmt_or_log::{debug, trace};

use crate::{ring::Ring, ControlLineState, Sniffer, OUT_PACKET_SIZE};

/// The USB device stack as seen from the virtual serial port.
pub trait UsbTransport {
    /// Starts sending `data` on the IN endpoint. The bytes must be copied out
    /// (e.g. into endpoint memory) before returning `Ok`, because the buffer
    /// they came from is reused right away. Completion is reported through
    /// [`UsbPort::on_transmit_complete`].
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Arms the OUT endpoint for one more packet.
    fn prepare_receive(&mut self) -> Result<(), TransportError>;

    /// Copies the packet that just completed on the OUT endpoint into `buf`
    /// and returns its length. Called once per
    /// [`UsbPort::on_receive_complete`].
    fn read_packet(&mut self, buf: &mut [u8; OUT_PACKET_SIZE]) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    #[error("The endpoint is busy, try again on the next tick")]
    Busy,
}

/// Returned when bytes do not all fit in the host-bound buffer. The buffer is
/// left exactly as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("Tried to queue {requested} bytes for the host but only {available} were free")]
pub struct BufferFull {
    pub requested: usize,
    pub available: usize,
}

/// Per-direction endpoint state.
#[derive(Debug, Default)]
pub struct TransferState {
    inbound_transfer_in_progress: AtomicBool,
    outbound_transfer_needs_renewal: AtomicBool,
}

impl TransferState {
    pub const fn new() -> Self {
        Self {
            inbound_transfer_in_progress: AtomicBool::new(false),
            outbound_transfer_needs_renewal: AtomicBool::new(false),
        }
    }

    /// An IN transfer is on its way to the host
    pub fn inbound_transfer_in_progress(&self) -> bool {
        self.inbound_transfer_in_progress.load(Ordering::Acquire)
    }

    /// The last attempt to arm the OUT endpoint was refused
    pub fn outbound_transfer_needs_renewal(&self) -> bool {
        self.outbound_transfer_needs_renewal.load(Ordering::Acquire)
    }

    fn set_inbound_transfer_in_progress(&self, in_progress: bool) {
        self.inbound_transfer_in_progress
            .store(in_progress, Ordering::Release);
    }

    fn set_outbound_transfer_needs_renewal(&self, needs_renewal: bool) {
        self.outbound_transfer_needs_renewal
            .store(needs_renewal, Ordering::Release);
    }

    pub(crate) fn reset(&self) {
        self.set_inbound_transfer_in_progress(false);
        self.set_outbound_transfer_needs_renewal(false);
    }
}

/// Receive target of the OUT endpoint. Holds the most recent packet from the
/// host until the next one lands; nothing in it is ever interpreted.
#[derive(Debug, Clone)]
pub struct DeviceBoundBuffer {
    data: [u8; OUT_PACKET_SIZE],
    len: usize,
}

impl Default for DeviceBoundBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBoundBuffer {
    pub const fn new() -> Self {
        Self {
            data: [0; OUT_PACKET_SIZE],
            len: 0,
        }
    }

    /// Lets the transport write the completed packet straight into the
    /// buffer. A length past the packet size is clamped.
    fn receive(&mut self, usb: &mut impl UsbTransport) -> usize {
        self.len = usb.read_packet(&mut self.data).min(OUT_PACKET_SIZE);
        self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Consumer of the host-bound buffer and owner of the OUT endpoint. Belongs
/// to the USB interrupt.
pub struct UsbPort<'a, const N: usize, const M: usize> {
    sniffer: &'a Sniffer<N, M>,
    device_bound: DeviceBoundBuffer,
}

impl<'a, const N: usize, const M: usize> UsbPort<'a, N, M> {
    pub(crate) fn new(sniffer: &'a Sniffer<N, M>) -> Self {
        Self {
            sniffer,
            device_bound: DeviceBoundBuffer::new(),
        }
    }

    /// The host selected a configuration. Anything still waiting for the
    /// previous session is dropped and the OUT endpoint is armed.
    pub fn configure(&mut self, usb: &mut impl UsbTransport) {
        debug!("USB configured, dropping {} pending bytes", self.sniffer.pending_bytes());

        self.sniffer.transfer.reset();
        self.sniffer.host_bound.discard_pending();
        self.device_bound.clear();

        self.arm_reception(usb);
    }

    /// CDC `SET_CONTROL_LINE_STATE`. DTR opens and closes the collection
    /// gate.
    pub fn on_control_line_state(&mut self, state: u16) {
        let enabled = ControlLineState::from(state).dtr();

        if enabled != self.sniffer.gate.is_active() {
            debug!("Collection {}", if enabled { "enabled" } else { "disabled" });
        }

        self.sniffer.gate.set_active(enabled);
    }

    /// Periodic bus event (start of frame, once per millisecond). Sends at
    /// most one span of pending bytes and retries a refused OUT arm.
    pub fn on_periodic_tick(&mut self, usb: &mut impl UsbTransport) {
        self.drain_host_bound(usb);

        if self.sniffer.transfer.outbound_transfer_needs_renewal() {
            self.arm_reception(usb);
        }
    }

    /// The IN transfer started by a tick has reached the host.
    pub fn on_transmit_complete(&mut self) {
        self.sniffer.transfer.set_inbound_transfer_in_progress(false);
    }

    /// A packet arrived from the host. It lands in the device-bound buffer
    /// uninterpreted and the endpoint is re-armed straight away.
    pub fn on_receive_complete(&mut self, usb: &mut impl UsbTransport) {
        let received = self.device_bound.receive(usb);
        trace!("Ignoring {} bytes from the host", received);

        self.arm_reception(usb);
    }

    /// Most recent packet from the host
    pub fn device_bound(&self) -> &DeviceBoundBuffer {
        &self.device_bound
    }

    pub fn sniffer(&self) -> &'a Sniffer<N, M> {
        self.sniffer
    }

    fn drain_host_bound(&mut self, usb: &mut impl UsbTransport) {
        let sniffer = self.sniffer;

        // One transfer in flight at a time
        if sniffer.transfer.inbound_transfer_in_progress() {
            return;
        }

        let host_bound = &sniffer.host_bound;
        let (read, write) = host_bound.snapshot();

        if read == write {
            return;
        }

        // A wrapped buffer goes out in two ticks, the physical tail first
        let end = if read > write { M } else { write };

        // SAFETY: this handle is the only consumer and `read..end` lies inside
        // the snapshot without crossing the physical end
        let span = unsafe { host_bound.span(read, end) };

        match usb.transmit(span) {
            Ok(()) => {
                sniffer.transfer.set_inbound_transfer_in_progress(true);
                host_bound.commit_read(Ring::<u8, M>::advance(read, end - read));
            }
            Err(TransportError::Busy) => {
                trace!("IN endpoint busy, offering {} bytes again next tick", end - read);
            }
        }
    }

    fn arm_reception(&mut self, usb: &mut impl UsbTransport) {
        let busy = usb.prepare_receive().is_err();

        if busy {
            trace!("OUT endpoint busy, re-arming next tick");
        }

        self.sniffer
            .transfer
            .set_outbound_transfer_needs_renewal(busy);
    }
}
