//! Capture path and service loop.
//!
//! Frames come in from the CAN interrupt through [`CanPort`], sit in a fixed
//! queue, and are turned into LAWICEL lines by [`Service`] whenever the main
//! loop is idle. [`UsbPort`] moves those lines to the host on each bus tick.
//!
//! All state lives in one [`Sniffer`] built once at startup. Splitting it
//! hands out exactly one handle per execution context, which is what keeps
//! each ring single-producer/single-consumer.

use core::sync::atomic::{AtomicU32, Ordering};

use defmt_or_log::{error, trace};
use embedded_can::Frame;

use crate::{
    ring::Ring, BufferFull, CanFrame, CollectionGate, TransferState, UsbPort, FRAME_QUEUE_SIZE,
    HOST_BUFFER_SIZE,
};

/// The CAN peripheral as seen from the capture path.
pub trait CanReceiver {
    /// Arms one more receive. Idempotent and always legal to call.
    fn request_next_reception(&mut self);

    /// Clears the peripheral's fault flag.
    fn acknowledge_fault(&mut self);
}

/// Local capture counters. None of this reaches the host, which only ever
/// sees frames go missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureStats {
    /// Frames placed in the queue
    pub captured: u32,
    /// Frames lost to a full queue
    pub dropped: u32,
    /// Frames refused for carrying more than 8 data bytes
    pub rejected: u32,
    /// Bus faults acknowledged
    pub faults: u32,
}

// Only the CAN interrupt writes these, so load/store is enough and works on
// cores without atomic read-modify-write.
#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU32,
    dropped: AtomicU32,
    rejected: AtomicU32,
    faults: AtomicU32,
}

impl Counters {
    const fn new() -> Self {
        Self {
            captured: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            faults: AtomicU32::new(0),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.store(counter.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
    }

    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            captured: self.captured.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [&self.captured, &self.dropped, &self.rejected, &self.faults] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Process-wide sniffer state: `N` queue slots for frames, `M` bytes of
/// host-bound buffer.
pub struct Sniffer<const N: usize = FRAME_QUEUE_SIZE, const M: usize = HOST_BUFFER_SIZE> {
    pub(crate) gate: CollectionGate,
    pub(crate) frames: Ring<CanFrame, N>,
    pub(crate) host_bound: Ring<u8, M>,
    pub(crate) transfer: TransferState,
    counters: Counters,
}

impl<const N: usize, const M: usize> Default for Sniffer<N, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const M: usize> Sniffer<N, M> {
    pub const fn new() -> Self {
        Self {
            gate: CollectionGate::new(),
            frames: Ring::new(CanFrame::EMPTY),
            host_bound: Ring::new(0),
            transfer: TransferState::new(),
            counters: Counters::new(),
        }
    }

    /// Returns everything to the empty state with the gate closed and arms
    /// the first CAN reception.
    pub fn init(&mut self, can: &mut impl CanReceiver) {
        self.gate.set_active(false);
        self.frames.clear();
        self.host_bound.clear();
        self.transfer.reset();
        self.counters.reset();

        can.request_next_reception();
    }

    /// Hands out the three execution-context handles: CAN interrupt,
    /// cooperative loop and USB interrupt.
    pub fn split(&mut self) -> (CanPort<'_, N, M>, Service<'_, N, M>, UsbPort<'_, N, M>) {
        let sniffer = &*self;

        (
            CanPort { sniffer },
            Service { sniffer },
            UsbPort::new(sniffer),
        )
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }

    /// Frames captured but not yet encoded
    pub fn queued_frames(&self) -> usize {
        self.frames.len()
    }

    /// Encoded bytes waiting for the IN endpoint
    pub fn pending_bytes(&self) -> usize {
        self.host_bound.len()
    }

    pub fn frame_capacity(&self) -> usize {
        self.frames.capacity()
    }

    pub fn transfer_state(&self) -> &TransferState {
        &self.transfer
    }
}

/// Producer side of the frame queue. Belongs to the CAN interrupt.
pub struct CanPort<'a, const N: usize, const M: usize> {
    sniffer: &'a Sniffer<N, M>,
}

impl<'a, const N: usize, const M: usize> CanPort<'a, N, M> {
    /// A reception completed. The peripheral is re-armed whatever happens to
    /// the frame.
    pub fn on_frame_received(&mut self, frame: &impl Frame, can: &mut impl CanReceiver) {
        if self.sniffer.gate.is_active() {
            self.enqueue(frame);
        }

        can.request_next_reception();
    }

    /// The peripheral flagged a bus error. There is no frame to capture and
    /// no recovery beyond clearing the flag.
    pub fn on_bus_fault(&mut self, can: &mut impl CanReceiver) {
        can.acknowledge_fault();
        Counters::bump(&self.sniffer.counters.faults);
        trace!("Acknowledged CAN bus fault");

        can.request_next_reception();
    }

    pub fn sniffer(&self) -> &'a Sniffer<N, M> {
        self.sniffer
    }

    fn enqueue(&mut self, frame: &impl Frame) {
        let counters = &self.sniffer.counters;

        let Some(captured) = CanFrame::from_frame(frame) else {
            error!("Rejected a frame with {} data bytes", frame.dlc());
            Counters::bump(&counters.rejected);
            return;
        };

        let frames = &self.sniffer.frames;
        let (read, write) = frames.snapshot();
        let next_write = Ring::<CanFrame, N>::advance(write, 1);

        // Never overwrite: the newest frame is the one that gets lost
        if next_write == read {
            trace!("Frame queue full, dropping frame");
            Counters::bump(&counters.dropped);
            return;
        }

        // SAFETY: this handle is the only producer and `write` is its cursor
        unsafe { frames.write_slot(write, captured) };
        frames.commit_write(next_write);

        Counters::bump(&counters.captured);
    }
}

/// Consumer of the frame queue and producer of the host-bound buffer.
/// Belongs to the cooperative main loop.
pub struct Service<'a, const N: usize, const M: usize> {
    sniffer: &'a Sniffer<N, M>,
}

impl<'a, const N: usize, const M: usize> Service<'a, N, M> {
    /// Encodes queued frames into the host-bound buffer until the queue is
    /// empty or the buffer is full. Returns how many frames were moved.
    ///
    /// While the gate is closed this empties the frame queue instead.
    pub fn service(&mut self) -> usize {
        let sniffer = self.sniffer;
        let frames = &sniffer.frames;

        if !sniffer.gate.is_active() {
            frames.clear();
            return 0;
        }

        let (mut read, write) = frames.snapshot();
        let mut drained = 0;

        while read != write {
            // SAFETY: `read` is inside the snapshot and this handle is the
            // only consumer
            let frame = unsafe { frames.read_slot(read) };

            if self.try_append_outbound(&frame.as_bytes()).is_err() {
                // The frame stays queued and is retried on the next pass
                trace!("Host-bound buffer full, {} frames waiting", frames.len());
                break;
            }

            read = Ring::<CanFrame, N>::advance(read, 1);
            frames.commit_read(read);
            drained += 1;
        }

        drained
    }

    /// Queues bytes for the host. Returns 0 if they do not all fit, otherwise
    /// `bytes.len()`; nothing is ever partially written.
    pub fn append_outbound(&mut self, bytes: &[u8]) -> usize {
        self.try_append_outbound(bytes).unwrap_or(0)
    }

    pub fn try_append_outbound(&mut self, bytes: &[u8]) -> Result<usize, BufferFull> {
        let host_bound = &self.sniffer.host_bound;
        let (read, write) = host_bound.snapshot();
        let available = Ring::<u8, M>::headroom(read, write);

        if bytes.len() > available {
            return Err(BufferFull {
                requested: bytes.len(),
                available,
            });
        }

        // SAFETY: this handle is the only producer, starting at its cursor,
        // and the length was checked against the headroom
        unsafe { host_bound.write_bytes(write, bytes) };
        host_bound.commit_write(Ring::<u8, M>::advance(write, bytes.len()));

        Ok(bytes.len())
    }

    pub fn sniffer(&self) -> &'a Sniffer<N, M> {
        self.sniffer
    }
}
