use core::sync::atomic::{AtomicBool, Ordering};

/// Enables or disables capture. Driven by the host's DTR line.
#[derive(Debug, Default)]
pub struct CollectionGate {
    active: AtomicBool,
}

impl CollectionGate {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Closing the gate does not flush anything by itself; the next service
    /// pass empties the frame queue. Bytes already encoded for the host stay
    /// eligible for transmission.
    ///
    /// A close followed by a reopen before any service pass runs is never
    /// seen, so frames queued before the close are still sent.
    pub fn set_active(&self, enabled: bool) {
        self.active.store(enabled, Ordering::Release);
    }
}

/// Payload of a CDC `SET_CONTROL_LINE_STATE` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlLineState(pub u16);

impl ControlLineState {
    const DTR: u16 = 1 << 0;
    const RTS: u16 = 1 << 1;

    /// Data terminal ready, the collection gate enable
    pub fn dtr(&self) -> bool {
        self.0 & Self::DTR != 0
    }

    pub fn rts(&self) -> bool {
        self.0 & Self::RTS != 0
    }
}

impl From<u16> for ControlLineState {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtr_is_bit_zero() {
        assert!(ControlLineState(0x0001).dtr());
        assert!(ControlLineState(0x0003).dtr());
        assert!(!ControlLineState(0x0002).dtr());
        assert!(ControlLineState(0x0002).rts());
        assert!(!ControlLineState::default().dtr());
    }

    #[test]
    fn gate_starts_closed() {
        let gate = CollectionGate::new();
        assert!(!gate.is_active());

        gate.set_active(true);
        assert!(gate.is_active());

        gate.set_active(false);
        assert!(!gate.is_active());
    }
}
