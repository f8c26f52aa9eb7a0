//! Test utils
//!
//! Only available with `#[cfg(test)]`
use std::{collections::VecDeque, vec::Vec};

use embedded_can::{Frame, Id, StandardId};

use crate::{CanFrame, CanReceiver, TransportError, UsbPort, UsbTransport, OUT_PACKET_SIZE};

/// Records what the capture path asks of the CAN peripheral
#[derive(Debug, Default)]
pub struct MockCan {
    pub receptions_requested: usize,
    pub faults_acknowledged: usize,
}

impl CanReceiver for MockCan {
    fn request_next_reception(&mut self) {
        self.receptions_requested += 1;
    }

    fn acknowledge_fault(&mut self) {
        self.faults_acknowledged += 1;
    }
}

/// USB endpoint pair which accepts everything unless told to report busy
#[derive(Debug, Default)]
pub struct MockUsb {
    /// Every span offered to `transmit`, accepted or not
    pub offered: Vec<Vec<u8>>,
    /// Bytes from accepted transmits, in order
    pub sent: Vec<u8>,
    /// Number of upcoming `transmit` calls to refuse
    pub busy_transmits: usize,
    /// Number of upcoming `prepare_receive` calls to refuse
    pub busy_receives: usize,
    pub receives_armed: usize,
    /// Packets the host will send, handed out one per `read_packet`
    pub host_packets: VecDeque<Vec<u8>>,
    /// Report one byte more than the buffer holds, like a broken driver
    pub overstate_packet_length: bool,
}

impl UsbTransport for MockUsb {
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.offered.push(data.to_vec());

        if self.busy_transmits > 0 {
            self.busy_transmits -= 1;
            return Err(TransportError::Busy);
        }

        self.sent.extend_from_slice(data);
        Ok(())
    }

    fn prepare_receive(&mut self) -> Result<(), TransportError> {
        if self.busy_receives > 0 {
            self.busy_receives -= 1;
            return Err(TransportError::Busy);
        }

        self.receives_armed += 1;
        Ok(())
    }

    fn read_packet(&mut self, buf: &mut [u8; OUT_PACKET_SIZE]) -> usize {
        let packet = self.host_packets.pop_front().unwrap_or_default();
        let len = packet.len().min(OUT_PACKET_SIZE);
        buf[..len].copy_from_slice(&packet[..len]);

        if self.overstate_packet_length {
            OUT_PACKET_SIZE + 1
        } else {
            len
        }
    }
}

/// A frame type carrying more data than classic CAN allows, like an FD
/// frame handed over by a misbehaving driver
#[derive(Debug)]
pub struct OversizedFrame {
    pub data: [u8; 12],
}

impl Frame for OversizedFrame {
    fn new(_id: impl Into<Id>, _data: &[u8]) -> Option<Self> {
        None
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Standard(StandardId::ZERO)
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Remote transmission request as a CAN driver would deliver it
#[derive(Debug)]
pub struct RemoteFrame {
    pub id: Id,
    pub dlc: usize,
}

impl Frame for RemoteFrame {
    fn new(_id: impl Into<Id>, _data: &[u8]) -> Option<Self> {
        None
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        Some(Self { id: id.into(), dlc })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        true
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc
    }

    fn data(&self) -> &[u8] {
        &[]
    }
}

/// Standard data frame with the given raw id
pub fn frame(id: u16, data: &[u8]) -> CanFrame {
    CanFrame::new_data(StandardId::new(id).unwrap(), data).unwrap()
}

/// Expected wire bytes for a run of frames
pub fn lines(frames: &[CanFrame]) -> Vec<u8> {
    frames.iter().flat_map(|frame| frame.as_bytes()).collect()
}

/// Ticks the USB side, completing every transfer at once, until the
/// host-bound buffer is empty
pub fn flush<const N: usize, const M: usize>(usb_port: &mut UsbPort<'_, N, M>, usb: &mut MockUsb) {
    while usb_port.sniffer().pending_bytes() > 0 {
        usb_port.on_periodic_tick(usb);
        usb_port.on_transmit_complete();
    }
}
