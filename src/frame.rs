use embedded_can::{Frame, Id};
use heapless::Vec;
use num_enum::IntoPrimitive;

use crate::{
    codec::{bytes_to_hex, extended_id_to_hex, standard_id_to_hex, to_hex_digit},
    LINE_TERMINATOR, MAX_DATA_LENGTH, MAX_LINE_SIZE,
};

/// One captured CAN 2.0 data frame.
///
/// The data length can be up to 8 bytes. Unused payload bytes are always
/// zero, so two frames compare equal exactly when their id, length and valid
/// bytes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: Id,
    dlc: u8,
    data: [u8; MAX_DATA_LENGTH],
}

impl CanFrame {
    /// Placeholder used to fill queue slots before anything is captured.
    pub const EMPTY: Self = Self {
        id: Id::Standard(embedded_can::StandardId::ZERO),
        dlc: 0,
        data: [0; MAX_DATA_LENGTH],
    };

    /// Creates a new data frame. `data` must have a length in the range
    /// 0..=8 or else `None` will be returned instead.
    pub fn new_data(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_DATA_LENGTH {
            return None;
        }

        let mut copy = [0u8; MAX_DATA_LENGTH];
        copy[..data.len()].copy_from_slice(data);

        Some(Self {
            id: id.into(),
            dlc: data.len() as u8,
            data: copy,
        })
    }

    /// Copies any `embedded_can` frame delivered by a CAN driver.
    ///
    /// Remote frames keep their DLC and get a zero payload, since the line
    /// format has no separate remote variant. Returns `None` for anything
    /// carrying more than 8 bytes.
    pub fn from_frame(frame: &impl Frame) -> Option<Self> {
        if frame.is_remote_frame() {
            let zeros = [0u8; MAX_DATA_LENGTH];
            Self::new_data(frame.id(), zeros.get(..frame.dlc())?)
        } else {
            Self::new_data(frame.id(), frame.data())
        }
    }

    /// Gets the message ID of the frame
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn kind(&self) -> FrameKind {
        self.id.kind()
    }

    /// Number of valid data bytes
    pub fn dlc(&self) -> usize {
        self.dlc as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// Encodes the frame as one LAWICEL line, carriage return included.
    ///
    /// ```text
    /// t 123 2 DEAD \r          standard id, 3 hex digits
    /// T 1ABCDEF0 0 \r          extended id, 8 hex digits
    /// ```
    pub fn as_bytes(&self) -> Vec<u8, MAX_LINE_SIZE> {
        let mut line = Vec::new();

        line.push(self.kind().into())
            .expect("MAX_LINE_SIZE holds any classic frame");

        match self.id {
            Id::Standard(standard_id) => line
                .extend_from_slice(&standard_id_to_hex(standard_id))
                .expect("MAX_LINE_SIZE holds any classic frame"),
            Id::Extended(extended_id) => line
                .extend_from_slice(&extended_id_to_hex(extended_id))
                .expect("MAX_LINE_SIZE holds any classic frame"),
        }

        line.push(to_hex_digit(self.dlc as u32))
            .expect("MAX_LINE_SIZE holds any classic frame");

        let payload = bytes_to_hex(self.data()).expect("a frame never carries more than 8 bytes");
        line.extend_from_slice(&payload)
            .expect("MAX_LINE_SIZE holds any classic frame");

        line.push(LINE_TERMINATOR)
            .expect("MAX_LINE_SIZE holds any classic frame");

        line
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Self::new_data(id, data)
    }

    /// Remote frames are only ever received, never constructed here.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    fn data(&self) -> &[u8] {
        CanFrame::data(self)
    }
}

/// Leading character of a line, which also selects the identifier width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FrameKind {
    #[default]
    Standard = b't',
    Extended = b'T',
}

pub trait IdExt {
    fn kind(self) -> FrameKind;
}

impl IdExt for Id {
    fn kind(self) -> FrameKind {
        match self {
            Id::Standard(_) => FrameKind::Standard,
            Id::Extended(_) => FrameKind::Extended,
        }
    }
}
