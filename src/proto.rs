//! Wire vocabulary: DFU request/state/status codes and the 6-byte FLIP
//! command record with its address-span arithmetic.

use core::cmp::min;

/// DFU class-specific request codes carried in `bRequest` of a control
/// setup packet directed at the bootloader interface.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuRequest {
    /// Host asks the device to switch to DFU mode. The bootloader already is
    /// in DFU mode, so the request is accepted and ignored.
    Detach = 0,
    /// Write request. A non-empty data stage starts with a 6-byte command
    /// record; an empty one is the terminating signal that hands control to
    /// the application.
    Dnload = 1,
    /// Read request. Runs the cached command, or returns the blank-check
    /// result while a blank-check record is cached.
    Upload = 2,
    /// Poll the 6-byte status reply. Also advances the synchronization
    /// states (see [`DfuState`]).
    GetStatus = 3,
    /// Return to Idle with status [`DfuStatus::OK`].
    ClrStatus = 4,
    /// Read the 1-byte state reply. No transition.
    GetState = 5,
    /// Same effect as ClrStatus.
    Abort = 6,
}

impl DfuRequest {
    /// Decodes a raw `bRequest` value. `None` for codes outside the class
    /// set; the caller should stall those.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DfuRequest::Detach),
            1 => Some(DfuRequest::Dnload),
            2 => Some(DfuRequest::Upload),
            3 => Some(DfuRequest::GetStatus),
            4 => Some(DfuRequest::ClrStatus),
            5 => Some(DfuRequest::GetState),
            6 => Some(DfuRequest::Abort),
            _ => None,
        }
    }
}

/// Device state as reported by GetStatus and GetState. The values are the
/// DFU-mode section of the DFU 1.1 state taxonomy; the bootloader never
/// reports the two application-mode states.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuState {
    /// Device is waiting for requests.
    Idle = 2,
    /// Device has consumed a packet and is waiting for the host to solicit
    /// the status via GetStatus.
    DnloadSync = 3,
    /// Device is programming a received packet into its nonvolatile
    /// memories.
    DnBusy = 4,
    /// Device is processing a download operation, expecting more data.
    DnloadIdle = 5,
    /// Device has received the final packet of a transfer and is waiting for
    /// a GetStatus to begin the Manifestation phase.
    ManifestSync = 6,
    /// Device is in the Manifestation phase.
    Manifest = 7,
    /// Device has programmed its memories and is waiting for a reset.
    ManifestWaitReset = 8,
    /// Device is processing an upload operation.
    UploadIdle = 9,
    /// An error has occurred. Awaiting ClrStatus.
    Error = 10,
}

/// Status code reported in the first byte of the GetStatus reply.
///
/// The handler logic itself produces only [`DfuStatus::ErrCheckErased`]
/// (blank-check failure) and [`DfuStatus::ErrStalledPkt`] (request arrived
/// in the wrong state); the remaining codes are carried for wire
/// compatibility with DFU 1.1 hosts.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DfuStatus {
    /// No error condition is present.
    OK = 0x00,
    /// File is not targeted for use by this device.
    ErrTarget = 0x01,
    /// File is for this device but fails some vendor-specific test.
    ErrFile = 0x02,
    /// Device is unable to write memory.
    ErrWrite = 0x03,
    /// Memory erase function failed.
    ErrErase = 0x04,
    /// Memory erase check failed.
    ErrCheckErased = 0x05,
    /// Program memory function failed.
    ErrProg = 0x06,
    /// Programmed memory failed verification.
    ErrVerify = 0x07,
    /// Received address is out of range.
    ErrAddress = 0x08,
    /// Received Dnload with wLength = 0, but the device does not think it
    /// has all of the data yet.
    ErrNotdone = 0x09,
    /// Device's firmware is corrupt.
    ErrFirmware = 0x0A,
    /// Vendor-specific error.
    ErrVendor = 0x0B,
    /// Device detected unexpected USB reset signaling.
    ErrUsbr = 0x0C,
    /// Device detected unexpected power on reset.
    ErrPOR = 0x0D,
    /// Something went wrong, but the device does not know what it was.
    ErrUnknown = 0x0E,
    /// Device stalled an unexpected request.
    ErrStalledPkt = 0x0F,
}

/// Command group selector, byte 0 of the command record: memory write.
pub const CMD_GROUP_DOWNLOAD: u8 = 1;
/// Command group selector: memory read and blank check.
pub const CMD_GROUP_UPLOAD: u8 = 3;
/// Command group selector: bulk erase and application start.
pub const CMD_GROUP_EXEC: u8 = 4;
/// Command group selector: identity byte read.
pub const CMD_GROUP_READ: u8 = 5;
/// Command group selector: 64K bank select.
pub const CMD_GROUP_SELECT: u8 = 6;

/// Download-group target: program memory.
pub const DNLOAD_PROGRAM: u8 = 0x00;
/// Download-group target: configuration memory.
pub const DNLOAD_CONFIG: u8 = 0x01;
/// Download-group target: external serial store.
pub const DNLOAD_EXTERNAL: u8 = 0x10;

/// Upload-group subcommand: read program memory.
pub const UPLOAD_PROGRAM: u8 = 0x00;
/// Upload-group subcommand: blank-check program memory.
pub const UPLOAD_BLANK_PROGRAM: u8 = 0x01;
/// Upload-group subcommand: read configuration memory.
pub const UPLOAD_CONFIG: u8 = 0x02;
/// Upload-group subcommand: blank-check configuration memory.
pub const UPLOAD_BLANK_CONFIG: u8 = 0x03;
/// Upload-group subcommand: read the external store.
pub const UPLOAD_EXTERNAL: u8 = 0x10;
/// Upload-group subcommand: blank-check the external store.
pub const UPLOAD_BLANK_EXTERNAL: u8 = 0x11;

/// An inclusive absolute address range resolved from a command record.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Span {
    /// First address of the range.
    pub start: u32,
    /// Last address of the range, inclusive.
    pub end: u32,
}

impl Span {
    /// Number of bytes the range covers, zero when the span is inverted.
    pub fn len(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// True when the span covers no addresses (end below start).
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// A FLIP command record: one group byte plus five payload bytes, staged by
/// the first packet of a Dnload data stage.
///
/// The record is never cleared between commands. A request carrying fewer
/// than 6 bytes updates only a prefix of it, and a follow-up Upload may run
/// a record staled this way; hosts that speak the protocol always send full
/// records.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    /// Group selector, one of the `CMD_GROUP_*` values.
    pub group: u8,
    /// Subcommand byte followed by four operand bytes.
    pub data: [u8; 5],
}

impl Command {
    /// The all-zero record a session starts with.
    pub const fn empty() -> Self {
        Command {
            group: 0,
            data: [0; 5],
        }
    }

    /// Overwrites the record from the first packet of a Dnload data stage,
    /// taking at most `wLength - 1` payload bytes. Bytes the request does
    /// not carry keep their previous values.
    pub fn update(&mut self, packet: &[u8], length: u16) {
        let Some((&group, rest)) = packet.split_first() else {
            return;
        };
        self.group = group;
        let n = min(rest.len(), min(5, (length as usize).saturating_sub(1)));
        self.data[..n].copy_from_slice(&rest[..n]);
    }

    /// True for the blank-check subcommands of the Upload group.
    pub fn is_blank_check(&self) -> bool {
        self.group == CMD_GROUP_UPLOAD
            && matches!(
                self.data[0],
                UPLOAD_BLANK_PROGRAM | UPLOAD_BLANK_CONFIG | UPLOAD_BLANK_EXTERNAL
            )
    }

    /// True when the command runs during the Dnload request that staged it;
    /// false when it is cached until the follow-up Upload arrives.
    pub fn runs_immediately(&self) -> bool {
        self.group == CMD_GROUP_DOWNLOAD
            || self.group == CMD_GROUP_EXEC
            || self.group == CMD_GROUP_SELECT
            || self.is_blank_check()
    }

    /// Resolves the big-endian start/end operands against a bank byte into
    /// an inclusive span. Both offsets take the same bank snapshot; callers
    /// pass `bank = 0` for the internal memories, which are below 64K.
    pub fn span(&self, bank: u8) -> Span {
        let base = u32::from(bank) << 16;
        Span {
            start: base | u32::from(u16::from_be_bytes([self.data[1], self.data[2]])),
            end: base | u32::from(u16::from_be_bytes([self.data[3], self.data[4]])),
        }
    }
}
