//! The bootloader engine: session state machine, request dispatch, and the
//! multi-packet transfer engines.

use core::cmp::min;

use crate::nvm::{
    ByteNvm, ConfigMemory, ExternalStore, NvmBackend, PageFlash, ProgramMemory, SerialFlash,
};
use crate::proto::{self, Command, DfuRequest, DfuState, DfuStatus, Span};
use crate::transport::{ControlPipe, MAX_PACKET_SIZE};

/// Identity bytes served by the info registry (command group 5). The
/// values identify the bootloader build and the part it runs on; hosts use
/// them to pick the right firmware image.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identity {
    /// Bootloader version, major nibble then minor nibble.
    pub version: u8,
    /// First bootloader ID byte.
    pub id1: u8,
    /// Second bootloader ID byte.
    pub id2: u8,
    /// Manufacturer code.
    pub manufacturer: u8,
    /// Device family code.
    pub family: u8,
    /// Product name code.
    pub product: u8,
    /// Product revision code.
    pub revision: u8,
}

impl Identity {
    /// Looks up one identity byte by (category, item) key. Category 0x00
    /// holds the bootloader bytes (items 0, 1, 2), category 0x01 the device
    /// signature bytes (items 0x30, 0x31, 0x60, 0x61). Unknown keys return
    /// `None` and the reply stays empty.
    pub fn read(&self, category: u8, item: u8) -> Option<u8> {
        match (category, item) {
            (0x00, 0x00) => Some(self.version),
            (0x00, 0x01) => Some(self.id1),
            (0x00, 0x02) => Some(self.id2),
            (0x01, 0x30) => Some(self.manufacturer),
            (0x01, 0x31) => Some(self.family),
            (0x01, 0x60) => Some(self.product),
            (0x01, 0x61) => Some(self.revision),
            _ => None,
        }
    }
}

/// Hardware hooks for leaving the bootloader.
pub trait BootControl {
    /// Arms a short hardware watchdog so a full reset follows once the
    /// current transaction completes.
    fn arm_reset_watchdog(&mut self);

    /// Transfers control to the application at `entry` (0 for the reset
    /// vector), after restoring the hardware to its reset state. Called
    /// once the terminating transaction has been acknowledged; normally
    /// does not return.
    fn start_application(&mut self, entry: u16);
}

#[derive(Clone, Copy)]
struct Session {
    state: DfuState,
    status: DfuStatus,
    command: Command,
    bank: u8,
    non_blank_addr: u32,
    app_entry: u16,
    leaving: bool,
}

impl Session {
    fn new() -> Self {
        Session {
            state: DfuState::Idle,
            status: DfuStatus::OK,
            command: Command::empty(),
            bank: 0,
            non_blank_addr: 0,
            app_entry: 0,
            leaving: false,
        }
    }

    fn new_state_ok(&mut self, state: DfuState) {
        self.new_state_status(state, DfuStatus::OK);
    }

    fn new_state_status(&mut self, state: DfuState, status: DfuStatus) {
        self.status = status;
        self.state = state;
    }

    // GetStatus advances the synchronization states before the reply is
    // built, so the host sees the post-transition state.
    fn update_state(&mut self) {
        self.state = match self.state {
            DfuState::DnloadSync => DfuState::DnloadIdle,
            DfuState::ManifestSync => DfuState::Idle,
            DfuState::UploadIdle => DfuState::Idle,
            other => other,
        };
    }

    /// Streams the data stage into a backend, one packet at a time. Only
    /// `span.len()` bytes are written; trailing bytes of the final packet
    /// are discarded.
    fn write_range(
        &mut self,
        backend: &mut dyn NvmBackend,
        pipe: &mut impl ControlPipe,
        span: Span,
    ) {
        if self.state != DfuState::Idle {
            self.new_state_status(DfuState::Error, DfuStatus::ErrStalledPkt);
            return;
        }
        backend.begin_write(span.start);
        let mut cursor = span.start;
        while cursor <= span.end {
            let packet = pipe.receive();
            self.state = DfuState::DnBusy;
            let take = min(packet.len() as u32, span.end - cursor + 1) as usize;
            backend.write_chunk(cursor, &packet[..take]);
            pipe.consumed();
            cursor += take as u32;
            if cursor <= span.end {
                self.state = DfuState::DnloadSync;
            }
        }
        backend.end_write();
        self.state = DfuState::ManifestSync;
    }

    /// Streams a backend range to the host in packet-size chunks, the last
    /// one short. An inverted span sends nothing.
    fn read_range(
        &mut self,
        backend: &mut dyn NvmBackend,
        pipe: &mut impl ControlPipe,
        span: Span,
    ) {
        if self.state != DfuState::Idle {
            self.new_state_status(DfuState::Error, DfuStatus::ErrStalledPkt);
            return;
        }
        self.state = DfuState::UploadIdle;
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let size = min(pipe.packet_size(), MAX_PACKET_SIZE) as u32;
        let mut cursor = span.start;
        while cursor <= span.end {
            let n = min(size, span.end - cursor + 1) as usize;
            backend.read_chunk(cursor, &mut buf[..n]);
            pipe.send(&buf[..n]);
            cursor += n as u32;
        }
    }

    /// Scans a range for the erased fill. Stops at the first mismatch,
    /// recording its address; a fully blank range changes nothing, which
    /// is the pass signal. Runs in any state.
    fn blank_check(&mut self, backend: &mut dyn NvmBackend, span: Span) {
        let fill = backend.erased_fill();
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut cursor = span.start;
        while cursor <= span.end {
            let n = min(buf.len() as u32, span.end - cursor + 1) as usize;
            backend.read_chunk(cursor, &mut buf[..n]);
            for (i, &byte) in buf[..n].iter().enumerate() {
                if byte != fill {
                    self.non_blank_addr = cursor + i as u32;
                    self.new_state_status(DfuState::Error, DfuStatus::ErrCheckErased);
                    return;
                }
            }
            cursor += n as u32;
        }
    }
}

impl From<Session> for [u8; 6] {
    fn from(s: Session) -> Self {
        [
            // bStatus
            s.status as u8,
            // bwPollTimeout: zero, the work is done before the reply goes out
            0,
            0,
            0,
            // bState
            s.state as u8,
            // iString
            0,
        ]
    }
}

/// The bootloader engine: DFU request handling, the FLIP command state
/// machine, and the transfer engines over the three memory backends.
///
/// One instance lives for the whole bootloader session. The integrator's
/// EP0 driver decodes class-specific setup packets and feeds them to
/// [`handle_request`](Self::handle_request) together with a
/// [`ControlPipe`] for the transfer's data and status stages.
pub struct DfuBootloader<F: PageFlash, E: ByteNvm, S: SerialFlash, C: BootControl> {
    session: Session,
    program: ProgramMemory<F>,
    config: ConfigMemory<E>,
    external: ExternalStore<S>,
    control: C,
    identity: Identity,
}

impl<F: PageFlash, E: ByteNvm, S: SerialFlash, C: BootControl> DfuBootloader<F, E, S, C> {
    /// Creates the engine in the Idle state, taking ownership of the
    /// memory primitives.
    pub fn new(flash: F, config: E, store: S, control: C, identity: Identity) -> Self {
        DfuBootloader {
            session: Session::new(),
            program: ProgramMemory::new(flash),
            config: ConfigMemory::new(config),
            external: ExternalStore::new(store),
            control,
            identity,
        }
    }

    /// Processes one class-specific control request.
    ///
    /// The caller has already decoded the setup packet: `request` is its
    /// `bRequest` code and `length` is `wLength`. The call blocks through
    /// the whole transfer, consuming or producing data-stage packets on
    /// `pipe`, and completes the status stage before returning. After the
    /// terminating empty Dnload is acknowledged, control passes to the
    /// application and the call does not return.
    pub fn handle_request(
        &mut self,
        pipe: &mut impl ControlPipe,
        request: DfuRequest,
        length: u16,
    ) {
        match request {
            DfuRequest::Detach => {}
            DfuRequest::Dnload => self.download(pipe, length),
            DfuRequest::Upload => self.upload(pipe),
            DfuRequest::GetStatus => self.get_status(pipe),
            DfuRequest::GetState => self.get_state(pipe),
            DfuRequest::ClrStatus | DfuRequest::Abort => self.clear_status(),
        }
        pipe.complete_status();
        if self.session.leaving {
            self.session.leaving = false;
            self.control.start_application(self.session.app_entry);
        }
    }

    // An empty Dnload is the signal to leave the bootloader. A non-empty
    // one stages the command record from the first packet; Download, Exec,
    // Select and the blank checks then run during this same request, the
    // rest wait for the follow-up Upload.
    fn download(&mut self, pipe: &mut impl ControlPipe, length: u16) {
        if length == 0 {
            self.session.leaving = true;
            return;
        }
        let packet = pipe.receive();
        self.session.command.update(packet, length);
        pipe.consumed();
        if self.session.command.runs_immediately() {
            self.run_command(pipe);
        }
    }

    // While a blank-check record is cached, Upload reports where the last
    // scan stopped instead of running the record again.
    fn upload(&mut self, pipe: &mut impl ControlPipe) {
        if self.session.command.is_blank_check() {
            let addr = self.session.non_blank_addr as u16;
            pipe.send(&addr.to_le_bytes());
        } else {
            self.run_command(pipe);
        }
    }

    fn get_status(&mut self, pipe: &mut impl ControlPipe) {
        self.session.update_state();
        let reply: [u8; 6] = self.session.into();
        pipe.send(&reply);
    }

    fn get_state(&mut self, pipe: &mut impl ControlPipe) {
        pipe.send(&[self.session.state as u8]);
    }

    fn clear_status(&mut self) {
        self.session.new_state_ok(DfuState::Idle);
    }

    fn run_command(&mut self, pipe: &mut impl ControlPipe) {
        let DfuBootloader {
            session,
            program,
            config,
            external,
            control,
            identity,
        } = self;
        let command = session.command;
        match command.group {
            proto::CMD_GROUP_DOWNLOAD => {
                let (backend, bank): (&mut dyn NvmBackend, u8) = match command.data[0] {
                    proto::DNLOAD_PROGRAM => (program, 0),
                    proto::DNLOAD_CONFIG => (config, 0),
                    proto::DNLOAD_EXTERNAL => (external, session.bank),
                    _ => return,
                };
                session.write_range(backend, pipe, command.span(bank));
            }
            proto::CMD_GROUP_UPLOAD => match command.data[0] {
                proto::UPLOAD_PROGRAM | proto::UPLOAD_CONFIG | proto::UPLOAD_EXTERNAL => {
                    let (backend, bank): (&mut dyn NvmBackend, u8) = match command.data[0] {
                        proto::UPLOAD_PROGRAM => (program, 0),
                        proto::UPLOAD_CONFIG => (config, 0),
                        _ => (external, session.bank),
                    };
                    session.read_range(backend, pipe, command.span(bank));
                }
                proto::UPLOAD_BLANK_PROGRAM
                | proto::UPLOAD_BLANK_CONFIG
                | proto::UPLOAD_BLANK_EXTERNAL => {
                    let (backend, bank): (&mut dyn NvmBackend, u8) = match command.data[0] {
                        proto::UPLOAD_BLANK_PROGRAM => (program, 0),
                        proto::UPLOAD_BLANK_CONFIG => (config, 0),
                        _ => (external, session.bank),
                    };
                    session.blank_check(backend, command.span(bank));
                }
                _ => {}
            },
            proto::CMD_GROUP_EXEC => match (command.data[0], command.data[1]) {
                // bulk erases
                (0x00, 0xFF) => program.erase_all(),
                (0x01, 0xFF) => config.erase_all(),
                (0x10, 0xFF) => external.erase_all(),
                // set configuration byte, accepted without effect
                (0x01, _) => {}
                // start the application once this transaction completes
                (0x03, 0x00) => control.arm_reset_watchdog(),
                (0x03, 0x01) => {
                    session.app_entry = u16::from_be_bytes([command.data[3], command.data[4]]);
                }
                _ => {}
            },
            proto::CMD_GROUP_READ => match identity.read(command.data[0], command.data[1]) {
                Some(value) => pipe.send(&[value]),
                None => pipe.send(&[]),
            },
            proto::CMD_GROUP_SELECT => {
                if command.data[0] == 0x03 && command.data[1] == 0x00 {
                    session.bank = command.data[2];
                }
            }
            _ => {}
        }
    }
}
