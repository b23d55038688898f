#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use flip_dfu::class::{BootControl, DfuBootloader, Identity};
use flip_dfu::nvm::{ByteNvm, PageFlash, SerialFlash};
use flip_dfu::proto::DfuRequest;
use flip_dfu::transport::ControlPipe;

pub const PACKET: usize = 64;

pub const FLASH_SIZE: usize = 4096;
pub const FLASH_PAGE: usize = 128;
pub const BOOT_START: usize = 0x0F00;
pub const EEPROM_SIZE: usize = 512;
pub const STORE_PAGE: usize = 256;
pub const STORE_SIZE: usize = 3 * 64 * 1024;

// Seed memories as [0,0, 1,0, 2,0, ...]: each little-endian word holds its
// own index. Never all-0xFF, so erases are observable.
pub fn pattern(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    for (i, v) in buf.iter_mut().enumerate() {
        if i & 1 == 1 {
            *v = ((i >> 9) & 0xff) as u8;
        } else {
            *v = ((i >> 1) & 0xff) as u8;
        }
    }
    buf
}

/// Control pipe fed from a queue of OUT packets, recording everything the
/// device sends back.
pub struct MockPipe {
    size: usize,
    out: VecDeque<Vec<u8>>,
    current: Option<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub released: usize,
    pub status_completed: usize,
}

impl MockPipe {
    pub fn new(size: usize) -> Self {
        MockPipe {
            size,
            out: VecDeque::new(),
            current: None,
            sent: Vec::new(),
            released: 0,
            status_completed: 0,
        }
    }

    pub fn queue(&mut self, packet: &[u8]) {
        assert!(packet.len() <= self.size);
        self.out.push_back(packet.to_vec());
    }

    /// Queues `data` split into packet-size OUT packets.
    pub fn queue_split(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.size) {
            self.queue(chunk);
        }
    }

    pub fn drained(&self) -> bool {
        self.out.is_empty() && self.current.is_none()
    }

    pub fn pending(&self) -> usize {
        self.out.len()
    }

    /// All IN data of the transfer, concatenated.
    pub fn reply(&self) -> Vec<u8> {
        self.sent.concat()
    }
}

impl ControlPipe for MockPipe {
    fn packet_size(&self) -> usize {
        self.size
    }

    fn receive(&mut self) -> &[u8] {
        let packet = self.out.pop_front().expect("no OUT packet queued");
        self.current = Some(packet);
        self.current.as_deref().unwrap()
    }

    fn consumed(&mut self) {
        assert!(self.current.take().is_some(), "consumed without receive");
        self.released += 1;
    }

    fn send(&mut self, data: &[u8]) {
        assert!(data.len() <= self.size);
        self.sent.push(data.to_vec());
    }

    fn complete_status(&mut self) {
        self.status_completed += 1;
    }
}

/// Page flash with a word latch. Programming clears bits only; the latch
/// resets to 0xFF once a page is committed, and survives erases.
pub struct MockFlash {
    cells: Rc<RefCell<Vec<u8>>>,
    latch: [u8; FLASH_PAGE],
}

impl MockFlash {
    pub fn new() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let cells = Rc::new(RefCell::new(pattern(FLASH_SIZE)));
        let flash = MockFlash {
            cells: cells.clone(),
            latch: [0xFF; FLASH_PAGE],
        };
        (flash, cells)
    }
}

impl PageFlash for MockFlash {
    const PAGE_SIZE: u32 = FLASH_PAGE as u32;
    const BOOT_START: u32 = BOOT_START as u32;

    fn erase_page(&mut self, address: u32) {
        let base = (address as usize) & !(FLASH_PAGE - 1);
        self.cells.borrow_mut()[base..base + FLASH_PAGE].fill(0xFF);
    }

    fn fill_word(&mut self, address: u32, word: u16) {
        assert_eq!(address & 1, 0, "word fill at odd address");
        let off = (address as usize) & (FLASH_PAGE - 1);
        let bytes = word.to_le_bytes();
        self.latch[off] = bytes[0];
        self.latch[off + 1] = bytes[1];
    }

    fn program_page(&mut self, address: u32) {
        let base = (address as usize) & !(FLASH_PAGE - 1);
        let mut cells = self.cells.borrow_mut();
        for (i, latched) in self.latch.iter().enumerate() {
            cells[base + i] &= latched;
        }
        drop(cells);
        self.latch = [0xFF; FLASH_PAGE];
    }

    fn enable_read(&mut self) {}

    fn read_byte(&mut self, address: u32) -> u8 {
        self.cells.borrow()[address as usize]
    }
}

pub struct MockEeprom {
    cells: Rc<RefCell<Vec<u8>>>,
}

impl MockEeprom {
    pub fn new() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let cells = Rc::new(RefCell::new(pattern(EEPROM_SIZE)));
        let eeprom = MockEeprom {
            cells: cells.clone(),
        };
        (eeprom, cells)
    }
}

impl ByteNvm for MockEeprom {
    const SIZE: u32 = EEPROM_SIZE as u32;

    fn write_byte(&mut self, address: u32, value: u8) {
        self.cells.borrow_mut()[address as usize] = value;
    }

    fn read_byte(&mut self, address: u32) -> u8 {
        self.cells.borrow()[address as usize]
    }
}

/// Serial flash with one page buffer. The buffer keeps its previous
/// content between opens, like the hardware.
pub struct MockStore {
    cells: Rc<RefCell<Vec<u8>>>,
    buffer: [u8; STORE_PAGE],
    write_pos: usize,
    read_pos: usize,
    selected: bool,
}

impl MockStore {
    pub fn new() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let cells = Rc::new(RefCell::new(pattern(STORE_SIZE)));
        let store = MockStore {
            cells: cells.clone(),
            buffer: [0; STORE_PAGE],
            write_pos: 0,
            read_pos: 0,
            selected: false,
        };
        (store, cells)
    }
}

impl SerialFlash for MockStore {
    const PAGE_SIZE: u32 = STORE_PAGE as u32;

    fn begin_page_write(&mut self, _page: u32, offset: u32) {
        self.selected = true;
        self.write_pos = offset as usize;
    }

    fn push_byte(&mut self, value: u8) {
        assert!(self.selected, "push while deselected");
        self.buffer[self.write_pos] = value;
        self.write_pos += 1;
    }

    fn commit_page(&mut self, page: u32) {
        assert!(self.selected, "commit while deselected");
        let base = page as usize * STORE_PAGE;
        self.cells.borrow_mut()[base..base + STORE_PAGE].copy_from_slice(&self.buffer);
    }

    fn begin_read(&mut self, page: u32, offset: u32) {
        self.selected = true;
        self.read_pos = page as usize * STORE_PAGE + offset as usize;
    }

    fn read_byte(&mut self) -> u8 {
        assert!(self.selected, "read while deselected");
        let value = self.cells.borrow()[self.read_pos];
        self.read_pos += 1;
        value
    }

    fn chip_erase(&mut self) {
        self.cells.borrow_mut().fill(0xFF);
    }

    fn release(&mut self) {
        self.selected = false;
    }
}

#[derive(Default)]
pub struct ControlLog {
    pub watchdog: Cell<u32>,
    pub started: Cell<Option<u16>>,
}

pub struct MockControl {
    log: Rc<ControlLog>,
}

impl MockControl {
    pub fn new() -> (Self, Rc<ControlLog>) {
        let log = Rc::new(ControlLog::default());
        (MockControl { log: log.clone() }, log)
    }
}

impl BootControl for MockControl {
    fn arm_reset_watchdog(&mut self) {
        self.log.watchdog.set(self.log.watchdog.get() + 1);
    }

    fn start_application(&mut self, entry: u16) {
        self.log.started.set(Some(entry));
    }
}

pub const IDENTITY: Identity = Identity {
    version: 0x20,
    id1: 0xDC,
    id2: 0xFB,
    manufacturer: 0x1E,
    family: 0x94,
    product: 0x13,
    revision: 0x14,
};

pub type Dfu = DfuBootloader<MockFlash, MockEeprom, MockStore, MockControl>;

pub struct Device {
    pub dfu: Dfu,
    pub flash: Rc<RefCell<Vec<u8>>>,
    pub eeprom: Rc<RefCell<Vec<u8>>>,
    pub store: Rc<RefCell<Vec<u8>>>,
    pub control: Rc<ControlLog>,
}

pub fn device() -> Device {
    let (flash, flash_cells) = MockFlash::new();
    let (eeprom, eeprom_cells) = MockEeprom::new();
    let (store, store_cells) = MockStore::new();
    let (control, log) = MockControl::new();
    Device {
        dfu: DfuBootloader::new(flash, eeprom, store, control, IDENTITY),
        flash: flash_cells,
        eeprom: eeprom_cells,
        store: store_cells,
        control: log,
    }
}

/// Builds a 6-byte command record with big-endian start/end offsets.
pub fn record(group: u8, sub: u8, start: u16, end: u16) -> [u8; 6] {
    let s = start.to_be_bytes();
    let e = end.to_be_bytes();
    [group, sub, s[0], s[1], e[0], e[1]]
}

/// One Dnload transfer: a command record packet, then the payload split
/// into packet-size chunks. Asserts the device consumed everything.
pub fn dnload(dfu: &mut Dfu, rec: &[u8], payload: &[u8]) {
    let mut pipe = MockPipe::new(PACKET);
    pipe.queue(rec);
    pipe.queue_split(payload);
    dfu.handle_request(&mut pipe, DfuRequest::Dnload, rec.len() as u16);
    assert!(pipe.drained(), "device left OUT packets unread");
    assert_eq!(pipe.status_completed, 1);
}

/// A Dnload transfer carrying only a command record.
pub fn command(dfu: &mut Dfu, rec: &[u8]) {
    dnload(dfu, rec, &[]);
}

/// Stages a record, then fetches its reply with a follow-up Upload.
pub fn fetch(dfu: &mut Dfu, rec: &[u8]) -> Vec<u8> {
    command(dfu, rec);
    upload(dfu)
}

/// One Upload transfer against the cached record.
pub fn upload(dfu: &mut Dfu) -> Vec<u8> {
    let mut pipe = MockPipe::new(PACKET);
    dfu.handle_request(&mut pipe, DfuRequest::Upload, 0);
    assert_eq!(pipe.status_completed, 1);
    pipe.reply()
}

pub fn get_status(dfu: &mut Dfu) -> [u8; 6] {
    let mut pipe = MockPipe::new(PACKET);
    dfu.handle_request(&mut pipe, DfuRequest::GetStatus, 6);
    let reply = pipe.reply();
    assert_eq!(reply.len(), 6);
    reply.try_into().unwrap()
}

pub fn get_state(dfu: &mut Dfu) -> u8 {
    let mut pipe = MockPipe::new(PACKET);
    dfu.handle_request(&mut pipe, DfuRequest::GetState, 1);
    let reply = pipe.reply();
    assert_eq!(reply.len(), 1);
    reply[0]
}

/// A request with no data stage (Detach, ClrStatus, Abort).
pub fn plain_request(dfu: &mut Dfu, request: DfuRequest) {
    let mut pipe = MockPipe::new(PACKET);
    dfu.handle_request(&mut pipe, request, 0);
    assert!(pipe.sent.is_empty());
    assert_eq!(pipe.status_completed, 1);
}
