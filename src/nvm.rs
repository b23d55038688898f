//! Memory backends.
//!
//! Three user-implemented primitive traits describe the hardware:
//! [`PageFlash`] for the self-programmable instruction flash, [`ByteNvm`]
//! for the byte-addressable configuration memory, and [`SerialFlash`] for
//! the page-buffered external store. An adapter wraps each primitive and
//! exposes the uniform [`NvmBackend`] interface the transfer engines
//! dispatch on, hiding the page-boundary sequencing differences.
//!
//! All primitives block until the hardware is ready and cannot report
//! failure; a stuck memory device hangs the transfer.

/// The value a fully erased cell reads back as, for all three memories.
pub const ERASED_FILL: u8 = 0xFF;

/// Self-programmable page flash, the memory the application runs from.
///
/// Writes go through a hardware page buffer: words are latched one at a
/// time with [`fill_word`](Self::fill_word) and committed in one operation
/// by [`program_page`](Self::program_page). Erasing a page does not disturb
/// the latched buffer.
pub trait PageFlash {
    /// Page size in bytes. Must be a power of two and even.
    const PAGE_SIZE: u32;
    /// First address of the protected boot region. Bulk erase stops here.
    const BOOT_START: u32;

    /// Erases the page containing `address` and waits for completion.
    fn erase_page(&mut self, address: u32);

    /// Latches one little-endian word into the page buffer at the given
    /// even address.
    fn fill_word(&mut self, address: u32, word: u16);

    /// Commits the latched buffer to the page containing `address` and
    /// waits for completion. Words not latched since the last commit
    /// program as 0xFFFF, leaving those bytes erased.
    fn program_page(&mut self, address: u32);

    /// Re-enables read access to the flash after an erase or commit.
    fn enable_read(&mut self);

    /// Reads one byte.
    fn read_byte(&mut self, address: u32) -> u8;
}

/// Byte-addressable nonvolatile configuration memory.
pub trait ByteNvm {
    /// Capacity in bytes.
    const SIZE: u32;

    /// Writes one byte and waits until the memory is ready again.
    fn write_byte(&mut self, address: u32, value: u8);

    /// Reads one byte.
    fn read_byte(&mut self, address: u32) -> u8;
}

/// External serial flash with a page-sized write buffer.
///
/// The chip stays selected between `begin_*` and
/// [`release`](Self::release); reads are sequential from the position
/// given to [`begin_read`](Self::begin_read).
pub trait SerialFlash {
    /// Page size in bytes.
    const PAGE_SIZE: u32;

    /// Opens the write buffer at `offset` within `page`.
    fn begin_page_write(&mut self, page: u32, offset: u32);

    /// Appends one byte to the open write buffer.
    fn push_byte(&mut self, value: u8);

    /// Programs the buffer into `page`, erasing it first, and waits for
    /// completion. Buffer bytes not pushed since the buffer was opened keep
    /// whatever the buffer previously held.
    fn commit_page(&mut self, page: u32);

    /// Starts a continuous read at `offset` within `page`.
    fn begin_read(&mut self, page: u32, offset: u32);

    /// Reads the next byte of a continuous read.
    fn read_byte(&mut self) -> u8;

    /// Erases the whole chip and waits for completion.
    fn chip_erase(&mut self);

    /// Deselects the chip, ending any open read or write buffer access.
    fn release(&mut self);
}

/// Uniform write/read/erase interface the transfer engines drive.
///
/// A download calls [`begin_write`](Self::begin_write) once, then
/// [`write_chunk`](Self::write_chunk) with strictly ascending contiguous
/// addresses, then [`end_write`](Self::end_write), which flushes whatever
/// the backend still buffers. Reads have no session: each
/// [`read_chunk`](Self::read_chunk) stands alone.
pub trait NvmBackend {
    /// Prepares a write transfer starting at `start`.
    fn begin_write(&mut self, start: u32);

    /// Writes the next `data.len()` bytes at `address`.
    fn write_chunk(&mut self, address: u32, data: &[u8]);

    /// Ends the write transfer, committing any partially filled page.
    fn end_write(&mut self);

    /// Reads `out.len()` bytes starting at `address`.
    fn read_chunk(&mut self, address: u32, out: &mut [u8]);

    /// Erases the whole memory, or its unprotected part.
    fn erase_all(&mut self);

    /// The value an erased cell reads back as.
    fn erased_fill(&self) -> u8 {
        ERASED_FILL
    }
}

/// [`NvmBackend`] over [`PageFlash`].
///
/// Bytes are paired by address parity into little-endian words. A page is
/// physically committed only once the write moves past it: entering a new
/// page erases it, then programs the page before it. The final page is
/// committed by `end_write`, and the page after the final write is never
/// erased, so a transfer touches exactly the pages of its span.
pub struct ProgramMemory<F: PageFlash> {
    flash: F,
    start: u32,
    cursor: u32,
    pending: Option<u8>,
}

impl<F: PageFlash> ProgramMemory<F> {
    /// Wraps a flash primitive.
    pub fn new(flash: F) -> Self {
        ProgramMemory {
            flash,
            start: 0,
            cursor: 0,
            pending: None,
        }
    }

    fn enter_page(&mut self, address: u32) {
        self.flash.erase_page(address);
        if address != self.start {
            self.flash.program_page(address - 1);
            self.flash.enable_read();
        }
    }
}

impl<F: PageFlash> NvmBackend for ProgramMemory<F> {
    fn begin_write(&mut self, start: u32) {
        self.start = start;
        self.cursor = start;
        self.pending = None;
    }

    fn write_chunk(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let a = address + i as u32;
            if a % F::PAGE_SIZE == 0 {
                self.enter_page(a);
            }
            if a & 1 == 0 {
                self.pending = Some(byte);
            } else {
                // A write starting on an odd address leaves the low byte
                // of its first word erased.
                let low = self.pending.take().unwrap_or(ERASED_FILL);
                self.flash.fill_word(a & !1, u16::from_le_bytes([low, byte]));
            }
        }
        self.cursor = address + data.len() as u32;
    }

    fn end_write(&mut self) {
        if let Some(low) = self.pending.take() {
            self.flash
                .fill_word(self.cursor - 1, u16::from_le_bytes([low, ERASED_FILL]));
        }
        if self.cursor > self.start {
            self.flash.program_page(self.cursor - 1);
            self.flash.enable_read();
        }
    }

    fn read_chunk(&mut self, address: u32, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.flash.read_byte(address + i as u32);
        }
    }

    fn erase_all(&mut self) {
        let mut page = 0;
        while page < F::BOOT_START {
            self.flash.erase_page(page);
            page += F::PAGE_SIZE;
        }
        self.flash.enable_read();
    }
}

/// [`NvmBackend`] over [`ByteNvm`]. Every byte is written and committed
/// individually, so there is nothing to flush.
pub struct ConfigMemory<E: ByteNvm> {
    nvm: E,
}

impl<E: ByteNvm> ConfigMemory<E> {
    /// Wraps a configuration memory primitive.
    pub fn new(nvm: E) -> Self {
        ConfigMemory { nvm }
    }
}

impl<E: ByteNvm> NvmBackend for ConfigMemory<E> {
    fn begin_write(&mut self, _start: u32) {}

    fn write_chunk(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.nvm.write_byte(address + i as u32, byte);
        }
    }

    fn end_write(&mut self) {}

    fn read_chunk(&mut self, address: u32, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.nvm.read_byte(address + i as u32);
        }
    }

    fn erase_all(&mut self) {
        for address in 0..E::SIZE {
            self.nvm.write_byte(address, ERASED_FILL);
        }
    }
}

/// [`NvmBackend`] over [`SerialFlash`].
///
/// Bytes stream into the chip's write buffer; crossing into a new page
/// commits the finished one and reopens the buffer at offset 0. A write
/// starting mid-page opens the buffer at that offset, so bytes below it
/// keep the buffer's previous content when the page commits.
pub struct ExternalStore<S: SerialFlash> {
    store: S,
    start: u32,
    cursor: u32,
}

impl<S: SerialFlash> ExternalStore<S> {
    /// Wraps a serial flash primitive.
    pub fn new(store: S) -> Self {
        ExternalStore {
            store,
            start: 0,
            cursor: 0,
        }
    }
}

impl<S: SerialFlash> NvmBackend for ExternalStore<S> {
    fn begin_write(&mut self, start: u32) {
        self.start = start;
        self.cursor = start;
        self.store
            .begin_page_write(start / S::PAGE_SIZE, start % S::PAGE_SIZE);
    }

    fn write_chunk(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let a = address + i as u32;
            if a != self.start && a % S::PAGE_SIZE == 0 {
                self.store.commit_page(a / S::PAGE_SIZE - 1);
                self.store.begin_page_write(a / S::PAGE_SIZE, 0);
            }
            self.store.push_byte(byte);
        }
        self.cursor = address + data.len() as u32;
    }

    fn end_write(&mut self) {
        if self.cursor > self.start {
            self.store.commit_page((self.cursor - 1) / S::PAGE_SIZE);
        }
        self.store.release();
    }

    fn read_chunk(&mut self, address: u32, out: &mut [u8]) {
        self.store
            .begin_read(address / S::PAGE_SIZE, address % S::PAGE_SIZE);
        for slot in out.iter_mut() {
            *slot = self.store.read_byte();
        }
        self.store.release();
    }

    fn erase_all(&mut self) {
        self.store.chip_erase();
    }
}
