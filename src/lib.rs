#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! Device half of a USB DFU bootloader speaking the FLIP memory commands.
//!
//! ## About
//!
//! Parts that ship with a factory DFU bootloader are reprogrammed over USB
//! with a 6-byte vendor command protocol carried inside the standard DFU
//! 1.1 requests: the host stages a command record with `DFU_DNLOAD`,
//! firmware data follows in the same transfer or flows back through
//! `DFU_UPLOAD`, and `DFU_GETSTATUS` walks the DFU state machine between
//! steps. This crate implements that engine for a device with three
//! nonvolatile memories: internal program flash, internal byte-addressable
//! configuration memory, and an external page-buffered serial flash.
//!
//! The library is a protocol implementation only. Code that actually
//! erases, programs, or reads the memories, and the USB endpoint driver,
//! are not part of the library and are provided by its user through the
//! [`PageFlash`], [`ByteNvm`], [`SerialFlash`], [`BootControl`], and
//! [`ControlPipe`] traits.
//!
//! ### Supported operations
//!
//! * Write (host to device) to any of the three memories
//! * Read (device to host) from any of the three memories
//! * Blank check with failure address readback
//! * Bulk erase, per memory
//! * Bootloader and device identity bytes
//! * 64K bank selection for the external store
//! * Application start by watchdog reset or direct jump
//!
//! ### Limitations
//!
//! * All transfers use the control endpoint only, and the engine processes
//! one request to completion before returning; a host that stalls
//! mid-transfer stalls the device.
//!
//! * iString in the `DFU_GETSTATUS` reply is always `0`. Vendor-specific
//! string error descriptions are not supported.
//!
//! * Firmware images are not authenticated.
//!
//! ## Flashing utilities
//!
//! Hosts that speak this protocol include:
//!
//! * [dfu-programmer](https://dfu-programmer.github.io/)
//! * Atmel/Microchip FLIP
//!
//! ## Example
//!
//! The example below focuses on [`DfuBootloader`]; target controller
//! initialization (clocks, USB peripheral, interrupts) is out of scope.
//! The trait implementations stand in for real hardware access.
//!
//! ```no_run
//! use flip_dfu::*;
//!
//! struct Flash;
//! impl PageFlash for Flash {
//!     const PAGE_SIZE: u32 = 128;
//!     const BOOT_START: u32 = 0x7000;
//!     fn erase_page(&mut self, address: u32) { /* page erase, busy wait */ }
//!     fn fill_word(&mut self, address: u32, word: u16) { /* latch into page buffer */ }
//!     fn program_page(&mut self, address: u32) { /* commit page buffer, busy wait */ }
//!     fn enable_read(&mut self) { /* re-enable read-while-write section */ }
//!     fn read_byte(&mut self, address: u32) -> u8 { 0xFF }
//! }
//!
//! struct Eeprom;
//! impl ByteNvm for Eeprom {
//!     const SIZE: u32 = 512;
//!     fn write_byte(&mut self, address: u32, value: u8) { /* write, busy wait */ }
//!     fn read_byte(&mut self, address: u32) -> u8 { 0xFF }
//! }
//!
//! struct SpiFlash;
//! impl SerialFlash for SpiFlash {
//!     const PAGE_SIZE: u32 = 256;
//!     fn begin_page_write(&mut self, page: u32, offset: u32) {}
//!     fn push_byte(&mut self, value: u8) {}
//!     fn commit_page(&mut self, page: u32) {}
//!     fn begin_read(&mut self, page: u32, offset: u32) {}
//!     fn read_byte(&mut self) -> u8 { 0xFF }
//!     fn chip_erase(&mut self) {}
//!     fn release(&mut self) {}
//! }
//!
//! struct Mcu;
//! impl BootControl for Mcu {
//!     fn arm_reset_watchdog(&mut self) { /* shortest watchdog period */ }
//!     fn start_application(&mut self, entry: u16) { /* reset peripherals, jump */ }
//! }
//!
//! // The integrator's EP0 driver, wrapped to expose the data and status
//! // stages of the current transfer.
//! struct Ep0;
//! impl ControlPipe for Ep0 {
//!     fn packet_size(&self) -> usize { 32 }
//!     fn receive(&mut self) -> &[u8] { &[] }
//!     fn consumed(&mut self) {}
//!     fn send(&mut self, data: &[u8]) {}
//!     fn complete_status(&mut self) {}
//! }
//!
//! let identity = Identity {
//!     version: 0x20,
//!     id1: 0xDC,
//!     id2: 0xFB,
//!     manufacturer: 0x1E,
//!     family: 0x94,
//!     product: 0x13,
//!     revision: 0x14,
//! };
//! let mut dfu = DfuBootloader::new(Flash, Eeprom, SpiFlash, Mcu, identity);
//!
//! // From the EP0 setup handler: decode the request and hand it over.
//! # struct Setup { request: u8, length: u16 }
//! # let setup = Setup { request: 3, length: 6 };
//! let mut pipe = Ep0;
//! if let Some(request) = DfuRequest::from_code(setup.request) {
//!     dfu.handle_request(&mut pipe, request, setup.length);
//! }
//! ```
//!

pub mod class;
pub mod descriptor;
pub mod nvm;
pub mod proto;
pub mod transport;

#[doc(inline)]
pub use crate::class::{BootControl, DfuBootloader, Identity};
#[doc(inline)]
pub use crate::nvm::{ByteNvm, PageFlash, SerialFlash};
#[doc(inline)]
pub use crate::proto::{DfuRequest, DfuState, DfuStatus};
#[doc(inline)]
pub use crate::transport::ControlPipe;
