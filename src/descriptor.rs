//! Enumeration descriptor tables.
//!
//! The bootloader exposes a single configuration with one endpoint-less
//! DFU interface. Serving these tables is the integrator's job; they are
//! provided here because they are pure data and every port needs the same
//! bytes.

use core::cmp::min;

/// Vendor ID the stock FLIP hosts look for.
pub const VENDOR_ID: u16 = 0x03EB;
/// Product ID of the reference part.
pub const PRODUCT_ID: u16 = 0x2FF0;

/// Largest number of bytes the device accepts per control-write
/// transaction, reported in the functional descriptor.
pub const TRANSFER_SIZE: u16 = 3072;

/// Functional descriptor attribute: device detaches itself on Detach.
pub const ATTR_WILL_DETACH: u8 = 1 << 3;
/// Functional descriptor attribute: device can communicate during the
/// manifestation phase.
pub const ATTR_MANIFESTATION_TOLERANT: u8 = 1 << 2;
/// Functional descriptor attribute: device accepts Upload requests.
pub const ATTR_CAN_UPLOAD: u8 = 1 << 1;
/// Functional descriptor attribute: device accepts Dnload requests.
pub const ATTR_CAN_DOWNLOAD: u8 = 1 << 0;

/// The attribute byte this bootloader reports.
pub const FUNCTIONAL_ATTRIBUTES: u8 =
    ATTR_MANIFESTATION_TOLERANT | ATTR_CAN_UPLOAD | ATTR_CAN_DOWNLOAD;

/// String descriptor 0: the language table, US English only.
pub const LANGUAGE_STRING: [u8; 4] = [4, 0x03, 0x09, 0x04];

/// Builds the 18-byte device descriptor. The device identifies itself at
/// USB 1.0 with no class at the device level and no string indices.
pub const fn device_descriptor(vendor_id: u16, product_id: u16, ep0_size: u8) -> [u8; 18] {
    [
        // bLength, bDescriptorType
        18,
        0x01,
        // bcdUSB
        0x00,
        0x01,
        // bDeviceClass, bDeviceSubClass, bDeviceProtocol
        0x00,
        0x00,
        0x00,
        // bMaxPacketSize0
        ep0_size,
        // idVendor
        (vendor_id & 0xff) as u8,
        (vendor_id >> 8) as u8,
        // idProduct
        (product_id & 0xff) as u8,
        (product_id >> 8) as u8,
        // bcdDevice
        0x00,
        0x00,
        // iManufacturer, iProduct, iSerialNumber
        0x00,
        0x00,
        0x00,
        // bNumConfigurations
        0x01,
    ]
}

/// Builds the full 27-byte configuration descriptor set: configuration,
/// interface and DFU functional descriptors in one reply.
pub const fn configuration_descriptor_set(attributes: u8, transfer_size: u16) -> [u8; 27] {
    [
        // configuration: bLength, bDescriptorType
        9,
        0x02,
        // wTotalLength
        27,
        0,
        // bNumInterfaces, bConfigurationValue, iConfiguration
        1,
        1,
        0,
        // bmAttributes: bus powered
        0x80,
        // bMaxPower, 2 mA units
        50,
        // interface: bLength, bDescriptorType
        9,
        0x04,
        // bInterfaceNumber, bAlternateSetting
        0,
        0,
        // bNumEndpoints: control pipe only
        0,
        // bInterfaceClass, bInterfaceSubClass, bInterfaceProtocol
        0xFE,
        0x01,
        0x00,
        // iInterface
        0,
        // functional: bLength, bDescriptorType
        9,
        0x21,
        // bmAttributes
        attributes,
        // wDetachTimeOut
        0,
        0,
        // wTransferSize
        (transfer_size & 0xff) as u8,
        (transfer_size >> 8) as u8,
        // bcdDFUVersion
        0x01,
        0x01,
    ]
}

/// Encodes `text` as a UTF-16LE string descriptor into `out` and returns
/// the descriptor length. The text is truncated to what `out` (and the
/// one-byte length field) can hold.
pub fn write_string_descriptor(text: &str, out: &mut [u8]) -> usize {
    if out.len() < 2 {
        return 0;
    }
    let cap = min(out.len(), 255);
    let mut n = 2;
    for unit in text.encode_utf16() {
        if n + 2 > cap {
            break;
        }
        let bytes = unit.to_le_bytes();
        out[n] = bytes[0];
        out[n + 1] = bytes[1];
        n += 2;
    }
    // bLength, bDescriptorType
    out[0] = n as u8;
    out[1] = 0x03;
    n
}
