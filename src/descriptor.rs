//! Free-standing interface-descriptor walk (`spec.md` §4.2).
//!
//! `usb-device` devices only *write* their own descriptors during
//! enumeration — the host parses them, not the device. This module exists
//! for the DFU-mode "interface open" operation described in the spec, which
//! a `DfuHandler` implementation or a test can use to validate a descriptor
//! byte sequence the same way the original state machine would. It is not
//! on the hot path of `DfuClass` itself.

/// DFU application-specific subclass (`bInterfaceSubClass`).
pub const USB_SUBCLASS_DFU: u8 = 0x01;
/// DFU-mode protocol code (`bInterfaceProtocol`).
pub const USB_PROTOCOL_DFU_MODE: u8 = 0x02;
/// DFU functional descriptor type (`bDescriptorType`).
pub const DFU_FUNCTIONAL_DESCRIPTOR_TYPE: u8 = 0x21;

const INTERFACE_DESCRIPTOR_LEN: usize = 9;

/// Walks an interface descriptor (and, if present, the DFU functional
/// descriptor that follows it), validating subclass and protocol.
///
/// `bytes` must start at the interface descriptor itself. `remaining` is
/// the number of descriptor bytes left in the enclosing configuration
/// descriptor, used to decide whether a following functional descriptor
/// actually belongs to this interface.
///
/// Returns `0` if `bytes` is too short, or if the subclass/protocol don't
/// match DFU mode ("not mine" per `spec.md` §4.2). Otherwise returns the
/// number of descriptor bytes consumed: 9, or 9 plus the functional
/// descriptor's own length if one immediately follows.
pub fn parse_interface_descriptor(bytes: &[u8], remaining: usize) -> usize {
    if bytes.len() < INTERFACE_DESCRIPTOR_LEN || remaining < INTERFACE_DESCRIPTOR_LEN {
        return 0;
    }

    let length = bytes[0] as usize;
    let descriptor_type = bytes[1];
    let subclass = bytes[6];
    let protocol = bytes[7];

    if descriptor_type != 0x04 || length != INTERFACE_DESCRIPTOR_LEN {
        return 0;
    }
    if subclass != USB_SUBCLASS_DFU || protocol != USB_PROTOCOL_DFU_MODE {
        return 0;
    }

    let mut consumed = INTERFACE_DESCRIPTOR_LEN;

    if remaining > consumed + 1 {
        let rest = &bytes[consumed..];
        if rest.len() >= 2 && rest[1] == DFU_FUNCTIONAL_DESCRIPTOR_TYPE {
            let functional_len = rest[0] as usize;
            if functional_len >= 2 && remaining >= consumed + functional_len {
                consumed += functional_len;
            }
        }
    }

    consumed
}
