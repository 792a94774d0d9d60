//! The application-supplied side of the DFU protocol: capability flags, the
//! fallible-callback error type, and the [`DfuHandler`] trait itself.

use crate::state::{DfuState, DfuStatus};

/// Device capability bits, matching the `bmAttributes` field of the DFU
/// functional descriptor (USB DFU 1.1 §4.1.3, table 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Attributes(u8);

impl Attributes {
    /// `bitCanDnload`: the device supports firmware download (host to device).
    pub const CAN_DOWNLOAD: Attributes = Attributes(0x01);
    /// `bitCanUpload`: the device supports firmware upload (device to host).
    pub const CAN_UPLOAD: Attributes = Attributes(0x02);
    /// `bitManifestationTolerant`: the device can continue answering USB
    /// requests during and after manifestation without a bus reset.
    pub const MANIFESTATION_TOLERANT: Attributes = Attributes(0x04);
    /// `bitWillDetach`: the device generates its own detach-attach sequence
    /// on `DFU_DETACH` rather than waiting for a USB reset.
    pub const WILL_DETACH: Attributes = Attributes(0x08);
    /// No capability bits set.
    pub const NONE: Attributes = Attributes(0x00);

    /// Builds an `Attributes` value from a raw `bmAttributes` byte.
    pub const fn from_bits(bits: u8) -> Self {
        Attributes(bits & 0x0F)
    }

    /// Returns the raw `bmAttributes` byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit set in `other` is also set in `self`.
    pub const fn contains(self, other: Attributes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for Attributes {
    type Output = Attributes;
    fn bitor(self, rhs: Attributes) -> Attributes {
        Attributes(self.0 | rhs.0)
    }
}

/// The control-transfer stage a non-standard request arrived on.
///
/// Mirrors the three stages `spec.md` requires the dispatcher to
/// distinguish (§4.4): `usb-device` only ever calls back for the
/// combined setup+data stage on `control_out`/`control_in`, and the
/// acknowledge stage has no application-visible hook, so only `Setup` is
/// currently produced; the other two variants exist so the
/// `nonstandard_request` signature does not need to change if a future
/// `usb-device` release splits the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ControlStage {
    /// Setup (and, for `usb-device`, data) stage of the control transfer.
    Setup,
    /// Data stage of a control transfer whose setup stage was already seen.
    Data,
    /// Acknowledge (status) stage of the control transfer.
    Ack,
}

/// Error reported by a fallible [`DfuHandler`] callback.
///
/// Discriminants match [`DfuStatus`]'s non-`Ok` variants one for one, so the
/// conversion to [`DfuStatus`] is a plain reinterpretation of the
/// discriminant and cannot fail.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DfuError {
    /// File is not targeted for use by this device.
    Target = DfuStatus::ErrTarget as u8,
    /// File is for this device but fails some vendor-specific verification test.
    File = DfuStatus::ErrFile as u8,
    /// Device is unable to write memory.
    Write = DfuStatus::ErrWrite as u8,
    /// Memory erase function failed.
    Erase = DfuStatus::ErrErase as u8,
    /// Memory erase check failed.
    CheckErased = DfuStatus::ErrCheckErased as u8,
    /// Program memory function failed.
    Prog = DfuStatus::ErrProg as u8,
    /// Programmed memory failed verification.
    Verify = DfuStatus::ErrVerify as u8,
    /// Cannot program memory due to a received address that is out of range.
    Address = DfuStatus::ErrAddress as u8,
    /// Received `DFU_DNLOAD` with `wLength == 0`, but not all data has been received.
    NotDone = DfuStatus::ErrNotdone as u8,
    /// Device's firmware is corrupt. It cannot return to run-time operation.
    Firmware = DfuStatus::ErrFirmware as u8,
    /// A vendor-specific error. `iString` in `DFU_GETSTATUS` will reflect it.
    Vendor = DfuStatus::ErrVendor as u8,
    /// Something went wrong, but the device does not know what it was.
    Unknown = DfuStatus::ErrUnknown as u8,
}

impl From<DfuError> for DfuStatus {
    fn from(err: DfuError) -> Self {
        match err {
            DfuError::Target => DfuStatus::ErrTarget,
            DfuError::File => DfuStatus::ErrFile,
            DfuError::Write => DfuStatus::ErrWrite,
            DfuError::Erase => DfuStatus::ErrErase,
            DfuError::CheckErased => DfuStatus::ErrCheckErased,
            DfuError::Prog => DfuStatus::ErrProg,
            DfuError::Verify => DfuStatus::ErrVerify,
            DfuError::Address => DfuStatus::ErrAddress,
            DfuError::NotDone => DfuStatus::ErrNotdone,
            DfuError::Firmware => DfuStatus::ErrFirmware,
            DfuError::Vendor => DfuStatus::ErrVendor,
            DfuError::Unknown => DfuStatus::ErrUnknown,
        }
    }
}

/// The application-side collaborator contract required by [`crate::DfuClass`].
///
/// Every method is called from the USB stack's control-transfer execution
/// context (see `spec.md` §5); none of them may block. Methods without a
/// provided default are required; the rest default to the behavior
/// `spec.md` §6 documents for an absent optional callback.
pub trait DfuHandler {
    /// Returns the device's capability bitmask. Queried once at
    /// construction and again after every bus reset.
    fn attributes(&mut self) -> Attributes;

    /// Returns `true` if the currently stored firmware is valid and the
    /// device may safely reboot into run-time mode.
    fn firmware_valid_check(&mut self) -> bool;

    /// Invoked when the state machine transitions to `AppIdle`. Expected to
    /// reset the USB stack into run-time mode; on real hardware this does
    /// not return.
    fn reboot_to_rt(&mut self);

    /// Delivers one downloaded block to be programmed. `block_num` is the
    /// `wValue` of the triggering `DFU_DNLOAD` request; `data` is the bytes
    /// actually received for this block.
    fn download_block(&mut self, block_num: u16, data: &[u8]) -> Result<(), DfuError>;

    /// Fills `buf` with up to `buf.len()` bytes of image data for block
    /// `block_num` and returns the number of bytes written. Returning fewer
    /// bytes than requested ends the upload session.
    fn upload_block(&mut self, block_num: u16, buf: &mut [u8]) -> Result<usize, DfuError>;

    /// Returns `true` once every byte of the image has been received and
    /// programmed, i.e. it is safe to begin manifestation.
    fn data_done_check(&mut self) -> Result<bool, DfuError>;

    /// Starts the platform poll timer with the given `bwPollTimeout` value
    /// (3 bytes, little-endian milliseconds). The platform is expected to
    /// call [`crate::DfuClass::poll_timeout_expired`] once the timer fires.
    fn start_poll_timeout(&mut self, timeout: [u8; 3]);

    /// Returns the `bwPollTimeout` value to report and to start the next
    /// timer with. Defaults to zero (no wait required).
    fn poll_timeout(&mut self) -> [u8; 3] {
        [0, 0, 0]
    }

    /// Returns `wDetachTimeOut` for the DFU functional descriptor, in
    /// milliseconds. Queried once at construction and again after every bus
    /// reset, alongside [`DfuHandler::attributes`]. Defaults to `250`, the
    /// value the teacher crate itself defaults to.
    fn detach_timeout_ms(&mut self) -> u16 {
        250
    }

    /// Returns `wTransferSize` for the DFU functional descriptor: the
    /// maximum number of bytes the device accepts per `DFU_DNLOAD`/returns
    /// per `DFU_UPLOAD`. Queried once at construction and again after every
    /// bus reset. Defaults to `128`, matching the teacher crate's default
    /// and the typical `usb-device` control buffer size.
    fn transfer_size(&mut self) -> u16 {
        128
    }

    /// Returns the string descriptor index to report in `iString`.
    /// Defaults to `0` (no description available).
    fn status_string_index(&mut self) -> u8 {
        0
    }

    /// Called when `DFU_ABORT` is accepted from `DfuDnloadIdle` or
    /// `DfuUploadIdle`. Defaults to a no-op.
    fn on_abort(&mut self) {}

    /// Called on every bus reset before the default reset logic runs. If
    /// this returns `Some(state)`, that state is used as-is and the default
    /// reset logic (`spec.md` §4.3) is skipped. Defaults to `None` (no
    /// override).
    fn usb_reset_override(&mut self, _port: u8, _state: DfuState) -> Option<DfuState> {
        None
    }

    /// Offered a chance to handle a class-unrecognized, non-standard setup
    /// request before the dispatcher stalls it. Returns `true` if handled.
    /// Defaults to `false` (unhandled).
    fn nonstandard_request(&mut self, _port: u8, _stage: ControlStage, _request: u8) -> bool {
        false
    }
}
