//! DFU 1.1 protocol states and status codes.

/// DFU 1.1 device state, as reported by `DFU_GETSTATE`/`DFU_GETSTATUS`.
///
/// Discriminants match the USB DFU 1.1 specification table 6.1 and must not
/// be reordered: they are sent on the wire as `bState`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DfuState {
    /// Device is running its normal application.
    AppIdle = 0,
    /// Device is running its normal application, has received `DFU_DETACH`,
    /// and is waiting for a USB reset.
    AppDetach = 1,
    /// Device is operating in DFU mode and is waiting for requests.
    DfuIdle = 2,
    /// Device has received a block and is waiting for the host to solicit
    /// the status via `DFU_GETSTATUS`.
    DfuDnloadSync = 3,
    /// Device is programming a block into nonvolatile memory.
    DfuDnBusy = 4,
    /// Device is processing a download operation and expects further
    /// `DFU_DNLOAD` requests.
    DfuDnloadIdle = 5,
    /// Device received the final block and is waiting for `DFU_GETSTATUS` to
    /// begin manifestation, or has finished manifestation and is waiting for
    /// `DFU_GETSTATUS` before returning to idle (manifestation-tolerant
    /// devices only).
    DfuManifestSync = 6,
    /// Device is in the manifestation phase.
    DfuManifest = 7,
    /// Device has programmed its memories and is waiting for a USB reset or
    /// power-on reset (manifestation-intolerant devices only).
    DfuManifestWaitReset = 8,
    /// Device is processing an upload operation and expects further
    /// `DFU_UPLOAD` requests.
    DfuUploadIdle = 9,
    /// An error has occurred. Awaiting `DFU_CLRSTATUS`.
    DfuError = 10,
}

impl From<DfuState> for u8 {
    fn from(state: DfuState) -> Self {
        state as u8
    }
}

/// DFU 1.1 status code, as reported in `bStatus` of `DFU_GETSTATUS`.
///
/// Discriminants match the USB DFU 1.1 specification table 6.2.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DfuStatus {
    /// No error condition is present.
    Ok = 0x00,
    /// File is not targeted for use by this device.
    ErrTarget = 0x01,
    /// File is for this device but fails some vendor-specific verification test.
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
    /// Cannot program memory due to a received address that is out of range.
    ErrAddress = 0x08,
    /// Received `DFU_DNLOAD` with `wLength == 0`, but the device does not
    /// think it has all of the data yet.
    ErrNotdone = 0x09,
    /// Device's firmware is corrupt. It cannot return to run-time operation.
    ErrFirmware = 0x0A,
    /// `iString` indicates a vendor-specific error.
    ErrVendor = 0x0B,
    /// Device detected unexpected USB reset signaling.
    ErrUsbr = 0x0C,
    /// Device detected unexpected power-on reset.
    ErrPor = 0x0D,
    /// Something went wrong, but the device does not know what it was.
    ErrUnknown = 0x0E,
    /// Device stalled an unexpected request.
    ErrStalledPkt = 0x0F,
}

impl From<DfuStatus> for u8 {
    fn from(status: DfuStatus) -> Self {
        status as u8
    }
}
