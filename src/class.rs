//! The `usb-device` `UsbClass` implementation: control-transfer dispatcher,
//! bus-reset hook, poll-timeout hook, and the full DFU 1.1 state machine.

use core::cmp::min;
use core::marker::PhantomData;
use usb_device::{class_prelude::*, control::Request};

use crate::context::{status_payload, DfuContext};
use crate::descriptor::{DFU_FUNCTIONAL_DESCRIPTOR_TYPE, USB_PROTOCOL_DFU_MODE, USB_SUBCLASS_DFU};
use crate::handler::{Attributes, DfuHandler};
use crate::state::{DfuState, DfuStatus};

const USB_CLASS_APPLICATION_SPECIFIC: u8 = 0xFE;
/// `bcdDFUVersion`: USB DFU 1.1.
const DFU_VERSION: u16 = 0x011a;

#[allow(dead_code)]
const DFU_DETACH: u8 = 0x00;
const DFU_DNLOAD: u8 = 0x01;
const DFU_UPLOAD: u8 = 0x02;
const DFU_GETSTATUS: u8 = 0x03;
const DFU_CLRSTATUS: u8 = 0x04;
const DFU_GETSTATE: u8 = 0x05;
const DFU_ABORT: u8 = 0x06;

/// Standard `SET_INTERFACE` request code (USB 2.0 §9.4.10).
const STD_SET_INTERFACE: u8 = 11;

/// Returns `true` for the eight states in which the device is actively
/// running the DFU-mode protocol (as opposed to run-time mode or the error
/// state, both of which a bus reset handles separately; see `reset()`).
fn is_normal_dfu_state(state: DfuState) -> bool {
    matches!(
        state,
        DfuState::DfuIdle
            | DfuState::DfuDnloadSync
            | DfuState::DfuDnBusy
            | DfuState::DfuDnloadIdle
            | DfuState::DfuManifestSync
            | DfuState::DfuManifest
            | DfuState::DfuManifestWaitReset
            | DfuState::DfuUploadIdle
    )
}

/// USB DFU 1.1 protocol class implementation for `usb-device`.
///
/// Generic over the bus (`B`, as with any `usb-device` class) and over the
/// application collaborator `H: DfuHandler`, which owns the flash-level
/// details this class does not: reading/writing image bytes, validating
/// firmware, and timekeeping.
pub struct DfuClass<B: UsbBus, H: DfuHandler> {
    if_num: InterfaceNumber,
    ctx: DfuContext,
    handler: H,
    _bus: PhantomData<B>,
}

impl<B: UsbBus, H: DfuHandler> DfuClass<B, H> {
    /// Creates a new `DfuClass`, querying `handler` once for its capability
    /// bitmask and descriptor fields. Starts in `DfuState::AppDetach`; the
    /// next bus reset advances it to `DfuState::DfuIdle`.
    pub fn new(alloc: &UsbBusAllocator<B>, mut handler: H) -> Self {
        let attributes = handler.attributes();
        let detach_timeout_ms = handler.detach_timeout_ms();
        let transfer_size = handler.transfer_size();
        Self {
            if_num: alloc.interface(),
            ctx: DfuContext::new(attributes, detach_timeout_ms, transfer_size),
            handler,
            _bus: PhantomData,
        }
    }

    /// Call right after [`DfuClass::new`] to start in `DfuError` reporting
    /// "device detected unexpected power-on reset" instead of the usual
    /// `DfuIdle`/`AppDetach` path.
    pub fn set_unexpected_reset_state(&mut self) {
        self.ctx.transition(DfuState::DfuError, DfuStatus::ErrPor);
    }

    /// Call right after [`DfuClass::new`] to start in `DfuError` reporting
    /// "device's firmware is corrupt" instead of the usual path.
    pub fn set_firmware_corrupted_state(&mut self) {
        self.ctx.transition(DfuState::DfuError, DfuStatus::ErrFirmware);
    }

    /// Returns the current protocol state.
    pub fn state(&self) -> DfuState {
        self.ctx.state
    }

    /// Must be called by the application once its poll timer, started by
    /// the most recent [`DfuHandler::start_poll_timeout`] call, fires.
    /// Implements `spec.md` §4.8: advances `DfuDnBusy` and `DfuManifest`;
    /// a no-op (logged as spurious) in every other state.
    pub fn poll_timeout_expired(&mut self) {
        match self.ctx.state {
            DfuState::DfuDnBusy => {
                self.ctx.clear_block_bookkeeping();
                self.ctx.transition(DfuState::DfuDnloadSync, self.ctx.status);
            }
            DfuState::DfuManifest => {
                let next = if self.ctx.attributes.contains(Attributes::MANIFESTATION_TOLERANT) {
                    DfuState::DfuManifestSync
                } else {
                    DfuState::DfuManifestWaitReset
                };
                self.ctx.transition(next, self.ctx.status);
            }
            #[allow(unused_variables)]
            other => {
                #[cfg(feature = "defmt-03")]
                defmt::trace!("dfu: spurious poll-timeout expiry in state {:?}", other);
            }
        }
    }

    fn status_payload_now(&mut self) -> [u8; 6] {
        let poll_timeout = self.handler.poll_timeout();
        let istring = self.handler.status_string_index();
        status_payload(self.ctx.status, poll_timeout, self.ctx.state, istring)
    }

    /// `spec.md` §4.9: the payload is 6 bytes. A `wLength` too short to hold
    /// it is a protocol violation, not a truncated reply (matches the
    /// teacher's `req.length >= 6` guard).
    fn accept_get_status(&mut self, xfer: ControlIn<B>, req: Request) {
        if req.length < 6 {
            self.protocol_violation_in(xfer);
            return;
        }
        let payload = self.status_payload_now();
        xfer.accept_with(&payload).ok();
    }

    /// `spec.md` §4.9: the `DFU_GETSTATE` payload is 1 byte; `wLength == 0`
    /// is a protocol violation (matches the teacher's `req.length > 0` guard).
    fn accept_get_state(&mut self, xfer: ControlIn<B>, req: Request) {
        if req.length == 0 {
            self.protocol_violation_in(xfer);
            return;
        }
        let state: u8 = self.ctx.state.into();
        xfer.accept_with(&[state]).ok();
    }

    /// A request was seen that is not valid for the current state and is
    /// not one of the states where the DFU 1.1 table says to stall without
    /// a state change. Logs at `warn` and transitions to `DfuError`.
    fn protocol_violation_in(&mut self, xfer: ControlIn<B>) {
        self.ctx.transition(DfuState::DfuError, DfuStatus::ErrStalledPkt);
        #[cfg(feature = "defmt-03")]
        defmt::warn!("dfu: stalling unexpected IN request, entering DfuError");
        xfer.reject().ok();
    }

    fn protocol_violation_out(&mut self, xfer: ControlOut<B>) {
        self.ctx.transition(DfuState::DfuError, DfuStatus::ErrStalledPkt);
        #[cfg(feature = "defmt-03")]
        defmt::warn!("dfu: stalling unexpected OUT request, entering DfuError");
        xfer.reject().ok();
    }

    /// Accepts a `DFU_DNLOAD` block from `DfuIdle` or `DfuDnloadIdle`
    /// (`spec.md` §4.6). `usb-device` has already collapsed setup and data
    /// stages by the time this runs, so `xfer.data()` is the full block.
    fn accept_download(&mut self, xfer: ControlOut<B>, req: Request) {
        let block_num = req.value;
        let data = xfer.data();

        self.ctx.last_block_num = block_num;
        self.ctx.last_transfer_len = data.len() as u16;
        self.ctx.blk_transfer_in_proc = true;
        self.ctx.transition(DfuState::DfuDnloadSync, DfuStatus::Ok);

        let timeout = self.handler.poll_timeout();
        self.handler.start_poll_timeout(timeout);

        if let Err(e) = self.handler.download_block(block_num, data) {
            self.ctx.transition(DfuState::DfuError, e.into());
            self.ctx.clear_block_bookkeeping();
        }
        // `blk_transfer_in_proc` stays set until `poll_timeout_expired` fires
        // (spec.md §4.8): the first GETSTATUS after a block always reports
        // DfuDnBusy, and only the poll timeout -- not the (synchronous, in
        // this collapsed setup+data callback) write itself -- releases the
        // host to DfuDnloadIdle.

        xfer.accept().ok();
    }

    /// Accepts a `DFU_UPLOAD` request from `DfuIdle` or `DfuUploadIdle`
    /// (`spec.md` §4.7). A short or zero-length reply ends the session.
    fn accept_upload(&mut self, xfer: ControlIn<B>, req: Request) {
        let block_num = req.value;
        let requested = req.length;

        self.ctx.transition(DfuState::DfuUploadIdle, DfuStatus::Ok);

        let handler = &mut self.handler;
        let ctx = &mut self.ctx;
        xfer.accept(|buf| {
            let len = min(buf.len(), requested as usize);
            match handler.upload_block(block_num, &mut buf[..len]) {
                Ok(n) => {
                    if (n as u16) < requested {
                        ctx.transition(DfuState::DfuIdle, DfuStatus::Ok);
                    }
                    Ok(n)
                }
                Err(e) => {
                    ctx.transition(DfuState::DfuError, e.into());
                    Ok(0)
                }
            }
        })
        .ok();
    }

    fn step_idle_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_UPLOAD if self.ctx.attributes.contains(Attributes::CAN_UPLOAD) => {
                self.accept_upload(xfer, req);
            }
            DFU_GETSTATUS => self.accept_get_status(xfer, req),
            DFU_GETSTATE => self.accept_get_state(xfer, req),
            _ => self.protocol_violation_in(xfer),
        }
    }

    fn step_idle_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_DNLOAD if req.length > 0 && self.ctx.attributes.contains(Attributes::CAN_DOWNLOAD) => {
                self.accept_download(xfer, req);
            }
            DFU_ABORT => {
                xfer.accept().ok();
            }
            _ => self.protocol_violation_out(xfer),
        }
    }

    fn step_dnload_sync_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_GETSTATUS if req.length >= 6 => {
                let next = if self.ctx.blk_transfer_in_proc {
                    DfuState::DfuDnBusy
                } else {
                    DfuState::DfuDnloadIdle
                };
                self.ctx.transition(next, DfuStatus::Ok);
                self.accept_get_status(xfer, req);
            }
            DFU_GETSTATUS => self.protocol_violation_in(xfer),
            DFU_GETSTATE => self.accept_get_state(xfer, req),
            _ => self.protocol_violation_in(xfer),
        }
    }

    fn step_dnload_idle_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_GETSTATUS => self.accept_get_status(xfer, req),
            DFU_GETSTATE => self.accept_get_state(xfer, req),
            _ => self.protocol_violation_in(xfer),
        }
    }

    fn step_dnload_idle_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_DNLOAD if req.length > 0 && self.ctx.attributes.contains(Attributes::CAN_DOWNLOAD) => {
                self.accept_download(xfer, req);
            }
            DFU_DNLOAD if req.length == 0 => match self.handler.data_done_check() {
                Ok(true) => {
                    self.ctx.transition(DfuState::DfuManifestSync, DfuStatus::Ok);
                    xfer.accept().ok();
                }
                Ok(false) => {
                    self.ctx.transition(DfuState::DfuError, DfuStatus::ErrNotdone);
                    xfer.reject().ok();
                }
                Err(e) => {
                    self.ctx.transition(DfuState::DfuError, e.into());
                    xfer.reject().ok();
                }
            },
            DFU_ABORT => {
                self.handler.on_abort();
                self.ctx.transition(DfuState::DfuIdle, DfuStatus::Ok);
                self.ctx.clear_block_bookkeeping();
                xfer.accept().ok();
            }
            _ => self.protocol_violation_out(xfer),
        }
    }

    /// `spec.md` §4.5's `DFU_MANIFEST_SYNC`/`GETSTATUS` row, including the
    /// documented interoperability quirk (`spec.md` §9, `SPEC_FULL.md` §9):
    /// for a manifestation-tolerant device, the status payload reflects the
    /// *pre*-transition state, and only afterwards does the state actually
    /// advance to `DfuIdle`.
    fn step_manifest_sync_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_GETSTATUS if req.length < 6 => self.protocol_violation_in(xfer),
            DFU_GETSTATUS if !self.ctx.attributes.contains(Attributes::MANIFESTATION_TOLERANT) => {
                self.ctx.transition(DfuState::DfuManifest, DfuStatus::Ok);
                self.accept_get_status(xfer, req);
            }
            DFU_GETSTATUS => {
                let payload = self.status_payload_now();
                if self.handler.firmware_valid_check() {
                    self.ctx.transition(DfuState::DfuIdle, DfuStatus::Ok);
                }
                xfer.accept_with(&payload).ok();
            }
            DFU_GETSTATE => self.accept_get_state(xfer, req),
            _ => self.protocol_violation_in(xfer),
        }
    }

    fn step_upload_idle_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_UPLOAD => self.accept_upload(xfer, req),
            DFU_GETSTATUS => self.accept_get_status(xfer, req),
            DFU_GETSTATE => self.accept_get_state(xfer, req),
            // stall without a state change: spec.md §4.5's DFU_UPLOAD_IDLE/other row
            _ => {
                xfer.reject().ok();
            }
        }
    }

    fn step_upload_idle_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_ABORT => {
                self.handler.on_abort();
                self.ctx.transition(DfuState::DfuIdle, DfuStatus::Ok);
                xfer.accept().ok();
            }
            _ => {
                xfer.reject().ok();
            }
        }
    }

    fn step_error_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_GETSTATUS => self.accept_get_status(xfer, req),
            DFU_GETSTATE => self.accept_get_state(xfer, req),
            _ => {
                xfer.reject().ok();
            }
        }
    }

    fn step_error_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        match req.request {
            DFU_CLRSTATUS => {
                self.ctx.transition(DfuState::DfuIdle, DfuStatus::Ok);
                self.ctx.clear_block_bookkeeping();
                xfer.accept().ok();
            }
            _ => {
                xfer.reject().ok();
            }
        }
    }
}

impl<B: UsbBus, H: DfuHandler> UsbClass<B> for DfuClass<B, H> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        writer.interface(
            self.if_num,
            USB_CLASS_APPLICATION_SPECIFIC,
            USB_SUBCLASS_DFU,
            USB_PROTOCOL_DFU_MODE,
        )?;

        writer.write(
            DFU_FUNCTIONAL_DESCRIPTOR_TYPE,
            &[
                self.ctx.attributes.bits(),
                (self.ctx.detach_timeout_ms & 0xff) as u8,
                (self.ctx.detach_timeout_ms >> 8) as u8,
                (self.ctx.transfer_size & 0xff) as u8,
                (self.ctx.transfer_size >> 8) as u8,
                (DFU_VERSION & 0xff) as u8,
                (DFU_VERSION >> 8) as u8,
            ],
        )?;

        Ok(())
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if req.recipient != control::Recipient::Interface || req.index != u8::from(self.if_num) as u16 {
            return;
        }

        if req.request_type != control::RequestType::Class {
            let port = 0;
            let stage = crate::handler::ControlStage::Setup;
            if !self.handler.nonstandard_request(port, stage, req.request) {
                xfer.reject().ok();
            }
            return;
        }

        match self.ctx.state {
            DfuState::DfuIdle => self.step_idle_in(xfer),
            DfuState::DfuDnloadSync => self.step_dnload_sync_in(xfer),
            DfuState::DfuDnloadIdle => self.step_dnload_idle_in(xfer),
            DfuState::DfuManifestSync => self.step_manifest_sync_in(xfer),
            DfuState::DfuUploadIdle => self.step_upload_idle_in(xfer),
            DfuState::DfuError => self.step_error_in(xfer),
            // stall without a state change: spec.md §4.5's DFU_MANIFEST/
            // DFU_MANIFEST_WAIT_RESET "any" rows.
            DfuState::DfuManifest | DfuState::DfuManifestWaitReset => {
                xfer.reject().ok();
            }
            DfuState::DfuDnBusy | DfuState::AppIdle | DfuState::AppDetach => {
                self.protocol_violation_in(xfer);
            }
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if req.recipient != control::Recipient::Interface || req.index != u8::from(self.if_num) as u16 {
            return;
        }

        if req.request_type == control::RequestType::Standard && req.request == STD_SET_INTERFACE {
            xfer.accept().ok();
            return;
        }

        if req.request_type != control::RequestType::Class {
            let port = 0;
            let stage = crate::handler::ControlStage::Setup;
            if !self.handler.nonstandard_request(port, stage, req.request) {
                xfer.reject().ok();
            }
            return;
        }

        match self.ctx.state {
            DfuState::DfuIdle => self.step_idle_out(xfer),
            DfuState::DfuDnloadIdle => self.step_dnload_idle_out(xfer),
            DfuState::DfuUploadIdle => self.step_upload_idle_out(xfer),
            DfuState::DfuError => self.step_error_out(xfer),
            // stall without a state change: spec.md §4.5's DFU_MANIFEST/
            // DFU_MANIFEST_WAIT_RESET "any" rows.
            DfuState::DfuManifest | DfuState::DfuManifestWaitReset => {
                xfer.reject().ok();
            }
            DfuState::DfuDnloadSync
            | DfuState::DfuDnBusy
            | DfuState::DfuManifestSync
            | DfuState::AppIdle
            | DfuState::AppDetach => {
                self.protocol_violation_out(xfer);
            }
        }
    }

    fn reset(&mut self) {
        let current = self.ctx.state;

        let next = if current == DfuState::AppDetach {
            DfuState::DfuIdle
        } else if let Some(s) = self.handler.usb_reset_override(0, current) {
            s
        } else if !is_normal_dfu_state(current) {
            // DfuError, AppIdle, or an unreachable state: unconditional.
            DfuState::AppIdle
        } else if self.handler.firmware_valid_check() {
            DfuState::AppIdle
        } else {
            DfuState::DfuError
        };

        if next == DfuState::AppIdle {
            self.handler.reboot_to_rt();
        }

        self.ctx.attributes = self.handler.attributes();
        self.ctx.detach_timeout_ms = self.handler.detach_timeout_ms();
        self.ctx.transfer_size = self.handler.transfer_size();
        self.ctx.clear_block_bookkeeping();
        self.ctx.transition(next, DfuStatus::Ok);
    }
}
