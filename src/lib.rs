#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! Implements DFU protocol version 1.1 for a `usb-device` device.
//!
//! ## About
//!
//! DFU protocol aims to provide a standard how USB device's firmware
//! can be upgraded. Often, in this case firmware of the device
//! consists of two parts: a large main firmware, and a smaller
//! bootloader. When device is powered on, bootloader starts
//! and either runs main firmware, or enters "firmware update"
//! mode.
//!
//! Protocol implementation tries to follow the USB Device Firmware
//! Upgrade Specification, Revision 1.1, as a state machine over the
//! eleven `DFU_*` states and sixteen status codes the spec defines.
//!
//! This library is a protocol implementation only; actual code that
//! programs, erases, or reads memory or flash is not part of the
//! library and is expected to be provided by the library user through
//! the [`DfuHandler`] trait.
//!
//! ### Supported operations
//!
//! * Upload (device to host)
//! * Download (host to device)
//! * Manifestation, both tolerant and intolerant of a following bus reset
//! * Detach/attach via bus reset, the only transport this crate supports
//!   (there is no run-time `DFU_DETACH` interface; see [`crate::class`])
//!
//! ### Limitations
//!
//! * Maximum USB transfer size is limited to what `usb-device` supports
//! for control endpoint transfers, which is `128` bytes by default.
//!
//! * `iString` in `DFU_GETSTATUS` defaults to `0`; implement
//! [`DfuHandler::status_string_index`] to report a vendor-specific string.
//!
//! ## DFU utilities
//!
//! There are many implementations of tools to flash USB device
//! supporting DFU protocol, for example:
//!
//! * [dfu](https://crates.io/crates/dfu) and [dfu-flasher](https://crates.io/crates/dfu-flasher)
//! * [dfu-programmer](https://dfu-programmer.github.io/)
//! * [dfu-util](http://dfu-util.sourceforge.net/)
//! * others
//!
//!
//! ## Example
//!
//! The example below focuses on [`DfuClass`] and [`DfuHandler`]; parts
//! related to target controller initialization and configuration (USB,
//! interrupts, GPIO, etc.) are not in the scope of the example.
//!
//! Also see documentation for the `usb-device` crate, and crates that
//! support the target microcontroller and provide a corresponding HAL.
//!
//! ```no_run
//! use usb_device::prelude::*;
//! use usbd_dfu::*;
//! #
//! # use usb_device::prelude::*;
//! # use usb_device::bus::UsbBusAllocator;
//! # use stm32f1xx_hal::usb::{Peripheral, UsbBus, UsbBusType};
//! #
//! # let usb_bus_alloc: UsbBusAllocator<UsbBus<Peripheral>> = unsafe { core::mem::MaybeUninit::<UsbBusAllocator<UsbBus<Peripheral>>>::uninit().assume_init() };
//! # let mut usb_dev = UsbDeviceBuilder::new(&usb_bus_alloc, UsbVidPid(0, 0)).build();
//!
//! // DfuClass calls back into MyHandler to actually read, erase, or program
//! // the memory, and to answer the handful of questions the state machine
//! // can't answer on its own (is the firmware valid, what's the transfer size).
//!
//! struct MyHandler {
//!     image: [u8; 1024],
//!     received: usize,
//! }
//!
//! impl DfuHandler for MyHandler {
//!     fn attributes(&mut self) -> Attributes {
//!         Attributes::CAN_DOWNLOAD
//!     }
//!
//!     fn firmware_valid_check(&mut self) -> bool {
//!         self.received > 0
//!     }
//!
//!     fn reboot_to_rt(&mut self) {
//!         // Reset peripherals and jump to the application image.
//!     }
//!
//!     fn download_block(&mut self, block_num: u16, data: &[u8]) -> Result<(), DfuError> {
//!         let offset = block_num as usize * data.len();
//!         if offset + data.len() > self.image.len() {
//!             return Err(DfuError::Address);
//!         }
//!         self.image[offset..offset + data.len()].copy_from_slice(data);
//!         self.received += data.len();
//!         Ok(())
//!     }
//!
//!     fn upload_block(&mut self, _block_num: u16, _buf: &mut [u8]) -> Result<usize, DfuError> {
//!         Ok(0)
//!     }
//!
//!     fn data_done_check(&mut self) -> Result<bool, DfuError> {
//!         Ok(true)
//!     }
//!
//!     fn start_poll_timeout(&mut self, _timeout: [u8; 3]) {
//!         // Arm a platform timer; call DfuClass::poll_timeout_expired when it fires.
//!     }
//! }
//!
//! let mut my_handler = MyHandler { image: [0u8; 1024], received: 0 };
//!
//! // Create USB device for a target device:
//! // let usb_bus_alloc = UsbBus::new(peripheral);
//! // let usb_dev = UsbDeviceBuilder::new().build();
//!
//! // Create DfuClass
//! let mut dfu = DfuClass::new(&usb_bus_alloc, my_handler);
//!
//! // usb_dev.poll() must be called periodically, usually from USB interrupt handlers.
//! // When USB input/output is done, handlers in MyHandler may be called.
//! usb_dev.poll(&mut [&mut dfu]);
//! ```
//!
//! ### Example bootloader implementation
//!
//! See [usbd-dfu-example](https://github.com/vitalyvb/usbd-dfu-example) for a functioning example
//! of the underlying `usb-device` integration this crate builds on.
//!

/// DFU protocol module: the `UsbClass` implementation and state machine.
pub mod class;
mod context;

/// Interface-descriptor parsing helpers.
pub mod descriptor;

/// The application-supplied collaborator contract.
pub mod handler;

/// DFU 1.1 protocol states and status codes.
pub mod state;

#[doc(inline)]
pub use crate::class::DfuClass;
#[doc(inline)]
pub use crate::descriptor::parse_interface_descriptor;
#[doc(inline)]
pub use crate::handler::{Attributes, ControlStage, DfuError, DfuHandler};
#[doc(inline)]
pub use crate::state::{DfuState, DfuStatus};
