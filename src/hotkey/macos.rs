//! macOS event tap
//!
//! Installs an active (non listen-only) CGEventTap on the session event
//! stream so matched key-downs can be swallowed. Requires Accessibility
//! permission. The C callback only decodes the event and forwards it to the
//! typed [`KeyHandler`]; everything else lives outside this file.

use std::ffi::c_void;
use std::ptr;
use std::time::Duration;

use core_foundation::base::TCFType;
use core_foundation::mach_port::{CFMachPort, CFMachPortRef};
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource};
use core_graphics::event::{CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType, EventField};
use tracing::{debug, error};

use super::listener::{KeyHandler, KeyTap, MonitorError, RawKeyEvent};

type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;
type TapCallback = extern "C" fn(CGEventTapProxy, u32, CGEventRef, *mut c_void) -> CGEventRef;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: TapCallback,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventGetFlags(event: CGEventRef) -> u64;
}

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
}

/// Check whether this process holds the Accessibility permission
pub fn accessibility_granted() -> bool {
    unsafe { AXIsProcessTrusted() }
}

/// State reachable from the C callback
struct TapContext {
    handler: Box<dyn KeyHandler>,
    port: CFMachPortRef,
}

/// CGEventTap-backed [`KeyTap`]
pub struct MacEventTap {
    context: *mut TapContext,
    port: Option<CFMachPort>,
    source: Option<CFRunLoopSource>,
    run_loop: Option<CFRunLoop>,
}

// SAFETY: the value is moved to the capture thread while empty; every CF
// object and the context are created, used and released on that thread.
unsafe impl Send for MacEventTap {}

impl MacEventTap {
    pub fn new() -> Self {
        Self {
            context: ptr::null_mut(),
            port: None,
            source: None,
            run_loop: None,
        }
    }

    fn free_context(&mut self) {
        if !self.context.is_null() {
            drop(unsafe { Box::from_raw(self.context) });
            self.context = ptr::null_mut();
        }
    }
}

impl Default for MacEventTap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyTap for MacEventTap {
    fn install(&mut self, handler: Box<dyn KeyHandler>) -> Result<(), MonitorError> {
        if !accessibility_granted() {
            error!("accessibility permission not granted, cannot intercept keys");
            return Err(MonitorError::PermissionDenied);
        }

        self.context = Box::into_raw(Box::new(TapContext {
            handler,
            port: ptr::null_mut(),
        }));

        let mask = 1u64 << (CGEventType::KeyDown as u32);
        let raw_port = unsafe {
            CGEventTapCreate(
                CGEventTapLocation::Session as u32,
                CGEventTapPlacement::HeadInsertEventTap as u32,
                CGEventTapOptions::Default as u32,
                mask,
                tap_callback,
                self.context as *mut c_void,
            )
        };

        if raw_port.is_null() {
            self.free_context();
            return Err(MonitorError::PermissionDenied);
        }

        unsafe { (*self.context).port = raw_port };
        let port = unsafe { CFMachPort::wrap_under_create_rule(raw_port) };

        let source = match port.create_runloop_source(0) {
            Ok(source) => source,
            Err(()) => {
                drop(port);
                self.free_context();
                return Err(MonitorError::TapCreation("failed to create run loop source".to_string()));
            }
        };

        let run_loop = CFRunLoop::get_current();
        unsafe {
            run_loop.add_source(&source, kCFRunLoopCommonModes);
            CGEventTapEnable(raw_port, true);
        }

        debug!("event tap created and enabled");

        self.port = Some(port);
        self.source = Some(source);
        self.run_loop = Some(run_loop);
        Ok(())
    }

    fn pump(&mut self, timeout: Duration) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, timeout, false);
        }

        if !self.context.is_null() {
            unsafe { (*self.context).handler.on_idle() };
        }
    }

    fn uninstall(&mut self) {
        if let Some(port) = self.port.take() {
            unsafe { CGEventTapEnable(port.as_concrete_TypeRef(), false) };
            if let (Some(run_loop), Some(source)) = (self.run_loop.take(), self.source.take()) {
                unsafe { run_loop.remove_source(&source, kCFRunLoopCommonModes) };
            }
        }
        self.free_context();
        debug!("event tap removed");
    }
}

impl Drop for MacEventTap {
    fn drop(&mut self) {
        self.uninstall();
    }
}

extern "C" fn tap_callback(
    _proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    if user_info.is_null() {
        return event;
    }
    let context = unsafe { &mut *(user_info as *mut TapContext) };

    if event_type == CGEventType::TapDisabledByTimeout as u32
        || event_type == CGEventType::TapDisabledByUserInput as u32
    {
        unsafe { CGEventTapEnable(context.port, true) };
        let reason = if event_type == CGEventType::TapDisabledByTimeout as u32 {
            "timeout"
        } else {
            "user input"
        };
        context.handler.on_tap_reenabled(reason);
        return event;
    }

    if event_type != CGEventType::KeyDown as u32 {
        return event;
    }

    let is_repeat = unsafe { CGEventGetIntegerValueField(event, EventField::KEYBOARD_EVENT_AUTOREPEAT) } != 0;
    if is_repeat {
        return event;
    }

    let keycode = unsafe { CGEventGetIntegerValueField(event, EventField::KEYBOARD_EVENT_KEYCODE) } as u16;
    let flags = unsafe { CGEventGetFlags(event) };

    if context.handler.on_key_down(RawKeyEvent { keycode, flags }) {
        ptr::null_mut()
    } else {
        event
    }
}
