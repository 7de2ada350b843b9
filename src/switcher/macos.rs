//! Text Input Sources (TIS) backed directory

use std::ffi::c_void;

use core_foundation::array::{CFArrayGetCount, CFArrayGetValueAtIndex, CFArrayRef};
use core_foundation::base::{CFRelease, CFTypeRef, TCFType};
use core_foundation::string::{CFString, CFStringRef};

use super::source::{InputSource, InputSourceDirectory, SwitchError};

type TISInputSourceRef = *const c_void;

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    static kTISPropertyInputSourceID: CFStringRef;
    static kTISPropertyLocalizedName: CFStringRef;
    static kTISPropertyInputSourceIsSelectCapable: CFStringRef;

    fn TISCreateInputSourceList(properties: *const c_void, include_all_installed: bool) -> CFArrayRef;
    fn TISCopyCurrentKeyboardInputSource() -> TISInputSourceRef;
    fn TISGetInputSourceProperty(source: TISInputSourceRef, key: CFStringRef) -> *const c_void;
    fn TISSelectInputSource(source: TISInputSourceRef) -> i32;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFBooleanGetValue(boolean: *const c_void) -> bool;
}

/// Input source directory backed by the Carbon TIS API
pub struct TisDirectory;

impl TisDirectory {
    pub fn new() -> Self {
        Self
    }

    /// Run `f` over every enabled source while the list is alive
    fn with_sources<T>(&self, mut f: impl FnMut(TISInputSourceRef) -> Option<T>) -> Result<Option<T>, SwitchError> {
        let list = unsafe { TISCreateInputSourceList(std::ptr::null(), false) };
        if list.is_null() {
            return Err(SwitchError::ListUnavailable);
        }

        let mut found = None;
        let count = unsafe { CFArrayGetCount(list) };
        for i in 0..count {
            let source = unsafe { CFArrayGetValueAtIndex(list, i) };
            if let Some(value) = f(source) {
                found = Some(value);
                break;
            }
        }

        unsafe { CFRelease(list as CFTypeRef) };
        Ok(found)
    }
}

impl Default for TisDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn string_property(source: TISInputSourceRef, key: CFStringRef) -> Option<String> {
    let value = unsafe { TISGetInputSourceProperty(source, key) };
    if value.is_null() {
        return None;
    }
    let string = unsafe { CFString::wrap_under_get_rule(value as CFStringRef) };
    Some(string.to_string())
}

fn describe(source: TISInputSourceRef) -> Option<InputSource> {
    let id = string_property(source, unsafe { kTISPropertyInputSourceID })?;
    let name = string_property(source, unsafe { kTISPropertyLocalizedName }).unwrap_or_else(|| id.clone());
    let selectable = unsafe {
        let flag = TISGetInputSourceProperty(source, kTISPropertyInputSourceIsSelectCapable);
        !flag.is_null() && CFBooleanGetValue(flag)
    };
    Some(InputSource { id, name, selectable })
}

impl InputSourceDirectory for TisDirectory {
    fn list(&self) -> Result<Vec<InputSource>, SwitchError> {
        let mut sources = Vec::new();
        self.with_sources(|source| {
            if let Some(described) = describe(source) {
                sources.push(described);
            }
            None::<()>
        })?;
        Ok(sources)
    }

    fn current_id(&self) -> Option<String> {
        let current = unsafe { TISCopyCurrentKeyboardInputSource() };
        if current.is_null() {
            return None;
        }
        let id = string_property(current, unsafe { kTISPropertyInputSourceID });
        unsafe { CFRelease(current as CFTypeRef) };
        id
    }

    fn select(&self, id: &str) -> Result<(), SwitchError> {
        let status = self.with_sources(|source| {
            let matches = string_property(source, unsafe { kTISPropertyInputSourceID }).as_deref() == Some(id);
            matches.then(|| unsafe { TISSelectInputSource(source) })
        })?;

        match status {
            None => Err(SwitchError::UnknownSource(id.to_string())),
            Some(0) => Ok(()),
            Some(status) => Err(SwitchError::Rejected {
                id: id.to_string(),
                status,
            }),
        }
    }
}
