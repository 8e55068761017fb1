//! Capability traits for window lookup and key injection, plus the
//! backends shipped with the harness: a virtual backend for tests and a
//! logging backend for dry runs. Real injection backends (X11, wayland,
//! uinput) implement these traits out of tree.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use log::info;

use crate::buttons::Button;

/// Opaque handle to an on-screen target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Backend-specific injectable key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

/// Finds a named on-screen target, with a root/default fallback.
pub trait WindowLocator {
    fn find_window(&mut self, name: &str) -> Option<WindowHandle>;
    fn root_window(&mut self) -> WindowHandle;
}

/// Resolves symbolic key names and synthesizes press/release events.
pub trait KeyInjector {
    /// Resolve a symbolic key name to an injectable code. `None` means the
    /// name is unknown or has no assignable code on this backend.
    fn resolve_key(&self, name: &str) -> Option<KeyCode>;

    fn inject(&mut self, window: WindowHandle, code: KeyCode, pressed: bool) -> Result<()>;
}

/// Key codes for the built-in button table: stable per symbolic name.
fn builtin_code(name: &str) -> Option<KeyCode> {
    Button::ALL
        .iter()
        .position(|b| b.key_name() == name)
        .map(|i| KeyCode(i as u32 + 8))
}

/// In-memory backend that records every injected event. Used by unit and
/// integration tests to assert on the exact event stream.
#[derive(Debug, Default)]
pub struct VirtualBackend {
    windows: HashMap<String, WindowHandle>,
    next_handle: u64,
    unknown_keys: HashSet<String>,
    fail_injection: bool,
    events: Vec<(WindowHandle, KeyCode, bool)>,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&mut self, name: &str) -> WindowHandle {
        self.next_handle += 1;
        let handle = WindowHandle(self.next_handle);
        self.windows.insert(name.to_string(), handle);
        handle
    }

    /// Make a key name unresolvable, to exercise the degraded path.
    pub fn forget_key(&mut self, name: &str) {
        self.unknown_keys.insert(name.to_string());
    }

    pub fn fail_injection(&mut self, fail: bool) {
        self.fail_injection = fail;
    }

    pub fn events(&self) -> &[(WindowHandle, KeyCode, bool)] {
        &self.events
    }

    /// Expected code for a button, for test assertions.
    pub fn code_for(button: Button) -> KeyCode {
        builtin_code(button.key_name()).unwrap()
    }
}

impl WindowLocator for VirtualBackend {
    fn find_window(&mut self, name: &str) -> Option<WindowHandle> {
        self.windows.get(name).copied()
    }

    fn root_window(&mut self) -> WindowHandle {
        WindowHandle(0)
    }
}

impl KeyInjector for VirtualBackend {
    fn resolve_key(&self, name: &str) -> Option<KeyCode> {
        if self.unknown_keys.contains(name) {
            return None;
        }
        builtin_code(name)
    }

    fn inject(&mut self, window: WindowHandle, code: KeyCode, pressed: bool) -> Result<()> {
        if self.fail_injection {
            bail!("injection refused");
        }
        self.events.push((window, code, pressed));
        Ok(())
    }
}

/// Dry-run backend: resolves the built-in table and logs events instead of
/// delivering them anywhere.
#[derive(Debug, Default)]
pub struct LoggingBackend;

impl WindowLocator for LoggingBackend {
    fn find_window(&mut self, _name: &str) -> Option<WindowHandle> {
        None
    }

    fn root_window(&mut self) -> WindowHandle {
        WindowHandle(0)
    }
}

impl KeyInjector for LoggingBackend {
    fn resolve_key(&self, name: &str) -> Option<KeyCode> {
        builtin_code(name)
    }

    fn inject(&mut self, _window: WindowHandle, code: KeyCode, pressed: bool) -> Result<()> {
        let action = if pressed { "press" } else { "release" };
        info!("{action} key code {}", code.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_backend_finds_added_windows() {
        let mut backend = VirtualBackend::new();
        let handle = backend.add_window("app");
        assert_eq!(backend.find_window("app"), Some(handle));
        assert_eq!(backend.find_window("other"), None);
        assert_eq!(backend.root_window(), WindowHandle(0));
    }

    #[test]
    fn resolve_known_and_forgotten_keys() {
        let mut backend = VirtualBackend::new();
        assert!(backend.resolve_key("Up").is_some());
        assert!(backend.resolve_key("no_such_key").is_none());
        backend.forget_key("Up");
        assert!(backend.resolve_key("Up").is_none());
    }

    #[test]
    fn inject_records_events() {
        let mut backend = VirtualBackend::new();
        let window = backend.add_window("app");
        let code = VirtualBackend::code_for(Button::Start);
        backend.inject(window, code, true).unwrap();
        backend.inject(window, code, false).unwrap();
        assert_eq!(
            backend.events(),
            &[(window, code, true), (window, code, false)]
        );
    }

    #[test]
    fn codes_are_stable_and_distinct() {
        let codes: Vec<KeyCode> = Button::ALL
            .iter()
            .map(|b| VirtualBackend::code_for(*b))
            .collect();
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
