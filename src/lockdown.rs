//! Interaction blocking while the prompt is shown.
//!
//! On Windows the lockdown hides the taskbar and swallows task-switching key
//! chords through a low-level keyboard hook. Everything is released through
//! [`LockdownGuard`], so an early return or a panic inside the session still
//! gives the desktop back.

use log::{debug, warn};

use crate::config::Config;
use crate::error::BlockerError;

pub trait InteractionBlocker {
    /// Suspend normal desktop interaction. Best effort.
    fn suspend(&self) -> Result<(), BlockerError>;
    /// Restore normal desktop interaction. Must be safe to call when nothing is suspended.
    fn resume(&self) -> Result<(), BlockerError>;
}

/// Used in tests, on platforms without a lockdown, and when lockdown is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBlocker;

impl InteractionBlocker for NoopBlocker {
    fn suspend(&self) -> Result<(), BlockerError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), BlockerError> {
        Ok(())
    }
}

/// Holds interaction suspended until dropped.
pub struct LockdownGuard<'a, B: InteractionBlocker + ?Sized> {
    blocker: &'a B,
}

impl<'a, B: InteractionBlocker + ?Sized> LockdownGuard<'a, B> {
    pub fn acquire(blocker: &'a B) -> Self {
        // Acquire the guard even on failure so partial suspension is undone.
        if let Err(e) = blocker.suspend() {
            warn!("Interaction blocking unavailable: {}", e);
        } else {
            debug!("Desktop interaction suspended");
        }
        Self { blocker }
    }
}

impl<B: InteractionBlocker + ?Sized> Drop for LockdownGuard<'_, B> {
    fn drop(&mut self) {
        match self.blocker.resume() {
            Ok(()) => debug!("Desktop interaction restored"),
            Err(e) => warn!("Failed to restore desktop interaction: {}", e),
        }
    }
}

/// The blocker for this platform and configuration.
pub fn platform_blocker(config: &Config) -> Box<dyn InteractionBlocker> {
    if !config.lockdown.enabled {
        return Box::new(NoopBlocker);
    }

    #[cfg(windows)]
    {
        match config.blocked_chords() {
            Ok(chords) => Box::new(windows_lockdown::DesktopLockdown::new(
                chords,
                config.lockdown.hide_taskbar,
            )),
            Err(e) => {
                warn!("Lockdown disabled: {}", e);
                Box::new(NoopBlocker)
            }
        }
    }

    #[cfg(not(windows))]
    {
        debug!("No desktop lockdown on this platform");
        Box::new(NoopBlocker)
    }
}

#[cfg(windows)]
mod windows_lockdown {
    use std::cell::Cell;
    use std::sync::Mutex;

    use windows::core::{w, PCWSTR};
    use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_LWIN, VK_RWIN, VK_SHIFT,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, FindWindowW, SetWindowsHookExW, ShowWindow, UnhookWindowsHookEx, HHOOK,
        KBDLLHOOKSTRUCT, LLKHF_ALTDOWN, SW_HIDE, SW_SHOW, WH_KEYBOARD_LL, WM_KEYDOWN,
        WM_SYSKEYDOWN,
    };

    use super::InteractionBlocker;
    use crate::error::BlockerError;
    use crate::keys::{KeyChord, Modifiers};

    // The hook procedure has no user data pointer.
    static BLOCKED_CHORDS: Mutex<Vec<KeyChord>> = Mutex::new(Vec::new());

    pub struct DesktopLockdown {
        chords: Vec<KeyChord>,
        hide_taskbar: bool,
        hook: Cell<Option<HHOOK>>,
    }

    impl DesktopLockdown {
        pub fn new(chords: Vec<KeyChord>, hide_taskbar: bool) -> Self {
            Self {
                chords,
                hide_taskbar,
                hook: Cell::new(None),
            }
        }
    }

    impl InteractionBlocker for DesktopLockdown {
        fn suspend(&self) -> Result<(), BlockerError> {
            if self.hide_taskbar {
                set_taskbar_visible(false)?;
            }

            if self.hook.get().is_some() || self.chords.is_empty() {
                return Ok(());
            }
            if let Ok(mut blocked) = BLOCKED_CHORDS.lock() {
                *blocked = self.chords.clone();
            }

            unsafe {
                let module = GetModuleHandleW(PCWSTR::null())
                    .map_err(|e| BlockerError::Hook(e.to_string()))?;
                let hook = SetWindowsHookExW(
                    WH_KEYBOARD_LL,
                    Some(keyboard_hook),
                    HINSTANCE(module.0),
                    0,
                )
                .map_err(|e| BlockerError::Hook(e.to_string()))?;
                self.hook.set(Some(hook));
            }
            Ok(())
        }

        fn resume(&self) -> Result<(), BlockerError> {
            let mut result = Ok(());

            if let Some(hook) = self.hook.take() {
                if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
                    result = Err(BlockerError::Hook(e.to_string()));
                }
            }
            if let Ok(mut blocked) = BLOCKED_CHORDS.lock() {
                blocked.clear();
            }

            if self.hide_taskbar {
                set_taskbar_visible(true)?;
            }
            result
        }
    }

    impl Drop for DesktopLockdown {
        fn drop(&mut self) {
            if let Some(hook) = self.hook.take() {
                let _ = unsafe { UnhookWindowsHookEx(hook) };
            }
        }
    }

    fn set_taskbar_visible(visible: bool) -> Result<(), BlockerError> {
        let cmd = if visible { SW_SHOW } else { SW_HIDE };
        unsafe {
            let primary = FindWindowW(w!("Shell_TrayWnd"), PCWSTR::null())
                .map_err(|e| BlockerError::Taskbar(e.to_string()))?;
            let _ = ShowWindow(primary, cmd);

            // Taskbars on secondary monitors are optional.
            if let Ok(secondary) = FindWindowW(w!("Shell_SecondaryTrayWnd"), PCWSTR::null()) {
                if secondary != HWND::default() {
                    let _ = ShowWindow(secondary, cmd);
                }
            }
        }
        Ok(())
    }

    fn key_held(vk: VIRTUAL_KEY) -> bool {
        unsafe { (GetAsyncKeyState(vk.0 as i32) as u16 & 0x8000) != 0 }
    }

    unsafe extern "system" fn keyboard_hook(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code >= 0 {
            let msg = wparam.0 as u32;
            if msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN {
                let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
                let held = Modifiers {
                    ctrl: key_held(VK_CONTROL),
                    alt: (info.flags.0 & LLKHF_ALTDOWN.0) != 0,
                    shift: key_held(VK_SHIFT),
                    win: key_held(VK_LWIN) || key_held(VK_RWIN),
                };
                let blocked = BLOCKED_CHORDS
                    .try_lock()
                    .map(|chords| chords.iter().any(|c| c.matches(info.vkCode, held)))
                    .unwrap_or(false);
                if blocked {
                    return LRESULT(1);
                }
            }
        }
        CallNextHookEx(HHOOK::default(), code, wparam, lparam)
    }
}
