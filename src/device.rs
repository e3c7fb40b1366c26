// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! CAPI card discovery and the memory-mapped card transport.
//!
//! # Platform Support
//!
//! ## Linux
//! CAPI accelerator function units appear as character devices
//! `/dev/cxl/afu<N>.0s`, one per card. [`MmioCard`] maps the action's
//! register space from such a device and implements [`ActionTransport`].
//!
//! ## Other platforms
//! Discovery and opening return [`AccelError::PlatformNotSupported`]; use
//! [`crate::sim::SimulatedAction`] instead.

use crate::config::AccelConfig;
use crate::error::AccelError;
use crate::regs::ENGINE_REGISTER_STRIDE;
use crate::transport::ActionTransport;
use std::path::PathBuf;
use std::time::Duration;

/// Device node directory of CAPI accelerator function units.
pub const DEV_CXL_PATH: &str = "/dev/cxl";

/// One CAPI card found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    /// Card number `N` of `/dev/cxl/afu<N>.0s`.
    pub number: u32,
    /// Device node path.
    pub path: PathBuf,
}

/// Card number of a slave AFU device node name like `afu3.0s`.
fn parse_afu_name(name: &str) -> Option<u32> {
    name.strip_prefix("afu")?
        .strip_suffix(".0s")?
        .parse()
        .ok()
}

/// Size of the register window for `engines` engines (whole pages).
fn window_size(engines: usize) -> usize {
    let bytes = engines.max(1) * ENGINE_REGISTER_STRIDE as usize;
    crate::record::align_up(bytes, crate::buffer::DMA_ALIGN)
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use crate::regs::{ActionControl, ACTION_CONTROL, ACTION_TYPE};
    use std::fs::{self, File};
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::time::Instant;

    pub fn discover_cards() -> Result<Vec<CardInfo>, AccelError> {
        let dir = Path::new(DEV_CXL_PATH);
        if !dir.exists() {
            return Err(AccelError::NoCardFound);
        }

        let mut cards = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(number) = parse_afu_name(&name) {
                cards.push(CardInfo {
                    number,
                    path: entry.path(),
                });
            }
        }
        cards.sort_by_key(|c| c.number);
        Ok(cards)
    }

    pub fn is_card_available(card: u32) -> bool {
        Path::new(DEV_CXL_PATH)
            .join(format!("afu{card}.0s"))
            .exists()
    }

    /// Memory-mapped register window of one card's action.
    pub struct MmioCard {
        /// Keeps the device open for the lifetime of the mapping.
        #[allow(dead_code)]
        file: File,
        base: *mut u8,
        size: usize,
        path: PathBuf,
        attached: bool,
        poll_interval: Duration,
    }

    // SAFETY: MmioCard owns its mapping exclusively; the mapping is
    // process-wide and stays valid when moved between threads.
    unsafe impl Send for MmioCard {}

    impl MmioCard {
        /// Open `path` and map the register window for `engines` engines.
        ///
        /// # Errors
        ///
        /// Returns an error if:
        /// - The device cannot be opened (permissions, not found)
        /// - Memory mapping fails
        pub fn open(path: &Path, engines: usize) -> Result<Self, AccelError> {
            let file = File::options()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        AccelError::PermissionDenied(path.display().to_string())
                    } else {
                        AccelError::Io(e)
                    }
                })?;

            let size = window_size(engines);
            // SAFETY: fresh shared mapping of a device we hold open; the
            // result is checked against MAP_FAILED before use.
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                return Err(AccelError::MmapFailed(format!(
                    "mmap of {} bytes failed for {}: {}",
                    size,
                    path.display(),
                    std::io::Error::last_os_error()
                )));
            }

            log::info!("mapped {} ({} bytes)", path.display(), size);
            Ok(Self {
                file,
                base: base as *mut u8,
                size,
                path: path.to_path_buf(),
                attached: false,
                poll_interval: Duration::from_micros(10),
            })
        }

        /// Open the card selected by `config`.
        pub fn open_card(config: &AccelConfig) -> Result<Self, AccelError> {
            let path = PathBuf::from(config.device_path());
            if !path.exists() {
                return Err(AccelError::NoCardFound);
            }
            let mut card = Self::open(&path, config.engine_count)?;
            if !config.poll_interval.is_zero() {
                card.poll_interval = config.poll_interval;
            }
            Ok(card)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn check(&self, offset: u32) -> Result<*mut u32, AccelError> {
            let offset = offset as usize;
            if offset % 4 != 0 || offset + 4 > self.size {
                return Err(AccelError::InvalidArgument(format!(
                    "register offset {offset:#x} outside {}-byte window",
                    self.size
                )));
            }
            // SAFETY: offset + 4 <= size, so the result stays inside the mapping.
            Ok(unsafe { self.base.add(offset) } as *mut u32)
        }

        fn wait_for<F>(&mut self, phase: &'static str, timeout: Duration, mut done: F) -> Result<Duration, AccelError>
        where
            F: FnMut(&mut Self) -> Result<bool, AccelError>,
        {
            let start = Instant::now();
            loop {
                if done(self)? {
                    return Ok(start.elapsed());
                }
                let waited = start.elapsed();
                if waited >= timeout {
                    return Err(AccelError::Timeout { phase, waited });
                }
                std::thread::sleep(self.poll_interval);
            }
        }
    }

    impl ActionTransport for MmioCard {
        fn attach(&mut self, action_type: u32, timeout: Duration) -> Result<(), AccelError> {
            let result = self.wait_for("action attach", timeout, |card| {
                Ok(card.read32(ACTION_TYPE)? == action_type)
            });
            match result {
                Ok(_) => {
                    self.attached = true;
                    log::info!("attached action {:#010x} on {}", action_type, self.path.display());
                    Ok(())
                }
                Err(AccelError::Timeout { .. }) => {
                    let found = self.read32(ACTION_TYPE)?;
                    Err(AccelError::AttachFailed {
                        action_type,
                        reason: format!("card reports action type {found:#010x}"),
                    })
                }
                Err(e) => Err(e),
            }
        }

        fn detach(&mut self) -> Result<(), AccelError> {
            if std::mem::take(&mut self.attached) {
                log::info!("detached from {}", self.path.display());
            }
            Ok(())
        }

        fn read32(&mut self, offset: u32) -> Result<u32, AccelError> {
            let reg = self.check(offset)?;
            // SAFETY: reg is an aligned address inside the live mapping.
            Ok(unsafe { std::ptr::read_volatile(reg) })
        }

        fn write32(&mut self, offset: u32, value: u32) -> Result<(), AccelError> {
            let reg = self.check(offset)?;
            // SAFETY: reg is an aligned address inside the live mapping.
            unsafe { std::ptr::write_volatile(reg, value) };
            Ok(())
        }

        fn start(&mut self) -> Result<(), AccelError> {
            self.write32(ACTION_CONTROL, ActionControl::START.bits())
        }

        fn wait_idle(&mut self, timeout: Duration) -> Result<Duration, AccelError> {
            self.wait_for("action idle wait", timeout, |card| {
                let control = ActionControl::from_bits_retain(card.read32(ACTION_CONTROL)?);
                Ok(control.contains(ActionControl::IDLE))
            })
        }
    }

    impl Drop for MmioCard {
        fn drop(&mut self) {
            // SAFETY: base/size describe the mapping created in `open`.
            unsafe {
                libc::munmap(self.base as *mut libc::c_void, self.size);
            }
        }
    }

    impl std::fmt::Debug for MmioCard {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MmioCard")
                .field("path", &self.path)
                .field("base", &format_args!("{:p}", self.base))
                .field("size", &self.size)
                .field("attached", &self.attached)
                .finish()
        }
    }
}

// ============================================================================
// Non-Linux Stub Implementation
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;
    use std::path::Path;

    pub fn discover_cards() -> Result<Vec<CardInfo>, AccelError> {
        Err(AccelError::PlatformNotSupported)
    }

    pub fn is_card_available(_card: u32) -> bool {
        false
    }

    /// Card transport placeholder; opening always fails off Linux.
    #[derive(Debug)]
    pub struct MmioCard {
        _private: (),
    }

    impl MmioCard {
        pub fn open(_path: &Path, _engines: usize) -> Result<Self, AccelError> {
            Err(AccelError::PlatformNotSupported)
        }

        pub fn open_card(_config: &AccelConfig) -> Result<Self, AccelError> {
            Err(AccelError::PlatformNotSupported)
        }
    }

    impl ActionTransport for MmioCard {
        fn attach(&mut self, _action_type: u32, _timeout: Duration) -> Result<(), AccelError> {
            Err(AccelError::PlatformNotSupported)
        }

        fn detach(&mut self) -> Result<(), AccelError> {
            Ok(())
        }

        fn read32(&mut self, _offset: u32) -> Result<u32, AccelError> {
            Err(AccelError::PlatformNotSupported)
        }

        fn write32(&mut self, _offset: u32, _value: u32) -> Result<(), AccelError> {
            Err(AccelError::PlatformNotSupported)
        }

        fn start(&mut self) -> Result<(), AccelError> {
            Err(AccelError::PlatformNotSupported)
        }

        fn wait_idle(&mut self, _timeout: Duration) -> Result<Duration, AccelError> {
            Err(AccelError::PlatformNotSupported)
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

#[cfg(target_os = "linux")]
pub use linux_impl::MmioCard;

#[cfg(not(target_os = "linux"))]
pub use stub_impl::MmioCard;

/// List the CAPI cards on this system, ordered by card number.
///
/// # Errors
///
/// - [`AccelError::NoCardFound`] if `/dev/cxl` does not exist (Linux)
/// - [`AccelError::PlatformNotSupported`] on other platforms
///
/// # Example
///
/// ```rust,no_run
/// use strmatch_accel::discover_cards;
///
/// for card in discover_cards()? {
///     println!("card {} at {}", card.number, card.path.display());
/// }
/// # Ok::<(), strmatch_accel::AccelError>(())
/// ```
pub fn discover_cards() -> Result<Vec<CardInfo>, AccelError> {
    #[cfg(target_os = "linux")]
    {
        linux_impl::discover_cards()
    }
    #[cfg(not(target_os = "linux"))]
    {
        stub_impl::discover_cards()
    }
}

/// Check whether card `card` has a device node.
pub fn is_card_available(card: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        linux_impl::is_card_available(card)
    }
    #[cfg(not(target_os = "linux"))]
    {
        stub_impl::is_card_available(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_afu_name() {
        assert_eq!(parse_afu_name("afu0.0s"), Some(0));
        assert_eq!(parse_afu_name("afu12.0s"), Some(12));
        assert_eq!(parse_afu_name("afu0.0m"), None);
        assert_eq!(parse_afu_name("afu0"), None);
        assert_eq!(parse_afu_name("card0"), None);
    }

    #[test]
    fn test_window_size() {
        assert_eq!(window_size(0), 4096);
        assert_eq!(window_size(16), 4096);
        assert_eq!(window_size(17), 8192);
    }

    #[test]
    fn test_discover_on_system_without_cards() {
        match discover_cards() {
            Ok(cards) => assert!(cards.windows(2).all(|w| w[0].number < w[1].number)),
            Err(AccelError::NoCardFound) | Err(AccelError::PlatformNotSupported) => {}
            Err(e) => panic!("unexpected discovery error: {e}"),
        }
    }

    #[test]
    fn test_open_missing_card() {
        let config = AccelConfig::default().with_card_number(999);
        assert!(!is_card_available(999));
        assert!(matches!(
            MmioCard::open_card(&config),
            Err(AccelError::NoCardFound) | Err(AccelError::PlatformNotSupported)
        ));
    }
}
