//! Physical memory probing used to size the default cache capacity.

#[cfg(target_os = "macos")]
pub fn physical_ram_bytes() -> Option<u64> {
    use std::ffi::CString;
    use std::mem::size_of;
    use std::ptr;

    let key = CString::new("hw.memsize").ok()?;
    let mut value: u64 = 0;
    let mut len = size_of::<u64>();
    let rc = unsafe {
        libc::sysctlbyname(
            key.as_ptr(),
            &mut value as *mut u64 as *mut libc::c_void,
            &mut len,
            ptr::null_mut(),
            0,
        )
    };
    if rc == 0 && len == size_of::<u64>() {
        Some(value)
    } else {
        None
    }
}

#[cfg(target_os = "linux")]
pub fn physical_ram_bytes() -> Option<u64> {
    let mut info = std::mem::MaybeUninit::<libc::sysinfo>::uninit();
    let rc = unsafe { libc::sysinfo(info.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let info = unsafe { info.assume_init() };
    Some((info.totalram as u64).saturating_mul(info.mem_unit as u64))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn physical_ram_bytes() -> Option<u64> {
    None
}

/// Share of physical memory given to the image cache (1/8).
pub const CACHE_MEMORY_DIVISOR: u64 = 8;

/// Capacity used when physical memory cannot be probed.
pub const FALLBACK_CAPACITY: usize = 64 * 1024 * 1024;

/// Default cache capacity: an eighth of physical memory.
pub fn default_capacity() -> usize {
    capacity_from_ram(physical_ram_bytes())
}

fn capacity_from_ram(ram: Option<u64>) -> usize {
    match ram {
        Some(bytes) if bytes > 0 => {
            usize::try_from(bytes / CACHE_MEMORY_DIVISOR).unwrap_or(usize::MAX)
        }
        _ => FALLBACK_CAPACITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_an_eighth_of_ram() {
        assert_eq!(capacity_from_ram(Some(8 * 1024 * 1024 * 1024)), 1024 * 1024 * 1024);
    }

    #[test]
    fn unknown_ram_falls_back() {
        assert_eq!(capacity_from_ram(None), FALLBACK_CAPACITY);
        assert_eq!(capacity_from_ram(Some(0)), FALLBACK_CAPACITY);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn probes_ram_on_linux() {
        assert!(physical_ram_bytes().unwrap_or(0) > 0);
        assert!(default_capacity() > 0);
    }
}
