use anyhow::{Result, anyhow};
#[cfg(target_os = "linux")]
use std::ffi::CStr;

// pthread names are capped at 16 bytes including the null terminator.
#[cfg(target_os = "linux")]
const MAX_PTHREAD_NAME_LEN: usize = 16;

/// Name of the calling thread, as the kernel sees it.
///
/// Worker threads are named by the runtime's thread-name function; this is
/// what lifecycle traces report as the worker identifier.
#[cfg(target_os = "linux")]
pub(crate) fn current_thread_name() -> Result<String> {
    // Zero-initialized, so the buffer is always null-terminated.
    let mut buf: [libc::c_char; MAX_PTHREAD_NAME_LEN] = [0; MAX_PTHREAD_NAME_LEN];

    let ret = unsafe { libc::pthread_getname_np(libc::pthread_self(), buf.as_mut_ptr(), buf.len()) };
    if ret != 0 {
        return Err(anyhow!("pthread_getname_np failed with error code {ret}"));
    }

    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    name.to_str()
        .map(str::to_owned)
        .map_err(|e| anyhow!("thread name is not valid UTF-8: {e}"))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn current_thread_name() -> Result<String> {
    std::thread::current()
        .name()
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("current thread has no name"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_the_name_set_at_spawn() {
        std::thread::Builder::new()
            .name("spindle-name-t".into())
            .spawn(|| {
                assert_eq!(current_thread_name().unwrap(), "spindle-name-t");
            })
            .unwrap()
            .join()
            .unwrap();
    }
}
