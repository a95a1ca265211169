//! C ABI for the hyprink engine.
//!
//! Every function takes the opaque handle returned by
//! [`hyprink_context_new`]. Fallible operations return `0` on success or a
//! non-zero status code, and leave a message retrievable with
//! [`hyprink_get_last_error`]:
//!
//! | code | meaning        |
//! |------|----------------|
//! | 0    | success        |
//! | 1    | not found      |
//! | 2    | I/O error      |
//! | 3    | invalid format |
//! | 4    | corrupt data   |
//! | 5    | path conflict  |
//! | 6    | config error   |
//! | 7    | unknown        |
//!
//! Null handles, null strings and strings that are not UTF-8 are reported
//! as code 7. Panics are caught at this boundary and also reported as 7.

#![allow(unsafe_code)]

use std::ffi::{CStr, c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;

use hyprink_core::{Context, Error, ErrorKind};

/// Status returned by successful operations.
pub const HYPRINK_OK: c_int = 0;

/// Opaque handle owning one [`Context`].
#[derive(Debug)]
pub struct HyprinkContext {
    inner: Context,
}

fn unknown() -> c_int {
    ErrorKind::Unknown.status_code()
}

/// Run `op` against the context behind `handle`, converting the outcome to
/// a status code.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`hyprink_context_new`].
unsafe fn run<F>(handle: *mut HyprinkContext, op: F) -> c_int
where
    F: FnOnce(&mut Context) -> Result<(), Error>,
{
    // SAFETY: guaranteed by the caller; null is checked by `as_mut`.
    let Some(handle) = (unsafe { handle.as_mut() }) else {
        tracing::warn!("hyprink call with a null context");
        return unknown();
    };

    match panic::catch_unwind(AssertUnwindSafe(|| op(&mut handle.inner))) {
        Ok(Ok(())) => HYPRINK_OK,
        Ok(Err(e)) => e.status_code(),
        Err(_) => {
            handle
                .inner
                .fail(&Error::Unknown("internal error: operation panicked".to_string()));
            unknown()
        }
    }
}

/// Borrow a C string argument, recording a failure on the context if it is
/// unusable.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn arg<'a>(ctx: &mut Context, ptr: *const c_char, name: &str) -> Result<&'a str, Error> {
    let result = if ptr.is_null() {
        Err(Error::Unknown(format!("{name} is null")))
    } else {
        // SAFETY: non-null and NUL-terminated per the caller's contract.
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map_err(|_| Error::Unknown(format!("{name} is not valid UTF-8")))
    };
    if let Err(e) = &result {
        ctx.fail(e);
    }
    result
}

/// Create a context, loading `hyprink.conf` if one is found.
///
/// Returns null only if construction panicked. Release with
/// [`hyprink_context_free`].
#[unsafe(no_mangle)]
pub extern "C" fn hyprink_context_new() -> *mut HyprinkContext {
    panic::catch_unwind(|| {
        Box::into_raw(Box::new(HyprinkContext {
            inner: Context::new(),
        }))
    })
    .unwrap_or(ptr::null_mut())
}

/// Release a context. Null is ignored.
///
/// # Safety
///
/// `ctx` must be null or a pointer from [`hyprink_context_new`] that has not
/// been freed yet. It must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_context_free(ctx: *mut HyprinkContext) {
    if ctx.is_null() {
        return;
    }
    // SAFETY: ownership returns to Rust exactly once, per the contract above.
    let boxed = unsafe { Box::from_raw(ctx) };
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(boxed)));
}

/// Override the app name used in log formatting.
///
/// # Safety
///
/// `ctx` must be a live context; `name` a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_context_set_app_name(ctx: *mut HyprinkContext, name: *const c_char) {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let name = arg(c, name, "name")?;
            c.set_app_name(name);
            Ok(())
        });
    }
}

/// Log `msg` at `level` (`trace`, `debug`, `info`, `warn`, `error`; anything
/// else logs at `info`) under `scope`.
///
/// # Safety
///
/// `ctx` must be a live context; the strings NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_log(
    ctx: *mut HyprinkContext,
    level: *const c_char,
    scope: *const c_char,
    msg: *const c_char,
) {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let level = arg(c, level, "level")?;
            let scope = arg(c, scope, "scope")?;
            let msg = arg(c, msg, "message")?;
            c.log(level, scope, msg);
            Ok(())
        });
    }
}

/// Log the named preset. `msg` may be null to use the preset's template.
/// Clears the last error.
///
/// # Safety
///
/// `ctx` must be a live context; `preset` NUL-terminated; `msg` null or
/// NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_log_preset(
    ctx: *mut HyprinkContext,
    preset: *const c_char,
    msg: *const c_char,
) {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let preset = arg(c, preset, "preset")?;
            let msg = if msg.is_null() {
                None
            } else {
                Some(arg(c, msg, "message")?)
            };
            c.log_preset(preset, msg);
            Ok(())
        });
    }
}

/// Pack the directory `src_dir` into the package file `out_file`.
///
/// # Safety
///
/// `ctx` must be a live context; the strings NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_pack(
    ctx: *mut HyprinkContext,
    src_dir: *const c_char,
    out_file: *const c_char,
) -> c_int {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let src = arg(c, src_dir, "src_dir")?;
            let out = arg(c, out_file, "out_file")?;
            c.pack(Path::new(src), Path::new(out)).map(drop)
        })
    }
}

/// Unpack `pkg_file` into `target_dir`.
///
/// # Safety
///
/// `ctx` must be a live context; the strings NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_unpack(
    ctx: *mut HyprinkContext,
    pkg_file: *const c_char,
    target_dir: *const c_char,
) -> c_int {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let pkg = arg(c, pkg_file, "pkg_file")?;
            let target = arg(c, target_dir, "target_dir")?;
            c.unpack(Path::new(pkg), Path::new(target)).map(drop)
        })
    }
}

/// Install a package file or directory into the configured install root.
///
/// # Safety
///
/// `ctx` must be a live context; `path` NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_install(ctx: *mut HyprinkContext, path: *const c_char) -> c_int {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let path = arg(c, path, "path")?;
            c.install(Path::new(path)).map(drop)
        })
    }
}

/// Fully validate `pkg_file` without extracting it.
///
/// # Safety
///
/// `ctx` must be a live context; `pkg_file` NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_verify(ctx: *mut HyprinkContext, pkg_file: *const c_char) -> c_int {
    // SAFETY: forwarded caller contract.
    unsafe {
        run(ctx, |c| {
            let pkg = arg(c, pkg_file, "pkg_file")?;
            c.verify(Path::new(pkg)).map(drop)
        })
    }
}

/// Copy the last error message, NUL-terminated, into `buffer`.
///
/// Returns the number of bytes written excluding the terminator, or -1 when
/// the last operation succeeded, the message does not fit in `len` bytes,
/// or an argument is null. The message is never truncated.
///
/// # Safety
///
/// `ctx` must be a live context; `buffer` must be writable for `len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hyprink_get_last_error(
    ctx: *mut HyprinkContext,
    buffer: *mut c_char,
    len: usize,
) -> c_int {
    if buffer.is_null() || len == 0 {
        return -1;
    }
    // SAFETY: live or null per the contract.
    let Some(handle) = (unsafe { ctx.as_ref() }) else {
        return -1;
    };
    // SAFETY: `buffer` is writable for `len` bytes per the contract.
    let out = unsafe { std::slice::from_raw_parts_mut(buffer.cast::<u8>(), len) };
    handle
        .inner
        .error_slot()
        .copy_to(out)
        .and_then(|n| c_int::try_from(n).ok())
        .unwrap_or(-1)
}
