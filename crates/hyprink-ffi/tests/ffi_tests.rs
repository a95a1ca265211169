#![allow(unsafe_code)]

use std::ffi::{CString, c_char};
use std::fs;
use std::path::Path;
use std::ptr;

use hyprink::*;
use tempfile::TempDir;

/// Owns a context for the duration of a test.
struct Handle(*mut HyprinkContext);

impl Handle {
    fn new() -> Self {
        let ctx = hyprink_context_new();
        assert!(!ctx.is_null());
        Self(ctx)
    }

    fn last_error(&self) -> Option<String> {
        let mut buf = vec![0u8; 1024];
        let n = unsafe { hyprink_get_last_error(self.0, buf.as_mut_ptr().cast::<c_char>(), buf.len()) };
        if n < 0 {
            return None;
        }
        buf.truncate(n as usize);
        Some(String::from_utf8(buf).unwrap())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe { hyprink_context_free(self.0) };
    }
}

fn c(path: &Path) -> CString {
    CString::new(path.to_str().unwrap()).unwrap()
}

fn cs(s: &str) -> CString {
    CString::new(s).unwrap()
}

#[test]
fn test_pack_missing_source_reports_path() {
    let tmp = TempDir::new().unwrap();
    let h = Handle::new();
    let out = c(&tmp.path().join("output.pkg"));

    let status = unsafe { hyprink_pack(h.0, cs("/path/to/nothing").as_ptr(), out.as_ptr()) };
    assert_eq!(status, 1);
    assert!(h.last_error().unwrap().contains("/path/to/nothing"));
}

#[test]
fn test_roundtrip_and_error_clearing() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("sub/file.txt"), "payload").unwrap();
    let pkg = tmp.path().join("src.pkg");
    let target = tmp.path().join("out");
    let h = Handle::new();

    let bad = unsafe { hyprink_unpack(h.0, c(&pkg).as_ptr(), c(&target).as_ptr()) };
    assert_eq!(bad, 1);
    assert!(h.last_error().is_some());

    unsafe {
        assert_eq!(hyprink_pack(h.0, c(&src).as_ptr(), c(&pkg).as_ptr()), HYPRINK_OK);
        assert_eq!(h.last_error(), None);
        assert_eq!(hyprink_verify(h.0, c(&pkg).as_ptr()), HYPRINK_OK);
        assert_eq!(hyprink_unpack(h.0, c(&pkg).as_ptr(), c(&target).as_ptr()), HYPRINK_OK);
        assert_eq!(hyprink_unpack(h.0, c(&pkg).as_ptr(), c(&target).as_ptr()), 5);
    }
    assert_eq!(
        fs::read_to_string(target.join("sub/file.txt")).unwrap(),
        "payload"
    );
    assert!(h.last_error().unwrap().contains("refusing to overwrite"));
}

#[test]
fn test_small_buffer_is_refused_not_truncated() {
    let h = Handle::new();
    unsafe { hyprink_install(h.0, cs("/definitely/not/here").as_ptr()) };

    let mut tiny = [0x7f as c_char; 4];
    let n = unsafe { hyprink_get_last_error(h.0, tiny.as_mut_ptr(), tiny.len()) };
    assert_eq!(n, -1);
    assert!(tiny.iter().all(|&b| b == 0x7f));
    assert!(h.last_error().unwrap().contains("/definitely/not/here"));
}

#[test]
fn test_null_arguments_return_unknown() {
    let h = Handle::new();
    let status = unsafe { hyprink_pack(h.0, ptr::null(), cs("out.pkg").as_ptr()) };
    assert_eq!(status, 7);
    assert!(h.last_error().unwrap().contains("src_dir is null"));

    unsafe { hyprink_log(h.0, cs("info").as_ptr(), ptr::null(), cs("m").as_ptr()) };
    assert!(h.last_error().unwrap().contains("scope is null"));
}

#[test]
fn test_invalid_utf8_returns_unknown() {
    let h = Handle::new();
    let bad = CString::new(vec![0xff, 0xfe, b'x']).unwrap();
    let status = unsafe { hyprink_verify(h.0, bad.as_ptr()) };
    assert_eq!(status, 7);
    assert!(h.last_error().unwrap().contains("not valid UTF-8"));
}

#[test]
fn test_null_handle_never_crashes() {
    let p = cs("x");
    unsafe {
        assert_eq!(hyprink_pack(ptr::null_mut(), p.as_ptr(), p.as_ptr()), 7);
        assert_eq!(hyprink_unpack(ptr::null_mut(), p.as_ptr(), p.as_ptr()), 7);
        assert_eq!(hyprink_install(ptr::null_mut(), p.as_ptr()), 7);
        assert_eq!(hyprink_verify(ptr::null_mut(), p.as_ptr()), 7);
        hyprink_log(ptr::null_mut(), p.as_ptr(), p.as_ptr(), p.as_ptr());
        hyprink_log_preset(ptr::null_mut(), p.as_ptr(), ptr::null());
        hyprink_context_set_app_name(ptr::null_mut(), p.as_ptr());
        hyprink_context_free(ptr::null_mut());

        let mut buf = [0 as c_char; 16];
        assert_eq!(hyprink_get_last_error(ptr::null_mut(), buf.as_mut_ptr(), buf.len()), -1);
    }
}

#[test]
fn test_logging_on_a_fresh_context_sets_no_error() {
    let h = Handle::new();
    unsafe {
        hyprink_context_set_app_name(h.0, cs("embedder").as_ptr());
        hyprink_log(h.0, cs("WARNING").as_ptr(), cs("host").as_ptr(), cs("hello").as_ptr());
        hyprink_log_preset(h.0, cs("info").as_ptr(), ptr::null());
        hyprink_log_preset(h.0, cs("missing").as_ptr(), cs("override").as_ptr());
    }
    assert_eq!(h.last_error(), None);
}

#[test]
fn test_log_keeps_last_error_until_a_preset_is_logged() {
    let tmp = TempDir::new().unwrap();
    let h = Handle::new();
    let out = c(&tmp.path().join("output.pkg"));
    unsafe {
        assert_eq!(hyprink_pack(h.0, cs("/path/to/nothing").as_ptr(), out.as_ptr()), 1);
        hyprink_log(h.0, cs("error").as_ptr(), cs("host").as_ptr(), cs("pack failed").as_ptr());
    }
    assert!(h.last_error().unwrap().contains("/path/to/nothing"));

    unsafe { hyprink_log_preset(h.0, cs("info").as_ptr(), ptr::null()) };
    assert_eq!(h.last_error(), None);
}
