use std::ffi::CString;
use std::os::raw::c_void;

use crate::types::MhStreamCallback;

/// Hand one generated token to the host.
///
/// Returns whether generation should continue. A missing callback always
/// continues. Interior NUL bytes cannot cross the C boundary and are
/// dropped from `text`.
pub fn invoke_callback(
    callback: MhStreamCallback,
    user_data: *mut c_void,
    token_id: u32,
    text: &str,
) -> bool {
    let Some(cb) = callback else {
        return true;
    };
    let text = CString::new(text).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    });
    cb(text.as_ptr(), token_id, user_data)
}
