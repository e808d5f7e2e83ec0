use std::cell::RefCell;
use std::ffi::CString;

use mh_session::LlmError;

use crate::types::MhStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `mh_last_error`.
pub fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Record `err` and map it to a status. Backend failures map to `backend`,
/// which names the operation that failed.
pub fn report(err: LlmError, backend: MhStatus) -> MhStatus {
    let status = match &err {
        LlmError::Validation(_) => MhStatus::ErrorValidation,
        LlmError::Serialization(_) => MhStatus::ErrorSerialization,
        LlmError::UnknownHandle(_) => MhStatus::ErrorInvalidArgument,
        LlmError::Backend(_) => backend,
    };
    set_last_error(err.to_string());
    status
}
