use std::os::raw::{c_char, c_void};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MhStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorValidation = 2,
    ErrorModelLoad = 3,
    ErrorContext = 4,
    ErrorGenerate = 5,
    ErrorSerialization = 6,
    ErrorInternal = 7,
}

/// Sends one request to the backend.
///
/// Receives the method name and the parameters as a JSON object, and must
/// return a NUL-terminated `{"data": ..., "error": ...}` JSON reply (or null
/// when the backend is unreachable). The reply stays owned by the host and
/// is handed back through `MhTransport::release` once copied.
pub type MhTransportCall = Option<
    extern "C" fn(
        method: *const c_char,
        params_json: *const c_char,
        user_data: *mut c_void,
    ) -> *mut c_char,
>;

/// Frees a reply returned by `MhTransportCall`.
pub type MhTransportRelease = Option<extern "C" fn(reply: *mut c_char, user_data: *mut c_void)>;

/// Host-provided synchronous transport to the inference backend.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MhTransport {
    pub call: MhTransportCall,
    pub release: MhTransportRelease,
    pub user_data: *mut c_void,
}

/// Callback for streaming token output.
/// Returns true to continue generation, false to stop.
pub type MhStreamCallback = Option<
    extern "C" fn(token: *const c_char, token_id: u32, user_data: *mut c_void) -> bool,
>;
