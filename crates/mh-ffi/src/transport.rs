use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

use mh_registry::{Envelope, Params, Transport};

use crate::types::MhTransport;

type CallFn = extern "C" fn(*const c_char, *const c_char, *mut c_void) -> *mut c_char;
type ReleaseFn = extern "C" fn(*mut c_char, *mut c_void);

/// A `Transport` that forwards every call to host callbacks.
pub struct CallbackTransport {
    call: CallFn,
    release: Option<ReleaseFn>,
    user_data: *mut c_void,
}

// SAFETY: the host promises its callbacks and `user_data` may be used from
// whichever thread drives the runtime; the runtime never calls concurrently.
unsafe impl Send for CallbackTransport {}
unsafe impl Sync for CallbackTransport {}

impl CallbackTransport {
    /// Returns `None` when the host supplied no `call` function.
    pub fn new(transport: MhTransport) -> Option<Self> {
        Some(Self {
            call: transport.call?,
            release: transport.release,
            user_data: transport.user_data,
        })
    }
}

impl Transport for CallbackTransport {
    fn call(&self, method: &str, params: &Params) -> Envelope {
        let method_c = match CString::new(method) {
            Ok(m) => m,
            Err(e) => return Envelope::err(format!("invalid method name: {}", e)),
        };
        let params_c = match params.to_json().map(CString::new) {
            Ok(Ok(p)) => p,
            Ok(Err(e)) => return Envelope::err(format!("invalid parameters: {}", e)),
            Err(e) => return Envelope::err(e.to_string()),
        };

        let reply = (self.call)(method_c.as_ptr(), params_c.as_ptr(), self.user_data);
        if reply.is_null() {
            return Envelope::err(format!("no reply to {}", method));
        }

        let text = unsafe { CStr::from_ptr(reply) }
            .to_string_lossy()
            .into_owned();
        if let Some(release) = self.release {
            release(reply, self.user_data);
        }

        Envelope::from_json(&text).unwrap_or_else(|e| Envelope::err(e.message()))
    }
}
