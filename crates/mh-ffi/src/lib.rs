mod types;
mod error;
mod context;
mod streaming;
mod transport;

pub use types::*;
pub use error::*;
pub use context::*;
pub use transport::CallbackTransport;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use mh_session::{
    Context, ContextOptions, EvaluateOptions, LlmError, Model, ModelOptions, ResourceRegistry,
};
use tracing_subscriber::EnvFilter;

/// Execute a closure that returns an `MhStatus`, catching any panics
/// and converting them into `MhStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> MhStatus>(f: F) -> MhStatus {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            MhStatus::ErrorInternal
        }
    }
}

/// Read an optional C string argument. Null is `None`.
unsafe fn optional_str<'a>(ptr: *const c_char, what: &str) -> Result<Option<&'a str>, MhStatus> {
    if ptr.is_null() {
        return Ok(None);
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Ok(Some(s)),
        Err(e) => {
            set_last_error(format!("invalid {}: {}", what, e));
            Err(MhStatus::ErrorInvalidArgument)
        }
    }
}

/// Install a `tracing` subscriber writing to stderr.
///
/// The filter is read from `MH_LOG` (e.g. `mh_session=debug`) and defaults
/// to `info`. Fails if a global subscriber is already installed.
#[no_mangle]
pub extern "C" fn mh_init_logging() -> MhStatus {
    let filter = EnvFilter::try_from_env("MH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        Ok(()) => MhStatus::Ok,
        Err(e) => {
            set_last_error(format!("failed to install logger: {}", e));
            MhStatus::ErrorInternal
        }
    }
}

/// Create a new runtime bound to a host transport.
///
/// On success, writes a heap-allocated `MhRuntime` pointer into `*rt_out`
/// and returns `MhStatus::Ok`. The caller must later call `mh_runtime_destroy`
/// to free the runtime.
#[no_mangle]
pub unsafe extern "C" fn mh_runtime_create(
    transport: MhTransport,
    rt_out: *mut *mut MhRuntime,
) -> MhStatus {
    catch_panic(|| {
        if rt_out.is_null() {
            set_last_error("rt_out is null".to_string());
            return MhStatus::ErrorInvalidArgument;
        }
        let transport = match CallbackTransport::new(transport) {
            Some(t) => t,
            None => {
                set_last_error("transport has no call function".to_string());
                return MhStatus::ErrorInvalidArgument;
            }
        };
        let registry = Arc::new(ResourceRegistry::new(Arc::new(transport)));
        let rt = Box::new(MhRuntime::new(registry));
        unsafe {
            *rt_out = Box::into_raw(rt);
        }
        MhStatus::Ok
    })
}

/// Destroy a runtime previously created by `mh_runtime_create`, releasing
/// its context and model in the backend.
///
/// Passing a null pointer is a no-op and returns `MhStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn mh_runtime_destroy(rt: *mut MhRuntime) -> MhStatus {
    if rt.is_null() {
        return MhStatus::Ok;
    }
    catch_panic(|| {
        drop(unsafe { Box::from_raw(rt) });
        MhStatus::Ok
    })
}

/// Load a model. `options_json` is a camelCase options object and must
/// carry `path`.
///
/// Any previously loaded model and its context are released first.
#[no_mangle]
pub unsafe extern "C" fn mh_model_load(
    rt: *mut MhRuntime,
    options_json: *const c_char,
) -> MhStatus {
    catch_panic(|| {
        if rt.is_null() {
            set_last_error("null argument".to_string());
            return MhStatus::ErrorInvalidArgument;
        }
        let rt = unsafe { &mut *rt };
        let options = match unsafe { optional_str(options_json, "options") } {
            Ok(Some(json)) => ModelOptions::from_json(json),
            Ok(None) => Ok(ModelOptions::default()),
            Err(status) => return status,
        };
        let options = match options {
            Ok(o) => o,
            Err(e) => return report(e.into(), MhStatus::ErrorValidation),
        };

        rt.release(true);
        match Model::create(&rt.registry, options) {
            Ok(model) => {
                rt.model = Some(Arc::new(model));
                MhStatus::Ok
            }
            Err(e) => report(e, MhStatus::ErrorModelLoad),
        }
    })
}

/// Create the evaluation context for the loaded model. `options_json` may
/// be null for defaults. Any previous context is released first.
#[no_mangle]
pub unsafe extern "C" fn mh_context_create(
    rt: *mut MhRuntime,
    options_json: *const c_char,
) -> MhStatus {
    catch_panic(|| {
        if rt.is_null() {
            set_last_error("null argument".to_string());
            return MhStatus::ErrorInvalidArgument;
        }
        let rt = unsafe { &mut *rt };
        let options = match unsafe { optional_str(options_json, "options") } {
            Ok(Some(json)) => ContextOptions::from_json(json),
            Ok(None) => Ok(ContextOptions::default()),
            Err(status) => return status,
        };
        let options = match options {
            Ok(o) => o,
            Err(e) => return report(e.into(), MhStatus::ErrorValidation),
        };

        let model = match rt.model.as_ref() {
            Some(m) => Arc::clone(m),
            None => {
                set_last_error("model not loaded".to_string());
                return MhStatus::ErrorContext;
            }
        };

        rt.release(false);
        match Context::create(&model, options) {
            Ok(context) => {
                rt.context = Some(context);
                MhStatus::Ok
            }
            Err(e) => report(e, MhStatus::ErrorContext),
        }
    })
}

/// Resolve the runtime, prompt and evaluation options shared by both
/// generate entry points.
unsafe fn generation_args<'a>(
    rt: *mut MhRuntime,
    prompt: *const c_char,
    options_json: *const c_char,
) -> Result<(&'a mut Context, &'a str, EvaluateOptions), MhStatus> {
    if rt.is_null() || prompt.is_null() {
        set_last_error("null argument".to_string());
        return Err(MhStatus::ErrorInvalidArgument);
    }
    let rt = &mut *rt;
    let prompt = optional_str(prompt, "prompt")?.unwrap_or_default();
    let options = match optional_str(options_json, "options")? {
        Some(json) => EvaluateOptions::from_json(json),
        None => Ok(EvaluateOptions::default()),
    }
    .map_err(|e| report(e.into(), MhStatus::ErrorValidation))?;

    match rt.context.as_mut() {
        Some(context) => Ok((context, prompt, options)),
        None => {
            set_last_error("context not created".to_string());
            Err(MhStatus::ErrorGenerate)
        }
    }
}

/// Generate text from a prompt (non-streaming).
///
/// On success, writes a heap-allocated C string into `*output`.
/// The caller must later call `mh_free_string` to free the output string.
#[no_mangle]
pub unsafe extern "C" fn mh_generate(
    rt: *mut MhRuntime,
    prompt: *const c_char,
    options_json: *const c_char,
    output: *mut *mut c_char,
) -> MhStatus {
    catch_panic(|| {
        if output.is_null() {
            set_last_error("null argument".to_string());
            return MhStatus::ErrorInvalidArgument;
        }
        let (context, prompt, options) =
            match unsafe { generation_args(rt, prompt, options_json) } {
                Ok(args) => args,
                Err(status) => return status,
            };

        let generated: Result<Vec<u32>, LlmError> = match context.evaluate(prompt, options) {
            Ok(stream) => stream.collect(),
            Err(e) => Err(e),
        };
        let text = match generated.and_then(|tokens| context.detokenize(&tokens)) {
            Ok(text) => text,
            Err(e) => return report(e, MhStatus::ErrorGenerate),
        };

        match CString::new(text) {
            Ok(c) => {
                unsafe { *output = c.into_raw() };
                MhStatus::Ok
            }
            Err(e) => {
                set_last_error(format!("output encoding error: {}", e));
                MhStatus::ErrorGenerate
            }
        }
    })
}

/// Generate text from a prompt with streaming output.
///
/// Each generated token is passed to the `callback` function with its text.
/// The callback should return `true` to continue generation, or `false` to
/// stop; no further backend step is issued after it returns `false`.
#[no_mangle]
pub unsafe extern "C" fn mh_generate_streaming(
    rt: *mut MhRuntime,
    prompt: *const c_char,
    options_json: *const c_char,
    callback: MhStreamCallback,
    user_data: *mut std::os::raw::c_void,
) -> MhStatus {
    catch_panic(|| {
        let (context, prompt, options) =
            match unsafe { generation_args(rt, prompt, options_json) } {
                Ok(args) => args,
                Err(status) => return status,
            };

        let mut stream = match context.evaluate(prompt, options) {
            Ok(s) => s,
            Err(e) => return report(e, MhStatus::ErrorGenerate),
        };
        while let Some(token) = stream.next() {
            let token = match token {
                Ok(t) => t,
                Err(e) => return report(e, MhStatus::ErrorGenerate),
            };
            let text = match stream.context().detokenize(&[token]) {
                Ok(t) => t,
                Err(e) => return report(e, MhStatus::ErrorGenerate),
            };
            if !streaming::invoke_callback(callback, user_data, token, &text) {
                break; // user requested stop
            }
        }

        MhStatus::Ok
    })
}

/// Clear the context history (e.g. to start a new conversation).
#[no_mangle]
pub unsafe extern "C" fn mh_reset(rt: *mut MhRuntime) -> MhStatus {
    if rt.is_null() {
        return MhStatus::ErrorInvalidArgument;
    }
    let rt = &mut *rt;
    if let Some(context) = rt.context.as_mut() {
        context.reset();
    }
    MhStatus::Ok
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error, or
/// null if no error has occurred. The caller must free the returned string
/// with `mh_free_string`.
#[no_mangle]
pub extern "C" fn mh_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `mh_generate` or `mh_last_error`.
#[no_mangle]
pub unsafe extern "C" fn mh_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}
