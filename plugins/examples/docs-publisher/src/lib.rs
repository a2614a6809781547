//! A reference plugin exercising the `cdylib` ABI end to end: it
//! contributes a single `PUBLISH`-phase task that shells out to a
//! documentation build command, reading its output directory and
//! command template from the project's `docs` configuration slice.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;

use serde::Deserialize;
use serde_json::Value;

#[repr(C)]
struct FfiTaskSpec {
    id: *mut c_char,
    phase: *mut c_char,
    description: *mut c_char,
    depends_on: *mut *mut c_char,
    depends_on_len: usize,
    ctx: *mut c_void,
    handler: TaskHandlerFn,
}

type TaskHandlerFn = extern "C-unwind" fn(ctx: *mut c_void, env: *const FfiEnvironment, args_json: *const c_char) -> *mut c_char;

#[repr(C)]
struct FfiEnvironment {
    user_data: *mut c_void,
    run_command: RunCommandFn,
    read_resource: ReadResourceFn,
    free_string: extern "C-unwind" fn(*mut c_char),
}

type RunCommandFn = extern "C-unwind" fn(
    user_data: *mut c_void,
    cwd: *const c_char,
    command: *const c_char,
    timeout_secs: u64,
    out_exit_code: *mut i32,
    out_stdout: *mut *mut c_char,
    out_stderr: *mut *mut c_char,
) -> i32;

type ReadResourceFn = extern "C-unwind" fn(user_data: *mut c_void, name: *const c_char) -> *mut c_char;

#[repr(C)]
struct PluginVTable {
    id: extern "C-unwind" fn() -> *const c_char,
    context_key: extern "C-unwind" fn() -> *const c_char,
    register: extern "C-unwind" fn(context_json: *const c_char, out_tasks: *mut *mut FfiTaskSpec, out_tasks_len: *mut usize) -> i32,
    free_tasks: extern "C-unwind" fn(tasks: *mut FfiTaskSpec, len: usize),
    free_string: extern "C-unwind" fn(*mut c_char),
    free_ctx: extern "C-unwind" fn(ctx: *mut c_void),
    destroy: extern "C-unwind" fn(*mut PluginVTable),
}

/// The `docs` configuration slice this plugin binds its context from.
#[derive(Deserialize)]
struct DocsConfig {
    #[serde(default = "default_output_dir")]
    output_dir: String,
    #[serde(default = "default_command")]
    command: String,
}

fn default_output_dir() -> String {
    "site".to_string()
}

fn default_command() -> String {
    "mkdocs build -d {output_dir}".to_string()
}

fn to_cstring(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

extern "C-unwind" fn plugin_id() -> *const c_char {
    static ID: &[u8] = b"docs-publisher\0";
    ID.as_ptr() as *const c_char
}

extern "C-unwind" fn context_key() -> *const c_char {
    static KEY: &[u8] = b"docs\0";
    KEY.as_ptr() as *const c_char
}

extern "C-unwind" fn register(
    context_json: *const c_char,
    out_tasks: *mut *mut FfiTaskSpec,
    out_tasks_len: *mut usize,
) -> i32 {
    let raw = unsafe { CStr::from_ptr(context_json) }.to_string_lossy();
    let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Object(Default::default()));
    let config: DocsConfig = serde_json::from_value(value).unwrap_or(DocsConfig {
        output_dir: default_output_dir(),
        command: default_command(),
    });

    let command = config.command.replace("{output_dir}", &config.output_dir);
    let ctx = Box::into_raw(Box::new(command)) as *mut c_void;

    let spec = FfiTaskSpec {
        id: to_cstring("docs:publish"),
        phase: to_cstring("PUBLISH"),
        description: to_cstring("Builds project documentation and publishes the output directory"),
        depends_on: std::ptr::null_mut(),
        depends_on_len: 0,
        ctx,
        handler: publish_handler,
    };

    let tasks = Box::into_raw(Box::new(spec));
    unsafe {
        *out_tasks = tasks;
        *out_tasks_len = 1;
    }
    0
}

extern "C-unwind" fn publish_handler(
    ctx: *mut c_void,
    env: *const FfiEnvironment,
    _args_json: *const c_char,
) -> *mut c_char {
    let command = unsafe { &*(ctx as *const String) };
    let env = unsafe { &*env };

    let cwd = to_cstring(".");
    let command_c = to_cstring(command.as_str());
    let mut exit_code: i32 = -1;
    let mut out_stdout: *mut c_char = std::ptr::null_mut();
    let mut out_stderr: *mut c_char = std::ptr::null_mut();

    let rc = (env.run_command)(env.user_data, cwd, command_c, 0, &mut exit_code, &mut out_stdout, &mut out_stderr);
    unsafe {
        drop(CString::from_raw(cwd));
        drop(CString::from_raw(command_c));
    }

    let result = if rc == 0 && exit_code == 0 {
        serde_json::json!({ "success": true, "message": format!("published docs via `{command}`") })
    } else {
        let stderr = if out_stderr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(out_stderr) }.to_string_lossy().into_owned()
        };
        serde_json::json!({ "success": false, "message": format!("`{command}` failed (exit {exit_code}): {stderr}") })
    };

    if !out_stdout.is_null() {
        (env.free_string)(out_stdout);
    }
    if !out_stderr.is_null() {
        (env.free_string)(out_stderr);
    }

    to_cstring(result.to_string())
}

extern "C-unwind" fn free_tasks(tasks: *mut FfiTaskSpec, len: usize) {
    if tasks.is_null() || len == 0 {
        return;
    }
    unsafe {
        let spec = &*tasks;
        drop(CString::from_raw(spec.id));
        drop(CString::from_raw(spec.phase));
        drop(CString::from_raw(spec.description));
        // `ctx` outlives this call; the host frees it via `free_ctx`
        // once the task it was handed to is no longer callable.
        drop(Box::from_raw(tasks));
    }
}

extern "C-unwind" fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

extern "C-unwind" fn free_ctx(ctx: *mut c_void) {
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx as *mut String) });
    }
}

extern "C-unwind" fn destroy(vtable: *mut PluginVTable) {
    if !vtable.is_null() {
        drop(unsafe { Box::from_raw(vtable) });
    }
}

#[unsafe(no_mangle)]
pub extern "C-unwind" fn _plugin_init() -> *mut PluginVTable {
    Box::into_raw(Box::new(PluginVTable { id: plugin_id, context_key, register, free_tasks, free_string, free_ctx, destroy }))
}
