//! A reference plugin contributing two tasks that shell out to `git`:
//! a `PRE_COMMIT` check that fails the commit on unstaged changes, and
//! a `RELEASE` task that tags the current commit. `release:tag`
//! declares an explicit dependency on `git:verify-clean` so it never
//! runs against a dirty tree, exercising the engine's explicit
//! `depends_on` edges alongside its phase ordering.

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

#[derive(Deserialize)]
struct GitOpsConfig {
    #[serde(default = "default_remote")]
    remote: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

struct Context {
    remote: String,
}

fn to_cstring(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

extern "C-unwind" fn plugin_id() -> *const c_char {
    static ID: &[u8] = b"git-ops\0";
    ID.as_ptr() as *const c_char
}

extern "C-unwind" fn context_key() -> *const c_char {
    static KEY: &[u8] = b"git_ops\0";
    KEY.as_ptr() as *const c_char
}

extern "C-unwind" fn register(
    context_json: *const c_char,
    out_tasks: *mut *mut FfiTaskSpec,
    out_tasks_len: *mut usize,
) -> i32 {
    let raw = unsafe { CStr::from_ptr(context_json) }.to_string_lossy();
    let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Object(Default::default()));
    let config: GitOpsConfig = serde_json::from_value(value).unwrap_or(GitOpsConfig { remote: default_remote() });

    let ctx = Box::into_raw(Box::new(Context { remote: config.remote })) as *mut c_void;

    let verify_clean = FfiTaskSpec {
        id: to_cstring("git:verify-clean"),
        phase: to_cstring("PRE_COMMIT"),
        description: to_cstring("Fails the commit if the working tree has unstaged changes"),
        depends_on: std::ptr::null_mut(),
        depends_on_len: 0,
        ctx,
        handler: verify_clean_handler,
    };

    let mut tag_release_dep = to_cstring("git:verify-clean");
    let tag_release = FfiTaskSpec {
        id: to_cstring("release:tag"),
        phase: to_cstring("RELEASE"),
        description: to_cstring("Tags the current commit and pushes the tag to the configured remote"),
        depends_on: &mut tag_release_dep as *mut *mut c_char,
        depends_on_len: 1,
        ctx,
        handler: tag_release_handler,
    };

    // `depends_on` arrays are read by the loader before `free_tasks` is
    // called, so the single-element array backing `tag_release_dep`
    // must outlive this call. Box it alongside the spec array.
    let depends_on_storage = Box::into_raw(Box::new([tag_release_dep]));
    let tag_release = FfiTaskSpec { depends_on: depends_on_storage as *mut *mut c_char, ..tag_release };

    let specs = vec![verify_clean, tag_release];
    let boxed = specs.into_boxed_slice();
    let len = boxed.len();
    let ptr = Box::into_raw(boxed) as *mut FfiTaskSpec;

    unsafe {
        *out_tasks = ptr;
        *out_tasks_len = len;
    }
    0
}

extern "C-unwind" fn verify_clean_handler(
    _ctx: *mut c_void,
    env: *const FfiEnvironment,
    _args_json: *const c_char,
) -> *mut c_char {
    let env = unsafe { &*env };
    let result = match run(env, ".", "git status --porcelain") {
        Ok((0, stdout, _)) if stdout.trim().is_empty() => {
            serde_json::json!({ "success": true, "message": "working tree is clean" })
        }
        Ok((0, stdout, _)) => {
            serde_json::json!({ "success": false, "message": format!("working tree has unstaged changes:\n{stdout}") })
        }
        Ok((code, _, stderr)) => {
            serde_json::json!({ "success": false, "message": format!("git status exited {code}: {stderr}") })
        }
        Err(message) => serde_json::json!({ "success": false, "message": message }),
    };
    to_cstring(result.to_string())
}

extern "C-unwind" fn tag_release_handler(
    ctx: *mut c_void,
    env: *const FfiEnvironment,
    args_json: *const c_char,
) -> *mut c_char {
    let context = unsafe { &*(ctx as *const Context) };
    let env = unsafe { &*env };

    let args: Vec<String> = unsafe { CStr::from_ptr(args_json) }
        .to_string_lossy()
        .parse::<Value>()
        .ok()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let Some(tag) = args.first() else {
        return to_cstring(serde_json::json!({ "success": false, "message": "release:tag requires a tag name argument" }).to_string());
    };

    let tag_command = format!("git tag {tag}");
    let push_command = format!("git push {} {tag}", context.remote);

    let tag_result = run(env, ".", &tag_command);
    let push_result = match tag_result {
        Ok((0, _, _)) => run(env, ".", &push_command),
        other => other,
    };

    let result = match push_result {
        Ok((0, _, _)) => serde_json::json!({ "success": true, "message": format!("tagged and pushed {tag}") }),
        Ok((code, _, stderr)) => {
            serde_json::json!({ "success": false, "message": format!("tagging {tag} failed (exit {code}): {stderr}") })
        }
        Err(message) => serde_json::json!({ "success": false, "message": message }),
    };
    to_cstring(result.to_string())
}

fn run(env: &FfiEnvironment, cwd: &str, command: &str) -> Result<(i32, String, String), String> {
    let cwd_c = to_cstring(cwd);
    let command_c = to_cstring(command);
    let mut exit_code: i32 = -1;
    let mut out_stdout: *mut c_char = std::ptr::null_mut();
    let mut out_stderr: *mut c_char = std::ptr::null_mut();

    let rc = (env.run_command)(env.user_data, cwd_c, command_c, 0, &mut exit_code, &mut out_stdout, &mut out_stderr);
    unsafe {
        drop(CString::from_raw(cwd_c));
        drop(CString::from_raw(command_c));
    }

    if rc != 0 {
        return Err(format!("`{command}` could not be run (code {rc})"));
    }

    let stdout = read_and_free(env, out_stdout);
    let stderr = read_and_free(env, out_stderr);
    Ok((exit_code, stdout, stderr))
}

fn read_and_free(env: &FfiEnvironment, ptr: *mut c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let value = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    (env.free_string)(ptr);
    value
}

extern "C-unwind" fn free_tasks(tasks: *mut FfiTaskSpec, len: usize) {
    if tasks.is_null() || len == 0 {
        return;
    }
    unsafe {
        for i in 0..len {
            let spec = tasks.add(i).read();
            drop(CString::from_raw(spec.id));
            drop(CString::from_raw(spec.phase));
            drop(CString::from_raw(spec.description));
            if !spec.depends_on.is_null() {
                let deps = std::slice::from_raw_parts(spec.depends_on, spec.depends_on_len);
                for dep in deps {
                    if !dep.is_null() {
                        drop(CString::from_raw(*dep));
                    }
                }
                // `tag_release` is the only spec with a non-null
                // `depends_on`; its single-element array was boxed
                // separately from the `FfiTaskSpec` array itself.
                drop(Box::from_raw(spec.depends_on as *mut [*mut c_char; 1]));
            }
        }
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(tasks, len)));
    }
}

extern "C-unwind" fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

extern "C-unwind" fn free_ctx(ctx: *mut c_void) {
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx as *mut Context) });
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
