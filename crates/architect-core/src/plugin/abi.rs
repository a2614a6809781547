//! The C ABI a plugin `cdylib` exports and the engine loads through
//! `libloading`.
//!
//! This mirrors the vtable-of-function-pointers shape the corpus this
//! engine descends from uses for its own plugin system, trimmed to the
//! handful of operations a plugin loader actually requires: a plugin
//! exposes `{id, context_key, register(context) -> tasks}`, and each
//! registered task exposes a synchronous handler. Every struct here is
//! `#[repr(C)]` and every function pointer uses the `"C-unwind"` ABI so
//! a panic inside a plugin unwinds into the loader's `catch_unwind`
//! instead of aborting the process.
//!
//! Strings and byte buffers crossing this boundary are always owned by
//! whichever side allocated them: the plugin frees anything the engine
//! allocated via [`FfiEnvironment::free_string`], and the engine frees
//! anything the plugin allocated via [`PluginVTable::free_string`] /
//! [`PluginVTable::free_tasks`]. Neither side ever frees the other's
//! allocation directly.

use std::ffi::c_void;
use std::os::raw::c_char;

/// One task a plugin contributes, as returned from `register`.
///
/// `phase` is an empty string for a phase-less task, otherwise one of
/// one of the closed phase names (e.g. `"BUILD"`, `"PRE_COMMIT"`).
#[repr(C)]
pub struct FfiTaskSpec {
    pub id: *mut c_char,
    pub phase: *mut c_char,
    pub description: *mut c_char,
    pub depends_on: *mut *mut c_char,
    pub depends_on_len: usize,
    /// Opaque state the plugin associates with this task; passed back
    /// verbatim on every handler invocation.
    pub ctx: *mut c_void,
    pub handler: TaskHandlerFn,
}

/// `(ctx, environment, args_json) -> result_json`. The returned string
/// is owned by the plugin; the engine reads it and frees it through
/// `PluginVTable::free_string`.
pub type TaskHandlerFn =
    extern "C-unwind" fn(ctx: *mut c_void, env: *const FfiEnvironment, args_json: *const c_char) -> *mut c_char;

/// The environment a task handler runs with: a command executor and a
/// resource reader, passed to the plugin by reference for the duration
/// of one handler call only.
#[repr(C)]
pub struct FfiEnvironment {
    pub user_data: *mut c_void,
    pub run_command: RunCommandFn,
    pub read_resource: ReadResourceFn,
    /// Frees a string the engine allocated and handed to the plugin
    /// (`out_stdout`/`out_stderr`/`read_resource`'s return value).
    pub free_string: extern "C-unwind" fn(*mut c_char),
}

pub type RunCommandFn = extern "C-unwind" fn(
    user_data: *mut c_void,
    cwd: *const c_char,
    command: *const c_char,
    timeout_secs: u64,
    out_exit_code: *mut i32,
    out_stdout: *mut *mut c_char,
    out_stderr: *mut *mut c_char,
) -> i32;

pub type ReadResourceFn =
    extern "C-unwind" fn(user_data: *mut c_void, name: *const c_char) -> *mut c_char;

/// The table of entry points a plugin artifact exports.
#[repr(C)]
pub struct PluginVTable {
    pub id: extern "C-unwind" fn() -> *const c_char,
    pub context_key: extern "C-unwind" fn() -> *const c_char,
    /// Binds `context_json` (the project's configuration slice at this
    /// plugin's `context_key`) and writes the plugin's task list into
    /// `out_tasks`/`out_tasks_len`. Returns `0` on success, nonzero on
    /// failure.
    pub register: extern "C-unwind" fn(
        context_json: *const c_char,
        out_tasks: *mut *mut FfiTaskSpec,
        out_tasks_len: *mut usize,
    ) -> i32,
    pub free_tasks: extern "C-unwind" fn(tasks: *mut FfiTaskSpec, len: usize),
    pub free_string: extern "C-unwind" fn(*mut c_char),
    /// Frees one task's `ctx`, as handed out by a single `register`
    /// call. `register` is a plain function pointer with no instance
    /// identity of its own, so the host — not the plugin — is
    /// responsible for tracking which `ctx` values it has been given
    /// and calling this exactly once per distinct pointer, when the
    /// `PluginHandle` that produced it is dropped. A plugin must never
    /// assume it can recover this association through process-global
    /// state: the same `cdylib` artifact can be loaded more than once
    /// in a process (one project's plugins reloading, or two projects
    /// sharing a plugin), and re-opening an already-mapped shared
    /// object aliases its statics across those "separate" loads.
    pub free_ctx: extern "C-unwind" fn(ctx: *mut c_void),
    pub destroy: extern "C-unwind" fn(*mut PluginVTable),
}

/// The symbol every plugin `cdylib` exports, named `_plugin_init`.
pub type PluginInitFn = unsafe extern "C-unwind" fn() -> *mut PluginVTable;

pub const PLUGIN_INIT_SYMBOL: &[u8] = b"_plugin_init\0";
