//! Orchestrates plugin sources, loads each resolved artifact through the
//! `cdylib` ABI (`crate::plugin::abi`), binds each plugin's configuration
//! slice, and registers the tasks it contributes.
//!
//! The dynamic-loading mechanism is implementation-specific by design
//! left open by design; this workspace resolves that choice as a `cdylib`
//! loaded through `libloading`, mirroring a C vtable of function
//! pointers populated by a `#[no_mangle] extern "C-unwind" fn
//! _plugin_init() -> *mut PluginVTable` entry point. Every call through
//! the vtable is wrapped in `catch_unwind` so a panicking plugin becomes
//! a typed [`PluginError`] instead of aborting the host process.

use std::collections::HashSet;
use std::ffi::{c_void, CStr, CString};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libloading::{Library, Symbol};
use serde_json::{Map, Value};
use tracing::warn;

use crate::command::CommandError;
use crate::config::{ConfigDocument, ConfigError};
use crate::credentials::CredentialStore;
use crate::plugin::abi::{
    FfiEnvironment, FfiTaskSpec, PluginInitFn, PluginVTable, ReadResourceFn, RunCommandFn,
    PLUGIN_INIT_SYMBOL,
};
use crate::plugin::error::PluginError;
use crate::plugin::manifest::{self, PluginDescriptor};
use crate::plugin::source::{LocalSource, PluginSource, RemoteReleaseSource, SourceRegistry};
use crate::task::handler::Environment;
use crate::task::{ProjectContext, Task, TaskHandler, TaskRegistry, TaskResult};

/// Orchestrates source resolution and artifact loading for every
/// plugin a project declares.
pub struct PluginLoader {
    sources: SourceRegistry,
}

impl PluginLoader {
    /// Builds a loader with the two built-in sources registered
    /// (`local`, `remote-release`); callers who need a custom source
    /// type construct a [`SourceRegistry`] directly and pass it to
    /// [`PluginLoader::with_sources`].
    pub fn new(plugin_cache_dir: PathBuf, credentials: Arc<CredentialStore>, download_timeout: Duration) -> Self {
        let mut sources = SourceRegistry::new();
        sources.register(Box::new(LocalSource));
        sources.register(Box::new(RemoteReleaseSource::new(plugin_cache_dir, credentials, download_timeout)));
        Self::with_sources(sources)
    }

    pub fn with_sources(sources: SourceRegistry) -> Self {
        Self { sources }
    }

    /// Resolves, loads, and registers every plugin a project's
    /// configuration document declares, in declaration order.
    pub async fn load_project_plugins(
        &self,
        config: &ConfigDocument,
        tasks: &mut TaskRegistry,
    ) -> Result<(), PluginError> {
        let descriptors = manifest::parse_descriptors(config)?;
        for descriptor in &descriptors {
            let artifact_path = self.sources.resolve(descriptor).await?;
            self.load_plugin_artifact(&artifact_path, descriptor, config, tasks)?;
        }
        Ok(())
    }

    fn load_plugin_artifact(
        &self,
        artifact_path: &Path,
        descriptor: &PluginDescriptor,
        config: &ConfigDocument,
        tasks: &mut TaskRegistry,
    ) -> Result<(), PluginError> {
        let handle = Arc::new(PluginHandle::load(artifact_path)?);
        let plugin_id = handle.call_id(&descriptor.plugin_id)?;
        let context_key = handle.call_context_key(&plugin_id)?;

        let context_value = config.get(&context_key).cloned().unwrap_or_else(|| Value::Object(Map::new()));
        if !context_value.is_object() {
            return Err(PluginError::ContextBind { plugin_id: plugin_id.clone(), source: ConfigError::NotAMapping });
        }
        let context_json = CString::new(context_value.to_string()).map_err(|_| PluginError::InvalidArtifact {
            path: artifact_path.to_path_buf(),
            message: "configuration slice contains a NUL byte".to_string(),
        })?;

        let task_specs = handle.call_register(&context_json, &plugin_id, artifact_path)?;
        for spec in &task_specs {
            handle.track_context(spec.ctx);
        }
        for spec in task_specs {
            let task = spec.into_task(plugin_id.clone(), Arc::clone(&handle));
            tasks
                .add(task)
                .map_err(|source| PluginError::Registration { plugin_id: plugin_id.clone(), source })?;
        }
        Ok(())
    }
}

/// A loaded plugin artifact: the `libloading::Library` (kept alive for
/// as long as any task it contributed is callable) plus the raw vtable
/// pointer the plugin's `_plugin_init` returned.
///
/// `contexts` is this instance's own record of the `ctx` pointers its
/// `register` call handed out — not a plugin-global static, since two
/// `PluginHandle`s loaded from the same artifact path can alias the
/// same `cdylib` mapping (and hence the same statics) on the OS side.
/// Tracking ownership here instead means each handle frees exactly the
/// contexts it produced, regardless of how many other handles share
/// its underlying shared object.
pub(crate) struct PluginHandle {
    // Never read directly; held only to keep the shared library mapped
    // in this process for as long as `vtable` (and the `ctx` pointers
    // it handed out) remain valid.
    _library: Library,
    vtable: *mut PluginVTable,
    contexts: Mutex<HashSet<usize>>,
}

// The vtable is a table of `extern "C-unwind"` function pointers the
// plugin promises are safe to call from any thread; the `Library`
// itself has no interior mutability tying it to one thread either.
unsafe impl Send for PluginHandle {}
unsafe impl Sync for PluginHandle {}

impl PluginHandle {
    fn load(path: &Path) -> Result<Self, PluginError> {
        let library = unsafe { Library::new(path) }
            .map_err(|source| PluginError::Load { path: path.to_path_buf(), source })?;
        let init: Symbol<PluginInitFn> = unsafe { library.get(PLUGIN_INIT_SYMBOL) }
            .map_err(|source| PluginError::Load { path: path.to_path_buf(), source })?;
        let init_fn = *init;

        let vtable_ptr = std::panic::catch_unwind(|| unsafe { init_fn() }).map_err(|_| PluginError::Panic {
            plugin_id: path.display().to_string(),
            operation: "_plugin_init",
        })?;
        if vtable_ptr.is_null() {
            return Err(PluginError::InvalidArtifact {
                path: path.to_path_buf(),
                message: "_plugin_init returned a null vtable".to_string(),
            });
        }

        Ok(Self { _library: library, vtable: vtable_ptr, contexts: Mutex::new(HashSet::new()) })
    }

    fn vtable(&self) -> &PluginVTable {
        unsafe { &*self.vtable }
    }

    /// Records a `ctx` pointer this handle's `register` call handed
    /// out, so it is freed exactly once when this handle drops.
    fn track_context(&self, ctx: CtxPtr) {
        if !ctx.0.is_null() {
            self.contexts.lock().unwrap().insert(ctx.0 as usize);
        }
    }

    fn call_id(&self, fallback_id: &str) -> Result<String, PluginError> {
        let ptr = std::panic::catch_unwind(|| (self.vtable().id)())
            .map_err(|_| PluginError::Panic { plugin_id: fallback_id.to_string(), operation: "id" })?;
        read_cstr(ptr).ok_or_else(|| PluginError::InvalidArtifact {
            path: PathBuf::new(),
            message: "plugin returned a null id".to_string(),
        })
    }

    fn call_context_key(&self, plugin_id: &str) -> Result<String, PluginError> {
        let ptr = std::panic::catch_unwind(|| (self.vtable().context_key)())
            .map_err(|_| PluginError::Panic { plugin_id: plugin_id.to_string(), operation: "context_key" })?;
        read_cstr(ptr).ok_or_else(|| PluginError::InvalidArtifact {
            path: PathBuf::new(),
            message: format!("plugin '{plugin_id}' returned a null context key"),
        })
    }

    fn call_register(
        &self,
        context_json: &CString,
        plugin_id: &str,
        artifact_path: &Path,
    ) -> Result<Vec<OwnedTaskSpec>, PluginError> {
        let vtable = self.vtable();
        let mut out_tasks: *mut FfiTaskSpec = std::ptr::null_mut();
        let mut out_len: usize = 0;

        let rc = std::panic::catch_unwind(AssertUnwindSafe(|| {
            (vtable.register)(context_json.as_ptr(), &mut out_tasks, &mut out_len)
        }))
        .map_err(|_| PluginError::Panic { plugin_id: plugin_id.to_string(), operation: "register" })?;

        if rc != 0 {
            return Err(PluginError::InvalidArtifact {
                path: artifact_path.to_path_buf(),
                message: format!("plugin '{plugin_id}' registration failed with code {rc}"),
            });
        }

        let raw_specs: &[FfiTaskSpec] = if out_tasks.is_null() || out_len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(out_tasks, out_len) }
        };
        let owned: Vec<OwnedTaskSpec> =
            raw_specs.iter().map(|spec| OwnedTaskSpec::from_ffi(spec, plugin_id)).collect::<Result<_, _>>()?;

        if !out_tasks.is_null() {
            (vtable.free_tasks)(out_tasks, out_len);
        }

        Ok(owned)
    }

    fn free_string(&self, ptr: *mut std::os::raw::c_char) {
        if !ptr.is_null() {
            (self.vtable().free_string)(ptr);
        }
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        if self.vtable.is_null() {
            return;
        }
        let vtable = unsafe { &*self.vtable };
        for ctx in self.contexts.get_mut().unwrap().drain() {
            (vtable.free_ctx)(ctx as *mut c_void);
        }
        unsafe { (vtable.destroy)(self.vtable) };
    }
}

fn read_cstr(ptr: *const std::os::raw::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Pointer payload captured by a task handler closure. Plugin contexts
/// are opaque to the host and the plugin's own vtable entry points are
/// the only code that ever dereferences `ctx`; the host just threads it
/// through unchanged on every call.
#[derive(Clone, Copy)]
struct CtxPtr(*mut c_void);
unsafe impl Send for CtxPtr {}
unsafe impl Sync for CtxPtr {}

/// A task spec copied out of the plugin's FFI struct before the plugin
/// frees the struct itself via `free_tasks`. `ctx` and `handler` are
/// not owned by `free_tasks` — they stay valid for the plugin's
/// lifetime and are threaded into every future handler call.
struct OwnedTaskSpec {
    id: String,
    phase: Option<crate::task::Phase>,
    description: String,
    depends_on: Vec<String>,
    ctx: CtxPtr,
    handler: crate::plugin::abi::TaskHandlerFn,
}

impl OwnedTaskSpec {
    fn from_ffi(spec: &FfiTaskSpec, plugin_id: &str) -> Result<Self, PluginError> {
        let id = read_cstr(spec.id).ok_or_else(|| PluginError::InvalidArtifact {
            path: PathBuf::new(),
            message: format!("plugin '{plugin_id}' registered a task with a null id"),
        })?;
        let phase_str = read_cstr(spec.phase).unwrap_or_default();
        let phase = if phase_str.is_empty() {
            None
        } else {
            Some(phase_str.parse().map_err(|_| PluginError::InvalidArtifact {
                path: PathBuf::new(),
                message: format!("plugin '{plugin_id}' task '{id}' has unknown phase '{phase_str}'"),
            })?)
        };
        let description = read_cstr(spec.description).unwrap_or_default();

        let depends_on = if spec.depends_on.is_null() || spec.depends_on_len == 0 {
            Vec::new()
        } else {
            let raw = unsafe { std::slice::from_raw_parts(spec.depends_on, spec.depends_on_len) };
            raw.iter().filter_map(|ptr| read_cstr(*ptr)).collect()
        };

        Ok(Self { id, phase, description, depends_on, ctx: CtxPtr(spec.ctx), handler: spec.handler })
    }

    fn into_task(self, plugin_id: String, handle: Arc<PluginHandle>) -> Task {
        let ctx = self.ctx;
        let handler_fn = self.handler;
        let task_id = self.id.clone();

        let handler: TaskHandler = Arc::new(move |env: &dyn Environment, _ctx: &ProjectContext<'_>, args: &[String]| {
            invoke_plugin_handler(&handle, ctx, handler_fn, &plugin_id, &task_id, env, args)
        });

        Task {
            id: self.id,
            phase: self.phase,
            depends_on: self.depends_on,
            description: self.description,
            registered_by: plugin_id,
            handler,
        }
    }
}

/// Bridges the `&dyn Environment` trait object across the FFI boundary:
/// a thin, `#[repr(C)]`-free wrapper whose address is handed to the
/// plugin as `user_data`, since a trait object's fat pointer cannot be
/// stuffed into a single `*mut c_void`.
struct EnvBridge<'a> {
    env: &'a dyn Environment,
}

extern "C-unwind" fn run_command_trampoline(
    user_data: *mut c_void,
    cwd: *const std::os::raw::c_char,
    command: *const std::os::raw::c_char,
    timeout_secs: u64,
    out_exit_code: *mut i32,
    out_stdout: *mut *mut std::os::raw::c_char,
    out_stderr: *mut *mut std::os::raw::c_char,
) -> i32 {
    let bridge = unsafe { &*(user_data as *const EnvBridge) };
    let cwd = match read_cstr(cwd) {
        Some(s) => s,
        None => return 2,
    };
    let command = match read_cstr(command) {
        Some(s) => s,
        None => return 2,
    };
    let timeout = if timeout_secs == 0 { None } else { Some(Duration::from_secs(timeout_secs)) };

    match bridge.env.run_command(Path::new(&cwd), &command, timeout) {
        Ok(output) => {
            unsafe {
                *out_exit_code = output.exit_code;
                *out_stdout = CString::new(output.stdout).unwrap_or_default().into_raw();
                *out_stderr = CString::new(output.stderr).unwrap_or_default().into_raw();
            }
            0
        }
        Err(CommandError::Timeout { .. }) => 1,
        Err(CommandError::Spawn { .. }) => 2,
    }
}

extern "C-unwind" fn read_resource_trampoline(
    user_data: *mut c_void,
    name: *const std::os::raw::c_char,
) -> *mut std::os::raw::c_char {
    let bridge = unsafe { &*(user_data as *const EnvBridge) };
    let Some(name) = read_cstr(name) else { return std::ptr::null_mut() };
    match bridge.env.read_resource(&name) {
        Some(text) => CString::new(text).unwrap_or_default().into_raw(),
        None => std::ptr::null_mut(),
    }
}

extern "C-unwind" fn free_string_trampoline(ptr: *mut std::os::raw::c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

fn invoke_plugin_handler(
    handle: &Arc<PluginHandle>,
    ctx: CtxPtr,
    handler_fn: crate::plugin::abi::TaskHandlerFn,
    plugin_id: &str,
    task_id: &str,
    env: &dyn Environment,
    args: &[String],
) -> TaskResult {
    let args_json = match serde_json::to_string(args) {
        Ok(json) => json,
        Err(source) => {
            return TaskResult::failure(format!("failed to encode arguments for '{task_id}': {source}"))
        }
    };
    let args_cstring = match CString::new(args_json) {
        Ok(c) => c,
        Err(_) => return TaskResult::failure(format!("arguments for '{task_id}' contain a NUL byte")),
    };

    let bridge = EnvBridge { env };
    let ffi_env = FfiEnvironment {
        user_data: &bridge as *const EnvBridge as *mut c_void,
        run_command: run_command_trampoline as RunCommandFn,
        read_resource: read_resource_trampoline as ReadResourceFn,
        free_string: free_string_trampoline,
    };

    let call = std::panic::catch_unwind(AssertUnwindSafe(|| {
        (handler_fn)(ctx.0, &ffi_env as *const FfiEnvironment, args_cstring.as_ptr())
    }));

    let result_ptr = match call {
        Ok(ptr) => ptr,
        Err(panic_obj) => {
            let message = panic_message(&panic_obj);
            warn!(plugin = %plugin_id, task = %task_id, %message, "plugin task handler panicked");
            return TaskResult::failure(format!("plugin '{plugin_id}' task '{task_id}' panicked: {message}"));
        }
    };

    if result_ptr.is_null() {
        return TaskResult::failure(format!("plugin '{plugin_id}' task '{task_id}' returned a null result"));
    }
    let result_json = unsafe { CStr::from_ptr(result_ptr) }.to_string_lossy().into_owned();
    handle.free_string(result_ptr);

    match serde_json::from_str::<TaskResult>(&result_json) {
        Ok(result) => result,
        Err(source) => TaskResult::failure(format!(
            "plugin '{plugin_id}' task '{task_id}' returned invalid result JSON: {source}"
        )),
    }
}

fn panic_message(panic_obj: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_obj.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic_obj.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C-unwind" fn handler_echo_ok(
        _ctx: *mut c_void,
        _env: *const FfiEnvironment,
        _args_json: *const std::os::raw::c_char,
    ) -> *mut std::os::raw::c_char {
        std::ptr::null_mut()
    }

    #[test]
    fn from_ffi_parses_id_phase_description_and_depends_on() {
        let id = CString::new("build:compile").unwrap().into_raw();
        let phase = CString::new("BUILD").unwrap().into_raw();
        let description = CString::new("compiles the project").unwrap().into_raw();
        let dep = CString::new("init:setup").unwrap().into_raw();
        let mut deps = [dep];

        let spec = FfiTaskSpec {
            id,
            phase,
            description,
            depends_on: deps.as_mut_ptr(),
            depends_on_len: 1,
            ctx: std::ptr::null_mut(),
            handler: handler_echo_ok,
        };

        let owned = OwnedTaskSpec::from_ffi(&spec, "test-plugin").unwrap();
        assert_eq!(owned.id, "build:compile");
        assert_eq!(owned.phase, Some(crate::task::Phase::Build));
        assert_eq!(owned.description, "compiles the project");
        assert_eq!(owned.depends_on, vec!["init:setup".to_string()]);

        unsafe {
            drop(CString::from_raw(id));
            drop(CString::from_raw(phase));
            drop(CString::from_raw(description));
            drop(CString::from_raw(deps[0]));
        }
    }

    #[test]
    fn from_ffi_rejects_an_unknown_phase_name() {
        let id = CString::new("t").unwrap().into_raw();
        let phase = CString::new("NOT_A_REAL_PHASE").unwrap().into_raw();
        let description = CString::new("").unwrap().into_raw();
        let spec = FfiTaskSpec {
            id,
            phase,
            description,
            depends_on: std::ptr::null_mut(),
            depends_on_len: 0,
            ctx: std::ptr::null_mut(),
            handler: handler_echo_ok,
        };
        assert!(OwnedTaskSpec::from_ffi(&spec, "test-plugin").is_err());
        unsafe {
            drop(CString::from_raw(id));
            drop(CString::from_raw(phase));
            drop(CString::from_raw(description));
        }
    }

    #[test]
    fn from_ffi_treats_a_null_depends_on_as_empty() {
        let id = CString::new("t").unwrap().into_raw();
        let phase = CString::new("").unwrap().into_raw();
        let description = CString::new("").unwrap().into_raw();
        let spec = FfiTaskSpec {
            id,
            phase,
            description,
            depends_on: std::ptr::null_mut(),
            depends_on_len: 0,
            ctx: std::ptr::null_mut(),
            handler: handler_echo_ok,
        };
        let owned = OwnedTaskSpec::from_ffi(&spec, "test-plugin").unwrap();
        assert!(owned.depends_on.is_empty());
        assert_eq!(owned.phase, None);
        unsafe {
            drop(CString::from_raw(id));
            drop(CString::from_raw(phase));
            drop(CString::from_raw(description));
        }
    }

    #[test]
    fn read_cstr_returns_none_for_a_null_pointer() {
        assert_eq!(read_cstr(std::ptr::null()), None);
    }
}
