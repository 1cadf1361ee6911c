use std::env;
use std::process;
use std::ptr;
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow, bail};
use pyembed_abi::PyObject;
use pyembed_runtime::{
    CallFlags, EmbedError, EmbedSettings, HostFunction, MemAllocator, PreInitConfig, PyRef,
    PyToken, Runtime, StartToken, SubInterpreterConfig, ThreadState, TypeCategory,
    spawn_attached,
};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

const SCRIPT: &str = r#"
import sys
summary = {"version": "%d.%d" % sys.version_info[:2], "host": host_version()}
greeting = "hello from interpreter"
"#;

struct Report {
    interpreter: i64,
    summary: TypeCategory,
    greeting: String,
    host: String,
}

unsafe extern "C" fn host_version(_slf: *mut PyObject, _args: *mut PyObject) -> *mut PyObject {
    let Some(runtime) = RUNTIME.get() else {
        return ptr::null_mut();
    };
    // Called by the interpreter, so the calling thread holds its lock.
    let py = unsafe { PyToken::assume(runtime) };
    py.str(env!("CARGO_PKG_VERSION"))
        .map_or(ptr::null_mut(), PyRef::into_ptr)
}

fn worker(ts: &ThreadState) -> pyembed_runtime::Result<Report> {
    let py = ts.token();
    let globals = py.new_globals()?;
    let host = py.new_function(
        &HostFunction::new("host_version", CallFlags::NoArgs, host_version)
            .with_doc("Version of the embedding host."),
        None,
    )?;
    globals.set("host_version", &host)?;
    py.run(SCRIPT, StartToken::File, &globals, None)?;

    let summary = globals
        .get("summary")?
        .ok_or_else(|| EmbedError::InvalidState("script did not define summary".into()))?;
    let host = match py.dict_get(&summary, "host")? {
        Some(value) => value.to_owned().to_string_lossy()?,
        None => String::new(),
    };
    let greeting = globals
        .get("greeting")?
        .map(|g| g.to_owned().to_string_lossy())
        .transpose()?
        .unwrap_or_default();
    Ok(Report {
        interpreter: ts.interpreter().id(),
        summary: summary.classify(),
        greeting,
        host,
    })
}

fn run() -> Result<()> {
    let settings = EmbedSettings::from_env();
    let library = settings
        .find_library()
        .context("locating libpython (set PYEMBED_LIBRARY or PYEMBED_PYTHON)")?;
    let runtime = Runtime::load(&library).context("loading libpython")?;
    if RUNTIME.set(runtime.clone()).is_err() {
        bail!("runtime registered twice");
    }
    log::info!("using {}", runtime.library_path().display());

    runtime.pre_initialize(&PreInitConfig::python().with_allocator(MemAllocator::Malloc))?;
    let config = settings
        .init_config()
        .context("discovering home and search path")?
        .with_program_name("pyembed-harness");
    let mut main = runtime.initialize(&config)?;

    let report = {
        let mut sub = main.new_sub_interpreter(&SubInterpreterConfig::shared())?;
        let interp = sub.interpreter().clone();
        let joined = sub.allow_threads(|| {
            spawn_attached(&interp, "pyembed-worker", worker).map(|handle| handle.join())
        })?;
        sub.end().map_err(EmbedError::from)?;
        let attached = joined
            .context("spawning worker thread")?
            .map_err(|_| anyhow!("worker thread panicked"))?;
        attached
            .context("attaching worker thread")?
            .context("running worker script")?
    };

    println!("interpreter {}: {}", report.interpreter, report.greeting);
    println!("summary is a {} (host {})", report.summary, report.host);
    if report.summary != TypeCategory::Mapping {
        bail!("summary classified as {}", report.summary);
    }

    main.finalize().map_err(EmbedError::from)?;
    log::info!(
        "done; {} thread state(s) left",
        runtime.live_thread_states()
    );
    Ok(())
}

fn main() -> Result<()> {
    if env::args().skip(1).any(|a| a == "-h" || a == "--help") {
        eprintln!("usage: pyembed-harness");
        eprintln!("  PYEMBED_LIBRARY / PYEMBED_PYTHON select the runtime");
        return Ok(());
    }
    env_logger::init();
    match run() {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(code) = err.downcast_ref::<EmbedError>().and_then(EmbedError::exit_code) {
                process::exit(code);
            }
            Err(err)
        }
    }
}
