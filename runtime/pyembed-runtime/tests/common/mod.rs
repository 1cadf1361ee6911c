#![allow(dead_code)]

use std::path::PathBuf;

use pyembed_runtime::{EmbedSettings, MemAllocator, PreInitConfig, Runtime};

/// Settings pointing at a real libpython 3.12, or `None` (after printing a
/// skip line) when the environment does not name one.
pub fn settings_or_skip(test: &str) -> Option<EmbedSettings> {
    let settings = EmbedSettings::from_env();
    if !settings.is_configured() {
        eprintln!("skipping {test}: set PYEMBED_LIBRARY or PYEMBED_PYTHON to run");
        return None;
    }
    Some(settings)
}

pub fn library_or_skip(test: &str) -> Option<PathBuf> {
    let settings = settings_or_skip(test)?;
    Some(settings.find_library().expect("locate libpython"))
}

pub fn load_or_skip(test: &str) -> Option<(Runtime, EmbedSettings)> {
    let settings = settings_or_skip(test)?;
    let library = settings.find_library().expect("locate libpython");
    let runtime = Runtime::load(&library).expect("load libpython");
    Some((runtime, settings))
}

pub fn pre_init(runtime: &Runtime) {
    runtime
        .pre_initialize(&PreInitConfig::python().with_allocator(MemAllocator::Malloc))
        .expect("pre-initialize");
}
