//! Finding libpython and the interpreter's home and search path.
//!
//! Explicit settings win; otherwise a `python3` executable is asked through
//! `sysconfig`/`sys`.

use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{EmbedError, Result};
use crate::loader::LIBRARY_NAME;
use crate::state::InitConfig;

const LIBRARY_QUERY: &str = r#"
import sysconfig
print(sysconfig.get_config_var("LIBDIR") or "")
print(sysconfig.get_config_var("LDLIBRARY") or "")
"#;

const PATHS_QUERY: &str = r#"
import sys
print(sys.prefix)
[print(p) for p in sys.path if p]
"#;

/// Environment-driven settings (`PYEMBED_*`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbedSettings {
    pub library: Option<PathBuf>,
    pub python: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub path: Option<Vec<PathBuf>>,
    pub trace_lifecycle: bool,
}

impl EmbedSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var_os(key))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            library: non_empty("PYEMBED_LIBRARY").map(PathBuf::from),
            python: non_empty("PYEMBED_PYTHON").map(PathBuf::from),
            home: non_empty("PYEMBED_HOME").map(PathBuf::from),
            path: non_empty("PYEMBED_PATH").map(|v| env::split_paths(&v).collect()),
            trace_lifecycle: lookup("PYEMBED_TRACE_LIFECYCLE").is_some_and(|v| v == "1"),
        }
    }

    /// True when the caller pointed at a runtime explicitly.
    pub fn is_configured(&self) -> bool {
        self.library.is_some() || self.python.is_some()
    }

    pub fn python_executable(&self) -> PathBuf {
        self.python
            .clone()
            .unwrap_or_else(|| PathBuf::from("python3"))
    }

    pub fn find_library(&self) -> Result<PathBuf> {
        if let Some(path) = &self.library {
            return Ok(path.clone());
        }
        let output = query(&self.python_executable(), LIBRARY_QUERY)?;
        let (libdir, ldlibrary) = parse_library_query(&output)?;
        let path = pick_library(&libdir, ldlibrary.as_deref());
        log::debug!("discovered runtime library {}", path.display());
        Ok(path)
    }

    /// An [`InitConfig`] with home and module search path filled in, from
    /// the overrides or from the python executable.
    pub fn init_config(&self) -> Result<InitConfig> {
        let (home, paths) = match (&self.home, &self.path) {
            (Some(home), Some(path)) => (home.clone(), path.clone()),
            _ => {
                let (home, paths) = find_home_and_paths(&self.python_executable())?;
                (
                    self.home.clone().unwrap_or(home),
                    self.path.clone().unwrap_or(paths),
                )
            }
        };
        let mut config = InitConfig::new().with_home(home);
        for path in paths {
            config = config.with_module_search_path(path);
        }
        Ok(config)
    }
}

/// `sys.prefix` and the non-empty `sys.path` entries of `exe`.
pub fn find_home_and_paths(exe: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    let output = query(exe, PATHS_QUERY)?;
    parse_home_and_paths(&output)
}

fn query(exe: &Path, script: &str) -> Result<String> {
    let output = Command::new(exe)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(script.as_bytes())?;
            }
            child.wait_with_output()
        })
        .map_err(|err| EmbedError::Discovery(format!("running {}: {err}", exe.display())))?;
    if !output.status.success() {
        return Err(EmbedError::Discovery(format!(
            "{} exited with {}: {}",
            exe.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|err| EmbedError::Discovery(format!("non-UTF-8 output: {err}")))
}

pub(crate) fn parse_library_query(output: &str) -> Result<(PathBuf, Option<String>)> {
    let mut lines = output.lines().map(str::trim);
    let libdir = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| EmbedError::Discovery("sysconfig reported no LIBDIR".into()))?;
    let ldlibrary = lines
        .next()
        .filter(|l| !l.is_empty())
        .map(str::to_string);
    Ok((PathBuf::from(libdir), ldlibrary))
}

/// `LIBDIR/LDLIBRARY` when that is a shared object on disk, else the
/// platform's versioned name inside `LIBDIR`.
pub(crate) fn pick_library(libdir: &Path, ldlibrary: Option<&str>) -> PathBuf {
    if let Some(name) = ldlibrary.filter(|n| !n.ends_with(".a")) {
        let candidate = libdir.join(name);
        if candidate.exists() {
            return candidate;
        }
    }
    libdir.join(LIBRARY_NAME)
}

pub(crate) fn parse_home_and_paths(output: &str) -> Result<(PathBuf, Vec<PathBuf>)> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let home = lines
        .next()
        .ok_or_else(|| EmbedError::Discovery("no sys.prefix in output".into()))?;
    Ok((PathBuf::from(home), lines.map(PathBuf::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> EmbedSettings {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        EmbedSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn settings_read_every_variable() {
        let s = settings(&[
            ("PYEMBED_LIBRARY", "/opt/py/lib/libpython3.12.so"),
            ("PYEMBED_HOME", "/opt/py"),
            ("PYEMBED_PATH", "/opt/py/lib/python3.12:/srv/app"),
            ("PYEMBED_TRACE_LIFECYCLE", "1"),
        ]);
        assert_eq!(
            s.library.as_deref(),
            Some(Path::new("/opt/py/lib/libpython3.12.so"))
        );
        assert_eq!(s.home.as_deref(), Some(Path::new("/opt/py")));
        assert_eq!(
            s.path,
            Some(vec![
                PathBuf::from("/opt/py/lib/python3.12"),
                PathBuf::from("/srv/app")
            ])
        );
        assert!(s.trace_lifecycle);
        assert!(s.is_configured());
        assert_eq!(s.python_executable(), PathBuf::from("python3"));
    }

    #[test]
    fn empty_variables_count_as_unset() {
        let s = settings(&[("PYEMBED_LIBRARY", ""), ("PYEMBED_TRACE_LIFECYCLE", "0")]);
        assert_eq!(s, EmbedSettings::default());
        assert!(!s.is_configured());
    }

    #[test]
    fn explicit_library_skips_discovery() {
        let s = settings(&[
            ("PYEMBED_LIBRARY", "/x/libpython3.12.so.1.0"),
            ("PYEMBED_PYTHON", "/nonexistent/python"),
        ]);
        assert_eq!(
            s.find_library().unwrap(),
            PathBuf::from("/x/libpython3.12.so.1.0")
        );
    }

    #[test]
    fn overrides_skip_the_paths_query() {
        let s = settings(&[
            ("PYEMBED_PYTHON", "/nonexistent/python"),
            ("PYEMBED_HOME", "/opt/py"),
            ("PYEMBED_PATH", "/opt/py/lib"),
        ]);
        let config = s.init_config().unwrap();
        assert_eq!(config.home.as_deref(), Some(Path::new("/opt/py")));
        assert_eq!(config.module_search_paths, vec![PathBuf::from("/opt/py/lib")]);
    }

    #[test]
    fn missing_python_is_a_discovery_error() {
        let err = find_home_and_paths(Path::new("/nonexistent/python3")).unwrap_err();
        assert!(matches!(err, EmbedError::Discovery(_)), "{err}");
    }

    #[test]
    fn library_query_parses_both_lines() {
        let (libdir, ld) =
            parse_library_query("/usr/lib/x86_64-linux-gnu\nlibpython3.12.so\n").unwrap();
        assert_eq!(libdir, PathBuf::from("/usr/lib/x86_64-linux-gnu"));
        assert_eq!(ld.as_deref(), Some("libpython3.12.so"));

        let (_, ld) = parse_library_query("/usr/lib\n\n").unwrap();
        assert_eq!(ld, None);
        assert!(parse_library_query("\n").is_err());
    }

    #[test]
    fn pick_library_prefers_existing_shared_object() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("libpython3.12.so");
        std::fs::write(&shared, b"").unwrap();
        assert_eq!(pick_library(dir.path(), Some("libpython3.12.so")), shared);
    }

    #[test]
    fn pick_library_falls_back_for_static_or_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libpython3.12.a"), b"").unwrap();
        assert_eq!(
            pick_library(dir.path(), Some("libpython3.12.a")),
            dir.path().join(LIBRARY_NAME)
        );
        assert_eq!(
            pick_library(dir.path(), Some("libpython3.12.so")),
            dir.path().join(LIBRARY_NAME)
        );
        assert_eq!(pick_library(dir.path(), None), dir.path().join(LIBRARY_NAME));
    }

    #[test]
    fn home_and_paths_skip_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().display().to_string();
        let output = format!("{prefix}\n\n{prefix}/lib/python312.zip\n{prefix}/lib/python3.12\n");
        let (home, paths) = parse_home_and_paths(&output).unwrap();
        assert_eq!(home, dir.path());
        assert_eq!(
            paths,
            vec![
                dir.path().join("lib/python312.zip"),
                dir.path().join("lib/python3.12"),
            ]
        );
        assert!(parse_home_and_paths("").is_err());
    }
}
