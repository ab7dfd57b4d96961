//! Starting child processes with redirected stdio and a merged environment

use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use crate::command::Command;
use crate::error::{Error, Result};

/// Keep `cmd.exe` from opening a console window for the child.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

fn is_path_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("PATH")
}

/// Merge environment layers over an inherited search path
///
/// Layers apply in order. A `PATH` entry in a layer is prepended to the path
/// accumulated so far instead of replacing it; every other key is set as given,
/// later layers winning.
pub fn merge_environment(
    inherited_path: Option<OsString>,
    layers: &[&HashMap<String, String>],
) -> Result<Vec<(OsString, OsString)>> {
    let mut vars: Vec<(OsString, OsString)> = Vec::new();
    let mut path = inherited_path;
    let mut path_changed = false;

    for layer in layers {
        let mut keys: Vec<&String> = layer.keys().collect();
        keys.sort();
        for key in keys {
            let value = &layer[key];
            if is_path_key(key) {
                let mut entries: Vec<PathBuf> = env::split_paths(value).collect();
                if let Some(current) = &path {
                    entries.extend(env::split_paths(current));
                }
                let joined = env::join_paths(entries).map_err(|e| {
                    Error::spawn_failed(format!("Invalid PATH override '{}': {}", value, e))
                })?;
                path = Some(joined);
                path_changed = true;
            } else {
                vars.retain(|(existing, _)| existing != key.as_str());
                vars.push((OsString::from(key), OsString::from(value)));
            }
        }
    }

    if path_changed {
        if let Some(path) = path {
            vars.push((OsString::from("PATH"), path));
        }
    }

    Ok(vars)
}

/// Apply the working directory and merged environment to `command`
pub fn configure(
    command: &mut Command,
    default_env: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
    working_dir: Option<&Path>,
) -> Result<()> {
    for (key, val) in merge_environment(env::var_os("PATH"), &[default_env, overrides])? {
        command.env(key, val);
    }

    if let Some(dir) = working_dir {
        if !dir.is_dir() {
            return Err(Error::spawn_failed(format!(
                "Working directory '{}' does not exist",
                dir.display()
            )));
        }
        command.current_dir(dir);
    }

    Ok(())
}

/// Spawn `command` with all three standard streams piped
///
/// On Unix the child leads its own process group so cancellation can reach
/// anything it starts. On Windows no console window is created.
pub fn spawn(command: &Command) -> Result<Child> {
    let mut cmd = command.prepare();
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::CommandNotFound {
            command: command.get_program().to_string_lossy().into_owned(),
        },
        _ => Error::spawn_failed(format!("Failed to spawn process: {}", e)),
    })
}

/// Whether an executable named `name` is on the `PATH`
pub fn command_exists(name: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };

    #[cfg(windows)]
    let extensions: Vec<String> = env::var("PATHEXT")
        .unwrap_or_else(|_| ".EXE;.BAT;.CMD".to_string())
        .split(';')
        .map(str::to_string)
        .collect();

    env::split_paths(&path).any(|dir| {
        if dir.as_os_str().is_empty() {
            return false;
        }
        if dir.join(name).is_file() {
            return true;
        }

        #[cfg(windows)]
        {
            extensions
                .iter()
                .any(|ext| dir.join(format!("{}{}", name, ext)).is_file())
        }

        #[cfg(not(windows))]
        {
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn lookup<'a>(vars: &'a [(OsString, OsString)], key: &str) -> Option<&'a OsString> {
        vars.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[cfg(unix)]
    #[test]
    fn test_path_is_prepended() {
        let overrides = map(&[("PATH", "/opt/a:/opt/b"), ("FOO", "bar")]);
        let vars = merge_environment(Some("/usr/bin:/bin".into()), &[&overrides]).unwrap();

        assert_eq!(
            lookup(&vars, "PATH"),
            Some(&OsString::from("/opt/a:/opt/b:/usr/bin:/bin"))
        );
        assert_eq!(lookup(&vars, "FOO"), Some(&OsString::from("bar")));
    }

    #[cfg(unix)]
    #[test]
    fn test_layers_stack() {
        let defaults = map(&[("PATH", "/default/bin"), ("MODE", "default")]);
        let overrides = map(&[("path", "/request/bin"), ("MODE", "request")]);
        let vars = merge_environment(Some("/usr/bin".into()), &[&defaults, &overrides]).unwrap();

        assert_eq!(
            lookup(&vars, "PATH"),
            Some(&OsString::from("/request/bin:/default/bin:/usr/bin"))
        );
        assert_eq!(lookup(&vars, "MODE"), Some(&OsString::from("request")));
        assert_eq!(vars.iter().filter(|(k, _)| k == "MODE").count(), 1);
    }

    #[test]
    fn test_untouched_path_is_not_set() {
        let overrides = map(&[("ONLY", "this")]);
        let vars = merge_environment(Some("/usr/bin".into()), &[&overrides]).unwrap();
        assert!(lookup(&vars, "PATH").is_none());
    }

    #[test]
    fn test_missing_working_dir_fails() {
        let mut cmd = Command::new("true");
        let err = configure(
            &mut cmd,
            &HashMap::new(),
            &HashMap::new(),
            Some(Path::new("/no/such/dir/anywhere")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
    }

    #[test]
    fn test_spawn_missing_program() {
        let cmd = Command::new("this_command_does_not_exist_12345");
        let err = spawn(&cmd).unwrap_err();
        assert!(matches!(err, Error::CommandNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("this_command_does_not_exist_12345"));
    }
}
