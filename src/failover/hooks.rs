//! Hook Runner
//!
//! External pre/post scripts receive six positional arguments: old host,
//! new host, old port, new port, old proxy name, new proxy name. Stdout
//! and stderr are captured together and handed back for logging. A script
//! that exits non-zero is an outcome to log, never a reason to abort.

use std::process::Command;

use super::errors::HookError;

/// Positional argument contract for hook scripts.
#[derive(Debug, Clone)]
pub struct HookArgs {
    pub old_host: String,
    pub new_host: String,
    pub old_port: String,
    pub new_port: String,
    pub old_proxy_name: String,
    pub new_proxy_name: String,
}

/// Captured result of a hook invocation.
#[derive(Debug, Clone)]
pub struct HookOutput {
    /// Script exited zero.
    pub success: bool,
    /// Exit code when the script terminated normally.
    pub code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Run one hook script to completion.
pub fn run(script: &str, args: &HookArgs) -> Result<HookOutput, HookError> {
    let out = Command::new(script)
        .arg(&args.old_host)
        .arg(&args.new_host)
        .arg(&args.old_port)
        .arg(&args.new_port)
        .arg(&args.old_proxy_name)
        .arg(&args.new_proxy_name)
        .output()?;

    let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&out.stderr));

    Ok(HookOutput {
        success: out.status.success(),
        code: out.status.code(),
        output: combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn args() -> HookArgs {
        HookArgs {
            old_host: "db1".to_string(),
            new_host: "db2".to_string(),
            old_port: "3306".to_string(),
            new_port: "3306".to_string(),
            old_proxy_name: "mxs-db1".to_string(),
            new_proxy_name: "mxs-db2".to_string(),
        }
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_hook_receives_positional_args() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(&tmp, "hook.sh", "#!/bin/sh\necho \"$1 $2 $3 $4 $5 $6\"\n");
        let out = run(&script, &args()).unwrap();
        assert!(out.success);
        assert_eq!(out.output.trim(), "db1 db2 3306 3306 mxs-db1 mxs-db2");
    }

    #[test]
    fn test_hook_nonzero_exit_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(&tmp, "hook.sh", "#!/bin/sh\necho failing >&2\nexit 3\n");
        let out = run(&script, &args()).unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert!(out.output.contains("failing"));
    }

    #[test]
    fn test_missing_script_is_a_spawn_error() {
        let res = run("/nonexistent/hook.sh", &args());
        assert!(res.is_err());
    }

    #[test]
    fn test_hook_combines_stdout_and_stderr() {
        let tmp = TempDir::new().unwrap();
        let script = write_script(&tmp, "hook.sh", "#!/bin/sh\necho out\necho err >&2\n");
        let out = run(&script, &args()).unwrap();
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
    }
}
