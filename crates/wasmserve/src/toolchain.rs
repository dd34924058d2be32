//! External compiler invocation.
//!
//! The build pipeline only talks to a [`Toolchain`]: it hands over an
//! [`Invocation`] and gets back the exit status and the combined output.
//! [`ProcessToolchain`] runs real processes; tests substitute their own.

use crate::error::StartupError;
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// A single command to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Environment variables added on top of the inherited environment.
    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in vars {
            self.envs.push((k.as_ref().to_owned(), v.as_ref().to_owned()));
        }
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Value following `flag` in the argument list.
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(OsString::as_os_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Result of running an [`Invocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub success: bool,
    /// Standard output followed by standard error
    pub output: Vec<u8>,
}

impl ToolOutput {
    pub fn success(output: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(0),
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(code: Option<i32>, output: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            success: false,
            output: output.into(),
        }
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Capability to run external commands.
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput>;
}

/// Runs invocations as child processes.
///
/// The child is killed if the returned future is dropped, so an abandoned
/// request does not leave a compiler running.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessToolchain;

#[async_trait]
impl Toolchain for ProcessToolchain {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await?;
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        Ok(ToolOutput {
            code: output.status.code(),
            success: output.status.success(),
            output: combined,
        })
    }
}

fn is_tinygo(compiler: &str) -> bool {
    Path::new(compiler)
        .file_stem()
        .is_some_and(|stem| stem == "tinygo")
}

/// Find the loader script shipped with the compiler's installation.
///
/// Queries `go env GOROOT` (or `tinygo env TINYGOROOT`) and probes the
/// locations the script has lived at across toolchain releases.
pub async fn locate_runtime_script(
    toolchain: &dyn Toolchain,
    compiler: &str,
) -> Result<PathBuf, StartupError> {
    let (root_var, candidates): (&str, &[&str]) = if is_tinygo(compiler) {
        ("TINYGOROOT", &["targets/wasm_exec.js"])
    } else {
        ("GOROOT", &["lib/wasm/wasm_exec.js", "misc/wasm/wasm_exec.js"])
    };

    let toolchain_error = |detail: String| StartupError::Toolchain {
        compiler: compiler.to_string(),
        detail,
    };

    let invocation = Invocation::new(compiler).args(["env", root_var]);
    let output = toolchain
        .run(&invocation)
        .await
        .map_err(|e| toolchain_error(e.to_string()))?;
    if !output.success {
        return Err(toolchain_error(format!(
            "`{}` failed with {}: {}",
            invocation,
            output.status_text(),
            output.output_lossy().trim()
        )));
    }

    let root = PathBuf::from(output.output_lossy().trim());
    if root.as_os_str().is_empty() {
        return Err(toolchain_error(format!("`{}` printed nothing", invocation)));
    }

    for candidate in candidates {
        let path = root.join(candidate);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!("Using runtime script {}", path.display());
            return Ok(path);
        }
    }

    Err(toolchain_error(format!(
        "wasm_exec.js not found under {}",
        root.display()
    )))
}
