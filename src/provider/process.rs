use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::ProviderError;

/// Output of a finished package-manager invocation.
pub(crate) struct Captured {
    pub label: String,
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// Failure description, preferring stderr. Maven reports build errors on stdout.
    pub fn failure(&self) -> ProviderError {
        let detail = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        ProviderError::tool(
            &self.label,
            format!("exited with {}: {}", self.status, detail.trim()),
        )
    }
}

/// Run `executable` with `args` in `cwd`, whatever its exit status.
///
/// Only a failure to spawn is an error here.
pub(crate) fn capture<I, S>(executable: &Path, args: I, cwd: &Path) -> Result<Captured, ProviderError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let label = command_label(executable, &args);
    debug!(command = %label, cwd = %cwd.display(), "running package manager");

    let output = Command::new(executable)
        .args(&args)
        .current_dir(cwd)
        .output()
        .map_err(|e| ProviderError::tool(&label, e))?;

    debug!(command = %label, status = %output.status, "package manager finished");
    Ok(Captured {
        label,
        success: output.status.success(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `executable` with `args` in `cwd` and return its stdout.
///
/// A non-zero exit becomes [`ProviderError::ToolFailed`].
pub(crate) fn run<I, S>(executable: &Path, args: I, cwd: &Path) -> Result<String, ProviderError>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let captured = capture(executable, args, cwd)?;
    if !captured.success {
        return Err(captured.failure());
    }
    Ok(captured.stdout)
}

fn command_label(executable: &Path, args: &[OsString]) -> String {
    let program = executable
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| executable.display().to_string());
    std::iter::once(program)
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}
