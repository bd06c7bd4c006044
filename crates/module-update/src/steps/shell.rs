//! Configured shell hooks (extract, migrate, seed, health).

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use super::StepContext;
use crate::error::{Error, Result};

/// Build a shell [`Command`] that executes `cmd_str` via the system shell.
fn shell_command(cmd_str: &str) -> Command {
    #[cfg(windows)]
    {
        let mut c = Command::new("cmd");
        c.args(["/C", cmd_str]);
        c
    }
    #[cfg(not(windows))]
    {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_str);
        c
    }
}

/// Quote a value for interpolation into a POSIX shell command.
fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Substitute `{name}` placeholders with quoted values.
pub(crate) fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |cmd, (name, value)| {
        cmd.replace(&format!("{{{name}}}"), &quote(value))
    })
}

/// Run a hook for `step`, failing the step on a non-zero exit.
///
/// The module is exported as `MODULE_NAME`, `MODULE_VERSION` and
/// `MODULE_PATH`; the hook runs inside `working_dir`.
pub(crate) async fn run_hook(
    step: &'static str,
    template: &str,
    ctx: &StepContext,
    working_dir: &Path,
    extra: &[(&str, &str)],
) -> Result<()> {
    let version = ctx.to_version.to_string();
    let path = ctx.module_path.to_string_lossy();
    let mut vars = vec![
        ("module", ctx.module.as_str()),
        ("version", version.as_str()),
        ("path", path.as_ref()),
    ];
    vars.extend_from_slice(extra);
    let command = render(template, &vars);

    tracing::debug!(step, command = %command, "Running hook");
    let output = shell_command(&command)
        .current_dir(working_dir)
        .env("MODULE_NAME", &ctx.module)
        .env("MODULE_VERSION", &version)
        .env("MODULE_PATH", &ctx.module_path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::step(step, format!("could not run `{command}`: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.trim();
        return Err(Error::step(
            step,
            match output.status.code() {
                Some(code) if detail.is_empty() => format!("`{command}` exited with {code}"),
                Some(code) => format!("`{command}` exited with {code}: {detail}"),
                None => format!("`{command}` was terminated by a signal"),
            },
        ));
    }
    Ok(())
}
