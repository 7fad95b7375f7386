use std::process::{Command, Output};

use crate::error::{Result, TardisError};

fn render(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<String> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect();
    format!("{} {}", program, args.join(" "))
}

pub fn run_command(cmd: &mut Command) -> Result<i32> {
    tracing::debug!("exec: {}", render(cmd));
    let status = cmd
        .status()
        .map_err(|e| TardisError::message(format!("{}: {}", cmd.get_program().to_string_lossy(), e)))?;
    Ok(status.code().unwrap_or(1))
}

/// Run and capture stdout; used where the tool's output is the result
/// (losetup --find --show).
pub fn run_capture(cmd: &mut Command) -> Result<(i32, String)> {
    tracing::debug!("exec: {}", render(cmd));
    let Output { status, stdout, .. } = cmd
        .output()
        .map_err(|e| TardisError::message(format!("{}: {}", cmd.get_program().to_string_lossy(), e)))?;
    Ok((
        status.code().unwrap_or(1),
        String::from_utf8_lossy(&stdout).trim().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_reports_exit_code() {
        let rc = run_command(Command::new("false").arg("ignored")).unwrap();
        assert_ne!(rc, 0);
        let rc = run_command(&mut Command::new("true")).unwrap();
        assert_eq!(rc, 0);
    }

    #[test]
    fn run_capture_trims_output() {
        let (rc, out) = run_capture(Command::new("echo").arg("hello")).unwrap();
        assert_eq!(rc, 0);
        assert_eq!(out, "hello");
    }
}
