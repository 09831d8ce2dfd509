use anyhow::Result;
use std::env;
use std::process::Command;

use super::common::TestEnvironment;

pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run the built binary against the environment's config, with only the
/// environment's stub directory ahead of the system `PATH`.
pub fn run_repocheck_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let path = match env::var_os("PATH") {
        Some(system) => {
            let mut dirs = vec![env.bin_dir()];
            dirs.extend(env::split_paths(&system));
            env::join_paths(dirs)?
        }
        None => env.bin_dir().into_os_string(),
    };

    let output = Command::new(env!("CARGO_BIN_EXE_repocheck"))
        .args(args)
        .env("REPOCHECK_CONFIG", env.config_path())
        .env("PATH", path)
        .env_remove("REPOCHECK_REPORT_FILE")
        .current_dir(env.path())
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
