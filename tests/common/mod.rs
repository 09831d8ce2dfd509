use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Throwaway system root plus the config file pointing at it.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let env = Self { temp_dir };
        fs::create_dir_all(env.sysroot().join("etc"))?;
        fs::create_dir_all(env.bin_dir())?;
        env.write_config("")?;
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn sysroot(&self) -> PathBuf {
        self.path().join("root")
    }

    /// Directory prepended to `PATH` for stub package manager binaries.
    pub fn bin_dir(&self) -> PathBuf {
        self.path().join("bin")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    pub fn skip_file(&self) -> PathBuf {
        self.path().join("skip")
    }

    pub fn report_file(&self) -> PathBuf {
        self.path().join("failures.jsonl")
    }

    /// Write the config with the test paths plus `extra` TOML lines.
    pub fn write_config(&self, extra: &str) -> Result<()> {
        let config = format!(
            "sysroot = {:?}\nskip_file = {:?}\nreport_file = {:?}\nmachine = \"x86_64\"\n{}",
            self.sysroot().display().to_string(),
            self.skip_file().display().to_string(),
            self.report_file().display().to_string(),
            extra
        );
        fs::write(self.config_path(), config)?;
        Ok(())
    }

    pub fn write_os_release(&self, content: &str) -> Result<()> {
        fs::write(self.sysroot().join("etc/os-release"), content)?;
        Ok(())
    }

    /// Install an executable shell script as `name` in [`Self::bin_dir`].
    #[cfg(unix)]
    pub fn stub_command(&self, name: &str, script: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path = self.bin_dir().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}", script))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    pub fn report_lines(&self) -> Result<Vec<serde_json::Value>> {
        if !self.report_file().exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(self.report_file())?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}
