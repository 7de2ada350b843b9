//! launchd agent management via `launchctl`

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::plist::LaunchAgent;

/// Label of the LaunchAgent job
pub const LABEL: &str = "com.puck.daemon";

const LAUNCHCTL: &str = "/bin/launchctl";
const PS: &str = "/bin/ps";

/// Service management errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("service not installed at {0}; run `puck service install` first")]
    NotInstalled(PathBuf),
}

/// Installed and running state of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub installed: bool,
    pub running: bool,
}

/// Installs and controls the daemon's LaunchAgent
pub struct ServiceManager {
    agent_path: PathBuf,
    executable: PathBuf,
    log_path: PathBuf,
    data_dir: PathBuf,
}

impl ServiceManager {
    /// `home` is the user's home directory; the plist goes under
    /// `~/Library/LaunchAgents`
    pub fn new(home: &Path, executable: PathBuf, log_path: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            agent_path: home
                .join("Library")
                .join("LaunchAgents")
                .join(format!("{LABEL}.plist")),
            executable,
            log_path,
            data_dir,
        }
    }

    pub fn agent_path(&self) -> &Path {
        &self.agent_path
    }

    /// The job description written by `install`
    pub fn agent(&self) -> LaunchAgent {
        LaunchAgent {
            label: LABEL.to_string(),
            program_arguments: vec![
                self.executable.to_string_lossy().into_owned(),
                "run".to_string(),
                "--log-file".to_string(),
                self.log_path.to_string_lossy().into_owned(),
            ],
            working_directory: Some(self.data_dir.clone()),
            run_at_load: true,
            keep_alive: true,
            stdout_path: Some(self.log_path.clone()),
            stderr_path: Some(self.log_path.clone()),
        }
    }

    pub fn install(&self) -> Result<(), ServiceError> {
        if let Some(parent) = self.agent_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(&self.agent_path, self.agent().to_xml())?;
        info!(path = %self.agent_path.display(), "service installed");
        Ok(())
    }

    pub fn uninstall(&self) -> Result<(), ServiceError> {
        self.stop()?;
        if self.agent_path.exists() {
            std::fs::remove_file(&self.agent_path)?;
        }
        info!("service uninstalled");
        Ok(())
    }

    pub fn start(&self) -> Result<(), ServiceError> {
        if !self.agent_path.exists() {
            return Err(ServiceError::NotInstalled(self.agent_path.clone()));
        }
        launchctl("load", &self.agent_path)?;
        info!("service started");
        Ok(())
    }

    /// Unload the agent; a missing plist is not an error
    pub fn stop(&self) -> Result<(), ServiceError> {
        if !self.agent_path.exists() {
            return Ok(());
        }
        launchctl("unload", &self.agent_path)?;
        info!("service stopped");
        Ok(())
    }

    pub fn restart(&self) -> Result<(), ServiceError> {
        self.stop()?;
        self.start()
    }

    pub fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let output = Command::new(PS).args(["-ax", "-o", "command"]).output()?;
        let listing = String::from_utf8_lossy(&output.stdout);
        let name = self.executable.to_string_lossy();

        Ok(ServiceStatus {
            installed: self.agent_path.exists(),
            running: process_running(&listing, &name, &["run"], &["service"]),
        })
    }
}

fn launchctl(verb: &str, plist: &Path) -> Result<(), ServiceError> {
    debug!(verb, path = %plist.display(), "invoking launchctl");
    let output = Command::new(LAUNCHCTL).arg(verb).arg(plist).output()?;

    if output.status.success() {
        Ok(())
    } else {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(ServiceError::CommandFailed {
            command: format!("launchctl {verb}"),
            output: text.trim().to_string(),
        })
    }
}

/// Whether any line of a `ps -o command` listing contains `name` and every
/// required argument but none of the excluded patterns
fn process_running(listing: &str, name: &str, args: &[&str], exclude: &[&str]) -> bool {
    listing.lines().any(|command| {
        command.contains(name)
            && args.iter().all(|arg| command.contains(arg))
            && !exclude.iter().any(|pattern| command.contains(pattern))
    })
}
