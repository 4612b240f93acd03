//! Run command implementation.

use pkd_daemon::{Daemon, DaemonConfig, DaemonExit, EngineBuilder};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Command-line overrides applied on top of the configuration file.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Backend name.
    pub backend: Option<String>,
    /// Configuration file.
    pub config: Option<PathBuf>,
    /// State directory.
    pub state_dir: Option<PathBuf>,
    /// Idle seconds before quitting.
    pub exit_on_idle: Option<u64>,
    /// Developer mode.
    pub developer: bool,
}

/// Builds the configuration the daemon will run with.
pub fn config_for(options: &RunOptions) -> Result<DaemonConfig, Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => DaemonConfig::load(path)?.config_file(path),
        None => DaemonConfig::new(),
    };
    if let Some(backend) = &options.backend {
        config = config.backend(backend);
    }
    if let Some(state_dir) = &options.state_dir {
        config = config.state_dir(state_dir);
    }
    if let Some(secs) = options.exit_on_idle {
        config = config.exit_on_idle(Some(Duration::from_secs(secs)));
    }
    if options.developer {
        config = config.developer_mode(true);
    }
    match std::env::current_exe() {
        Ok(binary) => config = config.binary_file(binary),
        Err(e) => warn!("cannot find own binary, upgrades will not be noticed: {}", e),
    }
    Ok(config)
}

/// Runs the daemon.
pub fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = config_for(&options)?;
    let engine = EngineBuilder::new(config).build().map_err(|e| {
        error!("failed to start: {}", e);
        e
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let exit = runtime.block_on(async move {
        let (daemon, _handle) = Daemon::new(engine);
        daemon
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await
    })?;

    match exit {
        DaemonExit::Shutdown => info!("interrupted"),
        DaemonExit::Quit => info!("asked to quit"),
        DaemonExit::Idle => info!("exiting after idle timeout"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn overrides_apply_over_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("pkd.json");
        std::fs::write(&path, r#"{"backend":"apt","developer_mode":false}"#).unwrap();

        let options = RunOptions {
            backend: Some("dummy".into()),
            config: Some(path.clone()),
            state_dir: Some(temp.path().join("state")),
            exit_on_idle: Some(30),
            developer: true,
        };
        let config = config_for(&options).unwrap();

        assert_eq!(config.backend, "dummy");
        assert!(config.developer_mode);
        assert_eq!(config.exit_on_idle, Some(Duration::from_secs(30)));
        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
        assert_eq!(config.state_dir, Some(temp.path().join("state")));
    }

    #[test]
    fn file_values_survive_without_overrides() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("pkd.json");
        std::fs::write(&path, r#"{"backend":"apt"}"#).unwrap();

        let options = RunOptions {
            config: Some(path),
            ..RunOptions::default()
        };
        let config = config_for(&options).unwrap();
        assert_eq!(config.backend, "apt");
        assert!(!config.developer_mode);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let temp = tempdir().unwrap();
        let options = RunOptions {
            config: Some(temp.path().join("absent.json")),
            ..RunOptions::default()
        };
        assert!(config_for(&options).is_err());
    }
}
