//! Process wiring: config → identity → lock → link, then run until a
//! signal or reconnect exhaustion.

use tl_link::{ConnectionManager, LinkBuilder, LinkError};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigSeverity};
use crate::{executor, identity, pid};

/// Assemble the [`ConnectionManager`] described by `config`.
///
/// Acquires the PID lock when one is configured; it is handed to the
/// manager and released at teardown.
pub fn build_manager(config: &Config) -> anyhow::Result<ConnectionManager> {
    if !config.is_runnable() {
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        for issue in &errors {
            tracing::error!("{issue}");
        }
        anyhow::bail!("invalid configuration ({} error(s))", errors.len());
    }

    let identity = identity::resolve(&config.device)?;
    tracing::info!(
        device_id = %identity.id,
        model = %identity.model,
        brand = %identity.brand,
        ip = %identity.ip,
        group_id = %identity.group_id,
        "device identity"
    );

    let executor = executor::from_config(&config.executor);
    tracing::info!(executor = executor.name(), "command executor");

    let mut builder = LinkBuilder::new()
        .endpoint(&config.server.ws_url)
        .register_url(&config.server.register_url)
        .register_timeout(config.register_timeout())
        .identity(identity)
        .executor(executor)
        .connect_timeout(config.connect_timeout())
        .ping_interval(config.ping_interval())
        .health_check_multiplier(config.link.health_check_multiplier)
        .stale_multiplier(config.link.stale_multiplier)
        .max_inbound_bytes(config.link.max_inbound_bytes)
        .reconnect_backoff(config.backoff.policy());

    match config.process.pid_path() {
        Some(path) => builder = builder.resources(Box::new(pid::PidLock::acquire(path)?)),
        None => tracing::info!("PID lock disabled"),
    }

    Ok(builder.build()?)
}

/// Run the agent until shutdown.  A signal-driven shutdown is a clean
/// exit; reconnect exhaustion and other link errors are returned.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let manager = build_manager(&config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    tracing::info!(
        endpoint = %config.server.ws_url,
        version = env!("CARGO_PKG_VERSION"),
        "starting tvlink agent"
    );

    match manager.run(shutdown).await {
        Ok(()) => tracing::info!("agent exited cleanly"),
        Err(LinkError::Shutdown) => tracing::info!("agent shutdown"),
        Err(e) => {
            tracing::error!(error = %e, "agent exited with error");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for SIGINT only");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.ws_url = String::new();
        config.device.identity_file = dir.path().join("device.json");
        config.process.pid_file = Some(dir.path().join("tvlink.pid"));

        let err = build_manager(&config).err().unwrap();
        assert!(err.to_string().contains("invalid configuration"));
        assert!(!config.device.identity_file.exists());
        assert!(!dir.path().join("tvlink.pid").exists());
    }

    #[tokio::test]
    async fn empty_pid_file_runs_without_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.device.id = Some("TV-TEST0002".into());
        config.device.ip = Some("127.0.0.1".into());
        config.device.identity_file = dir.path().join("device.json");
        config.process.pid_file = Some(std::path::PathBuf::new());

        let manager = build_manager(&config).unwrap();
        drop(manager);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn manager_holds_pid_lock_until_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("tvlink.pid");
        let mut config = Config::default();
        config.device.id = Some("TV-TEST0001".into());
        config.device.ip = Some("127.0.0.1".into());
        config.device.identity_file = dir.path().join("device.json");
        config.process.pid_file = Some(pid_path.clone());

        let manager = build_manager(&config).unwrap();
        assert!(pid_path.exists());
        assert!(pid::PidLock::acquire(&pid_path).is_err());

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let result = manager.run(shutdown).await;
        assert!(matches!(result, Err(LinkError::Shutdown)));
        assert!(!pid_path.exists());
    }
}
