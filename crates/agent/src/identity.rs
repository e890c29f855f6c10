//! Device identity resolution.
//!
//! The id is taken from config when set; otherwise it is read from the
//! identity file, which is created with a fresh `TV-XXXXXXXX` id on first
//! start so the device keeps the same id across restarts.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tl_link::DeviceIdentity;

use crate::config::DeviceConfig;

const UNSPECIFIED_IP: &str = "0.0.0.0";

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    id: String,
}

/// Build the [`DeviceIdentity`] for this process.
pub fn resolve(device: &DeviceConfig) -> anyhow::Result<DeviceIdentity> {
    let id = match device.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => load_or_create_id(&device.identity_file)?,
    };

    let ip = match device.ip.as_deref().map(str::trim) {
        Some(ip) if !ip.is_empty() => ip.to_string(),
        _ => detect_local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNSPECIFIED_IP.into()),
    };

    Ok(DeviceIdentity {
        id,
        model: device.model.clone(),
        brand: device.brand.clone(),
        ip,
        group_id: device.group_id.clone(),
    })
}

/// `TV-` followed by eight uppercase hex characters.
pub fn generate_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("TV-{}", hex[..8].to_ascii_uppercase())
}

fn load_or_create_id(path: &Path) -> anyhow::Result<String> {
    if path.exists() {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let stored: StoredIdentity = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
        if !stored.id.trim().is_empty() {
            return Ok(stored.id);
        }
        tracing::warn!(path = %path.display(), "identity file has an empty id, regenerating");
    }

    let id = generate_id();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(&StoredIdentity { id: id.clone() })?;
    fs::write(path, body).map_err(|e| anyhow::anyhow!("writing {}: {e}", path.display()))?;

    tracing::info!(device_id = %id, path = %path.display(), "generated device id");
    Ok(id)
}

/// Address of the interface holding the default route.  Connecting a UDP
/// socket sends nothing; it only asks the kernel to pick a source address.
fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(dir: &Path) -> DeviceConfig {
        DeviceConfig {
            identity_file: dir.join("data").join("device.json"),
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn generated_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 11);
        assert!(id.starts_with("TV-"));
        assert!(id[3..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn configured_id_wins_and_no_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DeviceConfig {
            id: Some("TV-CAFEBABE".into()),
            ip: Some("10.0.0.9".into()),
            ..device(dir.path())
        };

        let identity = resolve(&cfg).unwrap();
        assert_eq!(identity.id, "TV-CAFEBABE");
        assert_eq!(identity.ip, "10.0.0.9");
        assert!(!cfg.identity_file.exists());
    }

    #[test]
    fn generated_id_is_persisted_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DeviceConfig {
            ip: Some("10.0.0.9".into()),
            ..device(dir.path())
        };

        let first = resolve(&cfg).unwrap();
        assert!(first.id.starts_with("TV-"));
        assert!(cfg.identity_file.exists());

        let second = resolve(&cfg).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn identity_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = device(dir.path());
        fs::create_dir_all(cfg.identity_file.parent().unwrap()).unwrap();
        fs::write(&cfg.identity_file, r#"{"id":"TV-00C0FFEE"}"#).unwrap();

        assert_eq!(resolve(&cfg).unwrap().id, "TV-00C0FFEE");
    }

    #[test]
    fn corrupt_identity_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = device(dir.path());
        fs::create_dir_all(cfg.identity_file.parent().unwrap()).unwrap();
        fs::write(&cfg.identity_file, "not json").unwrap();

        assert!(resolve(&cfg).is_err());
    }

    #[test]
    fn ip_is_never_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DeviceConfig {
            id: Some("TV-1".into()),
            ip: Some("   ".into()),
            ..device(dir.path())
        };
        let identity = resolve(&cfg).unwrap();
        assert!(!identity.ip.is_empty());
        assert!(identity.ip.parse::<IpAddr>().is_ok());
    }
}
