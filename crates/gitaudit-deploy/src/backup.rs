//! Backup / Rollback steps: snapshot the files a deployment is about to
//! touch into a timestamped sibling directory before Apply, and restore
//! from that snapshot if Apply or Verify fails.

use chrono::{DateTime, Utc};
use gitaudit_capabilities::RemoteFS;
use gitaudit_core::{Fingerprint, GitopsResult};
use serde::{Deserialize, Serialize};

use crate::types::DeploymentFileSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

pub fn backup_ref(destination_dir: &str, deployment_id: uuid::Uuid, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S");
    let prefix = if destination_dir.is_empty() { String::new() } else { format!("{destination_dir}/") };
    format!("{prefix}backup/{stamp}-{deployment_id}")
}

fn join(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_string()
    } else {
        format!("{dir}/{path}")
    }
}

/// Snapshots the current bytes of every file the plan is about to touch.
/// Files that don't exist yet (a fresh `create`) are skipped — there is
/// nothing to restore them to.
pub async fn snapshot(
    fs: &dyn RemoteFS,
    share: &str,
    destination_dir: &str,
    backup_ref: &str,
    files: &[DeploymentFileSpec],
) -> GitopsResult<Manifest> {
    fs.create_dir(share, backup_ref).await?;

    let mut manifest = Manifest::default();
    for file in files {
        let source_path = join(destination_dir, &file.path);
        let Ok(bytes) = fs.read_file(share, &source_path).await else {
            continue;
        };
        let backup_path = join(backup_ref, &file.path);
        fs.write_file(share, &backup_path, &bytes).await?;
        manifest.files.push(ManifestEntry {
            path: file.path.clone(),
            hash: Fingerprint::of(&bytes).to_hex(),
            size: bytes.len() as u64,
        });
    }

    let manifest_bytes = serde_json::to_vec_pretty(&manifest).unwrap_or_default();
    fs.write_file(share, &join(backup_ref, "manifest.json"), &manifest_bytes).await?;
    Ok(manifest)
}

/// Restores every manifest entry back onto the destination.
pub async fn restore(fs: &dyn RemoteFS, share: &str, destination_dir: &str, backup_ref: &str) -> GitopsResult<()> {
    let manifest_bytes = fs.read_file(share, &join(backup_ref, "manifest.json")).await?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| gitaudit_core::GitopsError::internal(format!("corrupt backup manifest at {backup_ref}: {e}")))?;

    for entry in &manifest.files {
        let bytes = fs.read_file(share, &join(backup_ref, &entry.path)).await?;
        fs.write_file(share, &join(destination_dir, &entry.path), &bytes).await?;
    }
    Ok(())
}
