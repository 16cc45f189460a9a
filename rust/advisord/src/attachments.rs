//! Content-addressed attachment store: `<workspace>/attachments/<sha256>`.

use crate::db::attachments_dir;
use anyhow::{anyhow, Context};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub sha256: String,
    pub size_bytes: u64,
}

pub fn blob_path(workspace: &Path, sha256: &str) -> PathBuf {
    attachments_dir(workspace).join(sha256)
}

fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn hash_file(path: &Path) -> anyhow::Result<(String, u64)> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

fn copy_hashing(src: &mut File, out: &mut File) -> anyhow::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;
    loop {
        let n = src.read(&mut buf).context("failed to read attachment source")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])
            .context("failed to write attachment blob")?;
        total += n as u64;
    }
    out.flush().context("failed to flush attachment blob")?;
    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Copies `source` into the store. Identical content is stored once.
pub fn store_file(workspace: &Path, source: &Path) -> anyhow::Result<StoredBlob> {
    let dir = attachments_dir(workspace);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;

    let tmp = dir.join(format!(".incoming-{}", uuid::Uuid::new_v4()));
    let mut src = File::open(source)
        .with_context(|| format!("failed to open {}", source.to_string_lossy()))?;
    let mut out = File::create(&tmp)
        .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;

    let copied = copy_hashing(&mut src, &mut out);
    drop(out);
    let (sha256, total) = match copied {
        Ok(v) => v,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
    };

    let dst = blob_path(workspace, &sha256);
    if dst.is_file() {
        std::fs::remove_file(&tmp).ok();
    } else {
        std::fs::rename(&tmp, &dst).with_context(|| {
            format!("failed to move blob into place at {}", dst.to_string_lossy())
        })?;
    }
    Ok(StoredBlob {
        sha256,
        size_bytes: total,
    })
}

/// True when the stored blob still hashes to its name.
pub fn verify_blob(workspace: &Path, sha256: &str) -> anyhow::Result<bool> {
    if !is_hex_digest(sha256) {
        return Err(anyhow!("invalid blob name {:?}", sha256));
    }
    let (actual, _) = hash_file(&blob_path(workspace, sha256))?;
    Ok(actual == sha256)
}

pub fn export_blob(workspace: &Path, sha256: &str, out_path: &Path) -> anyhow::Result<u64> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::copy(blob_path(workspace, sha256), out_path).with_context(|| {
        format!(
            "failed to copy attachment to {}",
            out_path.to_string_lossy()
        )
    })
}

pub fn remove_blob(workspace: &Path, sha256: &str) -> anyhow::Result<()> {
    if !is_hex_digest(sha256) {
        return Err(anyhow!("invalid blob name {:?}", sha256));
    }
    let p = blob_path(workspace, sha256);
    if p.is_file() {
        std::fs::remove_file(&p)
            .with_context(|| format!("failed to remove {}", p.to_string_lossy()))?;
    }
    Ok(())
}
