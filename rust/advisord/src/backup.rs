use crate::attachments::{blob_path, hash_file};
use crate::db::{attachments_dir, db_path, ATTACHMENTS_DIR};
use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/advisord.sqlite3";
pub const BUNDLE_FORMAT: &str = "advisord-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub attachment_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub attachment_count: usize,
}

fn is_blob_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn blob_names(workspace_path: &Path) -> anyhow::Result<Vec<String>> {
    let dir = attachments_dir(workspace_path);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir)
        .with_context(|| format!("failed to list {}", dir.to_string_lossy()))?
    {
        let entry = entry.context("failed to read attachments directory")?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_blob_name(&name) && entry.path().is_file() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_file_path = db_path(workspace_path);
    if !db_file_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_file_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let blobs = blob_names(workspace_path)?;
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "attachments": blobs.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_file_path).with_context(|| {
        format!(
            "failed to open database {}",
            db_file_path.to_string_lossy()
        )
    })?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    for name in &blobs {
        zip.start_file(format!("{}/{}", ATTACHMENTS_DIR, name), opts)
            .with_context(|| format!("failed to start attachment entry {}", name))?;
        let mut f = File::open(blob_path(workspace_path, name))
            .with_context(|| format!("failed to open attachment {}", name))?;
        std::io::copy(&mut f, &mut zip)
            .with_context(|| format!("failed to write attachment entry {}", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 2 + blobs.len(),
        attachment_count: blobs.len(),
    })
}

/// Restores the database and attachment blobs into `workspace_path`.
/// The caller must have closed any open connection to that workspace.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let blob_dir = attachments_dir(workspace_path);
    std::fs::create_dir_all(&blob_dir)
        .with_context(|| format!("failed to create directory {}", blob_dir.to_string_lossy()))?;

    let dst = db_path(workspace_path);
    let tmp_dst = dst.with_extension("sqlite3.importing");
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    {
        let mut db_out = File::create(&tmp_dst).with_context(|| {
            format!(
                "failed to create temp database {}",
                tmp_dst.to_string_lossy()
            )
        })?;
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/advisord.sqlite3")?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
        db_out
            .flush()
            .context("failed to flush extracted database")?;
    }

    let prefix = format!("{}/", ATTACHMENTS_DIR);
    let mut attachment_count = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("failed to read bundle entry {}", i))?;
        let Some(name) = entry.name().strip_prefix(&prefix).map(str::to_string) else {
            continue;
        };
        if !is_blob_name(&name) {
            tracing::warn!(entry = %entry.name(), "skipping unexpected bundle entry");
            continue;
        }
        let incoming = blob_dir.join(format!(".importing-{}", name));
        {
            let mut out = File::create(&incoming)
                .with_context(|| format!("failed to create {}", incoming.to_string_lossy()))?;
            std::io::copy(&mut entry, &mut out)
                .with_context(|| format!("failed to extract attachment {}", name))?;
        }
        let (actual, _) = hash_file(&incoming)?;
        if actual != name {
            let _ = std::fs::remove_file(&incoming);
            let _ = std::fs::remove_file(&tmp_dst);
            return Err(anyhow!("attachment {} failed its integrity check", name));
        }
        std::fs::rename(&incoming, blob_path(workspace_path, &name))
            .with_context(|| format!("failed to move attachment {} into place", name))?;
        attachment_count += 1;
    }

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
        attachment_count,
    })
}
