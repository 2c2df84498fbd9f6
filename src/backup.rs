use anyhow::{anyhow, bail, Context};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;
use crate::model::now_timestamp;
use crate::store;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/edcona.sqlite3";
const STRUCTURE_ENTRY: &str = "meta/structure.json";
pub const BUNDLE_FORMAT: &str = "edcona-workspace-v1";

/// Tables reported by `backup.stats` and recorded in the manifest.
pub const COUNTED_TABLES: &[(&str, &str)] = &[
    ("users", "users"),
    ("classes", "classes"),
    ("subjects", "subjects"),
    ("parentLinks", "parent_children"),
    ("teacherClasses", "teacher_classes"),
    ("classSubjects", "class_subjects"),
    ("homework", "homework"),
    ("announcements", "announcements"),
    ("grades", "grades"),
    ("attendance", "attendance"),
    ("messages", "messages"),
    ("attachments", "message_attachments"),
];

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub counts: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format: String,
    pub exported_at: Option<String>,
}

pub fn table_counts(conn: &Connection) -> anyhow::Result<serde_json::Value> {
    let mut out = serde_json::Map::new();
    for (key, table) in COUNTED_TABLES {
        let n = store::table_count(conn, table)
            .with_context(|| format!("failed to count {}", table))?;
        out.insert((*key).to_string(), json!(n));
    }
    Ok(serde_json::Value::Object(out))
}

/// School structure without contact details or message bodies.
pub fn structure_snapshot(conn: &Connection) -> anyhow::Result<serde_json::Value> {
    let users = store::list_users(conn, None).context("failed to list users")?;
    let users: Vec<serde_json::Value> = users
        .into_iter()
        .map(|u| {
            json!({
                "id": u.id,
                "name": u.name,
                "role": u.role,
                "classId": u.class_id,
                "parentId": u.parent_id,
                "childrenIds": u.children_ids,
                "subject": u.subject,
                "classIds": u.class_ids,
            })
        })
        .collect();
    let classes = store::list_classes(conn).context("failed to list classes")?;
    let subjects = store::list_subjects(conn).context("failed to list subjects")?;
    let message_count = store::table_count(conn, "messages").context("failed to count messages")?;

    Ok(json!({
        "users": users,
        "classes": classes,
        "subjects": subjects,
        "messageCount": message_count,
    }))
}

fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {} for checksum", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut f, &mut hasher).context("failed to hash database")?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn write_json_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    value: &serde_json::Value,
    opts: FileOptions,
) -> anyhow::Result<()> {
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start {} entry", name))?;
    let text = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", name))?;
    zip.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {} entry", name))?;
    Ok(())
}

pub fn export_bundle(
    conn: &Connection,
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.to_string_lossy());
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let counts = table_counts(conn)?;
    let structure = structure_snapshot(conn)?;
    let db_sha256 = sha256_file(&db_path)?;

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
        "exportedAt": now_timestamp(),
        "counts": counts,
        "dbSha256": db_sha256,
    });
    write_json_entry(&mut zip, MANIFEST_ENTRY, &manifest, opts)?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    write_json_entry(&mut zip, STRUCTURE_ENTRY, &structure, opts)?;
    zip.finish().context("failed to finalize zip bundle")?;

    log::info!(
        "exported bundle {} (sha256 {})",
        out_path.to_string_lossy(),
        db_sha256
    );
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
        counts,
    })
}

/// Replaces the workspace database with the one inside `in_path`. The caller
/// must have closed its connection to the workspace first.
pub fn import_bundle(in_path: &Path, workspace_path: &Path) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        bail!("not a zip bundle: {}", in_path.to_string_lossy());
    }
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

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
        bail!("unsupported bundle format: {}", format);
    }
    let expected_sha = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?
        .to_ascii_lowercase();

    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
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
            .with_context(|| format!("bundle missing {}", DB_ENTRY))?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
        db_out
            .flush()
            .context("failed to flush extracted database")?;
    }

    let actual_sha = sha256_file(&tmp_dst)?;
    if actual_sha != expected_sha {
        let _ = std::fs::remove_file(&tmp_dst);
        bail!(
            "database checksum mismatch: expected {}, got {}",
            expected_sha,
            actual_sha
        );
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

    log::info!("imported bundle {}", in_path.to_string_lossy());
    Ok(ImportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        exported_at: manifest
            .get("exportedAt")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
