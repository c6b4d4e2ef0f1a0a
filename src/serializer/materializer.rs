//! Result materialization: turn raw warehouse rows into client-ready JSON
//! by decoding serialized columns and resolving media references to
//! time-limited URLs.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::SerializerConfig;
use crate::fs::{join_uri, UrlSigner};

use super::json_relaxed::relaxed_json_parse;

/// A row whose media columns are structurally broken (missing, not an
/// array, or holding non-string entries). Processing stops at such a row.
struct RowFault(String);

pub struct ResultMaterializer<'a> {
    config: &'a SerializerConfig,
    signer: &'a dyn UrlSigner,
    expiry_secs: u64,
}

impl<'a> ResultMaterializer<'a> {
    pub fn new(config: &'a SerializerConfig, signer: &'a dyn UrlSigner, expiry_secs: u64) -> Self {
        Self { config, signer, expiry_secs }
    }

    /// Materialize a batch of rows.
    ///
    /// Column roles are detected once from the first row's keys and applied
    /// to the whole batch. A structurally broken row aborts processing and
    /// the rows materialized before it are still returned; per-entry signing
    /// failures only skip that entry.
    pub fn materialize(&self, rows: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
        if rows.is_empty() {
            warn!("nothing to materialize, input batch is empty");
            return Vec::new();
        }

        let roles = self.detect_roles(&rows[0]);
        debug!(
            media = ?roles.media,
            root = ?roles.root,
            backup = ?roles.backup,
            "detected column roles"
        );

        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            self.decode_serialized_fields(&mut row);
            if let Err(RowFault(reason)) = self.resolve_media(&mut row, &roles) {
                warn!(reason = %reason, "row is structurally broken, returning partial batch");
                return out;
            }
            out.push(row);
        }
        out
    }

    /// Match the first row's keys against the configured field lists. The
    /// first matching root-path and backup columns win; every matching
    /// media column participates.
    fn detect_roles(&self, first: &Map<String, Value>) -> ColumnRoles {
        let mut roles = ColumnRoles::default();
        for key in first.keys() {
            if self.config.medium_fields.iter().any(|f| f == key) {
                roles.media.push(key.clone());
            }
            if roles.root.is_none() && self.config.root_path_fields.iter().any(|f| f == key) {
                roles.root = Some(key.clone());
            }
            if roles.backup.is_none() && self.config.backup_medium_fields.iter().any(|f| f == key)
            {
                roles.backup = Some(key.clone());
            }
        }
        roles
    }

    /// Decode configured string columns in place. Values that resist every
    /// decoding strategy keep their raw text.
    fn decode_serialized_fields(&self, row: &mut Map<String, Value>) {
        for field in &self.config.parse_json_fields {
            let raw = match row.get(field) {
                Some(Value::String(s)) => s.clone(),
                _ => continue,
            };
            match relaxed_json_parse(&raw) {
                Some(parsed) => {
                    row.insert(field.clone(), parsed);
                }
                None => warn!(field = %field, "column kept as raw text, all decodings failed"),
            }
        }
    }

    fn resolve_media(&self, row: &mut Map<String, Value>, roles: &ColumnRoles) -> Result<(), RowFault> {
        if roles.media.is_empty() {
            return Ok(());
        }

        let root = roles
            .root
            .as_ref()
            .and_then(|f| row.get(f))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        for medium_field in &roles.media {
            let entries = match row.get(medium_field) {
                Some(Value::Array(entries)) => entries.clone(),
                other => {
                    return Err(RowFault(format!(
                        "media column {} is {}",
                        medium_field,
                        match other {
                            None => "missing",
                            Some(_) => "not an array",
                        }
                    )));
                }
            };

            let mut signed = Vec::new();
            for entry in &entries {
                let path = entry.as_str().ok_or_else(|| {
                    RowFault(format!("media column {} holds a non-string entry", medium_field))
                })?;

                let uri = if !self.has_storage_prefix(path) {
                    match &root {
                        Some(root) => join_uri(root, path),
                        None => path.to_string(),
                    }
                } else {
                    path.to_string()
                };

                match self.signer.sign(&uri, self.expiry_secs) {
                    Ok(url) => signed.push(Value::String(url)),
                    Err(e) => debug!(uri = %uri, error = %e, "presigning failed, entry skipped"),
                }
            }

            if signed.is_empty() {
                signed = self.sign_backup_entries(row, roles)?;
            }

            // The original references stay in place when nothing signed.
            if !signed.is_empty() {
                row.insert(medium_field.clone(), Value::Array(signed));
            }
        }
        Ok(())
    }

    /// Second chance for rows whose primary references all failed: sign the
    /// backup column's paths, defaulting bare ones onto the configured
    /// storage prefix.
    fn sign_backup_entries(
        &self,
        row: &Map<String, Value>,
        roles: &ColumnRoles,
    ) -> Result<Vec<Value>, RowFault> {
        let backup_field = match &roles.backup {
            Some(field) => field,
            None => return Ok(Vec::new()),
        };
        let entries = match row.get(backup_field) {
            Some(Value::Array(entries)) if !entries.is_empty() => entries,
            _ => return Ok(Vec::new()),
        };

        let mut signed = Vec::new();
        for entry in entries {
            let path = entry.as_str().ok_or_else(|| {
                RowFault(format!("backup column {} holds a non-string entry", backup_field))
            })?;

            let uri = if self.has_storage_prefix(path) {
                path.to_string()
            } else {
                format!(
                    "{}{}",
                    self.config.default_storage_prefix,
                    path.trim_start_matches('/')
                )
            };

            match self.signer.sign(&uri, self.expiry_secs) {
                Ok(url) => signed.push(Value::String(url)),
                Err(e) => debug!(uri = %uri, error = %e, "backup presigning failed, entry skipped"),
            }
        }
        Ok(signed)
    }

    /// Scheme prefixes match case-insensitively, same as URI scheme
    /// detection in the filesystem layer.
    fn has_storage_prefix(&self, path: &str) -> bool {
        let lower = path.to_ascii_lowercase();
        self.config
            .storage_prefixes
            .iter()
            .any(|prefix| lower.starts_with(&prefix.to_ascii_lowercase()))
    }
}

#[derive(Default)]
struct ColumnRoles {
    media: Vec<String>,
    root: Option<String>,
    backup: Option<String>,
}
