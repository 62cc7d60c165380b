use super::SeedStore;
use crate::{
    catalog::{ContentDefinition, ContentLibrary, ContentType, ContentVersion},
    error::{SeedError, SeedResult},
    import::ContentExport,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

/// What an import did to the stored catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// A version not seen before was stored and activated.
    Created,
    /// The version existed with a different hash; its definitions were
    /// replaced and it was activated.
    Updated,
    /// Same version, same hash. Nothing was written.
    Unchanged,
}

impl SeedStore {
    /// Import an export and make it the active version, in one transaction.
    pub fn import_content(
        &self,
        export: &ContentExport,
        imported_at: DateTime<Utc>,
    ) -> SeedResult<ImportOutcome> {
        export.check()?;
        let version = export.version.as_str();
        let hash = export.content_hash()?;

        let tx = self.conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT content_hash FROM content_version WHERE version = ?1",
                params![version],
                |row| row.get(0),
            )
            .optional()?;
        let outcome = match existing.as_deref() {
            Some(stored) if stored == hash => {
                log::info!("content: version {version} unchanged (hash {hash}); skipping import");
                return Ok(ImportOutcome::Unchanged);
            }
            Some(_) => ImportOutcome::Updated,
            None => ImportOutcome::Created,
        };

        tx.execute(
            "INSERT INTO content_version (version, content_hash, exported_at, imported_at, is_active)
             VALUES (?1, ?2, ?3, ?4, 0)
             ON CONFLICT(version) DO UPDATE SET
                content_hash = excluded.content_hash,
                exported_at  = excluded.exported_at,
                imported_at  = excluded.imported_at",
            params![version, hash, export.exported_at, imported_at.to_rfc3339()],
        )?;
        tx.execute(
            "DELETE FROM content_definition WHERE version = ?1",
            params![version],
        )?;

        let definitions = export.typed_definitions();
        {
            // Duplicate ids keep the first occurrence.
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO content_definition (
                    version, content_id, content_type, name, properties, is_active, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            )?;
            for (position, def) in definitions.iter().enumerate() {
                insert.execute(params![
                    version,
                    def.content_id,
                    def.content_type.as_str(),
                    def.name,
                    serde_json::to_string(&def.properties)?,
                    position as i64,
                ])?;
            }
        }

        tx.execute(
            "UPDATE content_version SET is_active = CASE WHEN version = ?1 THEN 1 ELSE 0 END",
            params![version],
        )?;
        tx.commit()?;

        log::info!(
            "content: imported version {version} ({} definitions, {:?}) and activated it",
            definitions.len(),
            outcome
        );
        Ok(outcome)
    }

    /// Make `version` the only active version.
    pub fn activate_content_version(&self, version: &str) -> SeedResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE content_version SET is_active = CASE WHEN version = ?1 THEN 1 ELSE 0 END",
            params![version],
        )?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM content_version WHERE version = ?1)",
            params![version],
            |row| row.get(0),
        )?;
        if !exists {
            // Dropping the transaction rolls the update back.
            return Err(SeedError::UnknownContentVersion {
                version: version.to_string(),
            });
        }
        tx.commit()?;
        log::info!("content: activated version {version} ({updated} versions touched)");
        Ok(())
    }

    pub fn content_versions(&self) -> SeedResult<Vec<ContentVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT version, content_hash, exported_at, is_active
             FROM content_version ORDER BY imported_at, version",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ContentVersion {
                version: row.get(0)?,
                content_hash: row.get(1)?,
                exported_at: row.get(2)?,
                is_active: row.get::<_, i64>(3)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every stored version, materialised with typed property views.
    pub fn load_library(&self) -> SeedResult<ContentLibrary> {
        let mut library = ContentLibrary::new();
        let mut stmt = self.conn.prepare(
            "SELECT content_id, content_type, name, properties, is_active
             FROM content_definition WHERE version = ?1 ORDER BY position",
        )?;

        for info in self.content_versions()? {
            let rows = stmt
                .query_map(params![info.version], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut definitions = Vec::with_capacity(rows.len());
            for (content_id, raw_type, name, properties, is_active) in rows {
                let Some(content_type) = ContentType::parse(&raw_type) else {
                    log::warn!("content: '{content_id}' has unknown type '{raw_type}'; skipped");
                    continue;
                };
                let properties: Value = serde_json::from_str(&properties)?;
                let mut def = ContentDefinition::new(content_id, content_type, name, properties);
                def.is_active = is_active != 0;
                definitions.push(def);
            }
            library.insert_version(info, definitions);
        }
        Ok(library)
    }
}
