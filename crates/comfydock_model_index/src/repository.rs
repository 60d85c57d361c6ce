use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::{
    IndexStats, ModelIndexError, ModelLocation, ModelSource, ModelWithLocation, SourceType, hash,
};

/// Bumping this drops and rebuilds the database; the index is derived data
/// and can always be rebuilt from a filesystem scan.
const SCHEMA_VERSION: i64 = 7;

const CREATE_MODELS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS models (
    hash TEXT PRIMARY KEY,
    file_size INTEGER NOT NULL,
    blake3_hash TEXT,
    sha256_hash TEXT,
    first_seen INTEGER NOT NULL,
    metadata TEXT DEFAULT '{}'
)";

const CREATE_MODEL_LOCATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS model_locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_hash TEXT NOT NULL,
    relative_path TEXT NOT NULL,
    filename TEXT NOT NULL,
    mtime REAL NOT NULL,
    last_seen INTEGER NOT NULL,
    FOREIGN KEY (model_hash) REFERENCES models(hash) ON DELETE CASCADE,
    UNIQUE(relative_path)
)";

const CREATE_MODEL_SOURCES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS model_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_hash TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_url TEXT NOT NULL,
    metadata TEXT DEFAULT '{}',
    added_time INTEGER NOT NULL,
    FOREIGN KEY (model_hash) REFERENCES models(hash) ON DELETE CASCADE,
    UNIQUE(model_hash, source_url)
)";

const CREATE_SCHEMA_INFO_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_info (
    version INTEGER PRIMARY KEY
)";

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_locations_hash ON model_locations(model_hash)",
    "CREATE INDEX IF NOT EXISTS idx_locations_path ON model_locations(relative_path)",
    "CREATE INDEX IF NOT EXISTS idx_locations_filename ON model_locations(filename)",
    "CREATE INDEX IF NOT EXISTS idx_models_blake3 ON models(blake3_hash)",
    "CREATE INDEX IF NOT EXISTS idx_models_sha256 ON models(sha256_hash)",
    "CREATE INDEX IF NOT EXISTS idx_sources_hash ON model_sources(model_hash)",
    "CREATE INDEX IF NOT EXISTS idx_sources_type ON model_sources(source_type)",
];

const MODEL_WITH_LOCATION_SELECT: &str = "
SELECT m.hash, m.file_size, m.blake3_hash, m.sha256_hash, m.metadata,
       l.relative_path, l.filename, l.mtime, l.last_seen
FROM models m
JOIN model_locations l ON m.hash = l.model_hash
";

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The workspace-wide content-addressed model index.
///
/// One handle per process is expected; the connection is serialized behind
/// a mutex and every operation is a short transaction.
pub struct ModelRepository {
    connection: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for ModelRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRepository")
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl ModelRepository {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, ModelIndexError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let connection = Connection::open(&db_path)?;

        // WAL gives concurrent readers with a single writer; the index is a
        // cache of filesystem state, so relaxed sync is acceptable.
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;
        connection.pragma_update(None, "foreign_keys", "ON")?;
        connection.busy_timeout(std::time::Duration::from_secs(5))?;

        let repository = Self {
            connection: Mutex::new(connection),
            db_path,
        };
        repository.ensure_schema()?;
        Ok(repository)
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, ModelIndexError> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        Ok(f(&connection)?)
    }

    fn ensure_schema(&self) -> Result<(), ModelIndexError> {
        self.with_connection(|conn| {
            create_schema(conn)?;

            let version: Option<i64> = conn
                .query_row("SELECT version FROM schema_info LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            match version {
                None => {
                    conn.execute("INSERT INTO schema_info (version) VALUES (?1)", [SCHEMA_VERSION])?;
                }
                Some(version) if version != SCHEMA_VERSION => {
                    tracing::info!(
                        "dropping model index schema v{version}, rebuilding as v{SCHEMA_VERSION}"
                    );
                    conn.execute_batch(
                        "DROP TABLE IF EXISTS model_sources;
                         DROP TABLE IF EXISTS model_locations;
                         DROP TABLE IF EXISTS models;
                         DROP TABLE IF EXISTS schema_info;",
                    )?;
                    create_schema(conn)?;
                    conn.execute("INSERT INTO schema_info (version) VALUES (?1)", [SCHEMA_VERSION])?;
                }
                Some(_) => {}
            }
            Ok(())
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // Models

    /// Insert the model row when missing; existing rows are left untouched.
    pub fn ensure_model(
        &self,
        hash: &str,
        file_size: u64,
        blake3_hash: Option<&str>,
        sha256_hash: Option<&str>,
    ) -> Result<(), ModelIndexError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO models
                 (hash, file_size, blake3_hash, sha256_hash, first_seen, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, '{}')",
                params![hash, file_size as i64, blake3_hash, sha256_hash, now()],
            )?;
            Ok(())
        })
    }

    pub fn has_model(&self, hash: &str) -> Result<bool, ModelIndexError> {
        self.with_connection(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM models WHERE hash = ?1 LIMIT 1", [hash], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn update_blake3(&self, hash: &str, blake3_hash: &str) -> Result<(), ModelIndexError> {
        let affected = self.with_connection(|conn| {
            conn.execute(
                "UPDATE models SET blake3_hash = ?1 WHERE hash = ?2",
                params![blake3_hash, hash],
            )
        })?;
        if affected == 0 {
            return Err(ModelIndexError::ModelNotFound(hash.to_string()));
        }
        Ok(())
    }

    pub fn update_sha256(&self, hash: &str, sha256_hash: &str) -> Result<(), ModelIndexError> {
        let affected = self.with_connection(|conn| {
            conn.execute(
                "UPDATE models SET sha256_hash = ?1 WHERE hash = ?2",
                params![sha256_hash, hash],
            )
        })?;
        if affected == 0 {
            return Err(ModelIndexError::ModelNotFound(hash.to_string()));
        }
        Ok(())
    }

    // Locations

    /// Add or replace (by relative path) a location for a model.
    pub fn add_location(
        &self,
        model_hash: &str,
        relative_path: &str,
        filename: &str,
        mtime: f64,
    ) -> Result<(), ModelIndexError> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO model_locations
                 (model_hash, relative_path, filename, mtime, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![model_hash, relative_path, filename, mtime, now()],
            )?;
            Ok(())
        })
    }

    pub fn get_locations(&self, model_hash: &str) -> Result<Vec<ModelLocation>, ModelIndexError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model_hash, relative_path, filename, mtime, last_seen
                 FROM model_locations WHERE model_hash = ?1
                 ORDER BY relative_path",
            )?;
            let rows = stmt
                .query_map([model_hash], |row| {
                    Ok(ModelLocation {
                        model_hash: row.get(0)?,
                        relative_path: row.get(1)?,
                        filename: row.get(2)?,
                        mtime: row.get(3)?,
                        last_seen: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn remove_location(&self, relative_path: &str) -> Result<bool, ModelIndexError> {
        let affected = self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM model_locations WHERE relative_path = ?1",
                [relative_path],
            )
        })?;
        Ok(affected > 0)
    }

    /// Delete location rows whose file no longer exists under `models_dir`.
    /// Model rows themselves are preserved (historical metadata).
    pub fn clean_stale_locations(&self, models_dir: &Path) -> Result<usize, ModelIndexError> {
        let rows: Vec<(i64, String)> = self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, relative_path FROM model_locations")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut removed = 0usize;
        for (id, relative_path) in rows {
            if !models_dir.join(&relative_path).exists() {
                self.with_connection(|conn| {
                    conn.execute("DELETE FROM model_locations WHERE id = ?1", [id])
                })?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("cleaned up {removed} stale model location(s)");
        }
        Ok(removed)
    }

    // Queries

    pub fn get_all_models(&self) -> Result<Vec<ModelWithLocation>, ModelIndexError> {
        self.query_models(&format!("{MODEL_WITH_LOCATION_SELECT} ORDER BY l.relative_path"), &[])
    }

    /// Prefix match across the short hash and the full blake3/sha256 hashes.
    pub fn find_model_by_hash(
        &self,
        hash_prefix: &str,
    ) -> Result<Vec<ModelWithLocation>, ModelIndexError> {
        let pattern = format!("{}%", escape_like(hash_prefix));
        self.query_models(
            &format!(
                "{MODEL_WITH_LOCATION_SELECT}
                 WHERE m.hash LIKE ?1 ESCAPE '\\'
                    OR m.blake3_hash LIKE ?1 ESCAPE '\\'
                    OR m.sha256_hash LIKE ?1 ESCAPE '\\'
                 ORDER BY l.relative_path"
            ),
            &[&pattern],
        )
    }

    /// Substring match on the location filename.
    pub fn find_by_filename(
        &self,
        filename_query: &str,
    ) -> Result<Vec<ModelWithLocation>, ModelIndexError> {
        let pattern = format!("%{}%", escape_like(filename_query));
        self.query_models(
            &format!(
                "{MODEL_WITH_LOCATION_SELECT}
                 WHERE l.filename LIKE ?1 ESCAPE '\\'
                 ORDER BY l.relative_path"
            ),
            &[&pattern],
        )
    }

    pub fn find_by_exact_path(
        &self,
        relative_path: &str,
    ) -> Result<Option<ModelWithLocation>, ModelIndexError> {
        Ok(self
            .query_models(
                &format!("{MODEL_WITH_LOCATION_SELECT} WHERE l.relative_path = ?1 LIMIT 1"),
                &[&relative_path.to_string()],
            )?
            .into_iter()
            .next())
    }

    /// Substring match on filename or path.
    pub fn search(&self, term: &str) -> Result<Vec<ModelWithLocation>, ModelIndexError> {
        let pattern = format!("%{}%", escape_like(term));
        self.query_models(
            &format!(
                "{MODEL_WITH_LOCATION_SELECT}
                 WHERE l.filename LIKE ?1 ESCAPE '\\' OR l.relative_path LIKE ?1 ESCAPE '\\'
                 ORDER BY l.filename"
            ),
            &[&pattern],
        )
    }

    /// All models whose location sits under `<category>/`.
    pub fn get_by_category(&self, category: &str) -> Result<Vec<ModelWithLocation>, ModelIndexError> {
        let pattern = format!("{}/%", escape_like(category));
        self.query_models(
            &format!(
                "{MODEL_WITH_LOCATION_SELECT}
                 WHERE l.relative_path LIKE ?1 ESCAPE '\\'
                 ORDER BY l.filename"
            ),
            &[&pattern],
        )
    }

    fn query_models(
        &self,
        sql: &str,
        params: &[&String],
    ) -> Result<Vec<ModelWithLocation>, ModelIndexError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|p| *p as &dyn rusqlite::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), row_to_model)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // Sources

    pub fn add_source(
        &self,
        model_hash: &str,
        source_type: SourceType,
        source_url: &str,
        metadata: Option<&Value>,
    ) -> Result<(), ModelIndexError> {
        let metadata = metadata
            .map(|m| m.to_string())
            .unwrap_or_else(|| "{}".to_string());
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO model_sources
                 (model_hash, source_type, source_url, metadata, added_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![model_hash, source_type.as_str(), source_url, metadata, now()],
            )?;
            Ok(())
        })
    }

    pub fn get_sources(&self, model_hash: &str) -> Result<Vec<ModelSource>, ModelIndexError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_type, source_url, metadata, added_time
                 FROM model_sources WHERE model_hash = ?1
                 ORDER BY added_time DESC",
            )?;
            let rows = stmt
                .query_map([model_hash], |row| {
                    Ok(ModelSource {
                        source_type: SourceType::parse(&row.get::<_, String>(0)?),
                        url: row.get(1)?,
                        metadata: parse_metadata(row.get::<_, Option<String>>(2)?),
                        added_time: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The model previously downloaded from `source_url`, if any.
    pub fn find_by_source_url(
        &self,
        source_url: &str,
    ) -> Result<Option<ModelWithLocation>, ModelIndexError> {
        let hash: Option<String> = self.with_connection(|conn| {
            conn.query_row(
                "SELECT model_hash FROM model_sources WHERE source_url = ?1 LIMIT 1",
                [source_url],
                |row| row.get(0),
            )
            .optional()
        })?;
        match hash {
            Some(hash) => Ok(self.find_model_by_hash(&hash)?.into_iter().next()),
            None => Ok(None),
        }
    }

    pub fn get_stats(&self) -> Result<IndexStats, ModelIndexError> {
        self.with_connection(|conn| {
            let count = |sql: &str| -> Result<u64, rusqlite::Error> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|v| v as u64)
            };
            Ok(IndexStats {
                total_models: count("SELECT COUNT(*) FROM models")?,
                total_locations: count("SELECT COUNT(*) FROM model_locations")?,
                total_sources: count("SELECT COUNT(*) FROM model_sources")?,
            })
        })
    }

    // Hashing

    pub fn compute_short_hash(&self, path: &Path) -> Result<String, ModelIndexError> {
        hash::compute_short_hash(path)
    }

    pub fn compute_blake3(&self, path: &Path) -> Result<String, ModelIndexError> {
        hash::compute_blake3(path)
    }

    pub fn compute_sha256(&self, path: &Path) -> Result<String, ModelIndexError> {
        hash::compute_sha256(path)
    }

    /// Hash a file and register it with a location under `models_dir`.
    /// Convenience for scanners and tests.
    pub fn index_file(
        &self,
        models_dir: &Path,
        relative_path: &str,
    ) -> Result<String, ModelIndexError> {
        let absolute = models_dir.join(relative_path);
        let short_hash = hash::compute_short_hash(&absolute)?;
        let metadata = fs_err::metadata(&absolute)?;
        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.ensure_model(&short_hash, metadata.len(), None, None)?;
        let filename = Path::new(relative_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(relative_path);
        self.add_location(&short_hash, relative_path, filename, mtime)?;
        Ok(short_hash)
    }
}

fn create_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(CREATE_MODELS_TABLE, [])?;
    conn.execute(CREATE_MODEL_LOCATIONS_TABLE, [])?;
    conn.execute(CREATE_MODEL_SOURCES_TABLE, [])?;
    conn.execute(CREATE_SCHEMA_INFO_TABLE, [])?;
    for index in INDEXES {
        conn.execute(index, [])?;
    }
    Ok(())
}

fn row_to_model(row: &rusqlite::Row<'_>) -> Result<ModelWithLocation, rusqlite::Error> {
    Ok(ModelWithLocation {
        hash: row.get(0)?,
        file_size: row.get::<_, i64>(1)? as u64,
        blake3_hash: row.get(2)?,
        sha256_hash: row.get(3)?,
        metadata: parse_metadata(row.get::<_, Option<String>>(4)?),
        relative_path: row.get(5)?,
        filename: row.get(6)?,
        mtime: row.get(7)?,
        last_seen: row.get(8)?,
    })
}

fn parse_metadata(raw: Option<String>) -> Value {
    raw.and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, ModelRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = ModelRepository::new(dir.path().join("models.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn ensure_model_is_idempotent() {
        let (_dir, repo) = repo();
        repo.ensure_model("abc", 100, None, None).unwrap();
        repo.ensure_model("abc", 100, Some("full-blake3"), None).unwrap();

        assert!(repo.has_model("abc").unwrap());
        assert_eq!(repo.get_stats().unwrap().total_models, 1);
    }

    #[test]
    fn location_replaces_by_relative_path() {
        let (_dir, repo) = repo();
        repo.ensure_model("abc", 100, None, None).unwrap();
        repo.ensure_model("def", 200, None, None).unwrap();
        repo.add_location("abc", "checkpoints/a.safetensors", "a.safetensors", 1.0)
            .unwrap();
        // The same path now holds a different model.
        repo.add_location("def", "checkpoints/a.safetensors", "a.safetensors", 2.0)
            .unwrap();

        let found = repo.find_by_exact_path("checkpoints/a.safetensors").unwrap().unwrap();
        assert_eq!(found.hash, "def");
        assert_eq!(repo.get_stats().unwrap().total_locations, 1);
    }

    #[test]
    fn hash_prefix_search_covers_all_hash_columns() {
        let (_dir, repo) = repo();
        repo.ensure_model("aabb0011", 100, Some("ffee99"), Some("112233")).unwrap();
        repo.add_location("aabb0011", "loras/x.safetensors", "x.safetensors", 1.0)
            .unwrap();

        assert_eq!(repo.find_model_by_hash("aabb").unwrap().len(), 1);
        assert_eq!(repo.find_model_by_hash("ffee").unwrap().len(), 1);
        assert_eq!(repo.find_model_by_hash("1122").unwrap().len(), 1);
        assert!(repo.find_model_by_hash("zzzz").unwrap().is_empty());
    }

    #[test]
    fn filename_and_path_queries() {
        let (_dir, repo) = repo();
        repo.ensure_model("m1", 10, None, None).unwrap();
        repo.add_location("m1", "loras/style/model.safetensors", "model.safetensors", 1.0)
            .unwrap();

        assert_eq!(repo.find_by_filename("model").unwrap().len(), 1);
        assert_eq!(repo.search("style").unwrap().len(), 1);
        assert_eq!(repo.get_by_category("loras").unwrap().len(), 1);
        assert!(repo.get_by_category("vae").unwrap().is_empty());
    }

    #[test]
    fn deleting_model_cascades_to_locations_and_sources() {
        let (_dir, repo) = repo();
        repo.ensure_model("m1", 10, None, None).unwrap();
        repo.add_location("m1", "vae/a.pt", "a.pt", 1.0).unwrap();
        repo.add_source("m1", SourceType::Custom, "https://x/a.pt", None).unwrap();

        repo.with_connection(|conn| {
            conn.execute("DELETE FROM models WHERE hash = 'm1'", [])
        })
        .unwrap();

        let stats = repo.get_stats().unwrap();
        assert_eq!(stats.total_locations, 0);
        assert_eq!(stats.total_sources, 0);
    }

    #[test]
    fn removing_last_location_keeps_model_row() {
        let (_dir, repo) = repo();
        repo.ensure_model("m1", 10, None, None).unwrap();
        repo.add_location("m1", "vae/a.pt", "a.pt", 1.0).unwrap();

        assert!(repo.remove_location("vae/a.pt").unwrap());
        assert!(repo.has_model("m1").unwrap());
    }

    #[test]
    fn clean_stale_locations_probes_filesystem() {
        let (dir, repo) = repo();
        let models_dir = dir.path().join("models");
        fs_err::create_dir_all(models_dir.join("vae")).unwrap();
        fs_err::write(models_dir.join("vae/present.pt"), b"x").unwrap();

        repo.ensure_model("m1", 1, None, None).unwrap();
        repo.add_location("m1", "vae/present.pt", "present.pt", 1.0).unwrap();
        repo.add_location("m1", "vae/gone.pt", "gone.pt", 1.0).unwrap();

        let removed = repo.clean_stale_locations(&models_dir).unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_by_exact_path("vae/present.pt").unwrap().is_some());
        assert!(repo.find_by_exact_path("vae/gone.pt").unwrap().is_none());
    }

    #[test]
    fn source_url_lookup_round_trips() {
        let (_dir, repo) = repo();
        repo.ensure_model("m1", 10, None, None).unwrap();
        repo.add_location("m1", "loras/a.safetensors", "a.safetensors", 1.0).unwrap();
        repo.add_source(
            "m1",
            SourceType::Civitai,
            "https://civitai.com/api/download/models/42",
            None,
        )
        .unwrap();

        let found = repo
            .find_by_source_url("https://civitai.com/api/download/models/42")
            .unwrap()
            .unwrap();
        assert_eq!(found.hash, "m1");

        let sources = repo.get_sources("m1").unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_type, SourceType::Civitai);
    }

    #[test]
    fn unique_source_urls_per_model() {
        let (_dir, repo) = repo();
        repo.ensure_model("m1", 10, None, None).unwrap();
        repo.add_source("m1", SourceType::Custom, "https://x/a", None).unwrap();
        repo.add_source("m1", SourceType::Custom, "https://x/a", None).unwrap();
        assert_eq!(repo.get_sources("m1").unwrap().len(), 1);
    }

    #[test]
    fn index_file_hashes_and_registers() {
        let (dir, repo) = repo();
        let models_dir = dir.path().join("models");
        fs_err::create_dir_all(models_dir.join("checkpoints")).unwrap();
        fs_err::write(models_dir.join("checkpoints/a.safetensors"), b"weights").unwrap();

        let hash = repo.index_file(&models_dir, "checkpoints/a.safetensors").unwrap();
        let found = repo.find_model_by_hash(&hash).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename, "a.safetensors");
        assert_eq!(found[0].file_size, 7);
    }
}
