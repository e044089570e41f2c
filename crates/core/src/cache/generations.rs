//! Named cache generations.
//!
//! A generation is the unit of invalidation: entries are never expired one by
//! one, the whole generation is dropped when a newer one is activated.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

/// Handle to an opened generation.
///
/// Only [`CacheDb::open_generation`] creates one, so holding a handle means the
/// generation existed at some point; writes still fail once it is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationHandle {
    name: String,
}

impl GenerationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for GenerationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl CacheDb {
    /// Open a generation, creating it if absent.
    pub async fn open_generation(&self, name: &str) -> Result<GenerationHandle, Error> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("generation name cannot be empty".into()));
        }

        let owned = name.to_string();
        let created = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute("INSERT OR IGNORE INTO generations (name) VALUES (?1)", params![owned])?;
                Ok(inserted > 0)
            })
            .await
            .map_err(Error::from)?;

        if created {
            tracing::info!(generation = name, "created cache generation");
        }

        Ok(GenerationHandle { name: name.to_string() })
    }

    /// Whether a generation with this name exists.
    pub async fn has_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every stored generation, sorted.
    pub async fn list_generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Runs as one transaction: once it commits, every later write into the
    /// generation fails with [`Error::GenerationClosed`]. Deleting an absent
    /// generation is a no-op. Returns the number of entries removed.
    pub async fn delete_generation(&self, name: &str) -> Result<u64, Error> {
        let owned = name.to_string();
        let removed = self
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let entries = tx.execute("DELETE FROM entries WHERE generation = ?1", params![owned])?;
                tx.execute("DELETE FROM generations WHERE name = ?1", params![owned])?;
                tx.commit()?;
                Ok(entries as u64)
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(generation = name, entries = removed, "deleted cache generation");
        Ok(removed)
    }
}
