//! Document storage for the content backend.
//!
//! Documents are opaque JSON objects grouped into named entity collections
//! (messages, events, sponsors, whatever the board's pages need). The store
//! imposes no schema: it keeps what it was given and hands it back.

use crate::cache::connection::StoreDb;
use crate::Error;
use serde_json::Value;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Length cap for entity collection names.
pub const MAX_ENTITY_NAME_LEN: usize = 64;

/// A stored document with its collection bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub entity: String,
    pub id: String,
    pub data: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Check that an entity collection name is well-formed.
///
/// Names are lowercase ASCII, digits, `_` and `-`, between 1 and 64
/// characters. Anything else is rejected before it reaches SQL.
pub fn validate_entity_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.len() > MAX_ENTITY_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "entity name must be 1-{MAX_ENTITY_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(Error::InvalidInput(format!("invalid entity name: {name}")));
    }
    Ok(())
}

/// Generate a random 32-hex-char document id.
fn new_document_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

fn parse_stored(entity: &str, id: &str, data: &str) -> Result<Value, Error> {
    serde_json::from_str(data)
        .map_err(|e| Error::CorruptDocument(format!("{entity}/{id}: {e}")))
}

/// Merge top-level keys of `patch` into `base`.
///
/// Only one level deep: a patched key replaces the whole previous value,
/// nested objects are not merged recursively.
fn merge_shallow(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

impl StoreDb {
    /// List every document in a collection, oldest first.
    pub async fn list_documents(&self, entity: &str) -> Result<Vec<Document>, Error> {
        let entity = entity.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Document>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, data, created_at, updated_at FROM documents
                     WHERE entity = ?1 ORDER BY created_at, id",
                )?;
                let rows = stmt
                    .query_map(params![entity], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, data, created_at, updated_at)| {
                        let data = parse_stored(&entity, &id, &data)?;
                        Ok(Document { entity: entity.clone(), id, data, created_at, updated_at })
                    })
                    .collect()
            })
            .await
            .map_err(Error::from)
    }

    /// Fetch one document. Returns None when the id is unknown.
    pub async fn get_document(&self, entity: &str, id: &str) -> Result<Option<Document>, Error> {
        let entity = entity.to_string();
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Document>, Error> {
                let result = conn.query_row(
                    "SELECT data, created_at, updated_at FROM documents
                     WHERE entity = ?1 AND id = ?2",
                    params![entity, id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                );

                match result {
                    Ok((data, created_at, updated_at)) => {
                        let data = parse_stored(&entity, &id, &data)?;
                        Ok(Some(Document { entity, id, data, created_at, updated_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Create a document with a server-generated id and return it.
    pub async fn create_document(&self, entity: &str, data: &Value) -> Result<Document, Error> {
        let entity = entity.to_string();
        let id = new_document_id();
        let now = chrono::Utc::now().to_rfc3339();
        let document = Document {
            entity: entity.clone(),
            id: id.clone(),
            data: data.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let serialized = serde_json::to_string(data)
            .map_err(|e| Error::InvalidInput(format!("document not serializable: {e}")))?;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO documents (entity, id, data, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![entity, id, serialized, now, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(document)
    }

    /// Merge `patch` into an existing document and return the updated copy.
    ///
    /// Read, merge and write happen inside one connection call, so two
    /// concurrent updates serialize instead of losing keys. Returns None
    /// when the id is unknown.
    pub async fn update_document(
        &self,
        entity: &str,
        id: &str,
        patch: &Value,
    ) -> Result<Option<Document>, Error> {
        let entity = entity.to_string();
        let id = id.to_string();
        let patch = patch.clone();

        self.conn
            .call(move |conn| -> Result<Option<Document>, Error> {
                let current = conn.query_row(
                    "SELECT data, created_at FROM documents WHERE entity = ?1 AND id = ?2",
                    params![entity, id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                );

                let (data, created_at) = match current {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let mut merged = parse_stored(&entity, &id, &data)?;
                merge_shallow(&mut merged, &patch);
                let serialized = serde_json::to_string(&merged)
                    .map_err(|e| Error::InvalidInput(format!("document not serializable: {e}")))?;
                let updated_at = chrono::Utc::now().to_rfc3339();

                conn.execute(
                    "UPDATE documents SET data = ?3, updated_at = ?4
                     WHERE entity = ?1 AND id = ?2",
                    params![entity, id, serialized, updated_at],
                )?;

                Ok(Some(Document { entity, id, data: merged, created_at, updated_at }))
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a document. Returns false when the id is unknown.
    pub async fn delete_document(&self, entity: &str, id: &str) -> Result<bool, Error> {
        let entity = entity.to_string();
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn
                    .execute(
                        "DELETE FROM documents WHERE entity = ?1 AND id = ?2",
                        params![entity, id],
                    )
                    .map_err(Error::from)?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }
}
