//! Catalog sessions
//!
//! A session is a cheap handle on an open catalog. Tables are LMDB named
//! databases with string keys and JSON document values.

use crate::{Error, Result};
use heed::types::Str;
use heed::{Database, Env, RoTxn, RwTxn};
use serde::Serialize;
use serde::de::DeserializeOwned;

type Table = Database<Str, Str>;

/// Open connection to one catalog
///
/// Dropping the session releases its handle on the catalog; a catalog drop
/// waits for all sessions to go away.
pub struct CatalogSession {
    catalog: String,
    env: Env,
}

impl CatalogSession {
    pub(crate) fn new(catalog: &str, env: Env) -> Self {
        Self {
            catalog: catalog.to_string(),
            env,
        }
    }

    /// Name of the catalog this session is bound to
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Create a table if it does not exist yet
    pub fn create_table(&self, table: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.create_table_in(&mut wtxn, table)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Whether a table exists
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let rtxn = self.env.read_txn()?;
        Ok(self.env.open_database::<Str, Str>(&rtxn, Some(table))?.is_some())
    }

    /// Read a raw value
    pub fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        let rtxn = self.env.read_txn()?;
        let db = self.table(&rtxn, table)?;
        Ok(db.get(&rtxn, key)?.map(str::to_string))
    }

    /// Write a raw value
    pub fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.put_in(&mut wtxn, table, key, value)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Delete a key, returning whether it was present
    pub fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let deleted = self.delete_in(&mut wtxn, table, key)?;
        wtxn.commit()?;
        Ok(deleted)
    }

    /// All keys of a table in order
    pub fn keys(&self, table: &str) -> Result<Vec<String>> {
        let rtxn = self.env.read_txn()?;
        let db = self.table(&rtxn, table)?;
        let mut keys = Vec::new();
        for entry in db.iter(&rtxn)? {
            let (key, _) = entry?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    /// Read and deserialize a JSON record
    pub fn get_record<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<Option<T>> {
        match self.get(table, key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a JSON record
    pub fn put_record<T: Serialize>(&self, table: &str, key: &str, record: &T) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.put(table, key, &raw)
    }

    /// Start a write transaction for batched statements
    pub(crate) fn write_txn(&self) -> Result<RwTxn<'_>> {
        Ok(self.env.write_txn()?)
    }

    pub(crate) fn create_table_in(&self, wtxn: &mut RwTxn<'_>, table: &str) -> Result<()> {
        if table.is_empty() {
            return Err(Error::TableNotFound(String::new()));
        }
        self.env.create_database::<Str, Str>(wtxn, Some(table))?;
        Ok(())
    }

    pub(crate) fn put_in(
        &self,
        wtxn: &mut RwTxn<'_>,
        table: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let db = self.table(wtxn, table)?;
        db.put(wtxn, key, value)?;
        Ok(())
    }

    pub(crate) fn delete_in(&self, wtxn: &mut RwTxn<'_>, table: &str, key: &str) -> Result<bool> {
        let db = self.table(wtxn, table)?;
        Ok(db.delete(wtxn, key)?)
    }

    fn table(&self, rtxn: &RoTxn<'_>, table: &str) -> Result<Table> {
        self.env
            .open_database::<Str, Str>(rtxn, Some(table))?
            .ok_or_else(|| Error::TableNotFound(table.to_string()))
    }
}
