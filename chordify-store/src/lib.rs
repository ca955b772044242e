// The local store adapter: a narrow interface of three operations onto
// whatever durable map the node keeps on disk. Keyed by keyHash in its
// string form for stable JSON comparability.

use chordify_base::Identifier;
use redb::{Database, ReadableTable, TableDefinition};

/// A single stored record: the original key, its ring identifier, and
/// its current value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub key_hash: Identifier,
    pub value: String,
}

/// The three operations the ring core is allowed to perform on the
/// local store. Kept trait-object-free (no `dyn`) since there is only
/// ever one implementation live per process, but still a trait so
/// tests can swap in an in-memory fake.
pub trait LocalStore: Send + Sync {
    fn lookup_value_by_hash(&self, hash: Identifier) -> chordify_base::Result<Option<String>>;
    fn upsert(&self, entry: StoredEntry) -> chordify_base::Result<()>;
    fn remove_by_hash(&self, hash: Identifier) -> chordify_base::Result<()>;
    /// All entries currently held, for query_all.
    fn all_entries(&self) -> chordify_base::Result<Vec<StoredEntry>>;
}

const ENTRIES: TableDefinition<&str, (&str, &str)> = TableDefinition::new("entries");

/// redb-backed `LocalStore`. Table row: keyHash (decimal string) ->
/// (key, value). redb's own file locking serializes concurrent
/// transactions, so no additional mutex is needed around the handle.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> chordify_base::Result<RedbStore> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(ENTRIES)?;
        }
        write_txn.commit()?;
        Ok(RedbStore { db })
    }
}

impl LocalStore for RedbStore {
    fn lookup_value_by_hash(&self, hash: Identifier) -> chordify_base::Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let key = hash.to_decimal_string();
        let found = table.get(key.as_str())?.map(|v| v.value().1.to_string());
        Ok(found)
    }

    fn upsert(&self, entry: StoredEntry) -> chordify_base::Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            let key = entry.key_hash.to_decimal_string();
            table.insert(key.as_str(), (entry.key.as_str(), entry.value.as_str()))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_by_hash(&self, hash: Identifier) -> chordify_base::Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            let key = hash.to_decimal_string();
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn all_entries(&self) -> chordify_base::Result<Vec<StoredEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let mut entries = Vec::new();
        for row in table.iter()? {
            let (hash_key, value) = row?;
            let key_hash = Identifier::from_decimal_string(hash_key.value())?;
            let (key, value) = value.value();
            entries.push(StoredEntry {
                key: key.to_string(),
                key_hash,
                value: value.to_string(),
            });
        }
        Ok(entries)
    }
}
