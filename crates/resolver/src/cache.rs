use blame_protocol::{AttributionRecord, FileId};
use std::collections::HashMap;

/// Records for one file; index `i` holds source line `i + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributionTable {
    records: Vec<AttributionRecord>,
}

impl FileAttributionTable {
    pub const fn new(records: Vec<AttributionRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for a 1-based line number.
    pub fn get(&self, line: usize) -> Option<&AttributionRecord> {
        line.checked_sub(1).and_then(|idx| self.records.get(idx))
    }

    pub fn records(&self) -> &[AttributionRecord] {
        &self.records
    }
}

impl From<Vec<AttributionRecord>> for FileAttributionTable {
    fn from(records: Vec<AttributionRecord>) -> Self {
        Self::new(records)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lookup {
    Hit(AttributionRecord),
    OutOfRange { len: usize },
    Missing,
}

/// File id → table. Entries are replaced wholesale, never patched, and only
/// leave on explicit invalidation.
#[derive(Debug, Default)]
pub(crate) struct AttributionCache {
    tables: HashMap<FileId, FileAttributionTable>,
}

impl AttributionCache {
    pub fn lookup(&self, file: &FileId, line: usize) -> Lookup {
        let Some(table) = self.tables.get(file) else {
            return Lookup::Missing;
        };
        table
            .get(line)
            .map_or(Lookup::OutOfRange { len: table.len() }, |record| {
                Lookup::Hit(record.clone())
            })
    }

    pub fn store(&mut self, file: FileId, table: FileAttributionTable) {
        self.tables.insert(file, table);
    }

    pub fn remove(&mut self, file: &FileId) -> Option<FileAttributionTable> {
        self.tables.remove(file)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.tables.len();
        self.tables.clear();
        count
    }

    pub fn table_len(&self, file: &FileId) -> Option<usize> {
        self.tables.get(file).map(FileAttributionTable::len)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}
