use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::Uid;

/// One verification row per archived record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyEntry {
    pub uid: i32,
    pub crc32: u32,
    pub size: usize,
    pub stamped: DateTime<Utc>,
}

/// External content-hash table, written alongside the archive so an
/// independent pass can re-read every record and compare checksums.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VerifyTable {
    pub entries: BTreeMap<i32, VerifyEntry>,
}

pub fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

impl VerifyTable {
    pub fn new() -> Self {
        VerifyTable::default()
    }

    pub fn record(&mut self, uid: Uid, payload: &[u8]) {
        self.entries.insert(
            uid.0,
            VerifyEntry {
                uid: uid.0,
                crc32: checksum(payload),
                size: payload.len(),
                stamped: Utc::now(),
            },
        );
    }

    pub fn forget(&mut self, uid: Uid) {
        self.entries.remove(&uid.0);
    }

    pub fn matches(&self, uid: Uid, payload: &[u8]) -> bool {
        match self.entries.get(&uid.0) {
            Some(entry) => entry.crc32 == checksum(payload) && entry.size == payload.len(),
            None => false,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let table = serde_json::from_reader(BufReader::new(file))?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verify.json");

        let mut table = VerifyTable::new();
        table.record(Uid(12345), b"<PubmedArticle>X</PubmedArticle>");
        table.save(&path).unwrap();

        let loaded = VerifyTable::load(&path).unwrap();
        assert!(loaded.matches(Uid(12345), b"<PubmedArticle>X</PubmedArticle>"));
        assert!(!loaded.matches(Uid(12345), b"<PubmedArticle>Y</PubmedArticle>"));
        assert!(!loaded.matches(Uid(99), b"anything"));
    }
}
