use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use parking_lot::Mutex;

use crate::archive::lock::{LockVerdict, UidLockTable};
use crate::archive::trie::{archive_trie, index_trie, pad_uid};
use crate::archive::verify::VerifyTable;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Uid;

pub const WRITE_RETRIES: usize = 5;

/// A shared XML prolog/DOCTYPE stored as its own gzip member ahead of every
/// record member. The member length is compressor dependent, so it is
/// computed once when the archive is opened and pinned for the process.
pub struct SharedProlog {
    pub text: String,
    pub member: Vec<u8>,
}

impl SharedProlog {
    pub fn new(text: &str) -> Result<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes())?;
        let member = encoder.finish()?;
        Ok(SharedProlog {
            text: text.to_string(),
            member,
        })
    }

    /// Byte count a streamer skips to drop the prolog without decoding.
    pub fn member_len(&self) -> usize {
        self.member.len()
    }
}

/// Trie-sharded compressed record store. For every stored identifier
/// exactly one file exists, holding the current version of that record;
/// the per-id lock table arbitrates concurrent writers so the highest
/// version index always wins.
pub struct Archive {
    pub config: Config,
    pub compress: bool,
    pub prolog: Option<SharedProlog>,
    pub retry_interval: Duration,
    pub locks: UidLockTable,
    verify: Option<Mutex<VerifyTable>>,
}

impl Archive {
    pub fn new(config: Config) -> Self {
        Archive {
            config,
            compress: true,
            prolog: None,
            retry_interval: Duration::from_secs(1),
            locks: UidLockTable::new(),
            verify: None,
        }
    }

    pub fn with_prolog(mut self, text: &str) -> Result<Self> {
        self.prolog = Some(SharedProlog::new(text)?);
        Ok(self)
    }

    pub fn with_verification(mut self) -> Self {
        self.verify = Some(Mutex::new(VerifyTable::new()));
        self
    }

    pub fn record_path(&self, uid: Uid) -> Result<PathBuf> {
        let padded = pad_uid(uid, self.config.corpus)?;
        let mut name = format!("{}{}", uid.0, self.config.corpus.suffix());
        if self.compress {
            name.push_str(".gz");
        }
        Ok(self
            .config
            .archive_dir()
            .join(archive_trie(&padded))
            .join(name))
    }

    /// Write the record at version-order `index`. A write superseded by a
    /// later-index writer is silently abandoned; a lock still held by an
    /// earlier writer after the retry budget fails the record.
    pub fn put(&self, uid: Uid, payload: &str, index: u64) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.locks.acquire(uid, index) {
                LockVerdict::Okay => break,
                LockVerdict::Bail => return Ok(()),
                LockVerdict::Wait => {
                    attempts += 1;
                    if attempts > WRITE_RETRIES {
                        return Err(Error::new(
                            ErrorKind::Contention,
                            format!("record {} still locked after {} retries", uid, WRITE_RETRIES),
                        ));
                    }
                    std::thread::sleep(self.retry_interval);
                }
            }
        }

        let outcome = self.write_record(uid, payload);
        self.locks.release(uid, index);

        if outcome.is_ok() {
            if let Some(verify) = &self.verify {
                verify.lock().record(uid, payload.as_bytes());
            }
        }
        outcome
    }

    fn write_record(&self, uid: Uid, payload: &str) -> Result<()> {
        let path = self.record_path(uid)?;
        let dir = path.parent().ok_or_else(|| {
            Error::new(ErrorKind::Internal, "record path has no parent directory")
        })?;
        fs::create_dir_all(dir)?;

        let bytes = if self.compress {
            let mut out = Vec::new();
            if let Some(prolog) = &self.prolog {
                out.extend_from_slice(&prolog.member);
            }
            let mut encoder = GzEncoder::new(out, Compression::default());
            encoder.write_all(payload.as_bytes())?;
            encoder.finish()?
        } else {
            payload.as_bytes().to_vec()
        };

        // create/rename atomicity is the cross-process coordination point
        let temp = dir.join(format!(".{}.{}.tmp", uid.0, std::process::id()));
        fs::write(&temp, &bytes)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    /// Read and decompress the current record, stripping the shared prolog.
    pub fn get(&self, uid: Uid) -> Result<String> {
        let path = self.record_path(uid)?;
        let file = File::open(&path).map_err(|_| {
            Error::new(ErrorKind::NotFound, format!("record {} is not archived", uid))
        })?;

        let mut text = String::new();
        if self.compress {
            MultiGzDecoder::new(file).read_to_string(&mut text)?;
        } else {
            let mut file = file;
            file.read_to_string(&mut text)?;
        }

        if let Some(prolog) = &self.prolog {
            if let Some(stripped) = text.strip_prefix(prolog.text.as_str()) {
                return Ok(stripped.to_string());
            }
        }
        Ok(text)
    }

    /// Raw compressed bytes, prolog member included (for network fan-out).
    pub fn stream(&self, uid: Uid) -> Result<Vec<u8>> {
        let path = self.record_path(uid)?;
        fs::read(&path).map_err(|_| {
            Error::new(ErrorKind::NotFound, format!("record {} is not archived", uid))
        })
    }

    /// Raw compressed record member with the fixed-length prolog member
    /// skipped by byte count, no decoding involved.
    pub fn stream_record_only(&self, uid: Uid) -> Result<Vec<u8>> {
        let bytes = self.stream(uid)?;
        match &self.prolog {
            Some(prolog) if bytes.len() >= prolog.member_len() => {
                Ok(bytes[prolog.member_len()..].to_vec())
            }
            Some(_) => Err(Error::new(
                ErrorKind::Corrupt,
                format!("record {} is shorter than the shared prolog", uid),
            )),
            None => Ok(bytes),
        }
    }

    /// Remove the record and invalidate the index and invert shards it
    /// participates in; the next build pass regenerates them. Idempotent.
    pub fn delete(&self, uid: Uid) -> Result<()> {
        let path = self.record_path(uid)?;
        remove_if_present(&path)?;

        if let Some(verify) = &self.verify {
            verify.lock().forget(uid);
        }

        let padded = pad_uid(uid, self.config.corpus)?;
        let (dir, prefix) = index_trie(&padded);
        let index_file = self
            .config
            .index_dir()
            .join(dir)
            .join(format!("{}.e2x.gz", prefix));
        remove_if_present(&index_file)?;

        let group = uid.0 / self.config.corpus.invert_group_span();
        let invert_file = self.config.invert_dir().join(format!(
            "{}{:03}.inv.gz",
            self.config.corpus.family(),
            group
        ));
        remove_if_present(&invert_file)?;
        Ok(())
    }

    pub fn save_verification(&self) -> Result<Option<PathBuf>> {
        match &self.verify {
            Some(verify) => {
                let dir = self.config.data_dir();
                fs::create_dir_all(&dir)?;
                let path = dir.join("verify.json");
                verify.lock().save(&path)?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }

    pub fn verify_payload(&self, uid: Uid, payload: &[u8]) -> bool {
        match &self.verify {
            Some(verify) => verify.lock().matches(uid, payload),
            None => false,
        }
    }
}

fn remove_if_present(path: &PathBuf) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Corpus;
    use std::sync::Arc;

    const PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE PubmedArticle>\n";

    fn archive_in(dir: &std::path::Path) -> Archive {
        let config = Config::new(Corpus::Pubmed, dir.to_path_buf(), dir.to_path_buf());
        Archive::new(config).with_prolog(PROLOG).unwrap()
    }

    #[test]
    fn round_trip_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path()).with_verification();
        let payload = "<PubmedArticle><PMID>12345</PMID><X>data</X></PubmedArticle>";

        archive.put(Uid(12345), payload, 1).unwrap();
        assert_eq!(archive.get(Uid(12345)).unwrap(), payload);

        // the file sits at the trie path
        let path = archive.record_path(Uid(12345)).unwrap();
        assert!(path.ends_with("Archive/00/01/23/12345.xml.gz"));
        assert!(path.exists());

        // the checksum table tracks the stored payload
        assert!(archive.verify_payload(Uid(12345), payload.as_bytes()));
        assert!(!archive.verify_payload(Uid(12345), b"tampered"));
        let table = archive.save_verification().unwrap().unwrap();
        assert!(table.exists());
    }

    #[test]
    fn stream_skips_the_prolog_without_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        archive.put(Uid(7), "<R>7</R>", 1).unwrap();

        let whole = archive.stream(Uid(7)).unwrap();
        let tail = archive.stream_record_only(Uid(7)).unwrap();
        let skip = archive.prolog.as_ref().unwrap().member_len();
        assert_eq!(&whole[skip..], &tail[..]);

        // the tail is itself a complete gzip member holding just the record
        let mut text = String::new();
        MultiGzDecoder::new(&tail[..])
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "<R>7</R>");
    }

    #[test]
    fn concurrent_writes_keep_the_highest_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = archive_in(dir.path());
        archive.retry_interval = Duration::from_millis(20);
        let archive = Arc::new(archive);

        // the index-1 writer is inside while the index-2 writer arrives
        assert_eq!(archive.locks.acquire(Uid(99), 1), LockVerdict::Okay);
        let later = Arc::clone(&archive);
        let late = std::thread::spawn(move || {
            later.put(Uid(99), "<R>late</R>", 2).unwrap();
        });

        std::thread::sleep(Duration::from_millis(50));
        archive.locks.release(Uid(99), 1);
        // the early write either lands before index 2 acquires (and is then
        // overwritten) or bails because the later writer is inside
        archive.put(Uid(99), "<R>early</R>", 1).unwrap();
        late.join().unwrap();

        assert_eq!(archive.get(Uid(99)).unwrap(), "<R>late</R>");
    }

    #[test]
    fn earlier_writer_bails_while_later_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());

        assert_eq!(archive.locks.acquire(Uid(5), 2), LockVerdict::Okay);
        // index 1 sees a later writer inside and abandons without error
        archive.put(Uid(5), "<R>old</R>", 1).unwrap();
        assert!(archive.get(Uid(5)).is_err());
        archive.locks.release(Uid(5), 2);
    }

    #[test]
    fn delete_is_idempotent_and_invalidates_shards() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive_in(dir.path());
        archive.put(Uid(12345), "<R>x</R>", 1).unwrap();

        // plant a stale index shard for the record's leaf
        let index_file = dir.path().join("Index/00/01/000123.e2x.gz");
        fs::create_dir_all(index_file.parent().unwrap()).unwrap();
        fs::write(&index_file, b"stale").unwrap();

        archive.delete(Uid(12345)).unwrap();
        assert!(archive.get(Uid(12345)).is_err());
        assert!(!index_file.exists());
        archive.delete(Uid(12345)).unwrap(); // second delete is a no-op
    }
}
