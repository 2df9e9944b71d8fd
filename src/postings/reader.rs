use std::collections::BTreeMap;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use memmap2::Mmap;
use parking_lot::Mutex;

use crate::archive::trie::{postings_key, postings_key_for_prefix, postings_trie};
use crate::core::error::{Error, ErrorKind, Result};

/// Memory-mapped postings file for zero-copy reads.
pub struct MmapFile {
    pub mmap: Mmap,
    pub len: usize,
}

impl MmapFile {
    /// `None` when the file is missing or empty.
    pub fn open_read_only(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(None);
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Some(MmapFile { mmap, len }))
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap[..]
    }
}

/// One open shard: the five parallel files of §postings format, the
/// position pair optional for fields without word offsets.
pub struct ShardFiles {
    trm: MmapFile,
    mst: MmapFile,
    pst: MmapFile,
    uqi: Option<MmapFile>,
    ofs: Option<MmapFile>,
    terms: usize,
}

impl ShardFiles {
    fn mst_entry(&self, index: usize) -> (i32, i32) {
        let at = index * 8;
        let bytes = self.mst.data();
        (
            i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]),
            i32::from_le_bytes([bytes[at + 4], bytes[at + 5], bytes[at + 6], bytes[at + 7]]),
        )
    }

    fn term_at(&self, index: usize) -> Result<&str> {
        let start = self.mst_entry(index).0 as usize;
        let end = self.mst_entry(index + 1).0 as usize;
        if end == 0 || end > self.trm.len || start >= end {
            return Err(Error::new(ErrorKind::Corrupt, "malformed term offsets"));
        }
        std::str::from_utf8(&self.trm.data()[start..end - 1])
            .map_err(|_| Error::new(ErrorKind::Corrupt, "term list is not UTF-8"))
    }

    fn postings_at(&self, index: usize) -> Result<Vec<i32>> {
        let start = self.mst_entry(index).1 as usize;
        let end = self.mst_entry(index + 1).1 as usize;
        if end > self.pst.len || start > end || (end - start) % 4 != 0 {
            return Err(Error::new(ErrorKind::Corrupt, "malformed posting offsets"));
        }
        Ok(self.pst.data()[start..end]
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn positions_at(&self, index: usize, id_slot: usize) -> Result<Vec<u16>> {
        let (Some(uqi), Some(ofs)) = (&self.uqi, &self.ofs) else {
            return Ok(Vec::new());
        };
        // the unique-index base for a term is its cumulative id count,
        // which the posting byte offset already encodes
        let base = self.mst_entry(index).1 as usize / 4;
        let slot = base + id_slot;
        if (slot + 2) * 4 > uqi.len {
            return Err(Error::new(ErrorKind::Corrupt, "malformed unique index"));
        }
        let read = |at: usize| -> i32 {
            let bytes = &uqi.data()[at * 4..at * 4 + 4];
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };
        let start = read(slot) as usize;
        let end = read(slot + 1) as usize;
        if end > ofs.len || start > end || (end - start) % 2 != 0 {
            return Err(Error::new(ErrorKind::Corrupt, "malformed position offsets"));
        }
        Ok(ofs.data()[start..end]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as u16)
            .collect())
    }

    /// Binary-search lower bound of `probe` in the term list.
    fn lower_bound(&self, probe: &str) -> Result<usize> {
        let mut lo = 0;
        let mut hi = self.terms;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.term_at(mid)? < probe {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn find(&self, term: &str) -> Result<Option<usize>> {
        let at = self.lower_bound(term)?;
        if at < self.terms && self.term_at(at)? == term {
            Ok(Some(at))
        } else {
            Ok(None)
        }
    }
}

/// Term lookup over the on-disk postings shards, with an LRU cache of open
/// memory maps. A missing shard is an empty result, never an error; a
/// malformed shard is fatal.
pub struct PostingsReader {
    pub root: PathBuf,
    cache: Mutex<LruCache<(String, String), Arc<ShardFiles>>>,
}

pub type PositionedPostings = Vec<(i32, Vec<u16>)>;

impl PostingsReader {
    pub fn new(root: PathBuf) -> Self {
        PostingsReader {
            root,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(64).unwrap())),
        }
    }

    fn shard(&self, field: &str, key: &str) -> Result<Option<Arc<ShardFiles>>> {
        let cache_key = (field.to_string(), key.to_string());
        {
            let mut cache = self.cache.lock();
            if let Some(shard) = cache.get(&cache_key) {
                return Ok(Some(Arc::clone(shard)));
            }
        }

        let dir = self.root.join(field).join(postings_trie(key));
        let base = format!("{}.{}", key, field);
        let Some(trm) = MmapFile::open_read_only(&dir.join(format!("{}.trm", base)))? else {
            return Ok(None);
        };
        let Some(mst) = MmapFile::open_read_only(&dir.join(format!("{}.mst", base)))? else {
            return Ok(None);
        };
        let Some(pst) = MmapFile::open_read_only(&dir.join(format!("{}.pst", base)))? else {
            return Ok(None);
        };
        if mst.len % 8 != 0 || mst.len < 16 {
            return Err(Error::new(
                ErrorKind::Corrupt,
                format!("malformed master index {}/{}.mst", dir.display(), base),
            ));
        }
        let uqi = MmapFile::open_read_only(&dir.join(format!("{}.uqi", base)))?;
        let ofs = MmapFile::open_read_only(&dir.join(format!("{}.ofs", base)))?;
        if let Some(uqi) = &uqi {
            if uqi.len % 4 != 0 {
                return Err(Error::new(
                    ErrorKind::Corrupt,
                    format!("malformed unique index {}/{}.uqi", dir.display(), base),
                ));
            }
        }

        let terms = mst.len / 8 - 1;
        let shard = Arc::new(ShardFiles {
            trm,
            mst,
            pst,
            uqi,
            ofs,
            terms,
        });
        self.cache.lock().put(cache_key, Arc::clone(&shard));
        Ok(Some(shard))
    }

    /// Sorted identifier vector for an exact term, empty when absent.
    pub fn lookup(&self, field: &str, term: &str) -> Result<Vec<i32>> {
        let key = match postings_key(term) {
            Ok(key) => key,
            Err(_) => return Ok(Vec::new()),
        };
        let Some(shard) = self.shard(field, &key)? else {
            return Ok(Vec::new());
        };
        match shard.find(term)? {
            Some(at) => shard.postings_at(at),
            None => Ok(Vec::new()),
        }
    }

    /// Identifier vector with per-identifier word offsets. Fields without
    /// position data yield empty offset lists.
    pub fn lookup_positions(&self, field: &str, term: &str) -> Result<PositionedPostings> {
        let key = match postings_key(term) {
            Ok(key) => key,
            Err(_) => return Ok(Vec::new()),
        };
        let Some(shard) = self.shard(field, &key)? else {
            return Ok(Vec::new());
        };
        let Some(at) = shard.find(term)? else {
            return Ok(Vec::new());
        };
        let ids = shard.postings_at(at)?;
        let mut out = Vec::with_capacity(ids.len());
        for (slot, id) in ids.into_iter().enumerate() {
            out.push((id, shard.positions_at(at, slot)?));
        }
        Ok(out)
    }

    /// Union of postings for every term starting with `prefix`: linear
    /// scan from the binary-search lower bound, sorted and deduplicated.
    pub fn wildcard(&self, field: &str, prefix: &str) -> Result<Vec<i32>> {
        let key = postings_key_for_prefix(prefix)?;
        let Some(shard) = self.shard(field, &key)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut at = shard.lower_bound(prefix)?;
        while at < shard.terms && shard.term_at(at)?.starts_with(prefix) {
            out.extend(shard.postings_at(at)?);
            at += 1;
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    /// Wildcard lookup with positions fused per identifier across all
    /// matching terms.
    pub fn wildcard_positions(&self, field: &str, prefix: &str) -> Result<PositionedPostings> {
        let key = postings_key_for_prefix(prefix)?;
        let Some(shard) = self.shard(field, &key)? else {
            return Ok(Vec::new());
        };
        let mut fused: BTreeMap<i32, Vec<u16>> = BTreeMap::new();
        let mut at = shard.lower_bound(prefix)?;
        while at < shard.terms && shard.term_at(at)?.starts_with(prefix) {
            let ids = shard.postings_at(at)?;
            for (slot, id) in ids.into_iter().enumerate() {
                let positions = shard.positions_at(at, slot)?;
                fused.entry(id).or_default().extend(positions);
            }
            at += 1;
        }
        Ok(fused
            .into_iter()
            .map(|(id, mut positions)| {
                positions.sort_unstable();
                positions.dedup();
                (id, positions)
            })
            .collect())
    }
}
