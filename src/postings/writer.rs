use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::archive::trie::{postings_key, postings_trie};
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::docset::{InvDocument, InvEntry, parse_positions};

/// Accumulated file images for one (prefix, field) shard. Offsets are
/// 32-bit little-endian; each master/index array gains a phantom row at
/// flush so every length is the difference of adjacent entries.
struct FieldAccum {
    trm: Vec<u8>,
    mst: Vec<(i32, i32)>,
    pst: Vec<u8>,
    uqi: Vec<i32>,
    ofs: Vec<u8>,
    has_positions: bool,
}

impl FieldAccum {
    fn new() -> Self {
        FieldAccum {
            trm: Vec::new(),
            mst: Vec::new(),
            pst: Vec::new(),
            uqi: Vec::new(),
            ofs: Vec::new(),
            has_positions: false,
        }
    }

    fn push_term(&mut self, term: &str, entries: &[InvEntry]) -> Result<()> {
        let term_off = self.trm.len() as i32;
        let post_off = self.pst.len() as i32;
        self.trm.extend_from_slice(term.as_bytes());
        self.trm.push(b'\n');

        let mut prev_uid: Option<i32> = None;
        for entry in entries {
            if let Some(prev) = prev_uid {
                if entry.uid <= prev {
                    return Err(Error::new(
                        ErrorKind::Corrupt,
                        format!("postings for '{}' are not strictly ascending", term),
                    ));
                }
            }
            prev_uid = Some(entry.uid);
            self.pst.extend_from_slice(&entry.uid.to_le_bytes());

            self.uqi.push(self.ofs.len() as i32);
            if let Some(attr) = &entry.pos {
                let positions = parse_positions(attr);
                let mut prev_pos: Option<u16> = None;
                for pos in positions {
                    if pos > i16::MAX as u16 {
                        continue; // beyond the 16-bit position range
                    }
                    if let Some(prev) = prev_pos {
                        if pos <= prev {
                            return Err(Error::new(
                                ErrorKind::Corrupt,
                                format!("positions for '{}'/{} are not ascending", term, entry.uid),
                            ));
                        }
                    }
                    prev_pos = Some(pos);
                    self.ofs.extend_from_slice(&(pos as i16).to_le_bytes());
                    self.has_positions = true;
                }
            }
        }
        self.mst.push((term_off, post_off));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct WriteSummary {
    pub shards: usize,
    pub terms: usize,
}

/// Consumes a merged inverted-document stream in key order and emits the
/// five-file binary postings format per term-prefix shard under
/// `Postings/<field>/<prefix-trie>/`.
pub struct PostingsWriter {
    pub root: PathBuf,
}

impl PostingsWriter {
    pub fn new(root: PathBuf) -> Self {
        PostingsWriter { root }
    }

    pub fn write(&self, merged: impl IntoIterator<Item = InvDocument>) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        let mut current_key: Option<String> = None;
        let mut accums: BTreeMap<String, FieldAccum> = BTreeMap::new();
        let mut last_term: Option<String> = None;

        for doc in merged {
            if let Some(last) = &last_term {
                if doc.key <= *last {
                    return Err(Error::new(
                        ErrorKind::Corrupt,
                        format!("merged stream out of order: '{}' after '{}'", doc.key, last),
                    ));
                }
            }

            let key = postings_key(&doc.key)?;
            if current_key.as_deref() != Some(key.as_str()) {
                if let Some(prev) = current_key.take() {
                    summary.shards += self.flush(&prev, &mut accums)?;
                }
                current_key = Some(key);
            }

            for (field, entries) in &doc.fields {
                accums
                    .entry(field.clone())
                    .or_insert_with(FieldAccum::new)
                    .push_term(&doc.key, entries)?;
            }
            summary.terms += 1;
            last_term = Some(doc.key);
        }

        if let Some(prev) = current_key.take() {
            summary.shards += self.flush(&prev, &mut accums)?;
        }
        Ok(summary)
    }

    fn flush(&self, key: &str, accums: &mut BTreeMap<String, FieldAccum>) -> Result<usize> {
        let mut written = 0;
        for (field, mut accum) in std::mem::take(accums) {
            if accum.mst.is_empty() {
                continue;
            }
            let dir = self.root.join(&field).join(postings_trie(key));
            fs::create_dir_all(&dir)?;

            // phantom terminator rows
            accum.mst.push((accum.trm.len() as i32, accum.pst.len() as i32));

            let mut mst_bytes = Vec::with_capacity(accum.mst.len() * 8);
            for (term_off, post_off) in &accum.mst {
                mst_bytes.extend_from_slice(&term_off.to_le_bytes());
                mst_bytes.extend_from_slice(&post_off.to_le_bytes());
            }

            fs::write(dir.join(format!("{}.{}.trm", key, field)), &accum.trm)?;
            fs::write(dir.join(format!("{}.{}.mst", key, field)), &mst_bytes)?;
            fs::write(dir.join(format!("{}.{}.pst", key, field)), &accum.pst)?;

            if accum.has_positions {
                accum.uqi.push(accum.ofs.len() as i32);
                let mut uqi_bytes = Vec::with_capacity(accum.uqi.len() * 4);
                for offset in &accum.uqi {
                    uqi_bytes.extend_from_slice(&offset.to_le_bytes());
                }
                fs::write(dir.join(format!("{}.{}.uqi", key, field)), &uqi_bytes)?;
                fs::write(dir.join(format!("{}.{}.ofs", key, field)), &accum.ofs)?;
            }
            written += 1;
        }
        Ok(written)
    }
}

/// Promote the inverted groups into the binary postings database: k-way
/// merge every `Invert/*.inv.gz` in key order and write the prefix shards.
pub fn promote_postings(config: &crate::core::config::Config) -> Result<WriteSummary> {
    let invert_dir = config.invert_dir();
    let mut paths = Vec::new();
    if invert_dir.is_dir() {
        for entry in fs::read_dir(&invert_dir)? {
            let path = entry?.path();
            if path.to_string_lossy().ends_with(".inv.gz") {
                paths.push(path);
            }
        }
    }
    if paths.is_empty() {
        return Ok(WriteSummary::default());
    }
    paths.sort();

    let merged = crate::index::merge::merge_files(paths, config.chan_depth)?;
    PostingsWriter::new(config.postings_dir()).write(merged.iter())
}
