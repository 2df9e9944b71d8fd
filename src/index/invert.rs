use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::analysis::normalize::normalize_token;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::index::docset::{
    IdxDocument, InvDocument, InvEntry, format_positions, parse_positions,
};

const SHARD_COUNT: usize = 36; // 0-9 then a-z

struct Triple {
    field: String,
    uid: i32,
    pos: Option<String>,
}

/// Transforms indexed-document streams into per-term inverted documents.
/// Tokens are bucketed by first character into 36 shards so concurrent
/// workers write into disjoint maps under per-shard mutexes; per term the
/// shard keeps a flat triple slice rather than nested per-identifier maps.
pub struct Inverter;

impl Inverter {
    pub fn invert(docs: &[IdxDocument]) -> Vec<InvDocument> {
        let shards: Vec<Mutex<HashMap<String, Vec<Triple>>>> =
            (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();

        docs.par_iter().for_each(|doc| {
            for term in &doc.terms {
                let text = normalize_token(&term.text);
                if text.is_empty() {
                    continue;
                }
                // positional compounds (hyphenated forms) index word by
                // word, taking consecutive offsets, so phrase matching
                // sees them the way plain title text is tokenized;
                // fields without positions keep the whole key
                if text.contains(' ') && term.pos.is_some() {
                    let starts = parse_positions(term.pos.as_deref().unwrap_or(""));
                    for (offset, part) in text.split(' ').enumerate() {
                        let positions: Vec<u16> = starts
                            .iter()
                            .filter_map(|&p| p.checked_add(offset as u16))
                            .collect();
                        if positions.is_empty() {
                            continue;
                        }
                        let shard = &shards[shard_of(part)];
                        shard.lock().entry(part.to_string()).or_default().push(Triple {
                            field: term.field.clone(),
                            uid: doc.uid.0,
                            pos: Some(format_positions(&positions)),
                        });
                    }
                    continue;
                }
                let shard = &shards[shard_of(&text)];
                shard.lock().entry(text).or_default().push(Triple {
                    field: term.field.clone(),
                    uid: doc.uid.0,
                    pos: term.pos.clone(),
                });
            }
        });

        // emit per shard; shard order is first-character order, so the
        // concatenation is globally alphabetized
        let mut out = Vec::new();
        for shard in shards {
            let map = shard.into_inner();
            let mut terms: Vec<(String, Vec<Triple>)> = map.into_iter().collect();
            terms.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, triples) in terms {
                let mut doc = InvDocument::new(&key);
                for triple in triples {
                    doc.fields.entry(triple.field).or_default().push(InvEntry {
                        uid: triple.uid,
                        pos: triple.pos,
                    });
                }
                doc.tidy();
                out.push(doc);
            }
        }
        out
    }

    /// Invert one 250,000-id group and write `Invert/<family>NNN.inv.gz`.
    /// An existing group file is left alone (lazily rebuilt after deletion).
    pub fn invert_group(config: &Config, group: i32, docs: &[IdxDocument]) -> Result<Option<PathBuf>> {
        let invert_dir = config.invert_dir();
        let path = invert_dir.join(format!("{}{:03}.inv.gz", config.corpus.family(), group));
        if path.exists() {
            return Ok(None);
        }

        let inverted = Self::invert(docs);
        fs::create_dir_all(&invert_dir)?;
        let temp = invert_dir.join(format!(".{:03}.tmp{}", group, std::process::id()));
        let file = fs::File::create(&temp)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        for doc in &inverted {
            encoder.write_all(doc.to_xml().as_bytes())?;
        }
        encoder.finish()?;
        fs::rename(&temp, &path)?;
        Ok(Some(path))
    }

    /// Group number an identifier belongs to.
    pub fn group_of(config: &Config, uid: i32) -> i32 {
        uid / config.corpus.invert_group_span()
    }

    /// Invert everything the incremental indexer has produced: read each
    /// indexed-document aggregate, bucket documents into identifier
    /// groups, write the group files that do not exist yet.
    pub fn invert_working(config: &Config) -> Result<Vec<PathBuf>> {
        let mut shard_files = Vec::new();
        collect_index_files(&config.index_dir(), &mut shard_files)?;
        shard_files.sort();

        let mut groups: std::collections::BTreeMap<i32, Vec<IdxDocument>> =
            std::collections::BTreeMap::new();
        for path in &shard_files {
            for doc in crate::index::incremental::read_indexed_file(path)? {
                groups
                    .entry(Self::group_of(config, doc.uid.0))
                    .or_default()
                    .push(doc);
            }
        }

        let mut written = Vec::new();
        for (group, docs) in groups {
            if let Some(path) = Self::invert_group(config, group, &docs)? {
                if config.verbose {
                    eprintln!("inverted group {:03} ({} documents)", group, docs.len());
                }
                written.push(path);
            }
        }
        Ok(written)
    }
}

fn collect_index_files(dir: &std::path::Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_index_files(&path, out)?;
        } else if path.to_string_lossy().ends_with(".e2x.gz") {
            out.push(path);
        }
    }
    Ok(())
}

fn shard_of(term: &str) -> usize {
    match term.as_bytes().first() {
        Some(b @ b'0'..=b'9') => (b - b'0') as usize,
        Some(b @ b'a'..=b'z') => 10 + (b - b'a') as usize,
        _ => 0,
    }
}
