use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::Compression;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::stopword::StopWords;
use crate::archive::store::Archive;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Uid;
use crate::index::docset::IdxDocument;
use crate::stream::block::{BlockEnding, BlockReader, MarkupPolicy};
use crate::stream::partition::Partitioner;
use crate::xml::node::XmlArena;
use crate::xml::parser::parse_into;

/// XML-to-index field extraction seam. The full transform language is an
/// external collaborator; the indexer only needs record-in, fields-out.
pub trait Extractor: Send + Sync {
    /// `None` skips the record without failing the shard.
    fn extract(&self, uid: Uid, record: &str) -> Result<Option<IdxDocument>>;
}

/// Bundled minimal transform: title+abstract word positions (stop words
/// occupy positions but are not emitted), publication year, author names.
pub struct BasicExtractor {
    stop: StopWords,
}

impl BasicExtractor {
    pub fn new() -> Self {
        BasicExtractor {
            stop: StopWords::pubmed(),
        }
    }
}

impl Default for BasicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for BasicExtractor {
    fn extract(&self, uid: Uid, record: &str) -> Result<Option<IdxDocument>> {
        let mut arena = XmlArena::new(256);
        let root = parse_into(&mut arena, record)?;

        let title = gather_text(&arena, root, "ArticleTitle");
        let abstract_text = gather_text(&arena, root, "AbstractText");
        let mut doc = IdxDocument::new(uid);

        let title_words = title.unicode_words().count();
        let mut position = 0usize;
        for text in [&title, &abstract_text] {
            for word in text.unicode_words() {
                position += 1;
                let lowered = word.to_lowercase();
                if self.stop.is_stop_word(&lowered) {
                    continue;
                }
                doc.add("TIAB", Some(position.to_string()), &lowered);
                if position <= title_words {
                    doc.add("TITL", Some(position.to_string()), &lowered);
                }
            }
        }

        for year in gather_all(&arena, root, "Year") {
            doc.add("YEAR", None, year.trim());
        }
        for name in gather_all(&arena, root, "LastName") {
            doc.add("AUTH", None, name.trim());
        }

        if doc.terms.is_empty() {
            return Ok(None);
        }
        Ok(Some(doc))
    }
}

fn gather_text(arena: &XmlArena, root: usize, name: &str) -> String {
    gather_all(arena, root, name).join(" ")
}

fn gather_all(arena: &XmlArena, root: usize, name: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(index) = stack.pop() {
        let node = arena.node(index);
        if node.name == name && !node.content.is_empty() {
            found.push(node.content.clone());
        }
        let children: Vec<usize> = arena.children(index).collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }
    found
}

#[derive(Debug, Default)]
pub struct IndexOutcome {
    pub written: usize,
    pub skipped: usize,
}

/// Builds one indexed-document aggregate per leaf archive shard, skipping
/// shards whose index file already exists. Staleness is detected by file
/// existence, never by timestamp; deleting a record deletes its shard file
/// and the next pass regenerates it.
pub struct IncrementalIndexer<E: Extractor> {
    pub archive: Archive,
    pub extractor: E,
    pub progress_every: usize,
}

impl<E: Extractor> IncrementalIndexer<E> {
    pub fn new(archive: Archive, extractor: E) -> Self {
        IncrementalIndexer {
            archive,
            extractor,
            progress_every: 100,
        }
    }

    pub fn run(&self) -> Result<IndexOutcome> {
        fs::create_dir_all(&self.archive.config.working)?;
        let _owner = crate::archive::lock::RootLock::acquire(&self.archive.config.working)?;

        let archive_root = self.archive.config.archive_dir();
        let levels = (self.archive.config.corpus.pad_width() - 2) / 2;
        let mut leaves = Vec::new();
        collect_leaves(&archive_root, levels, &mut leaves)?;
        leaves.sort();

        let written = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let ticked = AtomicUsize::new(0);

        leaves
            .par_iter()
            .map(|leaf| {
                let fresh = self.index_leaf(leaf)?;
                if fresh {
                    written.fetch_add(1, Ordering::Relaxed);
                } else {
                    skipped.fetch_add(1, Ordering::Relaxed);
                }
                let seen = ticked.fetch_add(1, Ordering::Relaxed) + 1;
                if self.archive.config.verbose && seen % self.progress_every == 0 {
                    eprintln!("indexed {}/{} shards", seen, leaves.len());
                }
                Ok(())
            })
            .collect::<Result<Vec<()>>>()?;

        Ok(IndexOutcome {
            written: written.into_inner(),
            skipped: skipped.into_inner(),
        })
    }

    fn index_leaf(&self, leaf: &Path) -> Result<bool> {
        let archive_root = self.archive.config.archive_dir();
        let rel = leaf
            .strip_prefix(&archive_root)
            .map_err(|_| Error::new(ErrorKind::Internal, "leaf outside the archive root"))?;
        let prefix: String = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        let index_dir = match rel.parent() {
            Some(parent) => self.archive.config.index_dir().join(parent),
            None => self.archive.config.index_dir(),
        };
        let index_path = index_dir.join(format!("{}.e2x.gz", prefix));
        if index_path.exists() {
            return Ok(false);
        }

        let mut uids = Vec::new();
        for entry in fs::read_dir(leaf)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                continue;
            }
            if let Ok(uid) = Uid::parse(&digits) {
                uids.push(uid);
            }
        }
        uids.sort();

        let mut aggregate = String::new();
        for uid in uids {
            let record = match self.archive.get(uid) {
                Ok(record) => record,
                Err(err) if err.is_recoverable() => {
                    eprintln!("skipping record {}: {}", uid, err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            match self.extractor.extract(uid, &record) {
                Ok(Some(doc)) => aggregate.push_str(&doc.to_xml()),
                Ok(None) => {}
                Err(err) if err.is_recoverable() => {
                    eprintln!("skipping record {}: {}", uid, err);
                }
                Err(err) => return Err(err),
            }
        }

        fs::create_dir_all(&index_dir)?;
        let temp = index_dir.join(format!(".{}.tmp{}", prefix, std::process::id()));
        let file = fs::File::create(&temp)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(aggregate.as_bytes())?;
        encoder.finish()?;
        fs::rename(&temp, &index_path)?;
        Ok(true)
    }
}

fn collect_leaves(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    if depth == 0 {
        out.push(dir.to_path_buf());
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() && name.len() == 2 && name.chars().all(|c| c.is_ascii_digit()) {
            collect_leaves(&entry.path(), depth - 1, out)?;
        }
    }
    Ok(())
}

/// Parse every IdxDocument from one aggregate shard file.
pub fn read_indexed_file(path: &Path) -> Result<Vec<IdxDocument>> {
    let blocks = BlockReader::from_file(path, BlockEnding::Element, MarkupPolicy::Mixed)?;
    let stream = Partitioner::new("IdxDocument").stream(blocks);

    let mut arena = XmlArena::new(4096);
    let mut docs = Vec::new();
    for record in stream {
        match IdxDocument::from_xml(&mut arena, &record) {
            Ok(doc) => docs.push(doc),
            Err(err) if err.is_recoverable() => {
                eprintln!("skipping indexed document: {}", err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(docs)
}
