use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::thread;

use crossbeam::channel::{Receiver, bounded};

use crate::core::error::Result;
use crate::index::docset::InvDocument;
use crate::stream::block::{BlockEnding, BlockReader, MarkupPolicy};
use crate::stream::partition::Partitioner;
use crate::xml::node::XmlArena;

struct HeapItem {
    doc: InvDocument,
    src: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.doc.key == other.doc.key && self.src == other.src
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc
            .key
            .cmp(&other.doc.key)
            .then(self.src.cmp(&other.src))
    }
}

/// K-way merge of inverted-document streams, each ascending by key. A
/// min-heap produces the next global key; fragments sharing that key are
/// fused (union of identifiers and position attributes, duplicates
/// suppressed) into one consolidated document. Order among streams that
/// present the same key is unspecified; fusion is commutative.
pub fn merge_streams(inputs: Vec<Receiver<InvDocument>>, chan_depth: usize) -> Receiver<InvDocument> {
    let (out_tx, out_rx) = bounded(chan_depth.max(1));

    thread::spawn(move || {
        let mut heap: BinaryHeap<Reverse<HeapItem>> = BinaryHeap::new();
        for (src, rx) in inputs.iter().enumerate() {
            if let Ok(doc) = rx.recv() {
                heap.push(Reverse(HeapItem { doc, src }));
            }
        }

        while let Some(Reverse(item)) = heap.pop() {
            let mut fused = item.doc;
            if let Ok(next) = inputs[item.src].recv() {
                heap.push(Reverse(HeapItem {
                    doc: next,
                    src: item.src,
                }));
            }

            while heap
                .peek()
                .map(|top| top.0.doc.key == fused.key)
                .unwrap_or(false)
            {
                let Reverse(other) = heap.pop().unwrap();
                fused.absorb(other.doc);
                if let Ok(next) = inputs[other.src].recv() {
                    heap.push(Reverse(HeapItem {
                        doc: next,
                        src: other.src,
                    }));
                }
            }

            if out_tx.send(fused).is_err() {
                return;
            }
        }
    });

    out_rx
}

/// One presenter thread per inverted file, yielding its documents in file
/// order over a bounded channel.
pub fn merge_files(paths: Vec<PathBuf>, chan_depth: usize) -> Result<Receiver<InvDocument>> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        let (tx, rx) = bounded(chan_depth.max(1));
        let blocks = BlockReader::from_file(&path, BlockEnding::Element, MarkupPolicy::Mixed)?;
        thread::spawn(move || {
            let stream = Partitioner::new("InvDocument").stream(blocks);
            let mut arena = XmlArena::new(4096);
            for record in stream {
                match InvDocument::from_xml(&mut arena, &record) {
                    Ok(doc) => {
                        if tx.send(doc).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        eprintln!("skipping inverted document: {}", err);
                    }
                }
            }
        });
        inputs.push(rx);
    }
    Ok(merge_streams(inputs, chan_depth))
}
