pub mod analysis;
pub mod archive;
pub mod core;
pub mod index;
pub mod postings;
pub mod query;
pub mod stream;
pub mod xml;

/*
┌──────────────────────────────── BIBDEX DATA FLOW ────────────────────────────────┐
│                                                                                   │
│  indexing:                                                                        │
│    bytes ── stream::block ──> blocks ── stream::partition ──> records             │
│      ── stream::pipeline (serve workers, min-heap unshuffler) ──> IdxDocument     │
│      ── index::incremental (per-leaf e2x.gz, existence skip)                      │
│      ── index::invert (36 shard maps, flat triples) ──> InvDocument               │
│      ── index::merge (presenter channels, min-heap fuse)                          │
│      ── postings::writer ──> <key>.<FIELD>.{trm,mst,pst,uqi,ofs}                  │
│                                                                                   │
│  query:                                                                           │
│    string ── query::rewrite (entities, operators, ranges, aliases, stops)         │
│      ── query::parser (| < & < ! < ~) ──> Query AST                               │
│      ── query::eval (merge-join intersect/union/exclude, positional extend)       │
│      ── postings::reader (mmap shards, binary search, wildcard range scan)        │
│      ──> ascending deduplicated UID vector                                        │
│                                                                                   │
│  retrieval:                                                                       │
│    uid ── archive::trie ──> Archive/<xx/yy/zz>/<uid>.xml.gz                       │
│      ── archive::store (multi-member gzip, prolog skip, lock table) ──> record    │
│                                                                                   │
└───────────────────────────────────────────────────────────────────────────────────┘
*/
