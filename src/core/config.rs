use std::env;
use std::path::PathBuf;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Corpus;

/// Engine configuration. One worker-count value drives pool sizes across
/// all pipeline stages; `farm_size` is the XML arena allocation chunk.
#[derive(Debug, Clone)]
pub struct Config {
    pub corpus: Corpus,
    pub master: PathBuf,  // root for Archive and Postings
    pub working: PathBuf, // root for Index and Invert during builds
    pub verbose: bool,

    pub serve: usize,      // worker count
    pub chan_depth: usize, // bounded-channel capacity
    pub heap_size: usize,  // unshuffler release delay
    pub farm_size: usize,  // XML node-pool chunk
}

impl Config {
    pub fn new(corpus: Corpus, master: PathBuf, working: PathBuf) -> Self {
        Config {
            corpus,
            master,
            working,
            verbose: false,
            serve: num_cpus::get(),
            chan_depth: 16,
            heap_size: 16,
            farm_size: 4096,
        }
    }

    /// Read roots from `<CORPUS>_MASTER` / `<CORPUS>_WORKING`; a missing
    /// master mount is fatal. `<CORPUS>_VERBOSE=Y` enables progress logs.
    pub fn from_env(corpus: Corpus) -> Result<Self> {
        let prefix = corpus.env_prefix();

        let master = env::var(format!("{}_MASTER", prefix)).map_err(|_| {
            Error::new(
                ErrorKind::NotFound,
                format!("{}_MASTER is not set; archive root unavailable", prefix),
            )
        })?;
        let master = PathBuf::from(master);
        if !master.is_dir() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("archive root {} is not mounted", master.display()),
            ));
        }

        let working = env::var(format!("{}_WORKING", prefix))
            .map(PathBuf::from)
            .unwrap_or_else(|_| master.clone());

        let verbose = env::var(format!("{}_VERBOSE", prefix))
            .map(|v| v.starts_with('Y') || v.starts_with('y'))
            .unwrap_or(false);

        let mut config = Config::new(corpus, master, working);
        config.verbose = verbose;
        Ok(config)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.master.join("Archive")
    }

    pub fn postings_dir(&self) -> PathBuf {
        self.master.join("Postings")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.master.join("Data")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.working.join("Index")
    }

    pub fn invert_dir(&self) -> PathBuf {
        self.working.join("Invert")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pools_are_positive() {
        let config = Config::new(
            Corpus::Pubmed,
            PathBuf::from("/tmp/master"),
            PathBuf::from("/tmp/working"),
        );
        assert!(config.serve >= 1);
        assert_eq!(config.chan_depth, 16);
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/working/Index"));
        assert_eq!(config.postings_dir(), PathBuf::from("/tmp/master/Postings"));
    }
}
