use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// MeSH and journal alias tables from the Data directory TSV files.
/// Missing files or entries are recovered locally: the query term is
/// simply looked up as written.
#[derive(Debug, Default)]
pub struct AliasTables {
    pub mesh_names: HashMap<String, Vec<String>>, // name -> tree codes
    pub mesh_tree: HashMap<String, String>,       // tree code -> name
    pub journals: HashMap<String, String>,        // alias -> canonical
}

impl AliasTables {
    pub fn empty() -> Self {
        AliasTables::default()
    }

    pub fn load(data_dir: &Path) -> Self {
        let mut tables = AliasTables::empty();
        for (name, codes) in read_tsv(&data_dir.join("meshname.txt")) {
            let codes = codes
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            tables.mesh_names.insert(name.to_lowercase(), codes);
        }
        for (code, name) in read_tsv(&data_dir.join("meshtree.txt")) {
            tables.mesh_tree.insert(code, name);
        }
        for (alias, canonical) in read_tsv(&data_dir.join("journals.txt")) {
            tables.journals.insert(alias.to_lowercase(), canonical);
        }
        tables
    }

    pub fn mesh_codes(&self, name: &str) -> Option<&Vec<String>> {
        self.mesh_names.get(&name.to_lowercase())
    }

    pub fn journal(&self, alias: &str) -> Option<&String> {
        self.journals.get(&alias.to_lowercase())
    }
}

fn read_tsv(path: &Path) -> Vec<(String, String)> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((left, right)) => rows.push((left.to_string(), right.to_string())),
            None => eprintln!("malformed alias row skipped: {:.60}", line),
        }
    }
    rows
}

/// One-shot lazily loaded alias tables, threaded through the rewriter
/// instead of process-global state.
pub struct TableContext {
    data_dir: PathBuf,
    tables: OnceLock<Arc<AliasTables>>,
}

impl TableContext {
    pub fn new(data_dir: PathBuf) -> Self {
        TableContext {
            data_dir,
            tables: OnceLock::new(),
        }
    }

    pub fn preloaded(tables: AliasTables) -> Self {
        let context = TableContext {
            data_dir: PathBuf::new(),
            tables: OnceLock::new(),
        };
        let _ = context.tables.set(Arc::new(tables));
        context
    }

    pub fn tables(&self) -> Arc<AliasTables> {
        Arc::clone(
            self.tables
                .get_or_init(|| Arc::new(AliasTables::load(&self.data_dir))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_tsv_tables() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("meshname.txt"),
            "Neoplasms\tC04\nCarcinoma\tC04.557.470,C04.588\n",
        )
        .unwrap();
        fs::write(dir.path().join("meshtree.txt"), "C04\tNeoplasms\n").unwrap();
        fs::write(
            dir.path().join("journals.txt"),
            "j biol chem\tJ Biol Chem\n",
        )
        .unwrap();

        let tables = AliasTables::load(dir.path());
        assert_eq!(tables.mesh_codes("neoplasms").unwrap(), &vec!["C04".to_string()]);
        assert_eq!(tables.mesh_codes("Carcinoma").unwrap().len(), 2);
        assert_eq!(tables.mesh_tree["C04"], "Neoplasms");
        assert_eq!(tables.journal("J BIOL CHEM").unwrap(), "J Biol Chem");
    }

    #[test]
    fn missing_files_yield_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let tables = AliasTables::load(dir.path());
        assert!(tables.mesh_names.is_empty());
        assert!(tables.mesh_codes("anything").is_none());
    }

    #[test]
    fn context_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("meshname.txt"), "X\tC01\n").unwrap();
        let context = TableContext::new(dir.path().to_path_buf());
        let first = context.tables();
        // a later rewrite of the file is not observed within the process
        fs::write(dir.path().join("meshname.txt"), "Y\tC02\n").unwrap();
        let second = context.tables();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
