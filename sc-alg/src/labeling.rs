use sc_data::common_io::read_lines_of_words;

use fnv::FnvHashMap;
use log::info;

/// The label table and the clustering disagree; always fatal, since a
/// mismatched table silently mislabels biological samples
#[derive(Debug, thiserror::Error)]
pub enum LabelingError {
    #[error("cluster {0} has no cell-type entry in the label table")]
    MissingCluster(usize),
    #[error("label table names cluster {0}, which does not exist")]
    UnknownCluster(usize),
}

/// Cluster id → human-assigned cell-type name
///
/// The mapping is a configuration table supplied by a domain expert;
/// nothing here infers labels from the data.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    map: FnvHashMap<usize, Box<str>>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cluster: usize, cell_type: &str) {
        self.map.insert(cluster, cell_type.into());
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Read a two-column `cluster<TAB>cell type` file, gzipped or not;
    /// `#`/`%` lines are comments
    pub fn from_tsv(file: &str) -> anyhow::Result<Self> {
        let mut map = FnvHashMap::default();
        for words in read_lines_of_words(file)? {
            if words.len() < 2 {
                return Err(anyhow::anyhow!(
                    "label table line needs `cluster<TAB>cell type`: {}",
                    words.join(" ")
                ));
            }
            let cluster = words[0].parse::<usize>().map_err(|_| {
                anyhow::anyhow!("label table cluster id is not an integer: {}", words[0])
            })?;
            // a cell-type name may contain spaces
            let cell_type = words[1..].join(" ");
            if map.insert(cluster, cell_type.into_boxed_str()).is_some() {
                return Err(anyhow::anyhow!(
                    "label table repeats cluster {}",
                    cluster
                ));
            }
        }
        if map.is_empty() {
            return Err(anyhow::anyhow!("empty label table: {}", file));
        }
        Ok(Self { map })
    }

    /// Attach a cell-type name to every cell: a total, order-preserving
    /// substitution of cluster ids
    ///
    /// Fails when any observed cluster is missing from the table or
    /// the table references a cluster that never occurs.
    pub fn apply(&self, clusters: &[usize]) -> Result<Vec<Box<str>>, LabelingError> {
        let observed: std::collections::BTreeSet<usize> = clusters.iter().cloned().collect();

        for &c in &observed {
            if !self.map.contains_key(&c) {
                return Err(LabelingError::MissingCluster(c));
            }
        }
        for &c in self.map.keys() {
            if !observed.contains(&c) {
                return Err(LabelingError::UnknownCluster(c));
            }
        }

        info!("labeling {} cells across {} cell types", clusters.len(), observed.len());

        Ok(clusters.iter().map(|c| self.map[c].clone()).collect())
    }
}
