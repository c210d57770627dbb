pub mod cell_cycle; // module scores and phase calls
pub mod cluster; // cluster assignment container
pub mod feature_selection; // highly variable genes
pub mod kmeans; // k-means alternative
pub mod knn; // HNSW kNN graph over cells
pub mod labeling; // cluster -> cell-type substitution
pub mod louvain; // modularity community detection
pub mod markers; // one-vs-rest differential expression
pub mod normalization; // per-cell log1p scaling
pub mod pca; // randomized PCA and the component rule
pub mod rsvd; // randomized SVD
pub mod scaling; // per-gene standardization
pub mod stat; // running sufficient statistics
