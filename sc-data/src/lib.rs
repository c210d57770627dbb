pub mod common_io; // line-oriented gz-aware file I/O
pub mod dataset; // gene x cell sparse count container
pub mod mtx_io; // MatrixMarket triplets
pub mod qc; // per-cell metrics and the cell filter
pub mod simulate; // synthetic Poisson-Gamma counts
