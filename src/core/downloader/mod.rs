mod client;
pub mod digest;

pub use client::{BatchReport, CacheMode, DownloadEntry, DownloadOutcome, Downloader};
pub use digest::{Digest, DigestAlgorithm};
