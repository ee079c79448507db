// ─── Jarsmith Core ───
// Provisioning pipeline for game jars consumed by build tooling.
//
// Architecture:
//   core/
//     version/      Mirrored version manifests + resolver
//     downloader/   Concurrent downloads with digest validation
//     jar/          Jar variants, configurations, bundles, MANIFEST.MF
//     archive       Deterministic zip read/write helpers
//     classfile/    Class-file model, pool rebuilder, annotations
//     merge/        Client/server merge and split
//     remap/        Tiny v2 mappings + namespace remapping
//     processor/    Processor chain, access widener, mod descriptors
//     maven/        GLOBAL/LOCAL artifact cache with backups
//     pipeline/     Ordered stages and the runner
//     config        Run configuration

pub mod archive;
pub mod classfile;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod jar;
pub mod maven;
pub mod merge;
pub mod pipeline;
pub mod processor;
pub mod remap;
pub mod version;
