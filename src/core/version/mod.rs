pub mod manifest;
pub mod resolver;

pub use manifest::{DownloadDescriptor, ManifestSource, VersionEntry, VersionsManifest};
pub use resolver::ManifestResolver;
