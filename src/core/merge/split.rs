use std::collections::BTreeSet;
use std::path::Path;

use tracing::{error, info};

use crate::core::archive::{self, Entries};
use crate::core::error::PipelineResult;

/// Entries the game loads from whichever jar is present, so both halves of
/// a split carry them.
pub const DEFAULT_SHARED_ENTRIES: &[&str] = &[
    "post_build/Cosmic-Reach-Localization/CREDITS.txt",
    "build_assets/Licences/COSMIC_REACH_LICENSE.txt",
    "build_assets/Licences/COSMIC_REACH_LOCALIZATION.txt",
    "build_assets/Licences/COSMIC_REACH_SAVE_LOCATION.txt",
    "build_assets/version.txt",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitStats {
    pub client_only: usize,
    pub common: usize,
    pub shared: usize,
}

/// Splits a client jar and an extracted server jar into a common jar and a
/// client-only jar.
#[derive(Debug, Clone)]
pub struct JarSplitter {
    shared: BTreeSet<String>,
}

impl Default for JarSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_SHARED_ENTRIES.iter().map(|s| s.to_string()))
    }
}

impl JarSplitter {
    pub fn new(shared: impl IntoIterator<Item = String>) -> Self {
        Self {
            shared: shared.into_iter().collect(),
        }
    }

    /// Write `client_only_dest` and `common_dest`. On failure neither file
    /// is left behind.
    pub fn split(
        &self,
        client: &Path,
        server: &Path,
        client_only_dest: &Path,
        common_dest: &Path,
    ) -> PipelineResult<SplitStats> {
        info!(":splitting jars {:?} + {:?}", client, server);

        let result = self.split_inner(client, server, client_only_dest, common_dest);
        if let Err(e) = &result {
            error!("Split failed, removing partial outputs: {}", e);
            let _ = std::fs::remove_file(client_only_dest);
            let _ = std::fs::remove_file(common_dest);
        }
        result
    }

    fn split_inner(
        &self,
        client: &Path,
        server: &Path,
        client_only_dest: &Path,
        common_dest: &Path,
    ) -> PipelineResult<SplitStats> {
        let client_entries = archive::read_entries(client)?;
        let server_entries = archive::read_entries(server)?;
        let (client_only, common, stats) = self.partition(client_entries, server_entries);

        archive::write_entries(client_only_dest, &client_only)?;
        archive::write_entries(common_dest, &common)?;

        info!(
            "Split into {} client-only and {} common entries ({} shared)",
            stats.client_only, stats.common, stats.shared
        );
        Ok(stats)
    }

    fn partition(&self, mut client: Entries, mut server: Entries) -> (Entries, Entries, SplitStats) {
        let mut stats = SplitStats::default();
        let mut client_only = Entries::new();
        let mut common = Entries::new();

        for name in &self.shared {
            let from_client = client.remove(name);
            let from_server = server.remove(name);
            let for_client = from_client.clone().or_else(|| from_server.clone());
            let for_common = from_server.or(from_client);
            if let (Some(c), Some(s)) = (for_client, for_common) {
                client_only.insert(name.clone(), c);
                common.insert(name.clone(), s);
                stats.shared += 1;
            }
        }

        for (name, bytes) in client {
            if !server.contains_key(&name) {
                client_only.insert(name, bytes);
                stats.client_only += 1;
            }
        }
        for (name, bytes) in server {
            common.insert(name, bytes);
            stats.common += 1;
        }

        (client_only, common, stats)
    }
}
