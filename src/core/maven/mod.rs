mod artifact;
mod cache;
mod pom;

pub use artifact::{ArtifactCoordinate, CacheScope};
pub use cache::{ArtifactCache, CacheStage, SlotState};
pub use pom::PomDocument;

/// Default group of published game jars.
pub const DEFAULT_GROUP: &str = "net.jarsmith.game";

/// Default artifact name of published game jars.
pub const DEFAULT_ARTIFACT: &str = "game";

/// Project-relative directory of the LOCAL repository.
pub const LOCAL_REPOSITORY: &str = ".gradle/jarsmith";
