pub mod classifier;
pub mod config;
pub mod coverage;
pub mod download;
pub mod events;
pub mod identity;
pub mod media;
pub mod metrics;
pub mod searcher;
pub mod selection;
pub mod subscription;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use coverage::{CoverageRequest, SeasonNeed};
pub use media::{EpisodeSet, MediaIdentity, MediaType, SearchOrigin};
pub use searcher::{MediaSearcher, SearchOutcome, SearchTarget};
pub use selection::{SelectionEngine, SelectionResult};
pub use subscription::{SubscriptionRunner, SubscriptionState};
