use std::sync::Once;

pub mod backup;
pub mod db;
mod error;
pub mod events;
mod lineage;
pub mod migrate;
pub mod model;
pub mod order;
pub mod payload;
mod permissions;
pub mod prefs;
mod singleton;
pub mod store;
mod time;
pub mod tree;

pub use error::{AppError, AppResult};
pub use events::TreeEvent;
pub use model::{
    Node, NodeKind, Payload, PermissionKind, PermissionScope, SpecialMode, ROOT_NODE_ID,
};
pub use prefs::Preferences;
pub use store::NodeStore;
pub use tree::{NodePosition, Offset};

static INIT_LOGGING: Once = Once::new();

/// Install the process-wide tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}
