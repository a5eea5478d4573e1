//! Playback persistence: identity, reconciliation, history, transfer and
//! debounced saving on top of the local store.

pub mod history;
pub mod identity;
pub mod reconcile;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod transfer;

pub use history::{HistoryAggregator, PlayOutcome};
pub use reconcile::{reconcile, StateSource};
pub use scheduler::SaveScheduler;
pub use state::PlaybackState;
pub use transfer::{export_document, import_document, ExportDocument};
