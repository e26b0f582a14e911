pub mod error;
pub mod memory;
pub mod recorder;
pub mod sqlite;

pub use error::StoreError;
pub use memory::{CachedDecision, DecisionCache};
pub use recorder::DecisionRecorder;
pub use sqlite::DecisionStore;
