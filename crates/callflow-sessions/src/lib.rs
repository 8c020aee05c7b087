pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::SessionError;
pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use store::{CallSummary, SaveOutcome, SessionStore};
