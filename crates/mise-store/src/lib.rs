//! Mise Store: SQLite persistence for conversations, messages, profiles and recipes.
//!
//! The pipeline only sees the traits in [`traits`]; [`SqliteStore`] implements
//! all four of them over a single connection.

pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use sqlite::SqliteStore;
pub use traits::{ConversationStore, MessageStore, ProfileStore, RecipeStore};
pub use types::*;
