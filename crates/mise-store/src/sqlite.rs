//! SQLite-backed store implementing every storage trait.

use std::path::{Path, PathBuf};

use mise_core::{DietaryProfile, Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::schema::SCHEMA_SQL;
use crate::traits::*;
use crate::types::*;

const RECIPE_COLUMNS: &str = "id, user_id, recipe_id, source_url_lower, conversation_id, \
     original_recipe_id, recipe_json, is_saved, has_substitutions, created_at, updated_at";

const CONVERSATION_COLUMNS: &str = "id, user_id, status, decided_dish, search_query, \
     editing_recipe_id, recipe_id, created_at, updated_at";

/// SQLite store for conversations, messages, profiles and recipes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/mise.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("mise.db");

        let conn = Self::create_connection(&db_path)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let recipe_count = store.count_recipes()?;
        info!(
            "SqliteStore initialized: {} recipes, path={}",
            recipe_count,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn count_recipes(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ---------------------------------------------------------------
    // Row mapping
    // ---------------------------------------------------------------

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
        let role: String = row.get(2)?;
        let role = Role::parse(&role).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown role: {}", role).into(),
            )
        })?;
        Ok(ChatMessage {
            conversation_id: row.get(0)?,
            index: row.get(1)?,
            role,
            content: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        let status: String = row.get(2)?;
        let status = ConversationStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown conversation status: {}", status).into(),
            )
        })?;
        Ok(Conversation {
            conversation_id: row.get(0)?,
            user_id: row.get(1)?,
            status,
            decided_dish: row.get(3)?,
            search_query: row.get(4)?,
            editing_recipe_id: row.get(5)?,
            recipe_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn row_to_recipe(row: &Row<'_>) -> rusqlite::Result<Recipe> {
        let recipe_json: String = row.get(6)?;
        let recipe_data = serde_json::from_str(&recipe_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Recipe {
            id: row.get(0)?,
            user_id: row.get(1)?,
            recipe_id: row.get(2)?,
            source_url_lower: row.get(3)?,
            conversation_id: row.get(4)?,
            original_recipe_id: row.get(5)?,
            recipe_data,
            is_saved: row.get::<_, i64>(7)? != 0,
            has_substitutions: row.get::<_, i64>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn conversation_locked(conn: &Connection, conversation_id: &str) -> Result<Option<Conversation>> {
        conn.prepare_cached(&format!(
            "SELECT {} FROM conversations WHERE id = ?1",
            CONVERSATION_COLUMNS
        ))
        .map_err(|e| Error::Database(e.to_string()))?
        .query_row(params![conversation_id], Self::row_to_conversation)
        .optional()
        .map_err(|e| Error::Database(e.to_string()))
    }

    fn recipe_locked(conn: &Connection, id: i64, user_id: &str) -> Result<Option<Recipe>> {
        conn.prepare_cached(&format!(
            "SELECT {} FROM recipes WHERE id = ?1 AND user_id = ?2",
            RECIPE_COLUMNS
        ))
        .map_err(|e| Error::Database(e.to_string()))?
        .query_row(params![id, user_id], Self::row_to_recipe)
        .optional()
        .map_err(|e| Error::Database(e.to_string()))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------
// Messages
// ---------------------------------------------------------------

impl MessageStore for SqliteStore {
    fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT conversation_id, idx, role, content, created_at FROM messages
                 WHERE conversation_id = ?1 ORDER BY idx ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![conversation_id], Self::row_to_message)
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn append_message(&self, message: NewMessage) -> Result<ChatMessage> {
        let conn = self.conn.lock();
        if Self::conversation_locked(&conn, &message.conversation_id)?.is_none() {
            return Err(Error::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }

        let next_index: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(idx), -1) + 1 FROM messages WHERE conversation_id = ?1",
                params![message.conversation_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = now_ms();
        conn.execute(
            "INSERT INTO messages (conversation_id, idx, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.conversation_id,
                next_index,
                message.role.as_str(),
                message.content,
                now
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(ChatMessage {
            conversation_id: message.conversation_id,
            index: next_index,
            role: message.role,
            content: message.content,
            timestamp: now,
        })
    }
}

// ---------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------

impl ConversationStore for SqliteStore {
    fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        Self::conversation_locked(&conn, conversation_id)
    }

    fn create_conversation(&self, user_id: &str) -> Result<Conversation> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (id, user_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, user_id, ConversationStatus::Exploring.as_str(), now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        debug!("Created conversation {} for user {}", id, user_id);

        Ok(Conversation {
            conversation_id: id,
            user_id: user_id.to_string(),
            status: ConversationStatus::Exploring,
            decided_dish: None,
            search_query: None,
            editing_recipe_id: None,
            recipe_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation> {
        let conn = self.conn.lock();
        let mut conversation = Self::conversation_locked(&conn, conversation_id)?
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))?;

        if let Some(status) = patch.status {
            conversation.status = status;
        }
        if let Some(dish) = patch.decided_dish {
            conversation.decided_dish = Some(dish);
        }
        if let Some(query) = patch.search_query {
            conversation.search_query = Some(query);
        }
        if let Some(id) = patch.editing_recipe_id {
            conversation.editing_recipe_id = Some(id);
        }
        if let Some(id) = patch.recipe_id {
            conversation.recipe_id = Some(id);
        }
        conversation.updated_at = now_ms();

        conn.execute(
            "UPDATE conversations SET status = ?2, decided_dish = ?3, search_query = ?4,
                 editing_recipe_id = ?5, recipe_id = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                conversation_id,
                conversation.status.as_str(),
                conversation.decided_dish,
                conversation.search_query,
                conversation.editing_recipe_id,
                conversation.recipe_id,
                conversation.updated_at
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(conversation)
    }
}

// ---------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------

impl ProfileStore for SqliteStore {
    fn get_profile(&self, user_id: &str) -> Result<Option<DietaryProfile>> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .prepare_cached("SELECT profile_json FROM profiles WHERE user_id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![user_id], |row| row.get(0))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn upsert_profile(&self, user_id: &str, profile: &DietaryProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO profiles (user_id, profile_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 profile_json = excluded.profile_json,
                 updated_at = excluded.updated_at",
            params![user_id, json, now_ms()],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------

impl RecipeStore for SqliteStore {
    fn find_by_user_and_source_url(
        &self,
        user_id: &str,
        url_lower: &str,
    ) -> Result<Option<Recipe>> {
        let conn = self.conn.lock();
        let found = conn
            .prepare_cached(&format!(
                "SELECT {} FROM recipes
                 WHERE user_id = ?1 AND source_url_lower = ?2 AND original_recipe_id IS NULL
                 ORDER BY id ASC LIMIT 1",
                RECIPE_COLUMNS
            ))
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![user_id, url_lower], Self::row_to_recipe)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(found)
    }

    fn get_recipe(&self, id: i64, user_id: &str) -> Result<Option<Recipe>> {
        let conn = self.conn.lock();
        Self::recipe_locked(&conn, id, user_id)
    }

    fn create_recipe(&self, recipe: NewRecipe) -> Result<Recipe> {
        let recipe_json = serde_json::to_string(&recipe.recipe_data)?;
        let public_id = uuid::Uuid::new_v4().to_string();
        let url_lower = recipe.recipe_data.source_url.to_lowercase();
        let now = now_ms();

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO recipes (user_id, recipe_id, source_url_lower, conversation_id,
                     original_recipe_id, recipe_json, is_saved, has_substitutions,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?8)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![
                recipe.user_id,
                public_id,
                url_lower,
                recipe.conversation_id,
                recipe.original_recipe_id,
                recipe_json,
                recipe.has_substitutions as i64,
                now
            ])
            .map_err(|e| Error::Database(e.to_string()))?;

        debug!("Created recipe {} ({}) for user {}", id, url_lower, recipe.user_id);

        Ok(Recipe {
            id,
            user_id: recipe.user_id,
            recipe_id: public_id,
            source_url_lower: url_lower,
            conversation_id: recipe.conversation_id,
            original_recipe_id: recipe.original_recipe_id,
            recipe_data: recipe.recipe_data,
            is_saved: false,
            has_substitutions: recipe.has_substitutions,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_recipe(&self, id: i64, user_id: &str, patch: RecipePatch) -> Result<Recipe> {
        let conn = self.conn.lock();
        let mut recipe = Self::recipe_locked(&conn, id, user_id)?
            .ok_or_else(|| Error::NotFound(format!("recipe {}", id)))?;

        if let Some(conversation_id) = patch.conversation_id {
            recipe.conversation_id = Some(conversation_id);
        }
        if let Some(saved) = patch.is_saved {
            recipe.is_saved = saved;
        }
        recipe.updated_at = now_ms();

        conn.execute(
            "UPDATE recipes SET conversation_id = ?3, is_saved = ?4, updated_at = ?5
             WHERE id = ?1 AND user_id = ?2",
            params![
                id,
                user_id,
                recipe.conversation_id,
                recipe.is_saved as i64,
                recipe.updated_at
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(recipe)
    }
}
