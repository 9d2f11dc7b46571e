//! Small shared helpers used across the model/cache/snapshot modules.

use uuid::Uuid;

/// Generate a new UUID v4 as a string, used for nonces.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
