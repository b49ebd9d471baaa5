//! redb table definitions for the SpotGrid deployment store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Versioned deployment records keyed by deployment id.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Action journal keyed by `{deployment_id}:{action_id:020}`.
pub const ACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("actions");
