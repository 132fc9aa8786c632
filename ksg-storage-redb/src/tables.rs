//! redb table and index definitions backing [`crate::RedbStore`].

use redb::{MultimapTableDefinition, TableDefinition};

/// `node id (string) -> postcard-encoded Node`.
pub const NODES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");
/// `edge id (string) -> postcard-encoded Edge`.
pub const EDGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");

/// `kind -> node id`, so `search` with a kind filter scans only that
/// partition (spec §6.5).
pub const NODE_KIND_INDEX: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("node_kind_index");
/// `from node id -> edge id`.
pub const EDGES_FROM_INDEX: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("edges_from_index");
/// `to node id -> edge id`.
pub const EDGES_TO_INDEX: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("edges_to_index");
