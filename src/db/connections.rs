//! The application-connections table.
//!
//! Every application backend upserts one row here at connect time via the
//! generated incantation, recording which revision (and schema hash) it is
//! pinned to. The migrator only ever reads this table; it exists so an
//! operator can see who would break before contracting the schema.

use anyhow::Result;
use chrono::{DateTime, Utc};
use postgres::{Client, Row};

/// Backends pinned to a revision at or above the given number.
///
/// Joined against `pg_stat_activity` so rows left behind by long-gone
/// backends (same pid, different start time) do not count as live.
const SELECT_PINNED_ABOVE: &str = "SELECT c.pid, c.revision, c.schema_hash, c.backend_start
FROM migrator_status.connections c
JOIN pg_stat_activity a ON a.pid = c.pid AND a.backend_start = c.backend_start
WHERE c.revision >= $1
ORDER BY c.revision DESC, c.pid";

/// One application backend's revision pin.
#[derive(Debug, Clone)]
pub struct AppConnection {
    pub pid: i32,
    pub revision: i32,
    pub schema_hash: Vec<u8>,
    pub backend_start: DateTime<Utc>,
}

fn map_connection(row: &Row) -> AppConnection {
    AppConnection {
        pid: row.get(0),
        revision: row.get(1),
        schema_hash: row.get(2),
        backend_start: row.get(3),
    }
}

/// Live backends still pinned to `revision` or later.
pub fn pinned_at_or_above(client: &mut Client, revision: i32) -> Result<Vec<AppConnection>> {
    let rows = client.query(SELECT_PINNED_ABOVE, &[&revision])?;
    Ok(rows.iter().map(map_connection).collect())
}
