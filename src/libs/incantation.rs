//! Per-connection setup SQL for application backends.
//!
//! Every application backend runs this snippet once after connecting. It
//! prepends the revision's shim schema to the backend's `search_path` so
//! renamed columns resolve through the shim views, and upserts one row into
//! `migrator_status.connections` keyed on the backend pid so operators can
//! see which revision each live connection is pinned to.

use crate::db::db::{shim_schema_name, SCHEMA_NAME};
use crate::libs::revision::Revision;

/// Renders the incantation for one revision.
///
/// Re-running the snippet on the same backend updates its row in place;
/// the upsert on `pid` keeps exactly one row per backend.
pub fn format_incantation(revision: &Revision) -> String {
    format!(
        "SELECT set_config('search_path', '{shim},'||current_setting('search_path'), false);
INSERT INTO {ns}.connections (pid, revision, schema_hash, backend_start)
VALUES (pg_backend_pid(), {number}, decode('{hash}', 'hex'),
        (SELECT backend_start FROM pg_stat_activity WHERE pid = pg_backend_pid()))
ON CONFLICT (pid) DO UPDATE
    SET revision = excluded.revision,
        schema_hash = excluded.schema_hash,
        backend_start = excluded.backend_start;
",
        shim = shim_schema_name(revision.number),
        ns = SCHEMA_NAME,
        number = revision.number,
        hash = hex::encode(&revision.schema_hash),
    )
}
