#[cfg(test)]
mod tests {
    use pgshift::libs::incantation::format_incantation;
    use pgshift::libs::revision::Revision;
    use std::fs;
    use tempfile::TempDir;

    fn fixture_revision(dir: &TempDir, number: i32) -> Revision {
        let migration_path = dir.path().join(format!("{}-migration.yml", number));
        fs::write(
            &migration_path,
            "message: create users
pre_deploy:
- run_ddl:
    up: CREATE TABLE users(u_id int);
    down: DROP TABLE users;
",
        )
        .unwrap();
        fs::write(dir.path().join(format!("{}-schema.sql", number)), "CREATE TABLE users(u_id int);\n").unwrap();
        Revision::parse(number, &migration_path).unwrap()
    }

    #[test]
    fn test_incantation_prepends_shim_schema() {
        let dir = tempfile::tempdir().unwrap();
        let revision = fixture_revision(&dir, 4);
        let incantation = format_incantation(&revision);
        assert!(incantation.starts_with(
            "SELECT set_config('search_path', 'shim_rev_4,'||current_setting('search_path'), false);"
        ));
    }

    #[test]
    fn test_incantation_upserts_connection_row() {
        let dir = tempfile::tempdir().unwrap();
        let revision = fixture_revision(&dir, 2);
        let incantation = format_incantation(&revision);
        assert!(incantation.contains("INSERT INTO migrator_status.connections (pid, revision, schema_hash, backend_start)"));
        assert!(incantation.contains("VALUES (pg_backend_pid(), 2, decode("));
        assert!(incantation.contains("ON CONFLICT (pid) DO UPDATE"));
        assert!(incantation.contains("backend_start = excluded.backend_start"));
    }

    #[test]
    fn test_incantation_embeds_schema_hash_hex() {
        let dir = tempfile::tempdir().unwrap();
        let revision = fixture_revision(&dir, 1);
        let incantation = format_incantation(&revision);
        let hex = hex::encode(&revision.schema_hash);
        assert_eq!(hex.len(), 64);
        assert!(incantation.contains(&format!("decode('{}', 'hex')", hex)));
    }
}
