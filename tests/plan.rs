#[cfg(test)]
mod tests {
    use pgshift::libs::plan::{PhaseIndex, PhaseSlice};
    use pgshift::libs::revision::Repo;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn index(revision: i32, pre_deploy: bool, change: i32, phase: i32) -> PhaseIndex {
        PhaseIndex {
            revision,
            migration_hash: vec![1],
            schema_hash: vec![2],
            pre_deploy,
            change,
            phase,
        }
    }

    /// Writes a two-revision repository into a temp dir and parses it.
    fn fixture_repo(dir: &TempDir) -> (PathBuf, Repo) {
        let root = dir.path();
        let migrations = root.join("migrations");
        fs::create_dir(&migrations).unwrap();
        fs::write(root.join("migrator.yml"), "schema_dump_command: pg_dump --schema-only\n").unwrap();
        fs::write(
            migrations.join("1-migration.yml"),
            "message: create users
pre_deploy:
- run_ddl:
    up: CREATE TABLE users(u_id int, email text, mobile text);
    down: DROP TABLE users;
",
        )
        .unwrap();
        fs::write(migrations.join("1-schema.sql"), "CREATE TABLE users(u_id int, email text, mobile text);\n").unwrap();
        fs::write(
            migrations.join("2-migration.yml"),
            "message: index and constrain emails
pre_deploy:
- create_index:
    name: users_email_idx
    table: users
    expr: email
- add_constraint:
    table: users
    name: users_email_nonempty
    check: (length(email) > 0)
post_deploy:
- run_ddl:
    up: ALTER TABLE users DROP COLUMN mobile;
    down: ALTER TABLE users ADD COLUMN mobile text;
",
        )
        .unwrap();
        fs::write(migrations.join("2-schema.sql"), "CREATE TABLE users(u_id int, email text);\n").unwrap();
        let config_path = root.join("migrator.yml");
        let repo = Repo::parse(&config_path).unwrap();
        (config_path, repo)
    }

    #[test]
    fn test_phase_order_pre_deploy_before_post_deploy() {
        assert!(index(1, true, 0, 0) < index(1, false, 0, 0));
        assert!(index(1, false, 0, 0) < index(2, true, 0, 0));
        assert!(index(1, true, 0, 0) < index(1, true, 0, 1));
        assert!(index(1, true, 0, 1) < index(1, true, 1, 0));
    }

    #[test]
    fn test_slice_bounds() {
        let all = PhaseSlice::default();
        assert!(all.contains(&index(1, true, 0, 0)));

        let after = PhaseSlice {
            start: Some(index(1, true, 0, 0)),
            start_inclusive: false,
            ..PhaseSlice::default()
        };
        assert!(!after.contains(&index(1, true, 0, 0)));
        assert!(after.contains(&index(1, false, 0, 0)));

        let bounded = PhaseSlice {
            start: Some(index(1, true, 0, 0)),
            start_inclusive: true,
            end: Some(index(2, true, 0, 0)),
            end_inclusive: false,
        };
        assert!(bounded.contains(&index(1, true, 0, 0)));
        assert!(bounded.contains(&index(1, false, 0, 0)));
        assert!(!bounded.contains(&index(2, true, 0, 0)));
    }

    #[test]
    fn test_enumeration_assigns_deterministic_indices() {
        let dir = tempfile::tempdir().unwrap();
        let (_, repo) = fixture_repo(&dir);

        let steps = repo.revisions.get_phases(&PhaseSlice::default());
        // Revision 1: one run_ddl phase. Revision 2: one index phase, two
        // constraint phases, one post-deploy run_ddl phase.
        assert_eq!(steps.len(), 5);

        let revision2 = repo.revisions.get(2).unwrap();
        assert_eq!(steps[0].index, repo.revisions.get(1).unwrap().index_for(true, 0, 0));
        assert_eq!(steps[1].index, revision2.index_for(true, 0, 0));
        assert_eq!(steps[2].index, revision2.index_for(true, 1, 0));
        assert_eq!(steps[3].index, revision2.index_for(true, 1, 1));
        assert_eq!(steps[4].index, revision2.index_for(false, 0, 0));

        // Indices carry the owning revision's hashes.
        assert_eq!(steps[1].index.migration_hash, revision2.migration_hash);
        assert_eq!(steps[1].index.schema_hash, revision2.schema_hash);
    }

    #[test]
    fn test_first_and_last_index() {
        let dir = tempfile::tempdir().unwrap();
        let (_, repo) = fixture_repo(&dir);

        let revision1 = repo.revisions.get(1).unwrap();
        assert_eq!(revision1.first_index(), Some(revision1.index_for(true, 0, 0)));
        assert_eq!(revision1.last_index(), Some(revision1.index_for(true, 0, 0)));

        let revision2 = repo.revisions.get(2).unwrap();
        assert_eq!(revision2.first_index(), Some(revision2.index_for(true, 0, 0)));
        assert_eq!(revision2.last_index(), Some(revision2.index_for(false, 0, 0)));
    }

    #[test]
    fn test_resume_slice_skips_finished_phases() {
        let dir = tempfile::tempdir().unwrap();
        let (_, repo) = fixture_repo(&dir);

        // Resume strictly after revision 2's first phase, as the upgrade
        // loop does after a finished forward audit.
        let revision2 = repo.revisions.get(2).unwrap();
        let slice = PhaseSlice {
            start: Some(revision2.index_for(true, 0, 0)),
            start_inclusive: false,
            ..PhaseSlice::default()
        };
        let steps = repo.revisions.get_phases(&slice);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].index, revision2.index_for(true, 1, 0));

        // A revert at the same index re-runs it as a forward step.
        let inclusive = PhaseSlice {
            start: Some(revision2.index_for(true, 0, 0)),
            start_inclusive: true,
            ..PhaseSlice::default()
        };
        assert_eq!(repo.revisions.get_phases(&inclusive).len(), 4);
    }

    #[test]
    fn test_first_index_from_skips_to_next_revision() {
        let dir = tempfile::tempdir().unwrap();
        let (_, repo) = fixture_repo(&dir);

        let revision2 = repo.revisions.get(2).unwrap();
        assert_eq!(repo.revisions.first_index_from(2), Some(revision2.index_for(true, 0, 0)));
        assert_eq!(repo.revisions.first_index_from(3), None);
    }
}
