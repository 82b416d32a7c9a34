#[cfg(test)]
mod tests {
    use pgshift::libs::catalog::{
        qualified, Catalog, Column, Constraint, ConstraintKind, Index, KeyConstraint, Sequence, Table, View,
    };
    use pgshift::libs::change::{Change, RunDdl};
    use pgshift::libs::diff::diff;
    use pgshift::libs::error::MigratorError;

    fn column(name: &str, type_name: &str, not_null: bool) -> Column {
        Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
            not_null,
            default: None,
            comment: None,
            former_name: None,
        }
    }

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            schema: "public".to_string(),
            name: name.to_string(),
            columns,
            keys: Vec::new(),
            former_name: None,
        }
    }

    fn catalog_with_tables(tables: Vec<Table>) -> Catalog {
        let mut catalog = Catalog::default();
        catalog.schemas.insert("public".to_string());
        for table in tables {
            catalog.tables.insert(table.qualified_name(), table);
        }
        catalog
    }

    fn users_v1() -> Table {
        table(
            "users",
            vec![
                column("u_id", "integer", false),
                column("email", "text", true),
                column("mobile", "text", false),
            ],
        )
    }

    fn run_ddl(change: &Change) -> &RunDdl {
        match change {
            Change::RunDdl(ddl) => ddl,
            other => panic!("expected run_ddl, got {:?}", other),
        }
    }

    #[test]
    fn test_identical_catalogs_diff_to_nothing() {
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![users_v1()]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(pre.is_empty());
        assert!(post.is_empty());
    }

    #[test]
    fn test_new_table_created_pre_deploy() {
        let old = catalog_with_tables(vec![]);
        let new = catalog_with_tables(vec![users_v1()]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        assert_eq!(pre.len(), 1);
        let ddl = run_ddl(&pre[0]);
        assert!(ddl.up.starts_with("CREATE TABLE public.users ("));
        assert!(ddl.up.contains("email text NOT NULL"));
        assert_eq!(ddl.down, "DROP TABLE public.users;");
    }

    #[test]
    fn test_dropped_table_goes_post_deploy() {
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(pre.is_empty());
        assert_eq!(post.len(), 1);
        let ddl = run_ddl(&post[0]);
        assert_eq!(ddl.up, "DROP TABLE public.users;");
        assert!(ddl.down.starts_with("CREATE TABLE public.users ("));
    }

    #[test]
    fn test_added_column_expands_pre_deploy() {
        let mut with_name = users_v1();
        with_name.columns.push(column("name", "text", false));
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![with_name]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        assert_eq!(pre.len(), 1);
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "ALTER TABLE public.users ADD COLUMN name text;");
        assert_eq!(ddl.down, "ALTER TABLE public.users DROP COLUMN name;");
    }

    #[test]
    fn test_dropped_column_contracts_post_deploy() {
        let mut without_email = users_v1();
        without_email.columns.retain(|c| c.name != "email");
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![without_email]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(pre.is_empty());
        assert_eq!(post.len(), 1);
        let ddl = run_ddl(&post[0]);
        assert_eq!(ddl.up, "ALTER TABLE public.users DROP COLUMN email;");
        assert_eq!(ddl.down, "ALTER TABLE public.users ADD COLUMN email text NOT NULL;");
    }

    #[test]
    fn test_column_type_change_is_pre_deploy() {
        let mut widened = users_v1();
        widened.columns[0].type_name = "bigint".to_string();
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![widened]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "ALTER TABLE public.users ALTER COLUMN u_id TYPE bigint;");
        assert_eq!(ddl.down, "ALTER TABLE public.users ALTER COLUMN u_id TYPE integer;");
    }

    #[test]
    fn test_new_index_is_typed_create_index() {
        let old = catalog_with_tables(vec![users_v1()]);
        let mut new = catalog_with_tables(vec![users_v1()]);
        new.indexes.insert(
            qualified("public", "users_email_idx"),
            Index {
                schema: "public".to_string(),
                name: "users_email_idx".to_string(),
                table: "users".to_string(),
                unique: false,
                using: None,
                expr: "email".to_string(),
                predicate: None,
            },
        );
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        assert_eq!(pre.len(), 1);
        match &pre[0] {
            Change::CreateIndex(def) => {
                assert_eq!(def.name, "users_email_idx");
                assert_eq!(def.table, "users");
                assert_eq!(def.expr, "email");
                assert!(!def.unique);
            }
            other => panic!("expected create_index, got {:?}", other),
        }
    }

    #[test]
    fn test_new_check_constraint_is_typed_two_phase() {
        let old = catalog_with_tables(vec![users_v1()]);
        let mut new = catalog_with_tables(vec![users_v1()]);
        new.constraints.insert(
            "public.users.users_email_nonempty".to_string(),
            Constraint {
                schema: "public".to_string(),
                table: Some("users".to_string()),
                domain: None,
                name: "users_email_nonempty".to_string(),
                kind: ConstraintKind::Check {
                    expr: "((length(email) > 0))".to_string(),
                },
            },
        );
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        match &pre[0] {
            Change::AddConstraint(def) => {
                assert_eq!(def.table.as_deref(), Some("users"));
                assert_eq!(def.check.as_deref(), Some("((length(email) > 0))"));
                assert_eq!(pre[0].phases().len(), 2);
            }
            other => panic!("expected add_constraint, got {:?}", other),
        }
    }

    #[test]
    fn test_post_deploy_drops_dependents_first() {
        let mut old = catalog_with_tables(vec![users_v1()]);
        old.constraints.insert(
            "public.users.users_email_nonempty".to_string(),
            Constraint {
                schema: "public".to_string(),
                table: Some("users".to_string()),
                domain: None,
                name: "users_email_nonempty".to_string(),
                kind: ConstraintKind::Check {
                    expr: "((length(email) > 0))".to_string(),
                },
            },
        );
        old.indexes.insert(
            qualified("public", "users_email_idx"),
            Index {
                schema: "public".to_string(),
                name: "users_email_idx".to_string(),
                table: "users".to_string(),
                unique: false,
                using: None,
                expr: "email".to_string(),
                predicate: None,
            },
        );
        let new = catalog_with_tables(vec![]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(pre.is_empty());
        assert_eq!(post.len(), 3);
        assert!(matches!(&post[0], Change::DropConstraint(_)));
        assert!(matches!(&post[1], Change::DropIndex(_)));
        assert_eq!(run_ddl(&post[2]).up, "DROP TABLE public.users;");
    }

    #[test]
    fn test_former_table_name_suppresses_drop() {
        let mut renamed = users_v1();
        renamed.name = "accounts".to_string();
        renamed.former_name = Some("users".to_string());
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![renamed]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        assert_eq!(pre.len(), 1);
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "ALTER TABLE public.users RENAME TO accounts;");
        assert_eq!(ddl.down, "ALTER TABLE public.accounts RENAME TO users;");
    }

    #[test]
    fn test_former_column_name_suppresses_add_and_drop() {
        let mut renamed = users_v1();
        renamed.columns[0].name = "user_id".to_string();
        renamed.columns[0].former_name = Some("u_id".to_string());
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![renamed]);
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        assert_eq!(pre.len(), 1);
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "ALTER TABLE public.users RENAME COLUMN u_id TO user_id;");
        assert_eq!(ddl.down, "ALTER TABLE public.users RENAME COLUMN user_id TO u_id;");
    }

    #[test]
    fn test_sequence_alter_only_emits_changed_attributes() {
        let sequence = Sequence {
            schema: "public".to_string(),
            name: "order_numbers".to_string(),
            data_type: "bigint".to_string(),
            start: 1,
            increment: 1,
            min_value: None,
            max_value: None,
            cycle: false,
        };
        let mut old = Catalog::default();
        old.schemas.insert("public".to_string());
        old.sequences.insert(qualified("public", "order_numbers"), sequence.clone());
        let mut new = old.clone();
        new.sequences.get_mut("public.order_numbers").unwrap().increment = 10;

        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "ALTER SEQUENCE public.order_numbers INCREMENT BY 10;");
        assert_eq!(ddl.down, "ALTER SEQUENCE public.order_numbers INCREMENT BY 1;");
    }

    #[test]
    fn test_view_body_replaced_pre_deploy() {
        let mut old = catalog_with_tables(vec![users_v1()]);
        old.views.insert(
            qualified("public", "active_users"),
            View {
                schema: "public".to_string(),
                name: "active_users".to_string(),
                definition: "SELECT u_id FROM users;".to_string(),
            },
        );
        let mut new = catalog_with_tables(vec![users_v1()]);
        new.views.insert(
            qualified("public", "active_users"),
            View {
                schema: "public".to_string(),
                name: "active_users".to_string(),
                definition: "SELECT u_id, email FROM users;".to_string(),
            },
        );
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "CREATE OR REPLACE VIEW public.active_users AS SELECT u_id, email FROM users;");
        assert_eq!(ddl.down, "CREATE OR REPLACE VIEW public.active_users AS SELECT u_id FROM users;");
    }

    #[test]
    fn test_key_change_is_unsupported() {
        let mut keyed = users_v1();
        keyed.keys.push(KeyConstraint {
            name: "users_pkey".to_string(),
            definition: "PRIMARY KEY (u_id)".to_string(),
        });
        let old = catalog_with_tables(vec![users_v1()]);
        let new = catalog_with_tables(vec![keyed]);
        let err = diff(&old, &new).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigratorError>(),
            Some(MigratorError::DiffUnsupported(_))
        ));
    }

    #[test]
    fn test_new_schema_created_before_its_tables() {
        let mut new = catalog_with_tables(vec![users_v1()]);
        new.schemas.insert("reporting".to_string());
        let old = catalog_with_tables(vec![]);
        let (pre, _) = diff(&old, &new).unwrap();
        assert_eq!(run_ddl(&pre[0]).up, "CREATE SCHEMA reporting;");
        assert!(run_ddl(&pre[1]).up.starts_with("CREATE TABLE public.users"));
    }
}
