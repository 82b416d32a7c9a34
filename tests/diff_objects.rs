#[cfg(test)]
mod tests {
    use pgshift::libs::catalog::{qualified, Catalog, Constraint, ConstraintKind, Domain, EnumType, Function, Index, Sequence, Trigger};
    use pgshift::libs::change::{Change, RunDdl};
    use pgshift::libs::diff::diff;
    use pgshift::libs::error::MigratorError;

    fn empty() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.schemas.insert("public".to_string());
        catalog
    }

    fn run_ddl(change: &Change) -> &RunDdl {
        match change {
            Change::RunDdl(ddl) => ddl,
            other => panic!("expected run_ddl, got {:?}", other),
        }
    }

    fn sample_enum(labels: &[&str]) -> EnumType {
        EnumType {
            schema: "public".to_string(),
            name: "order_state".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn test_enum_create_and_drop() {
        let mut new = empty();
        new.enums.insert(qualified("public", "order_state"), sample_enum(&["new", "paid"]));
        let (pre, post) = diff(&empty(), &new).unwrap();
        assert_eq!(run_ddl(&pre[0]).up, "CREATE TYPE public.order_state AS ENUM ('new', 'paid');");
        assert_eq!(run_ddl(&pre[0]).down, "DROP TYPE public.order_state;");
        assert!(post.is_empty());

        let (pre, post) = diff(&new, &empty()).unwrap();
        assert!(pre.is_empty());
        assert_eq!(run_ddl(&post[0]).up, "DROP TYPE public.order_state;");
    }

    #[test]
    fn test_enum_label_addition_is_forward_only() {
        let mut old = empty();
        old.enums.insert(qualified("public", "order_state"), sample_enum(&["new", "paid"]));
        let mut new = empty();
        new.enums
            .insert(qualified("public", "order_state"), sample_enum(&["new", "paid", "refunded"]));
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        let ddl = run_ddl(&pre[0]);
        assert_eq!(ddl.up, "ALTER TYPE public.order_state ADD VALUE 'refunded';");
        assert!(ddl.down.is_empty());
    }

    #[test]
    fn test_enum_label_removal_is_unsupported() {
        let mut old = empty();
        old.enums.insert(qualified("public", "order_state"), sample_enum(&["new", "paid"]));
        let mut new = empty();
        new.enums.insert(qualified("public", "order_state"), sample_enum(&["new"]));
        let err = diff(&old, &new).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigratorError>(),
            Some(MigratorError::DiffUnsupported(_))
        ));
    }

    #[test]
    fn test_domain_lifecycle() {
        let domain = Domain {
            schema: "public".to_string(),
            name: "email_address".to_string(),
            base_type: "text".to_string(),
            not_null: true,
            default: None,
        };
        let mut new = empty();
        new.domains.insert(qualified("public", "email_address"), domain.clone());
        let (pre, _) = diff(&empty(), &new).unwrap();
        assert_eq!(run_ddl(&pre[0]).up, "CREATE DOMAIN public.email_address AS text NOT NULL;");

        // Base type changes cannot be expressed as ALTER DOMAIN.
        let mut changed = empty();
        changed.domains.insert(
            qualified("public", "email_address"),
            Domain {
                base_type: "character varying(320)".to_string(),
                ..domain
            },
        );
        let err = diff(&new, &changed).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigratorError>(),
            Some(MigratorError::DiffUnsupported(_))
        ));
    }

    #[test]
    fn test_sequence_create_includes_explicit_attributes_only() {
        let mut new = empty();
        new.sequences.insert(
            qualified("public", "invoice_numbers"),
            Sequence {
                schema: "public".to_string(),
                name: "invoice_numbers".to_string(),
                data_type: "integer".to_string(),
                start: 1000,
                increment: 1,
                min_value: Some(1000),
                max_value: None,
                cycle: false,
            },
        );
        let (pre, _) = diff(&empty(), &new).unwrap();
        assert_eq!(
            run_ddl(&pre[0]).up,
            "CREATE SEQUENCE public.invoice_numbers AS integer MINVALUE 1000;"
        );
    }

    #[test]
    fn test_function_replaced_in_place() {
        let make = |body: &str| Function {
            schema: "public".to_string(),
            name: "touch_updated_at".to_string(),
            identity_args: String::new(),
            definition: format!(
                "CREATE OR REPLACE FUNCTION public.touch_updated_at()\n RETURNS trigger\n LANGUAGE plpgsql\nAS $function$ {} $function$",
                body
            ),
        };
        let mut old = empty();
        old.functions.insert("public.touch_updated_at()".to_string(), make("BEGIN RETURN NEW; END;"));
        let mut new = empty();
        new.functions.insert(
            "public.touch_updated_at()".to_string(),
            make("BEGIN NEW.updated_at = now(); RETURN NEW; END;"),
        );
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(post.is_empty());
        let ddl = run_ddl(&pre[0]);
        assert!(ddl.up.contains("NEW.updated_at = now()"));
        assert!(ddl.down.contains("BEGIN RETURN NEW; END;"));

        let (pre, post) = diff(&new, &empty()).unwrap();
        assert!(pre.is_empty());
        assert_eq!(
            run_ddl(&post[0]).up,
            "DROP FUNCTION public.touch_updated_at();"
        );
    }

    #[test]
    fn test_trigger_created_after_its_function() {
        let mut new = empty();
        new.functions.insert(
            "public.touch_updated_at()".to_string(),
            Function {
                schema: "public".to_string(),
                name: "touch_updated_at".to_string(),
                identity_args: String::new(),
                definition: "CREATE OR REPLACE FUNCTION public.touch_updated_at() RETURNS trigger LANGUAGE plpgsql AS $$ BEGIN RETURN NEW; END; $$".to_string(),
            },
        );
        new.triggers.insert(
            "public.users.users_touch".to_string(),
            Trigger {
                schema: "public".to_string(),
                table: "users".to_string(),
                name: "users_touch".to_string(),
                definition: "CREATE TRIGGER users_touch BEFORE UPDATE ON public.users FOR EACH ROW EXECUTE FUNCTION touch_updated_at()".to_string(),
            },
        );
        let (pre, _) = diff(&empty(), &new).unwrap();
        assert_eq!(pre.len(), 2);
        assert!(run_ddl(&pre[0]).up.starts_with("CREATE OR REPLACE FUNCTION"));
        assert!(run_ddl(&pre[1]).up.starts_with("CREATE TRIGGER users_touch"));
        assert_eq!(run_ddl(&pre[1]).down, "DROP TRIGGER users_touch ON public.users;");

        // Dropping reverses the order: trigger first, then the function.
        let (_, post) = diff(&new, &empty()).unwrap();
        assert!(run_ddl(&post[0]).up.starts_with("DROP TRIGGER"));
        assert!(run_ddl(&post[1]).up.starts_with("DROP FUNCTION"));
    }

    #[test]
    fn test_changed_index_rebuilds_in_post_deploy() {
        let make = |expr: &str| Index {
            schema: "public".to_string(),
            name: "users_email_idx".to_string(),
            table: "users".to_string(),
            unique: false,
            using: None,
            expr: expr.to_string(),
            predicate: None,
        };
        let mut old = empty();
        old.indexes.insert(qualified("public", "users_email_idx"), make("email"));
        let mut new = empty();
        new.indexes.insert(qualified("public", "users_email_idx"), make("lower(email)"));
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(pre.is_empty());
        // Old index drops first so the name is free for the rebuild.
        assert!(matches!(&post[0], Change::DropIndex(def) if def.expr == "email"));
        assert!(matches!(&post[1], Change::CreateIndex(def) if def.expr == "lower(email)"));
    }

    #[test]
    fn test_changed_constraint_replaced_in_post_deploy() {
        let make = |expr: &str| Constraint {
            schema: "public".to_string(),
            table: Some("users".to_string()),
            domain: None,
            name: "users_email_nonempty".to_string(),
            kind: ConstraintKind::Check { expr: expr.to_string() },
        };
        let mut old = empty();
        old.constraints.insert("public.users.users_email_nonempty".to_string(), make("((length(email) > 0))"));
        let mut new = empty();
        new.constraints.insert("public.users.users_email_nonempty".to_string(), make("((length(email) > 1))"));
        let (pre, post) = diff(&old, &new).unwrap();
        assert!(pre.is_empty());
        assert!(matches!(&post[0], Change::DropConstraint(def) if def.check.as_deref() == Some("((length(email) > 0))")));
        assert!(matches!(&post[1], Change::AddConstraint(def) if def.check.as_deref() == Some("((length(email) > 1))")));
    }

    #[test]
    fn test_non_public_index_is_unsupported() {
        let mut new = empty();
        new.schemas.insert("reporting".to_string());
        new.indexes.insert(
            qualified("reporting", "facts_day_idx"),
            Index {
                schema: "reporting".to_string(),
                name: "facts_day_idx".to_string(),
                table: "facts".to_string(),
                unique: false,
                using: None,
                expr: "day".to_string(),
                predicate: None,
            },
        );
        let err = diff(&empty(), &new).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigratorError>(),
            Some(MigratorError::DiffUnsupported(_))
        ));
    }

    #[test]
    fn test_foreign_key_constraint_keeps_actions() {
        let mut new = empty();
        new.constraints.insert(
            "public.orders.orders_user_fk".to_string(),
            Constraint {
                schema: "public".to_string(),
                table: Some("orders".to_string()),
                domain: None,
                name: "orders_user_fk".to_string(),
                kind: ConstraintKind::ForeignKey {
                    columns: "user_id".to_string(),
                    references: "users(u_id) ON DELETE CASCADE".to_string(),
                },
            },
        );
        let (pre, _) = diff(&empty(), &new).unwrap();
        match &pre[0] {
            Change::AddConstraint(def) => {
                assert_eq!(def.foreign_key.as_deref(), Some("user_id"));
                assert_eq!(def.references.as_deref(), Some("users(u_id) ON DELETE CASCADE"));
            }
            other => panic!("expected add_constraint, got {:?}", other),
        }
    }
}
