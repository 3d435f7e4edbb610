//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::{Datelike, Duration, Months, Utc};

    fn verified_user(db: &Database, email: &str, username: &str) -> i64 {
        let (id, token) = db
            .create_user(&NewUser {
                email: email.to_string(),
                username: username.to_string(),
                password: "secret1".to_string(),
                first_name: None,
                last_name: None,
            })
            .unwrap();
        db.verify_email(&token).unwrap();
        id
    }

    fn entry(kind: EntryKind, cents: i64, description: &str) -> NewTransaction {
        NewTransaction {
            kind,
            amount_cents: cents,
            category_id: None,
            description: description.to_string(),
            date: None,
        }
    }

    #[test]
    fn test_in_memory_db_seeds_default_categories() {
        let db = Database::in_memory().unwrap();
        let user_id = verified_user(&db, "seed@x.com", "seeder");

        let categories = db.list_categories(user_id).unwrap();
        assert_eq!(categories.len(), 10);
        assert!(categories.iter().all(|c| c.user_id.is_none()));
        assert!(categories
            .iter()
            .any(|c| c.name == "Salary" && c.kind == EntryKind::Income));
        assert!(categories
            .iter()
            .any(|c| c.name == "Groceries" && c.kind == EntryKind::Expense));
    }

    // ========== Users ==========

    #[test]
    fn test_registration_validation() {
        let db = Database::in_memory().unwrap();

        let bad_email = db.create_user(&NewUser {
            email: "not-an-email".to_string(),
            username: "alice".to_string(),
            password: "secret1".to_string(),
            first_name: None,
            last_name: None,
        });
        assert!(matches!(bad_email, Err(Error::Validation(_))));

        let short_password = db.create_user(&NewUser {
            email: "a@x.com".to_string(),
            username: "alice".to_string(),
            password: "short".to_string(),
            first_name: None,
            last_name: None,
        });
        assert!(matches!(short_password, Err(Error::Validation(_))));

        let short_username = db.create_user(&NewUser {
            email: "a@x.com".to_string(),
            username: "al".to_string(),
            password: "secret1".to_string(),
            first_name: None,
            last_name: None,
        });
        assert!(matches!(short_username, Err(Error::Validation(_))));
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let db = Database::in_memory().unwrap();
        verified_user(&db, "a@x.com", "alice");

        let dup = db.create_user(&NewUser {
            email: "a@x.com".to_string(),
            username: "alice2".to_string(),
            password: "secret1".to_string(),
            first_name: None,
            last_name: None,
        });
        assert!(matches!(dup, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_login_requires_verified_email() {
        let db = Database::in_memory().unwrap();
        let (_, token) = db
            .create_user(&NewUser {
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                password: "secret1".to_string(),
                first_name: None,
                last_name: None,
            })
            .unwrap();

        let before = db.authenticate("a@x.com", "secret1");
        match before {
            Err(Error::Authentication(msg)) => {
                assert_eq!(msg, "Please verify your email before logging in");
            }
            other => panic!("expected authentication error, got {:?}", other.map(|u| u.id)),
        }

        db.verify_email(&token).unwrap();
        let user = db.authenticate("a@x.com", "secret1").unwrap();
        assert!(user.email_verified);

        let wrong = db.authenticate("a@x.com", "wrong-password");
        assert!(matches!(wrong, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_profile_partial_update() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.update_profile(
            id,
            &ProfileUpdate {
                first_name: Some("Alice".to_string()),
                balance_alert: Some(-5_000),
                ..Default::default()
            },
        )
        .unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Alice"));
        assert_eq!(user.balance_alert_cents, Some(-5_000));
        assert!(user.last_name.is_none());

        let empty = db.update_profile(id, &ProfileUpdate::default());
        assert!(matches!(empty, Err(Error::Validation(_))));
    }

    #[test]
    fn test_password_reset_flow() {
        let db = Database::in_memory().unwrap();
        verified_user(&db, "a@x.com", "alice");

        // Unknown emails produce no token but no error either
        assert!(db.create_reset_token("nobody@x.com").unwrap().is_none());

        let token = db.create_reset_token("a@x.com").unwrap().unwrap();
        db.reset_password(&token, "newsecret").unwrap();
        db.authenticate("a@x.com", "newsecret").unwrap();

        // Tokens are single-use
        let reused = db.reset_password(&token, "again123");
        assert!(matches!(reused, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_email_change_upsert_overwrites_pending_code() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let first_code = db.request_email_change(id, "new1@x.com").unwrap();
        let second_code = db.request_email_change(id, "new2@x.com").unwrap();

        // The first code was replaced by the second request
        let stale = db.confirm_email_change(id, &first_code);
        assert!(matches!(stale, Err(Error::Authentication(_))));

        let new_email = db.confirm_email_change(id, &second_code).unwrap();
        assert_eq!(new_email, "new2@x.com");
        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.email, "new2@x.com");
    }

    #[test]
    fn test_soft_delete_hides_user_from_auth() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.soft_delete_user(id).unwrap();
        assert!(db.get_active_user(id).unwrap().is_none());
        // The row survives for audit purposes
        assert!(db.get_user(id).unwrap().is_some());

        let login = db.authenticate("a@x.com", "secret1");
        assert!(matches!(login, Err(Error::Authentication(_))));
    }

    // ========== Ledger ==========

    #[test]
    fn test_first_expense_yields_negative_balance() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let tx = db
            .record_transaction(id, &entry(EntryKind::Expense, 10_000, "Groceries"))
            .unwrap();
        assert_eq!(tx.balance_cents, -10_000);

        let summary = db.get_balance(id).unwrap();
        assert_eq!(summary.balance_cents, -10_000);
    }

    #[test]
    fn test_running_balance_sum_property() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let movements = [
            (EntryKind::Income, 250_000),
            (EntryKind::Expense, 42_150),
            (EntryKind::Expense, 999),
            (EntryKind::Income, 12_345),
            (EntryKind::Expense, 70_000),
        ];
        for (i, (kind, cents)) in movements.iter().enumerate() {
            db.record_transaction(id, &entry(*kind, *cents, &format!("movement {}", i)))
                .unwrap();
        }

        let expected: i64 = movements.iter().map(|(k, c)| k.sign() * c).sum();
        let summary = db.get_balance(id).unwrap();
        assert_eq!(summary.balance_cents, expected);
        assert_eq!(summary.total_income_cents, 250_000 + 12_345);
    }

    #[test]
    fn test_get_balance_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");
        db.record_transaction(id, &entry(EntryKind::Income, 50_000, "Pay"))
            .unwrap();

        let a = db.get_balance(id).unwrap();
        let b = db.get_balance(id).unwrap();
        assert_eq!(a.balance_cents, b.balance_cents);
        assert_eq!(a.total_income_cents, b.total_income_cents);
        assert_eq!(a.current_month_expense_cents, b.current_month_expense_cents);
        assert_eq!(a.expense_change_pct, b.expense_change_pct);
    }

    #[test]
    fn test_record_transaction_validation() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let zero = db.record_transaction(id, &entry(EntryKind::Income, 0, "zero"));
        assert!(matches!(zero, Err(Error::Validation(_))));

        let negative = db.record_transaction(id, &entry(EntryKind::Expense, -500, "negative"));
        assert!(matches!(negative, Err(Error::Validation(_))));

        let blank = db.record_transaction(id, &entry(EntryKind::Income, 100, "   "));
        assert!(matches!(blank, Err(Error::Validation(_))));
    }

    #[test]
    fn test_expense_change_percentage_policy() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        // No expenses at all: both months are zero
        let empty = db.get_balance(id).unwrap();
        assert_eq!(empty.expense_change_pct, 0.0);

        // Expenses this month but none last month: reported as +100%
        db.record_transaction(id, &entry(EntryKind::Expense, 5_000, "Lunch"))
            .unwrap();
        let summary = db.get_balance(id).unwrap();
        assert_eq!(summary.current_month_expense_cents, 5_000);
        assert_eq!(summary.previous_month_expense_cents, 0);
        assert_eq!(summary.expense_change_pct, 100.0);
    }

    #[test]
    fn test_recent_transactions_order_and_limit() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        for i in 0..5 {
            db.record_transaction(id, &entry(EntryKind::Income, 1_000 + i, &format!("e{}", i)))
                .unwrap();
        }

        let recent = db.recent_transactions(id, 3).unwrap();
        assert_eq!(recent.len(), 3);
        // Newest first
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
    }

    #[test]
    fn test_update_recomputes_later_snapshots() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.record_transaction(id, &entry(EntryKind::Income, 100_000, "Pay"))
            .unwrap();
        let mid = db
            .record_transaction(id, &entry(EntryKind::Expense, 20_000, "Rent"))
            .unwrap();
        db.record_transaction(id, &entry(EntryKind::Expense, 10_000, "Food"))
            .unwrap();

        db.update_transaction(
            mid.id,
            id,
            &TransactionUpdate {
                amount_cents: Some(50_000),
                ..Default::default()
            },
        )
        .unwrap();

        // Scan the full ledger oldest-first and re-derive every snapshot
        let mut entries = db.recent_transactions(id, 100).unwrap();
        entries.reverse();
        let mut running = 0i64;
        for tx in &entries {
            running += tx.kind.sign() * tx.amount_cents;
            assert_eq!(tx.balance_cents, running, "snapshot drift at tx {}", tx.id);
        }
        assert_eq!(running, 100_000 - 50_000 - 10_000);
    }

    #[test]
    fn test_delete_recomputes_later_snapshots() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.record_transaction(id, &entry(EntryKind::Income, 100_000, "Pay"))
            .unwrap();
        let mid = db
            .record_transaction(id, &entry(EntryKind::Expense, 20_000, "Rent"))
            .unwrap();
        db.record_transaction(id, &entry(EntryKind::Expense, 10_000, "Food"))
            .unwrap();

        db.delete_transaction(mid.id, id).unwrap();

        let entries = db.recent_transactions(id, 100).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].balance_cents, 90_000);

        let gone = db.delete_transaction(mid.id, id);
        assert!(matches!(gone, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_backdated_insert_repairs_snapshots() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");
        let today = Utc::now().date_naive();

        db.record_transaction(
            id,
            &NewTransaction {
                date: Some(today),
                ..entry(EntryKind::Income, 100_000, "Pay")
            },
        )
        .unwrap();

        // Lands before the existing entry in ledger order
        db.record_transaction(
            id,
            &NewTransaction {
                date: Some(today - Duration::days(10)),
                ..entry(EntryKind::Expense, 30_000, "Old bill")
            },
        )
        .unwrap();

        let mut entries = db.recent_transactions(id, 100).unwrap();
        entries.reverse();
        assert_eq!(entries[0].balance_cents, -30_000);
        assert_eq!(entries[1].balance_cents, 70_000);
    }

    #[test]
    fn test_ledger_is_owner_scoped() {
        let db = Database::in_memory().unwrap();
        let alice = verified_user(&db, "a@x.com", "alice");
        let bob = verified_user(&db, "b@x.com", "bobby");

        let tx = db
            .record_transaction(alice, &entry(EntryKind::Income, 1_000, "Pay"))
            .unwrap();

        assert!(db.get_transaction(tx.id, bob).unwrap().is_none());
        assert!(matches!(
            db.delete_transaction(tx.id, bob),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.update_transaction(
                tx.id,
                bob,
                &TransactionUpdate {
                    description: Some("mine now".to_string()),
                    ..Default::default()
                }
            ),
            Err(Error::NotFound(_))
        ));
        assert!(db.recent_transactions(bob, 10).unwrap().is_empty());
    }

    #[test]
    fn test_income_expense_views_filter_by_kind() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.record_transaction(id, &entry(EntryKind::Income, 1_000, "Pay"))
            .unwrap();
        let exp = db
            .record_transaction(id, &entry(EntryKind::Expense, 500, "Coffee"))
            .unwrap();

        let incomes = db
            .list_transactions(id, Some(EntryKind::Income), 50)
            .unwrap();
        assert_eq!(incomes.len(), 1);
        assert_eq!(db.kind_total(id, EntryKind::Expense).unwrap(), 500);

        // An expense id cannot be deleted through the income view
        let wrong_kind = db.delete_transaction_of_kind(exp.id, id, EntryKind::Income);
        assert!(matches!(wrong_kind, Err(Error::NotFound(_))));
        db.delete_transaction_of_kind(exp.id, id, EntryKind::Expense)
            .unwrap();
    }

    // ========== Categories ==========

    #[test]
    fn test_category_crud_and_default_protection() {
        let db = Database::in_memory().unwrap();
        let alice = verified_user(&db, "a@x.com", "alice");
        let bob = verified_user(&db, "b@x.com", "bobby");

        let custom = db
            .create_category(alice, "Pets", EntryKind::Expense)
            .unwrap();
        assert_eq!(custom.user_id, Some(alice));

        // Bob cannot see or delete Alice's category
        assert!(!db
            .list_categories(bob)
            .unwrap()
            .iter()
            .any(|c| c.id == custom.id));
        assert!(matches!(
            db.delete_category(custom.id, bob),
            Err(Error::NotFound(_))
        ));

        // Defaults cannot be deleted by anyone
        let default = db
            .list_categories(alice)
            .unwrap()
            .into_iter()
            .find(|c| c.user_id.is_none())
            .unwrap();
        assert!(matches!(
            db.delete_category(default.id, alice),
            Err(Error::NotFound(_))
        ));

        db.delete_category(custom.id, alice).unwrap();
    }

    #[test]
    fn test_failed_default_category_delete_leaves_references() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let groceries = db
            .list_categories(id)
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Groceries")
            .unwrap();
        let recorded = db
            .record_transaction(
                id,
                &NewTransaction {
                    category_id: Some(groceries.id),
                    ..entry(EntryKind::Expense, 2_500, "Weekly shop")
                },
            )
            .unwrap();

        assert!(matches!(
            db.delete_category(groceries.id, id),
            Err(Error::NotFound(_))
        ));

        // The rejected delete must not have touched the ledger row
        let after = db.get_transaction(recorded.id, id).unwrap().unwrap();
        assert_eq!(after.category_id, Some(groceries.id));
    }

    #[test]
    fn test_category_kind_must_match_entry_kind() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let salary = db
            .list_categories(id)
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Salary")
            .unwrap();

        let mismatched = db.record_transaction(
            id,
            &NewTransaction {
                category_id: Some(salary.id),
                ..entry(EntryKind::Expense, 1_000, "Oops")
            },
        );
        assert!(matches!(mismatched, Err(Error::Validation(_))));
    }

    // ========== Goals ==========

    #[test]
    fn test_goal_roundtrip() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");
        let target = Utc::now().date_naive() + Duration::days(30);

        db.create_goal(
            id,
            &NewGoal {
                target_cents: 500_000,
                description: "Emergency Fund".to_string(),
                target_date: Some(target),
            },
        )
        .unwrap();

        let goals = db.list_goals(id).unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].target_cents, 500_000);
        assert_eq!(goals[0].description, "Emergency Fund");
        assert_eq!(goals[0].target_date, target);
        assert!(!goals[0].is_completed);
        assert!(goals[0].completed_at.is_none());
    }

    #[test]
    fn test_goal_default_target_date_is_thirty_days_out() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let goal = db
            .create_goal(
                id,
                &NewGoal {
                    target_cents: 10_000,
                    description: "Bike".to_string(),
                    target_date: None,
                },
            )
            .unwrap();
        assert_eq!(goal.target_date, Utc::now().date_naive() + Duration::days(30));
    }

    #[test]
    fn test_primary_goal_is_latest_incomplete() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let first = db
            .create_goal(
                id,
                &NewGoal {
                    target_cents: 10_000,
                    description: "First".to_string(),
                    target_date: None,
                },
            )
            .unwrap();
        let second = db
            .create_goal(
                id,
                &NewGoal {
                    target_cents: 20_000,
                    description: "Second".to_string(),
                    target_date: None,
                },
            )
            .unwrap();

        assert_eq!(db.primary_goal(id).unwrap().unwrap().id, second.id);

        let completed = db.complete_goal(second.id, id).unwrap();
        assert!(completed.is_completed);
        assert!(completed.completed_at.is_some());

        // Falls back to the older incomplete goal
        assert_eq!(db.primary_goal(id).unwrap().unwrap().id, first.id);

        let again = db.complete_goal(second.id, id);
        assert!(matches!(again, Err(Error::NotFound(_))));
    }

    // ========== Subscriptions & features ==========

    #[test]
    fn test_subscription_lazily_created_as_free() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let sub = db.get_or_create_subscription(id).unwrap();
        assert_eq!(sub.tier, Tier::Free);
        assert!(sub.active);
        assert!(sub.ends_at.is_none());

        // Subsequent calls return the same row
        let again = db.get_or_create_subscription(id).unwrap();
        assert_eq!(again.id, sub.id);
    }

    #[test]
    fn test_feature_access_by_tier() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        // No subscription row yet: lazily created free, then consistent
        assert!(!db.has_feature_access(id, "advanced_analytics").unwrap());
        assert!(db.has_feature_access(id, "basic_tracking").unwrap());
        assert!(!db.has_feature_access(id, "advanced_analytics").unwrap());

        db.set_subscription_tier(id, "pro").unwrap();
        assert!(db.has_feature_access(id, "advanced_analytics").unwrap());
        assert!(db.has_feature_access(id, "budget_goals").unwrap());

        let sub = db.get_or_create_subscription(id).unwrap();
        assert_eq!(sub.tier, Tier::Pro);
        assert!(sub.ends_at.is_some());

        let invalid = db.set_subscription_tier(id, "platinum");
        assert!(matches!(invalid, Err(Error::Validation(_))));
    }

    #[test]
    fn test_require_feature_access_names_the_feature() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let denied = db.require_feature_access(id, "advanced_analytics");
        assert!(matches!(
            denied,
            Err(Error::Authorization { feature }) if feature == "advanced_analytics"
        ));

        db.set_subscription_tier(id, "pro").unwrap();
        db.require_feature_access(id, "advanced_analytics").unwrap();
    }

    // ========== Payments ==========

    fn completed_order(cents: i64) -> PaymentOrder {
        PaymentOrder {
            external_id: "ORDER-123".to_string(),
            status: "COMPLETED".to_string(),
            amount_cents: cents,
            method: "paypal".to_string(),
            metadata: serde_json::json!({"id": "ORDER-123"}),
        }
    }

    #[test]
    fn test_payment_upgrade_for_existing_user() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let (resolved, payment, sub) = db
            .apply_payment(Some(id), &completed_order(999), None)
            .unwrap();
        assert_eq!(resolved, id);
        assert_eq!(payment.amount_cents, 999);
        assert_eq!(sub.tier, Tier::Pro);
        assert_eq!(db.list_payments(id).unwrap().len(), 1);
    }

    #[test]
    fn test_payment_creates_account_inline() {
        let db = Database::in_memory().unwrap();

        let registration = NewUser {
            email: "new@x.com".to_string(),
            username: "newbie".to_string(),
            password: "secret1".to_string(),
            first_name: None,
            last_name: None,
        };
        let (user_id, _, sub) = db
            .apply_payment(None, &completed_order(999), Some(&registration))
            .unwrap();

        assert_eq!(sub.tier, Tier::Pro);
        let user = db.get_user(user_id).unwrap().unwrap();
        assert_eq!(user.email, "new@x.com");
        // Inline-created accounts still need email verification
        assert!(!user.email_verified);
    }

    #[test]
    fn test_incomplete_payment_writes_nothing() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        let order = PaymentOrder {
            status: "PENDING".to_string(),
            ..completed_order(999)
        };
        let result = db.apply_payment(Some(id), &order, None);
        match result {
            Err(Error::PaymentVerification { status }) => assert_eq!(status, "PENDING"),
            other => panic!("expected payment verification error, got {:?}", other.is_ok()),
        }

        assert_eq!(db.count_payments().unwrap(), 0);
        assert_eq!(db.get_or_create_subscription(id).unwrap().tier, Tier::Free);
    }

    #[test]
    fn test_failed_inline_registration_rolls_back_payment() {
        let db = Database::in_memory().unwrap();

        let bad_registration = NewUser {
            email: "not-an-email".to_string(),
            username: "newbie".to_string(),
            password: "secret1".to_string(),
            first_name: None,
            last_name: None,
        };
        let result = db.apply_payment(None, &completed_order(999), Some(&bad_registration));
        assert!(matches!(result, Err(Error::Validation(_))));

        assert_eq!(db.count_payments().unwrap(), 0);
        assert_eq!(db.count_active_users().unwrap(), 0);
    }

    // ========== Analytics ==========

    #[test]
    fn test_basic_summary_totals() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.record_transaction(id, &entry(EntryKind::Income, 300_000, "Pay"))
            .unwrap();
        db.record_transaction(id, &entry(EntryKind::Expense, 120_000, "Rent"))
            .unwrap();

        let summary = db.basic_summary(id).unwrap();
        assert_eq!(summary.income_cents, 300_000);
        assert_eq!(summary.expense_cents, 120_000);
        assert_eq!(summary.net_cents, 180_000);
    }

    #[test]
    fn test_monthly_rollup_ratio_is_null_safe() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.record_transaction(id, &entry(EntryKind::Expense, 10_000, "Rent"))
            .unwrap();

        let rollup = db.monthly_rollup(id, 6).unwrap();
        assert_eq!(rollup.len(), 6);

        let current = rollup.last().unwrap();
        assert_eq!(current.month, Utc::now().date_naive().format("%Y-%m").to_string());
        assert_eq!(current.expense_cents, 10_000);
        // No income this month, so no ratio
        assert!(current.expense_ratio_pct.is_none());

        db.record_transaction(id, &entry(EntryKind::Income, 20_000, "Pay"))
            .unwrap();
        let rollup = db.monthly_rollup(id, 6).unwrap();
        let current = rollup.last().unwrap();
        assert_eq!(current.expense_ratio_pct, Some(50.0));
    }

    #[test]
    fn test_monthly_rollup_covers_oldest_month_in_full() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        // First day of the oldest month in a two-month window
        let oldest_start = Utc::now()
            .date_naive()
            .checked_sub_months(Months::new(1))
            .unwrap()
            .with_day0(0)
            .unwrap();
        db.record_transaction(
            id,
            &NewTransaction {
                date: Some(oldest_start),
                ..entry(EntryKind::Expense, 4_200, "Rent")
            },
        )
        .unwrap();

        let rollup = db.monthly_rollup(id, 2).unwrap();
        assert_eq!(rollup.len(), 2);
        assert_eq!(rollup[0].month, oldest_start.format("%Y-%m").to_string());
        assert_eq!(rollup[0].expense_cents, 4_200);
    }

    #[test]
    fn test_category_breakdown_percentages() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");
        let groceries = db
            .list_categories(id)
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Groceries")
            .unwrap();

        db.record_transaction(
            id,
            &NewTransaction {
                category_id: Some(groceries.id),
                ..entry(EntryKind::Expense, 7_500, "Food")
            },
        )
        .unwrap();
        db.record_transaction(id, &entry(EntryKind::Expense, 2_500, "Misc"))
            .unwrap();

        let today = Utc::now().date_naive();
        let breakdown = db
            .category_breakdown(id, today - Duration::days(30), today)
            .unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].category, "Groceries");
        assert_eq!(breakdown[0].percentage, 75.0);
        assert_eq!(breakdown[1].category, "Uncategorized");
        assert_eq!(breakdown[1].percentage, 25.0);
    }

    #[test]
    fn test_export_rows_oldest_first_with_report_tags() {
        let db = Database::in_memory().unwrap();
        let id = verified_user(&db, "a@x.com", "alice");

        db.record_transaction(id, &entry(EntryKind::Income, 1_000, "Pay"))
            .unwrap();
        db.record_transaction(id, &entry(EntryKind::Expense, 400, "Coffee"))
            .unwrap();

        let rows = db.export_rows(id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].report, "income_report");
        assert_eq!(rows[1].report, "expense_report");
        assert_eq!(rows[1].balance_cents, 600);

        let csv = db.export_transactions_csv(id).unwrap();
        assert!(csv.starts_with("report,id,date,kind,amount"));
        assert_eq!(csv.lines().count(), 3);
    }
}
