//! User and group management.

mod common;

use common::TestLedger;
use splitledger::{error::EntityKind, LedgerError};

#[tokio::test]
async fn test_create_and_find_users() {
    let ledger = TestLedger::new().await;
    let ctl = ledger.ctl();

    let alice = ctl.create_user("alice", " alice@example.com ").await.unwrap();
    assert_eq!(alice.email, "alice@example.com");
    assert_eq!(ctl.get_user(alice.id).await.unwrap(), alice);
    assert_eq!(
        ctl.get_user_by_email("alice@example.com").await.unwrap(),
        Some(alice.clone())
    );
    assert!(ctl.get_user_by_email("nobody@example.com").await.unwrap().is_none());

    let err = ctl.create_user("alice2", "alice@example.com").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
    assert!(matches!(
        ctl.create_user("al", "al@example.com").await.unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
    assert!(matches!(
        ctl.create_user("albert", "not-an-email").await.unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
}

#[tokio::test]
async fn test_duplicate_email_insert_is_a_unique_violation() {
    let ledger = TestLedger::new().await;
    ledger.db.insert_user("alice", "alice@example.com").await.unwrap();

    let err = ledger
        .db
        .insert_user("alice2", "alice@example.com")
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_concurrent_duplicate_emails_register_once() {
    let ledger = TestLedger::new().await;
    let ctl = ledger.ctl();

    let (first, second) = tokio::join!(
        ctl.create_user("alice", "alice@example.com"),
        ctl.create_user("alicia", "alice@example.com"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|res| res.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|res| matches!(res, Err(LedgerError::InvalidInput(_)))));
    assert_eq!(ctl.list_users(0, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_users_pages() {
    let ledger = TestLedger::new().await;
    for name in ["alice", "bob", "carol", "dave"] {
        ledger.user(name).await;
    }
    let ctl = ledger.ctl();

    let all = ctl.list_users(0, None).await.unwrap();
    assert_eq!(all.len(), 4);
    let page = ctl.list_users(1, Some(2)).await.unwrap();
    let names: Vec<&str> = page.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["bob", "carol"]);
}

#[tokio::test]
async fn test_create_group_validates_members() {
    let ledger = TestLedger::new().await;
    let ctl = ledger.ctl();
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;

    let group = ctl
        .create_group("Trip", &[bob.id, alice.id, bob.id])
        .await
        .unwrap();
    assert_eq!(group.member_count, 2);

    let err = ctl.create_group("Ghosts", &[alice.id, 99]).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::EntityNotFound { entity: EntityKind::User, id: 99 }
    ));
    assert!(matches!(
        ctl.create_group("   ", &[alice.id]).await.unwrap_err(),
        LedgerError::InvalidInput(_)
    ));

    let groups = ctl.list_groups().await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Trip");
    assert_eq!(groups[0].member_count, 2);

    let alice_groups = ctl.get_user_groups(alice.id).await.unwrap();
    assert_eq!(alice_groups.len(), 1);
    assert_eq!(alice_groups[0].id, group.id);
}

#[tokio::test]
async fn test_add_member_requires_existing_records() {
    let ledger = TestLedger::new().await;
    let ctl = ledger.ctl();
    let alice = ledger.user("alice").await;
    let group = ctl.create_group("Trip", &[]).await.unwrap();
    assert_eq!(group.member_count, 0);

    assert!(matches!(
        ctl.add_member(group.id, 55).await.unwrap_err(),
        LedgerError::EntityNotFound { entity: EntityKind::User, id: 55 }
    ));
    assert!(matches!(
        ctl.add_member(66, alice.id).await.unwrap_err(),
        LedgerError::EntityNotFound { entity: EntityKind::Group, id: 66 }
    ));

    assert!(ctl.add_member(group.id, alice.id).await.unwrap());
    let details = ctl.group_details(group.id).await.unwrap();
    assert_eq!(details.users, vec![alice]);
    assert_eq!(details.total_expenses, rust_decimal::Decimal::ZERO);
}
