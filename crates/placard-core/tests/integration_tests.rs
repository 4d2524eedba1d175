//! Placard Core Integration Tests

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use placard_core::{
    Error,
    application::Services,
    config::Config,
    domain::actor::{Actor, Role},
    domain::directory::User,
    domain::history::{EntityType, HistoryAction},
    domain::notification::MemoryNotificationSink,
    domain::session::{
        DayStatus, NewDay, NewSession, Session, SessionStatus, SessionUpdate, SlotIndex,
        aggregate_status,
    },
    storage::{Database, DatabaseConfig},
};
use tempfile::TempDir;
use uuid::Uuid;

struct World {
    _db: Database,
    _dir: Option<TempDir>,
    services: Services,
    sink: Arc<MemoryNotificationSink>,
    admin: Actor,
    manager: Actor,
    creator: Actor,
    inspectors: Vec<Actor>,
    driver: Uuid,
}

async fn world() -> World {
    let db = Database::in_memory()
        .await
        .expect("Failed to create test database");
    world_on(db, None).await
}

/// A WAL file database with a real connection pool, so writers contend
async fn file_world() -> World {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig::with_path(dir.path().join("placard.db")).max_connections(8);
    let db = Database::new(config)
        .await
        .expect("Failed to create file database");
    world_on(db, Some(dir)).await
}

async fn world_on(db: Database, dir: Option<TempDir>) -> World {
    let sink = Arc::new(MemoryNotificationSink::new());
    let services = Services::with_sink(&db, Config::default(), sink.clone());

    let admin = User::new("Root", Role::Admin, None);
    let manager = User::new("Maria", Role::Manager, Some("control".to_string()));
    let creator = User::new("Nina", Role::Staff, Some("notices".to_string()));
    let driver = User::new("Dario", Role::Staff, Some("dispatch".to_string()));
    for user in [&admin, &manager, &creator, &driver] {
        services.directory.add_user(user).await.unwrap();
    }

    let mut inspectors = Vec::new();
    for name in ["Ana", "Bruno", "Carla", "Davi", "Eva"] {
        let user = User::new(name, Role::Inspector, Some("control".to_string()));
        services.directory.add_user(&user).await.unwrap();
        inspectors.push(user.actor());
    }

    World {
        _db: db,
        _dir: dir,
        services,
        sink,
        admin: admin.actor(),
        manager: manager.actor(),
        creator: creator.actor(),
        inspectors,
        driver: driver.id,
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn spec(days: u32) -> NewSession {
    NewSession::new(
        "2026-03",
        (1..=days).map(|i| NewDay::new(date(9 + i), i, 20)).collect(),
    )
    .with_description("March notices")
}

/// The cached status must always equal the aggregation of the stored days
async fn assert_consistent(world: &World, session_id: Uuid) -> Session {
    let session = world.services.sessions.get(session_id).await.unwrap();
    let statuses: Vec<DayStatus> = session.days.iter().map(|d| d.status()).collect();
    assert_eq!(session.status, aggregate_status(&statuses));
    for day in &session.days {
        let occupants = day.slots().inspector_ids();
        assert!(occupants.len() <= 2);
        if occupants.len() == 2 {
            assert_ne!(occupants[0], occupants[1]);
        }
        match day.status() {
            DayStatus::Open => assert!(!day.slots().is_full()),
            _ => assert!(day.slots().is_full()),
        }
    }
    session
}

// ========== Scenarios ==========

#[tokio::test]
async fn test_full_session_lifecycle() {
    let w = world().await;
    let [a, b, c, d, ..] = &w.inspectors[..] else {
        panic!("need four inspectors");
    };

    // 1. Create: draft with open days, pool and supervisors notified
    let session = w.services.sessions.create(&w.creator, spec(2)).await.unwrap();
    assert_eq!(session.status, SessionStatus::Draft);
    assert_eq!(session.days.len(), 2);
    let created = w.sink.deliveries_of("session_created");
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|n| !n.recipients.contains(&w.creator.id)));
    assert_eq!(created[0].recipients.len(), 6);

    let day1 = session.days[0].id;
    let day2 = session.days[1].id;

    // 2. Claim day 1 to assigned
    let first = w.services.marketplace.claim(day1, a).await.unwrap();
    assert_eq!(first.day.status(), DayStatus::Open);
    let second = w.services.marketplace.claim(day1, b).await.unwrap();
    assert_eq!(second.day.status(), DayStatus::Assigned);
    assert_eq!(second.status.current, SessionStatus::Draft);
    assert_eq!(w.sink.deliveries_of("day_fully_assigned").len(), 2);
    assert_consistent(&w, session.id).await;

    // 3. Every day assigned: ready
    w.services.marketplace.claim(day2, c).await.unwrap();
    let applied = w.services.marketplace.claim(day2, d).await.unwrap();
    assert_eq!(applied.status.current, SessionStatus::Ready);
    assert!(applied.status.changed());
    assert_consistent(&w, session.id).await;

    // Claimable list still shows assigned days of a ready session
    let available = w.services.marketplace.list_available(date(10)).await.unwrap();
    assert_eq!(available.len(), 2);

    // 4. Daily transition on day 1's date
    w.services
        .directory
        .add_schedule_assignment(w.driver, date(10))
        .await
        .unwrap();
    let report = w.services.job.run(date(10)).await.unwrap();
    assert_eq!(report.promoted, vec![day1]);
    assert!(report.is_clean());

    let session_now = assert_consistent(&w, session.id).await;
    assert_eq!(session_now.status, SessionStatus::InProgress);
    let execution = w.sink.deliveries_of("execution_day");
    assert_eq!(execution.len(), 1);
    assert_eq!(execution[0].recipients, vec![a.id, b.id]);
    let dispatch = w.sink.deliveries_of("dispatch_unavailable");
    assert_eq!(dispatch.len(), 1);
    assert_eq!(dispatch[0].recipients, vec![w.driver]);

    // In-progress session no longer offers its days
    assert!(
        w.services
            .marketplace
            .list_available(date(10))
            .await
            .unwrap()
            .is_empty()
    );

    // 5. Completion
    w.services
        .marketplace
        .complete(day1, a, Some("All 20 posted".to_string()))
        .await
        .unwrap();
    w.services.job.run(date(11)).await.unwrap();
    let last = w.services.marketplace.complete(day2, d, None).await.unwrap();
    assert_eq!(last.status.current, SessionStatus::Completed);

    let done = assert_consistent(&w, session.id).await;
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(
        done.days[0].completion().unwrap().observations.as_deref(),
        Some("All 20 posted")
    );
    assert_eq!(w.sink.deliveries_of("session_completed").len(), 1);

    // Terminal: nothing moves any more
    assert!(matches!(
        w.services.marketplace.unclaim(day1, &w.admin, None).await,
        Err(Error::IllegalStateTransition { .. })
    ));
    assert!(matches!(
        w.services.marketplace.complete(day1, &w.admin, None).await,
        Err(Error::IllegalStateTransition { .. })
    ));

    // Audit trail for day 1: two claims, promotion, completion
    let entries = w
        .services
        .history
        .list_for_entity(EntityType::Day, day1, None)
        .await
        .unwrap();
    let actions: Vec<HistoryAction> = entries.iter().rev().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Claimed,
            HistoryAction::Claimed,
            HistoryAction::Promoted,
            HistoryAction::Completed,
        ]
    );
    assert_eq!(entries[1].actor_id, None);
}

#[tokio::test]
async fn test_same_snapshot_race_has_one_winner() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    w.services
        .marketplace
        .claim(day_id, &w.inspectors[0])
        .await
        .unwrap();

    // Two inspectors race for the last slot from the same read
    let repository = w.services.sessions.repository();
    let snapshot = repository.get_day(day_id).await.unwrap().unwrap();

    let x = w.inspectors[1].id;
    let y = w.inspectors[2].id;
    let mut first = snapshot.clone();
    let mut second = snapshot;
    first.claim(x, Utc::now()).unwrap();
    second.claim(y, Utc::now()).unwrap();

    repository
        .commit_day_transition(&mut first, DayStatus::Open, Some(x))
        .await
        .unwrap();
    let loser = repository
        .commit_day_transition(&mut second, DayStatus::Open, Some(y))
        .await;
    assert!(matches!(loser, Err(Error::Conflict(_))));

    let stored = w.services.marketplace.get_day(day_id).await.unwrap();
    assert_eq!(
        stored.slots().inspector_ids(),
        vec![w.inspectors[0].id, x]
    );
    assert_eq!(stored.status(), DayStatus::Assigned);
    assert_consistent(&w, session.id).await;
}

#[tokio::test]
async fn test_concurrent_claims_never_overbook() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;

    let mut handles = Vec::new();
    for inspector in w.inspectors.clone() {
        let marketplace = w.services.marketplace.clone();
        handles.push(tokio::spawn(async move {
            marketplace.claim(day_id, &inspector).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(applied) => winners.push(applied.day.version),
            Err(Error::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let stored = w.services.marketplace.get_day(day_id).await.unwrap();
    assert!(!winners.is_empty());
    assert_eq!(stored.slots().occupied_count(), winners.len());
    assert_consistent(&w, session.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_on_file_database() {
    let w = file_world().await;

    for _ in 0..5 {
        let session = w.services.sessions.create(&w.admin, spec(2)).await.unwrap();

        let mut handles = Vec::new();
        for (i, inspector) in w.inspectors.iter().cloned().enumerate() {
            let day_id = session.days[i % 2].id;
            let marketplace = w.services.marketplace.clone();
            handles.push(tokio::spawn(async move {
                marketplace.claim(day_id, &inspector).await
            }));
        }

        let mut winners = [0usize; 2];
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await.unwrap() {
                Ok(_) => winners[i % 2] += 1,
                Err(Error::Conflict(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let stored = assert_consistent(&w, session.id).await;
        for (day, won) in stored.days.iter().zip(winners) {
            assert!(won >= 1);
            assert_eq!(day.slots().occupied_count(), won);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_update_racing_claims_on_file_database() {
    let w = file_world().await;

    for _ in 0..5 {
        let session = w.services.sessions.create(&w.admin, spec(2)).await.unwrap();

        let mut claims = Vec::new();
        for (i, inspector) in w.inspectors.iter().cloned().enumerate() {
            let day_id = session.days[i % 2].id;
            let marketplace = w.services.marketplace.clone();
            claims.push(tokio::spawn(async move {
                marketplace.claim(day_id, &inspector).await
            }));
        }

        let sessions = w.services.sessions.clone();
        let admin = w.admin.clone();
        let session_id = session.id;
        let update = tokio::spawn(async move {
            let update = SessionUpdate {
                days: Some(vec![NewDay::new(date(25), 9, 5)]),
                ..Default::default()
            };
            sessions.update(&admin, session_id, update).await
        });

        // A claim may land on a day the update already removed
        for handle in claims {
            match handle.await.unwrap() {
                Ok(_) | Err(Error::Conflict(_)) | Err(Error::DayNotFound(_)) => {}
                Err(e) => panic!("unexpected claim error: {e}"),
            }
        }
        match update.await.unwrap() {
            Ok(_) | Err(Error::Conflict(_)) => {}
            Err(e) => panic!("unexpected update error: {e}"),
        }

        let stored = assert_consistent(&w, session.id).await;
        assert!(!stored.days.is_empty() && stored.days.len() <= 3);
    }
}

// ========== Session rules ==========

#[tokio::test]
async fn test_day_count_limits() {
    let w = world().await;
    assert!(matches!(
        w.services.sessions.create(&w.admin, spec(0)).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        w.services.sessions.create(&w.admin, spec(6)).await,
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        w.services.sessions.create(&w.admin, spec(1)).await.unwrap().days.len(),
        1
    );
    assert_eq!(
        w.services.sessions.create(&w.admin, spec(5)).await.unwrap().days.len(),
        5
    );
    assert_eq!(w.services.sessions.list(None, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_requires_creator_department_or_admin() {
    let w = world().await;
    assert!(matches!(
        w.services.sessions.create(&w.inspectors[0], spec(1)).await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        w.services.sessions.create(&w.manager, spec(1)).await,
        Err(Error::Forbidden(_))
    ));
    assert!(w.services.sessions.create(&w.creator, spec(1)).await.is_ok());
}

#[tokio::test]
async fn test_update_and_delete_are_admin_only() {
    let w = world().await;
    let session = w.services.sessions.create(&w.creator, spec(2)).await.unwrap();
    let update = SessionUpdate {
        description: Some(None),
        ..Default::default()
    };

    assert!(matches!(
        w.services
            .sessions
            .update(&w.creator, session.id, update.clone())
            .await,
        Err(Error::Forbidden(_))
    ));
    let updated = w
        .services
        .sessions
        .update(&w.admin, session.id, update)
        .await
        .unwrap();
    assert_eq!(updated.description, None);
    assert_eq!(updated.updated_by, w.admin.id);

    assert!(matches!(
        w.services.sessions.delete(&w.creator, session.id).await,
        Err(Error::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_update_preserves_claimed_days() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(3)).await.unwrap();
    let claimed = session.days[0].id;
    w.services
        .marketplace
        .claim(claimed, &w.inspectors[0])
        .await
        .unwrap();

    let update = SessionUpdate {
        period: Some("2026-04".to_string()),
        days: Some(vec![NewDay::new(date(20), 2, 5)]),
        ..Default::default()
    };
    let updated = w
        .services
        .sessions
        .update(&w.admin, session.id, update)
        .await
        .unwrap();

    assert_eq!(updated.period, "2026-04");
    assert_eq!(updated.days.len(), 2);
    assert_eq!(updated.days[0].id, claimed);
    assert_eq!(updated.days[1].display_date, date(20));
    assert!(
        w.services
            .history
            .exists(EntityType::Session, session.id, HistoryAction::Updated)
            .await
            .unwrap()
    );
    assert_consistent(&w, session.id).await;
}

#[tokio::test]
async fn test_delete_cascades_and_notifies_claimants() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(2)).await.unwrap();
    let day_id = session.days[0].id;
    let inspector = &w.inspectors[0];
    w.services.marketplace.claim(day_id, inspector).await.unwrap();

    w.services.sessions.delete(&w.admin, session.id).await.unwrap();

    assert!(matches!(
        w.services.sessions.get(session.id).await,
        Err(Error::SessionNotFound(_))
    ));
    assert!(matches!(
        w.services.marketplace.get_day(day_id).await,
        Err(Error::DayNotFound(_))
    ));
    assert!(
        w.services
            .history
            .exists(EntityType::Session, session.id, HistoryAction::Deleted)
            .await
            .unwrap()
    );
    let deleted = w.sink.deliveries_of("session_deleted");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].recipients, vec![inspector.id]);

    assert!(matches!(
        w.services.sessions.delete(&w.admin, session.id).await,
        Err(Error::SessionNotFound(_))
    ));
}

// ========== Marketplace rules ==========

#[tokio::test]
async fn test_claim_rules() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    let market = &w.services.marketplace;

    market.claim(day_id, &w.inspectors[0]).await.unwrap();
    assert!(matches!(
        market.claim(day_id, &w.inspectors[0]).await,
        Err(Error::Conflict(_))
    ));
    market.claim(day_id, &w.inspectors[1]).await.unwrap();
    assert!(matches!(
        market.claim(day_id, &w.inspectors[2]).await,
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        market.claim(Uuid::new_v4(), &w.inspectors[2]).await,
        Err(Error::DayNotFound(_))
    ));

    let mine = market.list_mine(w.inspectors[1].id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, day_id);
}

#[tokio::test]
async fn test_unclaim_rules() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    let market = &w.services.marketplace;
    market.claim(day_id, &w.inspectors[0]).await.unwrap();
    market.claim(day_id, &w.inspectors[1]).await.unwrap();
    assert_eq!(
        w.services.sessions.get(session.id).await.unwrap().status,
        SessionStatus::Ready
    );

    assert!(matches!(
        market.unclaim(day_id, &w.inspectors[2], None).await,
        Err(Error::Forbidden(_))
    ));

    // Admin without a target releases slot 2
    let applied = market.unclaim(day_id, &w.admin, None).await.unwrap();
    assert_eq!(applied.day.status(), DayStatus::Open);
    assert_eq!(applied.status.current, SessionStatus::Draft);
    assert_eq!(
        applied.day.slots().held_by(w.inspectors[0].id),
        Some(SlotIndex::First)
    );
    let revoked = w.sink.deliveries_of("claim_revoked");
    assert_eq!(revoked.len(), 1);
    assert_eq!(revoked[0].recipients, vec![w.inspectors[1].id]);

    // Inspector releases own slot
    let applied = market.unclaim(day_id, &w.inspectors[0], None).await.unwrap();
    assert!(applied.day.slots().is_empty());
    assert_consistent(&w, session.id).await;
}

#[tokio::test]
async fn test_admin_assign_rules() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    let market = &w.services.marketplace;
    let a = w.inspectors[0].id;

    assert!(matches!(
        market
            .admin_assign(day_id, &w.inspectors[1], a, SlotIndex::First)
            .await,
        Err(Error::Forbidden(_))
    ));
    assert!(matches!(
        market
            .admin_assign(day_id, &w.admin, Uuid::new_v4(), SlotIndex::First)
            .await,
        Err(Error::Conflict(_))
    ));

    w.services.directory.set_active(w.inspectors[4].id, false).await.unwrap();
    assert!(matches!(
        market
            .admin_assign(day_id, &w.admin, w.inspectors[4].id, SlotIndex::First)
            .await,
        Err(Error::Conflict(_))
    ));

    let applied = market
        .admin_assign(day_id, &w.admin, a, SlotIndex::Second)
        .await
        .unwrap();
    assert_eq!(applied.day.slots().held_by(a), Some(SlotIndex::Second));
    assert_eq!(applied.action, HistoryAction::AdminAssigned);

    assert!(matches!(
        market
            .admin_assign(day_id, &w.admin, w.inspectors[1].id, SlotIndex::Second)
            .await,
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        market.admin_assign(day_id, &w.admin, a, SlotIndex::First).await,
        Err(Error::Conflict(_))
    ));

    let assigned = w.sink.deliveries_of("assigned_by_supervisor");
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].recipients, vec![a]);
}

#[tokio::test]
async fn test_admin_override_completion() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    let market = &w.services.marketplace;
    market.claim(day_id, &w.inspectors[0]).await.unwrap();
    market.claim(day_id, &w.inspectors[1]).await.unwrap();

    assert!(matches!(
        market.complete(day_id, &w.inspectors[0], None).await,
        Err(Error::IllegalStateTransition { .. })
    ));

    let applied = market.complete(day_id, &w.admin, None).await.unwrap();
    assert_eq!(applied.action, HistoryAction::CompleteOverride);
    assert!(applied.day.completion().unwrap().via_override);
    assert_eq!(applied.status.current, SessionStatus::Completed);
}

#[tokio::test]
async fn test_list_control_users() {
    let w = world().await;
    let control = w.services.marketplace.list_control_users(None).await.unwrap();
    // Five inspectors plus the manager of the control department
    assert_eq!(control.len(), 6);

    let dispatch = w
        .services
        .marketplace
        .list_control_users(Some("dispatch"))
        .await
        .unwrap();
    assert_eq!(dispatch.len(), 1);
}

#[tokio::test]
async fn test_notification_failure_does_not_undo_transition() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    w.services
        .marketplace
        .claim(day_id, &w.inspectors[0])
        .await
        .unwrap();

    w.sink.set_failing(true);
    let applied = w
        .services
        .marketplace
        .claim(day_id, &w.inspectors[1])
        .await
        .unwrap();
    assert_eq!(applied.notifications.failed, 2);
    assert_eq!(applied.day.status(), DayStatus::Assigned);
    assert_eq!(
        w.services.marketplace.get_day(day_id).await.unwrap().status(),
        DayStatus::Assigned
    );
}

// ========== Daily transition ==========

#[tokio::test]
async fn test_daily_transition_is_idempotent() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    w.services.marketplace.claim(day_id, &w.inspectors[0]).await.unwrap();
    w.services.marketplace.claim(day_id, &w.inspectors[1]).await.unwrap();

    let first = w.services.job.run(date(10)).await.unwrap();
    assert_eq!(first.promoted, vec![day_id]);
    let notified = w.sink.deliveries().len();

    let second = w.services.job.run(date(10)).await.unwrap();
    assert!(second.promoted.is_empty());
    assert!(second.unstaffed.is_empty());
    assert_eq!(w.sink.deliveries().len(), notified);

    let promotions = w
        .services
        .history
        .list_for_entity(EntityType::Day, day_id, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == HistoryAction::Promoted)
        .count();
    assert_eq!(promotions, 1);
}

#[tokio::test]
async fn test_daily_transition_ignores_other_dates() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(2)).await.unwrap();
    let day2 = session.days[1].id;
    w.services.marketplace.claim(day2, &w.inspectors[0]).await.unwrap();
    w.services.marketplace.claim(day2, &w.inspectors[1]).await.unwrap();

    let report = w.services.job.run(date(10)).await.unwrap();
    assert!(report.promoted.is_empty());
    assert_eq!(
        w.services.marketplace.get_day(day2).await.unwrap().status(),
        DayStatus::Assigned
    );
}

#[tokio::test]
async fn test_unstaffed_day_is_flagged_once() {
    let w = world().await;
    let session = w.services.sessions.create(&w.admin, spec(1)).await.unwrap();
    let day_id = session.days[0].id;
    w.services.marketplace.claim(day_id, &w.inspectors[0]).await.unwrap();

    let report = w.services.job.run(date(10)).await.unwrap();
    assert!(report.promoted.is_empty());
    assert_eq!(report.unstaffed, vec![day_id]);
    assert_eq!(
        w.services.marketplace.get_day(day_id).await.unwrap().status(),
        DayStatus::Open
    );

    let again = w.services.job.run(date(10)).await.unwrap();
    assert_eq!(again.unstaffed, vec![day_id]);

    let alerts = w.sink.deliveries_of("day_unstaffed");
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].recipients.contains(&w.admin.id));
    assert!(alerts[0].recipients.contains(&w.manager.id));
    assert!(
        w.services
            .history
            .exists(EntityType::Day, day_id, HistoryAction::UnstaffedFlagged)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_scheduler_stops_on_cancel() {
    let w = world().await;
    let scheduler = w.services.scheduler().unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    // Startup catch-up run happens, then the loop sees the cancellation
    tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.run(cancel))
        .await
        .expect("scheduler did not stop");
}
