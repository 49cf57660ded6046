//! End-to-end ledger scenarios, run against every store backend.
//!
//! Covers score movement on append, the unlock state machine, the score
//! histogram, concurrent appends and unlocks, reconciliation and the
//! analytics view.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};

use karma_core::error::{KarmaError, NotFoundError, UnlockError};
use karma_core::reconcile;
use karma_core::types::{BehaviorType, Role, UserId};
use karma_tests::helpers::{Backend, Harness, dated_request, request, reward, t0};

#[test]
fn scenario_a_score_follows_appends() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let ledger = h.service.ledger();

        assert_eq!(h.score(&alice), 0);
        ledger.record(&alice, request("payment_on_time"), Utc::now()).unwrap();
        assert_eq!(h.score(&alice), 10, "{backend:?}");
        ledger.record(&alice, request("payment_late"), Utc::now()).unwrap();
        assert_eq!(h.score(&alice), -5, "{backend:?}");
    }
}

#[test]
fn scenario_b_unlock_state_machine() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let store = h.service.store();
        let gate = h.service.rewards();
        let gold = store.insert_reward(reward("gold", 50)).unwrap();

        store.apply_delta(&alice, 40).unwrap();
        let err = gate.unlock(&alice, gold.id).unwrap_err();
        assert_eq!(
            err,
            KarmaError::Unlock(UnlockError::InsufficientBalance { have: 40, need: 50 })
        );

        h.service
            .ledger()
            .record(&alice, request("payment_on_time"), Utc::now())
            .unwrap();
        assert_eq!(h.score(&alice), 50);

        gate.unlock(&alice, gold.id).unwrap();
        let user = store.get_user(&alice).unwrap().unwrap();
        assert!(user.unlocked_rewards.contains(&gold.id), "{backend:?}");

        let err = gate.unlock(&alice, gold.id).unwrap_err();
        assert_eq!(err, KarmaError::Unlock(UnlockError::AlreadyUnlocked(gold.id)));
        assert_eq!(h.score(&alice), 50, "unlocking never spends karma");
    }
}

#[test]
fn unlock_of_unknown_reward_is_not_found() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let err = h
            .service
            .rewards()
            .unlock(&alice, karma_core::types::RewardId(404))
            .unwrap_err();
        assert!(matches!(err, KarmaError::NotFound(NotFoundError::Reward(_))));
    }
}

#[test]
fn scenario_c_distribution_spreads_evenly() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        for (i, score) in [0, 60, 120, 300, 600].into_iter().enumerate() {
            let id = h.user(&format!("user-{i}"));
            h.service.store().apply_delta(&id, score).unwrap();
        }

        let view = h.service.reporter().global_analytics(Utc::now()).unwrap();
        let counts: Vec<u64> = view.karma_distribution.iter().map(|b| b.count).collect();
        let percentages: Vec<i64> = view.karma_distribution.iter().map(|b| b.percentage).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 1], "{backend:?}");
        assert_eq!(percentages, vec![20, 20, 20, 20, 20]);
        assert_eq!(view.summary.avg_karma_score, 216);
    }
}

#[test]
fn scenario_d_concurrent_appends_converge() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["payment_on_time", "payment_late"]
            .into_iter()
            .map(|kind| {
                let ledger = h.service.ledger().clone();
                let alice = alice.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ledger.record(&alice, request(kind), Utc::now()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(h.score(&alice), -5, "{backend:?}");
    }
}

#[test]
fn many_writers_lose_no_increments() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let users: Vec<UserId> = (0..4).map(|i| h.user(&format!("u{i}"))).collect();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = h.service.ledger().clone();
                let users = users.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let user = &users[(t + i) % users.len()];
                        let kind = if i % 3 == 0 { "credit_check" } else { "credit_utilization_low" };
                        ledger.record(user, request(kind), Utc::now()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = h.service.store();
        assert_eq!(store.count_behaviors().unwrap(), 200);
        for user in &users {
            assert_eq!(h.score(user), store.ledger_total(user).unwrap(), "{backend:?}");
        }
        assert!(reconcile::audit(store.as_ref()).unwrap().is_empty());
    }
}

#[test]
fn racing_unlocks_succeed_once() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let store = h.service.store();
        let gold = store.insert_reward(reward("gold", 10)).unwrap();
        store.apply_delta(&alice, 10).unwrap();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = h.service.rewards().clone();
                let alice = alice.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    gate.unlock(&alice, gold.id)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "{backend:?}");
        for result in results.into_iter().filter_map(Result::err) {
            assert_eq!(
                result,
                KarmaError::Unlock(UnlockError::AlreadyUnlocked(gold.id))
            );
        }
    }
}

#[test]
fn drift_is_reported_and_repaired() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let bob = h.user("bob");
        let store = h.service.store();
        h.service
            .ledger()
            .record(&alice, request("payment_on_time"), Utc::now())
            .unwrap();

        // Simulate a lost increment and a stray one.
        store.apply_delta(&alice, -10).unwrap();
        store.apply_delta(&bob, 7).unwrap();

        let drifts = reconcile::audit(store.as_ref()).unwrap();
        assert_eq!(drifts.len(), 2, "{backend:?}");
        assert_eq!(reconcile::repair(store.as_ref(), &drifts).unwrap(), 2);

        assert_eq!(h.score(&alice), 10);
        assert_eq!(h.score(&bob), 0);
        assert!(reconcile::audit(store.as_ref()).unwrap().is_empty());
    }
}

#[test]
fn append_for_unregistered_user_changes_nothing() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let ghost = UserId::from("ghost");
        let err = h
            .service
            .ledger()
            .record(&ghost, request("payment_on_time"), Utc::now())
            .unwrap_err();
        assert_eq!(err, KarmaError::NotFound(NotFoundError::User(ghost)));
        assert_eq!(h.service.store().count_behaviors().unwrap(), 0);
    }
}

#[test]
fn analytics_window_and_top_performers() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let admin = h.register("admin", Role::Admin).id;
        let alice = h.user("alice");
        let bob = h.user("bob");
        let carol = h.user("carol");
        let ledger = h.service.ledger();
        let now = t0();

        let yesterday = now - Duration::days(1);
        ledger.record(&alice, dated_request("payment_on_time", yesterday), now).unwrap();
        ledger.record(&alice, dated_request("payment_late", yesterday), now).unwrap();
        ledger.record(&bob, dated_request("payment_on_time", now), now).unwrap();
        ledger.record(&bob, dated_request("new_credit_account", now), now).unwrap();
        ledger.record(&carol, dated_request("credit_check", now), now).unwrap();
        // Outside the window: counted in totals, not in activity.
        ledger
            .record(&carol, dated_request("payment_on_time", now - Duration::days(45)), now)
            .unwrap();

        let view = h.service.reporter().global_analytics(now).unwrap();
        assert_eq!(view.summary.total_users, 4);
        assert_eq!(view.summary.total_behaviors, 6);

        // Gross positive gain: bob 13, alice 10; carol only lost points in-window.
        let top: Vec<(&UserId, i64)> = view
            .top_performers
            .iter()
            .map(|p| (&p.user_id, p.karma_gained))
            .collect();
        assert_eq!(top, vec![(&bob, 13), (&alice, 10)], "{backend:?}");
        assert_eq!(view.top_performers[0].username, "bob-name");
        assert_eq!(view.summary.active_users, 2);

        let days: Vec<(&str, u64, i64)> = view
            .recent_activity
            .iter()
            .map(|d| (d.date.as_str(), d.count, d.karma_change))
            .collect();
        assert_eq!(days, vec![("2024-06-14", 2, -5), ("2024-06-15", 3, 11)]);

        // Leaderboard: bob 13, carol 8, admin 0, alice -5.
        let board: Vec<&UserId> = view.leaderboard.iter().map(|e| &e.id).collect();
        assert_eq!(board, vec![&bob, &carol, &admin, &alice]);

        let stats = &view.behavior_stats;
        assert_eq!(stats[&BehaviorType::PaymentOnTime].count, 3);
        assert_eq!(stats[&BehaviorType::PaymentOnTime].total_karma, 30);
    }
}

#[test]
fn feed_caps_at_fifty_and_counts_unread() {
    for backend in Backend::ALL {
        let h = Harness::new(backend);
        let alice = h.user("alice");
        let ledger = h.service.ledger();
        for i in 0..55 {
            ledger
                .record(&alice, dated_request("credit_check", t0() + Duration::minutes(i)), t0())
                .unwrap();
        }

        let feed = ledger.feed(&alice).unwrap();
        assert_eq!(feed.behaviors.len(), 50);
        assert_eq!(feed.unread_count, 55);
        assert_eq!(feed.behaviors[0].date, t0() + Duration::minutes(54));

        let marked = ledger.mark_read(&alice, feed.behaviors[0].id).unwrap();
        assert!(marked.behavior.is_read);
        assert_eq!(marked.unread_count, 54, "{backend:?}");
    }
}
