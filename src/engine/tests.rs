use super::*;
use crate::catalog::Catalog;
use crate::limits::*;
use chrono::NaiveDate;
use std::path::PathBuf;

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, m, day).unwrap()
}

fn range(from: (u32, u32), to: (u32, u32)) -> DateRange {
    DateRange::new(d(from.0, from.1), d(to.0, to.1))
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("innkeep_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Rooms 1-3 are type 1 at 30 a night, room 4 is type 2 at 80.
fn catalog() -> Catalog {
    Catalog::from_json(
        r#"{
            "hotel_name": "Seaview",
            "rooms": [
                {"number": 1, "type": 1, "cost": 30},
                {"number": 2, "type": 1, "cost": 30},
                {"number": 3, "type": 1, "cost": 30},
                {"number": 4, "type": 2, "cost": 80}
            ]
        }"#,
    )
    .unwrap()
}

async fn open_engine(name: &str) -> (Engine, PathBuf) {
    let path = test_wal_path(name);
    let engine = Engine::new(path.clone(), catalog()).unwrap();
    engine.open_calendars(d(8, 15)).await.unwrap();
    (engine, path)
}

// ── Transactions ─────────────────────────────────────────

#[tokio::test]
async fn book_then_cancel_restores_calendar() {
    let (engine, _) = open_engine("book_cancel.wal").await;
    let stay = range((8, 22), (8, 28));

    let booking = engine.book(3, stay, 9).await.unwrap();
    assert_eq!(booking.room, 3);
    assert_eq!(
        engine.calendar(3).await.unwrap(),
        vec![FreeInterval::bounded(d(8, 15), d(8, 21)), FreeInterval::open(d(8, 29))]
    );

    engine.cancel(3, stay).await.unwrap();
    assert_eq!(engine.calendar(3).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);
    assert!(engine.room_snapshot(3).await.unwrap().reservations.is_empty());
}

#[tokio::test]
async fn intersecting_booking_is_rejected() {
    let (engine, _) = open_engine("no_double_booking.wal").await;
    engine.book(1, range((8, 22), (8, 28)), 1).await.unwrap();

    for overlapping in [
        range((8, 20), (8, 23)),
        range((8, 28), (9, 2)),
        range((8, 24), (8, 25)),
        range((8, 18), (9, 5)),
    ] {
        let result = engine.book(1, overlapping, 2).await;
        assert!(
            matches!(result, Err(EngineError::AllocationConflict(_))),
            "{overlapping} should conflict"
        );
    }
    // One untouched day is required on each side, so the adjacent day is refused too.
    assert!(matches!(
        engine.book(1, range((8, 29), (9, 2)), 2).await,
        Err(EngineError::AllocationConflict(_))
    ));
    engine.book(1, range((8, 30), (9, 2)), 2).await.unwrap();
}

#[tokio::test]
async fn failed_booking_leaves_state_untouched() {
    let (engine, _) = open_engine("failed_booking.wal").await;
    let before = engine.room_snapshot(2).await.unwrap();

    let inverted = engine.book(2, range((9, 1), (8, 30)), 1).await;
    assert!(matches!(inverted, Err(EngineError::InvalidRange(_))));
    let touching = engine.book(2, range((8, 15), (8, 20)), 1).await;
    assert!(matches!(touching, Err(EngineError::AllocationConflict(_))));

    assert_eq!(engine.room_snapshot(2).await.unwrap(), before);
}

#[tokio::test]
async fn cancel_unknown_booking_is_not_found() {
    let (engine, _) = open_engine("cancel_unknown.wal").await;
    let result = engine.cancel(2, range((9, 1), (9, 3))).await;
    assert!(matches!(
        result,
        Err(EngineError::NotFound(Missing::Reservation { room: 2, .. }))
    ));
    assert!(matches!(
        engine.cancel(99, range((9, 1), (9, 3))).await,
        Err(EngineError::NotFound(Missing::Room(99)))
    ));
}

#[tokio::test]
async fn stay_longer_than_limit_rejected() {
    let (engine, _) = open_engine("stay_limit.wal").await;
    let start = d(9, 1);
    let end = start + chrono::Days::new(MAX_STAY_NIGHTS as u64 + 1);
    let result = engine.book(1, DateRange::new(start, end), 1).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn open_calendars_only_once() {
    let path = test_wal_path("open_once.wal");
    let engine = Engine::new(path, catalog()).unwrap();
    assert_eq!(engine.open_calendars(d(8, 15)).await.unwrap(), 4);
    assert_eq!(engine.open_calendars(d(9, 1)).await.unwrap(), 0);
    assert_eq!(engine.calendar(4).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);
}

// ── Search ───────────────────────────────────────────────

#[tokio::test]
async fn find_rooms_prefers_tightest_fit() {
    let (engine, _) = open_engine("find_rooms.wal").await;
    // Room 2 gets a short free gap that the request fits snugly.
    engine.book(2, range((8, 17), (8, 19)), 0).await.unwrap();
    engine.book(2, range((8, 31), (9, 5)), 0).await.unwrap();

    let found = engine.find_rooms(1, range((8, 22), (8, 28))).await.unwrap();
    assert_eq!(
        found,
        vec![
            Candidate { room: 2, cost: 2 },
            Candidate { room: 1, cost: 7 },
            Candidate { room: 3, cost: 7 },
        ]
    );
}

#[tokio::test]
async fn find_rooms_for_unknown_type_is_empty() {
    let (engine, _) = open_engine("unknown_type.wal").await;
    assert!(engine.find_rooms(7, range((8, 22), (8, 28))).await.unwrap().is_empty());
}

// ── Guests ───────────────────────────────────────────────

#[tokio::test]
async fn registration_assigns_sequential_ids() {
    let (engine, _) = open_engine("register.wal").await;
    assert_eq!(engine.register_guest("Ann", "ann@example.com").await.unwrap(), 0);
    assert_eq!(engine.register_guest("Bob", "bob@example.com").await.unwrap(), 1);
    // Same name, different email is a different guest.
    assert_eq!(engine.register_guest("Ann", "ann@work.example").await.unwrap(), 2);

    let dup = engine.register_guest("Bob", "bob@example.com").await;
    assert!(matches!(dup, Err(EngineError::AlreadyExists(_))));
    assert_eq!(engine.guest_id("Bob", "bob@example.com"), Some(1));
    assert_eq!(engine.guest_id("Bob", "nobody@example.com"), None);

    let ann = engine.guest(0).await.unwrap();
    assert_eq!(ann.state, GuestState::Idle);
    assert!(ann.reservation.is_none());
}

#[tokio::test]
async fn overlong_contact_rejected() {
    let (engine, _) = open_engine("long_contact.wal").await;
    let name = "x".repeat(MAX_CONTACT_LEN + 1);
    let result = engine.register_guest(&name, "x@example.com").await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    assert_eq!(engine.guest_count(), 0);
}

#[tokio::test]
async fn reserve_books_best_room_and_prices_stay() {
    let (engine, _) = open_engine("reserve.wal").await;
    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();

    let booking = engine.reserve(ann, 2, range((8, 22), (8, 28))).await.unwrap();
    assert_eq!(booking.room, 4);

    let record = engine.guest(ann).await.unwrap();
    assert_eq!(record.state, GuestState::Reserved);
    let reservation = record.reservation.unwrap();
    assert_eq!(reservation.room, 4);
    assert_eq!(reservation.booking_id, booking.id);
    assert_eq!(reservation.payment_due, 6 * 80);
    assert!(!record.paid);

    // Already holding a reservation.
    let again = engine.reserve(ann, 1, range((9, 10), (9, 12))).await;
    assert!(matches!(
        again,
        Err(EngineError::InvalidState { expected: GuestState::Idle, .. })
    ));
}

#[tokio::test]
async fn reserve_with_no_room_left_is_allocation_conflict() {
    let (engine, _) = open_engine("reserve_full.wal").await;
    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
    let bob = engine.register_guest("Bob", "bob@example.com").await.unwrap();

    engine.reserve(ann, 2, range((8, 22), (8, 28))).await.unwrap();
    let result = engine.reserve(bob, 2, range((8, 25), (8, 30))).await;
    assert!(matches!(result, Err(EngineError::AllocationConflict(_))));
    assert_eq!(engine.guest(bob).await.unwrap().state, GuestState::Idle);
}

#[tokio::test]
async fn reserve_unknown_guest_is_not_found() {
    let (engine, _) = open_engine("reserve_unknown.wal").await;
    let result = engine.reserve(42, 1, range((8, 22), (8, 28))).await;
    assert!(matches!(result, Err(EngineError::NotFound(Missing::Guest(42)))));
}

#[tokio::test]
async fn cancel_reservation_returns_guest_to_idle() {
    let (engine, _) = open_engine("cancel_reservation.wal").await;
    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
    let booking = engine.reserve(ann, 1, range((8, 22), (8, 28))).await.unwrap();

    let reservation = engine.cancel_reservation(ann).await.unwrap();
    assert_eq!(reservation.room, booking.room);
    assert_eq!(engine.calendar(booking.room).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);

    let record = engine.guest(ann).await.unwrap();
    assert_eq!(record.state, GuestState::Idle);
    assert!(record.reservation.is_none());

    let again = engine.cancel_reservation(ann).await;
    assert!(matches!(again, Err(EngineError::InvalidState { .. })));
}

#[tokio::test]
async fn room_cancel_of_guest_booking_releases_guest() {
    let (engine, path) = open_engine("room_cancel_guest.wal").await;
    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
    let bob = engine.register_guest("Bob", "bob@example.com").await.unwrap();
    let stay = range((8, 22), (8, 28));
    let booking = engine.reserve(ann, 1, stay).await.unwrap();

    engine.cancel(booking.room, stay).await.unwrap();
    let record = engine.guest(ann).await.unwrap();
    assert_eq!(record.state, GuestState::Idle);
    assert!(record.reservation.is_none());
    assert_eq!(engine.calendar(booking.room).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);

    // Bob takes the same dates; Ann has nothing left to cancel.
    assert_eq!(engine.reserve(bob, 1, stay).await.unwrap().room, booking.room);
    assert!(matches!(
        engine.cancel_reservation(ann).await,
        Err(EngineError::InvalidState { state: GuestState::Idle, .. })
    ));
    assert_eq!(engine.reserve(ann, 1, stay).await.unwrap().room, 2);

    drop(engine);
    let engine = Engine::new(path, catalog()).unwrap();
    assert_eq!(engine.guest(ann).await.unwrap().reservation.unwrap().room, 2);
    assert_eq!(engine.guest(bob).await.unwrap().reservation.unwrap().room, booking.room);
}

#[tokio::test]
async fn room_cancel_leaves_unrelated_guest_alone() {
    let (engine, _) = open_engine("room_cancel_unrelated.wal").await;
    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
    let booking = engine.reserve(ann, 1, range((8, 22), (8, 28))).await.unwrap();
    assert_eq!(booking.room, 1);

    // A direct booking under Ann's id that is not her reservation.
    let other = range((9, 10), (9, 12));
    engine.book(2, other, ann).await.unwrap();
    engine.cancel(2, other).await.unwrap();

    let record = engine.guest(ann).await.unwrap();
    assert_eq!(record.state, GuestState::Reserved);
    assert_eq!(record.reservation.unwrap().room, 1);
    assert_eq!(engine.check_in(ann).await.unwrap(), 1);
}

#[tokio::test]
async fn reserve_skips_room_at_fragmentation_limit() {
    let path = test_wal_path("reserve_fragmented.wal");
    {
        // Room 1: five-day free windows split by single booked days.
        let intervals = (0..MAX_INTERVALS_PER_ROOM as u64)
            .map(|i| {
                let start = d(8, 15) + chrono::Days::new(6 * i);
                FreeInterval::bounded(start, start + chrono::Days::new(4))
            })
            .collect();
        let mut wal = crate::wal::Wal::open(&path).unwrap();
        wal.append(&Event::RoomRestored {
            snapshot: RoomSnapshot {
                room: 1,
                intervals,
                reservations: Vec::new(),
            },
        })
        .unwrap();
        for room in 2..=4 {
            wal.append(&Event::CalendarOpened { room, from: d(8, 15) }).unwrap();
        }
    }
    let engine = Engine::new(path, catalog()).unwrap();
    let stay = range((8, 16), (8, 18));
    let ranked = engine.find_rooms(1, stay).await.unwrap();
    assert_eq!(ranked[0].room, 1);

    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
    assert_eq!(engine.reserve(ann, 1, stay).await.unwrap().room, 2);
    assert!(matches!(
        engine.book(1, stay, 7).await,
        Err(EngineError::LimitExceeded(_))
    ));
}

#[tokio::test]
async fn check_in_and_out_keep_calendar_booked() {
    let (engine, _) = open_engine("check_in_out.wal").await;
    let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
    let booking = engine.reserve(ann, 1, range((8, 22), (8, 28))).await.unwrap();
    let booked = engine.calendar(booking.room).await.unwrap();

    // Check-out before check-in is refused.
    assert!(matches!(
        engine.check_out(ann, true).await,
        Err(EngineError::InvalidState { .. })
    ));

    assert_eq!(engine.check_in(ann).await.unwrap(), booking.room);
    let record = engine.guest(ann).await.unwrap();
    assert_eq!(record.state, GuestState::CheckedIn);
    assert_eq!(record.current_room, Some(booking.room));
    assert!(engine.room_snapshot(booking.room).await.unwrap().reservations.is_empty());
    assert_eq!(engine.calendar(booking.room).await.unwrap(), booked);

    // A checked-in stay can no longer be cancelled.
    assert!(matches!(
        engine.cancel_reservation(ann).await,
        Err(EngineError::InvalidState { .. })
    ));

    engine.check_out(ann, true).await.unwrap();
    let record = engine.guest(ann).await.unwrap();
    assert_eq!(record.state, GuestState::Idle);
    assert_eq!(record.current_room, None);
    assert!(record.paid);
    assert_eq!(engine.calendar(booking.room).await.unwrap(), booked);
}

#[tokio::test]
async fn guests_in_state_sorted_by_id() {
    let (engine, _) = open_engine("guests_in_state.wal").await;
    let mut ids = Vec::new();
    for name in ["Ann", "Bob", "Cat", "Dan"] {
        ids.push(engine.register_guest(name, "x@example.com").await.unwrap());
    }
    engine.reserve(ids[3], 1, range((8, 20), (8, 22))).await.unwrap();
    engine.reserve(ids[1], 1, range((9, 20), (9, 22))).await.unwrap();
    engine.check_in(ids[3]).await.unwrap();

    let reserved: Vec<_> = engine
        .guests_in_state(GuestState::Reserved)
        .await
        .iter()
        .map(|g| g.id)
        .collect();
    assert_eq!(reserved, vec![ids[1]]);
    let idle: Vec<_> = engine.guests_in_state(GuestState::Idle).await.iter().map(|g| g.id).collect();
    assert_eq!(idle, vec![ids[0], ids[2]]);
    assert_eq!(engine.guests_in_state(GuestState::CheckedIn).await.len(), 1);
}

#[tokio::test]
async fn concurrent_reservations_never_share_a_room() {
    let (engine, _) = open_engine("concurrent_reserve.wal").await;
    let engine = Arc::new(engine);
    let mut guests = Vec::new();
    for i in 0..5 {
        guests.push(engine.register_guest(&format!("g{i}"), "g@example.com").await.unwrap());
    }

    let mut handles = Vec::new();
    for guest in guests {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.reserve(guest, 1, range((8, 22), (8, 28))).await
        }));
    }
    let mut rooms = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(booking) => rooms.push(booking.room),
            Err(EngineError::AllocationConflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    rooms.sort_unstable();
    assert_eq!(rooms, vec![1, 2, 3]);
    assert_eq!(conflicts, 2);
}

#[tokio::test]
async fn list_rooms_in_catalog_order() {
    let (engine, _) = open_engine("list_rooms.wal").await;
    engine.book(2, range((8, 22), (8, 28)), 0).await.unwrap();
    let rooms = engine.list_rooms().await;
    assert_eq!(rooms.iter().map(|r| r.number).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(rooms[1].free_intervals, 2);
    assert_eq!(rooms[1].pending_reservations, 1);
    assert_eq!(rooms[3].rate, 80);
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let (ann, bob, bob_room) = {
        let engine = Engine::new(path.clone(), catalog()).unwrap();
        engine.open_calendars(d(8, 15)).await.unwrap();
        let ann = engine.register_guest("Ann", "ann@example.com").await.unwrap();
        let bob = engine.register_guest("Bob", "bob@example.com").await.unwrap();
        engine.reserve(ann, 1, range((8, 22), (8, 28))).await.unwrap();
        let bob_room = engine.reserve(bob, 1, range((9, 2), (9, 4))).await.unwrap().room;
        engine.check_in(bob).await.unwrap();
        engine.book(3, range((10, 1), (10, 3)), 77).await.unwrap();
        engine.cancel(3, range((10, 1), (10, 3))).await.unwrap();
        (ann, bob, bob_room)
    };

    let engine = Engine::new(path, catalog()).unwrap();
    assert_eq!(engine.guest(ann).await.unwrap().state, GuestState::Reserved);
    let bob_record = engine.guest(bob).await.unwrap();
    assert_eq!(bob_record.state, GuestState::CheckedIn);
    assert_eq!(bob_record.current_room, Some(bob_room));
    assert_eq!(engine.calendar(3).await.unwrap().len(), 1 + usize::from(bob_room == 3));
    // Next registration continues the id sequence.
    assert_eq!(engine.register_guest("Cat", "cat@example.com").await.unwrap(), 2);
}

#[tokio::test]
async fn compact_wal_preserves_state() {
    let path = test_wal_path("compact.wal");
    let before = {
        let engine = Engine::new(path.clone(), catalog()).unwrap();
        engine.open_calendars(d(8, 15)).await.unwrap();
        for i in 0..4 {
            let id = engine.register_guest(&format!("g{i}"), "g@example.com").await.unwrap();
            engine
                .reserve(id, 1, range((8, 20 + i * 2), (8, 21 + i * 2)))
                .await
                .unwrap();
        }
        engine.cancel_reservation(1).await.unwrap();
        engine.check_in(2).await.unwrap();
        assert!(engine.wal_appends_since_compact().await > 8);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        let mut snapshots = Vec::new();
        for room in 1..=4 {
            snapshots.push(engine.room_snapshot(room).await.unwrap());
        }
        (snapshots, engine.guests_in_state(GuestState::Reserved).await)
    };

    let replayed = crate::wal::Wal::replay(&path).unwrap();
    assert_eq!(replayed.len(), 4 + 4); // one snapshot per guest and per room

    let engine = Engine::new(path, catalog()).unwrap();
    for (room, snapshot) in (1..=4).zip(before.0) {
        assert_eq!(engine.room_snapshot(room).await.unwrap(), snapshot);
    }
    assert_eq!(engine.guests_in_state(GuestState::Reserved).await, before.1);
    assert_eq!(engine.guest(2).await.unwrap().state, GuestState::CheckedIn);
    assert_eq!(engine.register_guest("late", "late@example.com").await.unwrap(), 4);
}

#[tokio::test]
async fn appends_after_compaction_replay() {
    let path = test_wal_path("compact_then_append.wal");
    {
        let engine = Engine::new(path.clone(), catalog()).unwrap();
        engine.open_calendars(d(8, 15)).await.unwrap();
        engine.book(1, range((8, 22), (8, 28)), 5).await.unwrap();
        engine.compact_wal().await.unwrap();
        engine.cancel(1, range((8, 22), (8, 28))).await.unwrap();
    }
    let engine = Engine::new(path, catalog()).unwrap();
    assert_eq!(engine.calendar(1).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);
}

#[tokio::test]
async fn replay_skips_events_that_do_not_apply() {
    let path = test_wal_path("replay_skip.wal");
    {
        let mut wal = crate::wal::Wal::open(&path).unwrap();
        wal.append(&Event::CalendarOpened { room: 1, from: d(8, 15) }).unwrap();
        // Cancels something never booked.
        wal.append(&Event::BookingCancelled {
            room: 1,
            range: range((8, 22), (8, 28)),
            guest: None,
        })
        .unwrap();
        // Room not in the catalog.
        wal.append(&Event::CalendarOpened { room: 99, from: d(8, 15) }).unwrap();
        wal.append(&Event::CalendarOpened { room: 2, from: d(8, 15) }).unwrap();
    }
    let engine = Engine::new(path, catalog()).unwrap();
    assert_eq!(engine.calendar(1).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);
    assert_eq!(engine.calendar(2).await.unwrap(), vec![FreeInterval::open(d(8, 15))]);
    assert!(engine.calendar(3).await.unwrap().is_empty());
}
