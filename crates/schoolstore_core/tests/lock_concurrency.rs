use schoolstore_core::model::module::STUDENTS_TABLE;
use schoolstore_core::{
    Cell, LockError, LockManager, Module, RegistrationError, SchoolStore, StoreConfig,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn critical_sections_never_overlap() {
    let manager = LockManager::default();
    let inside = AtomicBool::new(false);
    let entered = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..25 {
                    manager
                        .with_lock(Duration::from_secs(5), || {
                            assert!(!inside.swap(true, Ordering::SeqCst));
                            entered.fetch_add(1, Ordering::SeqCst);
                            inside.store(false, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(entered.load(Ordering::SeqCst), 200);
}

#[test]
fn store_mutation_reports_busy_while_lock_is_held() {
    let settings = StoreConfig {
        lock_timeout_ms: 50,
        ..StoreConfig::default()
    };
    let store = SchoolStore::open_in_memory(settings).unwrap();
    let ctx = store.current_context().unwrap();
    let (held_tx, held_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let lock = store.lock_manager();
        scope.spawn(move || {
            lock.with_lock(Duration::from_secs(5), || {
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();
        });

        held_rx.recv().unwrap();
        let error = store
            .register_unique(
                &ctx,
                Module::Students,
                STUDENTS_TABLE,
                "Student ID",
                vec![Cell::text("S001")],
            )
            .unwrap_err();
        assert!(matches!(
            error,
            RegistrationError::Busy(LockError::Busy { waited })
                if waited == Duration::from_millis(50)
        ));
        release_tx.send(()).unwrap();
    });

    assert!(!store.lock_manager().is_locked());
    store
        .register_unique(
            &ctx,
            Module::Students,
            STUDENTS_TABLE,
            "Student ID",
            vec![Cell::text("S001")],
        )
        .unwrap();
}

#[test]
fn concurrent_generated_ids_are_unique() {
    let store = SchoolStore::open_in_memory(StoreConfig::default()).unwrap();
    let ctx = store.current_context().unwrap();

    let ids = thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|worker| {
                let store = &store;
                let ctx = &ctx;
                scope.spawn(move || {
                    (0..5)
                        .map(|_| {
                            store
                                .register_with_generated_id(
                                    ctx,
                                    Module::Students,
                                    STUDENTS_TABLE,
                                    "Student ID",
                                    "STU",
                                    |id| vec![Cell::text(id), Cell::text(format!("worker {worker}"))],
                                )
                                .unwrap()
                                .0
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), 30);
    assert_eq!(unique.len(), 30);
    assert_eq!(
        store
            .list_rows(&ctx, Module::Students, STUDENTS_TABLE)
            .unwrap()
            .len(),
        30
    );
}
