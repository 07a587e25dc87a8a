//! End-to-end scenarios exercising blocked handoff, transfer and veto
//! through the public API, the way an external user drives the crate.

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use skinnylock::raw::yields::Mutex;
use skinnylock::raw::Condvar;

#[test]
fn serialized_lock_unlock_cycles() {
    let mutex = Mutex::new(0u32);
    for _ in 0..4 {
        *mutex.lock() += 1;
    }
    assert_eq!(*mutex.lock(), 4);
}

#[test]
fn blocked_locker_acquires_after_release() {
    let mutex = Arc::new(Mutex::new(0u32));
    let guard = mutex.lock();

    let (tx, rx) = channel();
    let handle = {
        let mutex = Arc::clone(&mutex);
        thread::spawn(move || {
            tx.send(()).unwrap();
            let mut guard = mutex.lock();
            *guard += 1;
        })
    };

    rx.recv().unwrap();
    // Make it likely the second locker has parked before the release.
    thread::sleep(Duration::from_millis(20));
    drop(guard);

    handle.join().expect("blocked locker failed");
    assert_eq!(*mutex.lock(), 1);
    assert!(mutex.try_lock().is_some());
}

#[test]
fn try_lock_busy_then_success() {
    let mutex = Arc::new(Mutex::new(()));
    let guard = mutex.lock();

    let mutex2 = Arc::clone(&mutex);
    let busy = thread::spawn(move || mutex2.try_lock().is_none());
    assert!(busy.join().expect("trylock thread failed"));

    drop(guard);
    let mutex2 = Arc::clone(&mutex);
    let taken = thread::spawn(move || mutex2.try_lock().is_some());
    assert!(taken.join().expect("trylock thread failed"));
}

#[test]
fn mutual_exclusion_under_stress() {
    const THREADS: usize = 8;
    const ITERS: usize = 500;

    let mutex = Arc::new(Mutex::new((0usize, false)));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                for _ in 0..ITERS {
                    let mut guard = mutex.lock();
                    // If another thread were inside the region, it would
                    // have left this marker set.
                    assert!(!guard.1, "two threads inside the critical region");
                    guard.1 = true;
                    guard.0 += 1;
                    guard.1 = false;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("incrementing thread failed");
    }
    assert_eq!(mutex.lock().0, THREADS * ITERS);
}

#[test]
fn transfer_waits_for_target_holder() {
    let a = Arc::new(Mutex::new(()));
    let b = Arc::new(Mutex::new(0u32));
    let guard_b = b.lock();

    let (tx, rx) = channel();
    let handle = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        thread::spawn(move || {
            let guard_a = a.lock();
            tx.send(()).unwrap();
            let mut guard_b = guard_a.transfer(&b).expect("nothing vetoes here");
            *guard_b += 1;
        })
    };

    rx.recv().unwrap();
    thread::sleep(Duration::from_millis(20));
    // `a` stays released-by-transfer only once `b` is handed over.
    drop(guard_b);

    handle.join().expect("transferring thread failed");
    assert_eq!(*b.lock(), 1);
    assert!(a.try_lock().is_some());
    assert!(b.try_lock().is_some());
}

#[test]
fn vetoed_transfer_retries_and_eventually_lands() {
    let a = Arc::new(Mutex::new(()));
    let b = Arc::new(Mutex::new(()));
    let guard_b = b.lock();

    let (started_tx, started_rx) = channel();
    let (vetoed_tx, vetoed_rx) = channel();
    let handle = {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        thread::spawn(move || {
            let mut guard_a = a.lock();
            started_tx.send(()).unwrap();
            let mut vetoes = 0u32;
            let guard_b = loop {
                match guard_a.transfer(&b) {
                    Ok(guard_b) => break guard_b,
                    Err(err) => {
                        // The hold on `a` came back with the error.
                        vetoes += 1;
                        vetoed_tx.send(()).unwrap();
                        guard_a = err.into_guard();
                    }
                }
            };
            drop(guard_b);
            vetoes
        })
    };

    started_rx.recv().unwrap();
    // A veto issued before the transfer snapshots its generation goes
    // unnoticed, so keep vetoing until one is acknowledged.
    loop {
        b.veto_transfer().expect("`b` is held by this thread");
        match vetoed_rx.recv_timeout(Duration::from_millis(10)) {
            Ok(()) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
            Err(err) => panic!("transferring thread went away: {err}"),
        }
    }
    drop(guard_b);

    let vetoes = handle.join().expect("transferring thread failed");
    assert!(vetoes >= 1, "the first transfer attempt must have been vetoed");
    assert!(a.try_lock().is_some());
    assert!(b.try_lock().is_some());
}

#[test]
fn cond_wait_hands_mutex_to_producer() {
    let shared = Arc::new((Mutex::new(Vec::new()), Condvar::new()));

    let consumer = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let (mutex, condvar) = &*shared;
            let mut items = mutex.lock();
            while items.len() < 3 {
                condvar.wait(&mut items);
            }
            items.clone()
        })
    };

    let (mutex, condvar) = &*shared;
    for item in ["one", "two", "three"] {
        // Succeeds while the consumer sleeps: waiting released the mutex.
        mutex.lock().push(item);
        condvar.notify_one();
    }

    let items = consumer.join().expect("consumer failed");
    assert_eq!(items, vec!["one", "two", "three"]);
}
