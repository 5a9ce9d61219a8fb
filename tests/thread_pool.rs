use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use frameblend::{FrameError, ThreadPool};

#[test]
fn wait_returns_after_every_task_ran() {
    let pool = ThreadPool::new(4).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..500 {
        let counter = Arc::clone(&counter);
        pool.enqueue(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }
    pool.wait().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 500);
    assert!(pool.is_idle());
}

#[test]
fn first_error_surfaces_from_wait_and_is_then_cleared() {
    let pool = ThreadPool::new(2).unwrap();
    for i in 0..8 {
        pool.enqueue(move || {
            if i == 3 {
                Err(FrameError::invalid_frame("band 3 failed"))
            } else {
                Ok(())
            }
        })
        .unwrap();
    }
    let err = pool.wait().unwrap_err();
    assert!(matches!(err, FrameError::InvalidFrame(_)));
    assert!(pool.wait().is_ok());
}

#[test]
fn panicking_task_becomes_task_failed() {
    let pool = ThreadPool::new(2).unwrap();
    pool.enqueue(|| panic!("boom")).unwrap();
    match pool.wait() {
        Err(FrameError::TaskFailed(msg)) => assert!(msg.contains("boom")),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    // Workers survive a panicking task.
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    pool.enqueue(move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    pool.wait().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn scope_joins_before_returning_and_reports_errors() {
    let pool = ThreadPool::new(3).unwrap();
    let mut rows = vec![1u32; 90];
    let result = pool.scope(|s| {
        for (i, band) in rows.chunks_mut(30).enumerate() {
            s.spawn(move || {
                for v in band.iter_mut() {
                    *v += i as u32;
                }
                if i == 2 {
                    return Err(FrameError::validation("last band"));
                }
                Ok(())
            })
            .unwrap();
        }
    });
    assert!(matches!(result, Err(FrameError::Validation(_))));
    assert_eq!(rows[0], 1);
    assert_eq!(rows[45], 2);
    assert_eq!(rows[89], 3);
    assert!(pool.is_idle());
}
