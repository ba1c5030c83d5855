use std::sync::{Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

fn log_poisoned(lock_type: &str, context: &str) {
    log::error!("{} lock poisoned in {}", lock_type, context);
}

pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("Mutex", context);
            poisoned.into_inner()
        }
    }
}

/// Waits on `condvar` until `condition` turns false or `timeout` elapses.
///
/// Returns the guard and `true` if the wait ended by timeout with the
/// condition still holding.
pub fn wait_while_timeout<'a, T, F>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    context: &str,
    condition: F,
) -> (MutexGuard<'a, T>, bool)
where
    F: FnMut(&mut T) -> bool,
{
    match condvar.wait_timeout_while(guard, timeout, condition) {
        Ok((guard, result)) => (guard, result.timed_out()),
        Err(poisoned) => {
            log_poisoned("Condvar", context);
            let (guard, result) = poisoned.into_inner();
            (guard, result.timed_out())
        }
    }
}

pub fn lock_rwlock_read<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("RwLock(read)", context);
            poisoned.into_inner()
        }
    }
}

pub fn lock_rwlock_write<'a, T>(lock: &'a RwLock<T>, context: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("RwLock(write)", context);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn poisoned_mutex_is_recovered() {
        let mutex = Arc::new(Mutex::new(5));
        let m = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m.lock().unwrap();
            panic!("poison it");
        })
        .join();

        assert!(mutex.is_poisoned());
        assert_eq!(*lock_mutex(&mutex, "test"), 5);
    }

    #[test]
    fn poisoned_rwlock_is_recovered() {
        let lock = Arc::new(RwLock::new(String::from("cam0")));
        let l = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = l.write().unwrap();
            panic!("poison it");
        })
        .join();

        assert!(lock.is_poisoned());
        lock_rwlock_write(&lock, "test").push('!');
        assert_eq!(*lock_rwlock_read(&lock, "test"), "cam0!");
    }

    #[test]
    fn guard_outlives_context_string() {
        let mutex = Mutex::new(1);
        let mut guard = {
            let context = format!("scope-{}", 1);
            lock_mutex(&mutex, &context)
        };
        *guard += 1;
        drop(guard);
        assert_eq!(*lock_mutex(&mutex, "test"), 2);
    }

    #[test]
    fn wait_reports_timeout() {
        let mutex = Mutex::new(false);
        let condvar = Condvar::new();
        let guard = lock_mutex(&mutex, "test");
        let (_guard, timed_out) =
            wait_while_timeout(&condvar, guard, Duration::from_millis(10), "test", |ready| {
                !*ready
            });
        assert!(timed_out);
    }
}
