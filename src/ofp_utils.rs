use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// A cancellable repeating task on its own named thread.
///
/// The body runs once per `interval`, starting one interval after spawn. It
/// may stop the task itself by returning `false`; `cancel()` stops it from
/// outside and takes effect without waiting out the current interval.
pub struct RepeatingTask {
    cancelled: Arc<AtomicBool>,
    signal: Arc<(Mutex<bool>, Condvar)>,
}

impl RepeatingTask {
    pub fn spawn<F>(name: &str, interval: Duration, mut body: F) -> RepeatingTask
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let signal = Arc::new((Mutex::new(false), Condvar::new()));

        let thread_cancelled = cancelled.clone();
        let thread_signal = signal.clone();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (ref lock, ref cvar) = *thread_signal;
                loop {
                    let stop = lock.lock().unwrap();
                    let (stop, _) = cvar.wait_timeout_while(stop, interval, |s| !*s).unwrap();
                    let stopping = *stop;
                    drop(stop);
                    if stopping || thread_cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    if !body() {
                        return;
                    }
                }
            });
        if let Err(e) = spawned {
            error!("Failed to spawn task thread {}: {}", name, e);
        }

        RepeatingTask { cancelled, signal }
    }

    /// Stop the task. Idempotent; the body never runs again after this
    /// returns (a run already in progress completes).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let (ref lock, ref cvar) = *self.signal;
        let mut stop = lock.lock().unwrap();
        *stop = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task_runs = runs.clone();
        let task = RepeatingTask::spawn("test-task", Duration::from_millis(10), move || {
            task_runs.fetch_add(1, Ordering::SeqCst);
            true
        });

        while runs.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(5));
        }
        task.cancel();
        assert!(task.is_cancelled());

        let after_cancel = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        // One run may have been in flight while cancel was called.
        assert!(runs.load(Ordering::SeqCst) <= after_cancel + 1);
    }

    #[test]
    fn test_body_can_stop_itself() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task_runs = runs.clone();
        let _task = RepeatingTask::spawn("test-once", Duration::from_millis(5), move || {
            task_runs.fetch_add(1, Ordering::SeqCst);
            false
        });

        thread::sleep(Duration::from_millis(60));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
