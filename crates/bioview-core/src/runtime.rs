use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::task::{Context, Poll, Waker};
use std::thread::ThreadId;

use crate::platform::RuntimeScheduler;

type UiTask = Box<dyn FnOnce() + Send + 'static>;
type LocalTask = Box<dyn FnOnce() + 'static>;

struct UiDispatcherInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    tx: mpsc::Sender<UiTask>,
    pending: AtomicUsize,
}

impl UiDispatcherInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>, tx: mpsc::Sender<UiTask>) -> Self {
        Self {
            scheduler,
            tx,
            pending: AtomicUsize::new(0),
        }
    }

    fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Box::new(task)).is_err() {
            // Receiver is gone with the runtime; nothing will ever drain this.
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::debug!("runtime dropped, discarding posted UI task");
            return;
        }
        self.scheduler.schedule_frame();
    }

    fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

struct PendingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> PendingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        Self { counter }
    }
}

impl<'a> Drop for PendingGuard<'a> {
    fn drop(&mut self) {
        let previous = self.counter.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "UI dispatcher pending count underflowed");
    }
}

/// Thread-safe entry point for work that must finish on the UI thread.
///
/// Query services that perform their I/O on a worker thread hand results back
/// through this.
#[derive(Clone)]
pub struct UiDispatcher {
    inner: Arc<UiDispatcherInner>,
}

impl UiDispatcher {
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.inner.post(task);
    }

    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }
}

struct TaskEntry {
    id: u64,
    future: Pin<Box<dyn Future<Output = ()> + 'static>>,
}

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    ui_dispatcher: Arc<UiDispatcherInner>,
    ui_rx: RefCell<mpsc::Receiver<UiTask>>,
    local_tasks: RefCell<VecDeque<LocalTask>>,
    ui_thread_id: ThreadId,
    tasks: RefCell<Vec<TaskEntry>>,
    next_task_id: Cell<u64>,
    task_waker: RefCell<Option<Waker>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        let (tx, rx) = mpsc::channel();
        let dispatcher = Arc::new(UiDispatcherInner::new(scheduler.clone(), tx));
        Self {
            scheduler,
            ui_dispatcher: dispatcher,
            ui_rx: RefCell::new(rx),
            local_tasks: RefCell::new(VecDeque::new()),
            ui_thread_id: std::thread::current().id(),
            tasks: RefCell::new(Vec::new()),
            next_task_id: Cell::new(1),
            task_waker: RefCell::new(None),
        }
    }

    fn init_task_waker(this: &Rc<Self>) {
        let waker = RuntimeTaskWaker {
            scheduler: Arc::clone(&this.scheduler),
        }
        .into_waker();
        *this.task_waker.borrow_mut() = Some(waker);
    }

    fn enqueue_ui_task(&self, task: LocalTask) {
        self.local_tasks.borrow_mut().push_back(task);
        self.scheduler.schedule_frame();
    }

    fn spawn_ui_task(&self, future: Pin<Box<dyn Future<Output = ()> + 'static>>) -> u64 {
        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);
        self.tasks.borrow_mut().push(TaskEntry { id, future });
        self.scheduler.schedule_frame();
        id
    }

    fn cancel_task(&self, id: u64) {
        self.tasks.borrow_mut().retain(|entry| entry.id != id);
    }

    /// Polls every pending future once. Futures spawned while polling are
    /// picked up on the next round.
    fn poll_async_tasks(&self) -> bool {
        let waker = match self.task_waker.borrow().as_ref() {
            Some(waker) => waker.clone(),
            None => return false,
        };
        let mut cx = Context::from_waker(&waker);
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        let mut pending = Vec::with_capacity(tasks.len());
        let mut made_progress = false;
        for mut entry in tasks {
            match entry.future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => made_progress = true,
                Poll::Pending => pending.push(entry),
            }
        }
        if !pending.is_empty() {
            let mut tasks = self.tasks.borrow_mut();
            // Keep spawn order: survivors first, then anything spawned mid-poll.
            let spawned = std::mem::take(&mut *tasks);
            tasks.extend(pending);
            tasks.extend(spawned);
        }
        made_progress
    }

    fn drain_ui(&self) {
        debug_assert_eq!(
            std::thread::current().id(),
            self.ui_thread_id,
            "runtime drained off its UI thread",
        );
        loop {
            let mut executed = false;

            {
                let posted: Vec<UiTask> = self.ui_rx.borrow_mut().try_iter().collect();
                for task in posted {
                    executed = true;
                    let _guard = PendingGuard::new(&self.ui_dispatcher.pending);
                    task();
                }
            }

            loop {
                let task = self.local_tasks.borrow_mut().pop_front();
                match task {
                    Some(task) => {
                        executed = true;
                        task();
                    }
                    None => break,
                }
            }

            if self.poll_async_tasks() {
                executed = true;
            }

            if !executed {
                break;
            }
        }
    }

    fn has_pending_ui(&self) -> bool {
        let local_pending = self
            .local_tasks
            .try_borrow()
            .map(|tasks| !tasks.is_empty())
            .unwrap_or(true);
        let async_pending = self
            .tasks
            .try_borrow()
            .map(|tasks| !tasks.is_empty())
            .unwrap_or(true);
        local_pending || async_pending || self.ui_dispatcher.has_pending()
    }
}

/// Owner of the UI-thread executor. Dropping it drops every pending task.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        let inner = Rc::new(RuntimeInner::new(scheduler));
        RuntimeInner::init_task_waker(&inner);
        Self { inner }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Rc::downgrade(&self.inner),
            dispatcher: UiDispatcher {
                inner: Arc::clone(&self.inner.ui_dispatcher),
            },
        }
    }
}

/// Weak, cloneable access to a [`Runtime`]. Every operation is a no-op once
/// the runtime is gone.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
    dispatcher: UiDispatcher,
}

pub struct TaskHandle {
    id: u64,
    runtime: RuntimeHandle,
}

impl RuntimeHandle {
    /// Schedules a closure for the next drain.
    ///
    /// The closure never leaves the UI thread, so it may capture `Rc`/`RefCell`
    /// values. If the runtime is gone the closure runs immediately.
    pub fn enqueue_ui_task(&self, task: Box<dyn FnOnce() + 'static>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.enqueue_ui_task(task);
        } else {
            task();
        }
    }

    /// Spawns a UI-thread future. Returns `None` if the runtime is gone.
    pub fn spawn_ui<F>(&self, fut: F) -> Option<TaskHandle>
    where
        F: Future<Output = ()> + 'static,
    {
        self.inner.upgrade().map(|inner| {
            let id = inner.spawn_ui_task(Box::pin(fut));
            TaskHandle {
                id,
                runtime: self.clone(),
            }
        })
    }

    pub fn cancel_task(&self, id: u64) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_task(id);
        }
    }

    /// Enqueues work from any thread to run on the UI thread.
    pub fn post_ui(&self, task: impl FnOnce() + Send + 'static) {
        self.dispatcher.post(task);
    }

    pub fn drain_ui(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.drain_ui();
        }
    }

    pub fn has_pending_ui(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.has_pending_ui())
            .unwrap_or_else(|| self.dispatcher.has_pending())
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn dispatcher(&self) -> UiDispatcher {
        self.dispatcher.clone()
    }
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(self) {
        self.runtime.cancel_task(self.id);
    }
}

struct RuntimeTaskWaker {
    scheduler: Arc<dyn RuntimeScheduler>,
}

impl RuntimeTaskWaker {
    fn into_waker(self) -> Waker {
        futures_task::waker(Arc::new(self))
    }
}

impl futures_task::ArcWake for RuntimeTaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.scheduler.schedule_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DefaultScheduler;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct CountingScheduler {
        frames: AtomicUsize,
    }

    impl RuntimeScheduler for CountingScheduler {
        fn schedule_frame(&self) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Future that stays pending until its flag is raised.
    struct Gate {
        open: Rc<Cell<bool>>,
    }

    impl Future for Gate {
        type Output = ();

        fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
            if self.open.get() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        }
    }

    #[test]
    fn local_tasks_run_on_drain() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        let hits = Rc::new(Cell::new(0));

        let h = Rc::clone(&hits);
        handle.enqueue_ui_task(Box::new(move || h.set(h.get() + 1)));
        assert_eq!(hits.get(), 0);
        assert!(handle.has_pending_ui());

        handle.drain_ui();
        assert_eq!(hits.get(), 1);
        assert!(!handle.has_pending_ui());
    }

    #[test]
    fn spawned_future_completes_after_gate_opens() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        let open = Rc::new(Cell::new(false));
        let done = Rc::new(Cell::new(false));

        let gate = Gate {
            open: Rc::clone(&open),
        };
        let d = Rc::clone(&done);
        handle
            .spawn_ui(async move {
                gate.await;
                d.set(true);
            })
            .expect("runtime alive");

        handle.drain_ui();
        assert!(!done.get());
        assert!(handle.has_pending_ui());

        open.set(true);
        handle.drain_ui();
        assert!(done.get());
        assert!(!handle.has_pending_ui());
    }

    #[test]
    fn cancelled_task_never_resumes() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        let open = Rc::new(Cell::new(false));
        let done = Rc::new(Cell::new(false));

        let gate = Gate {
            open: Rc::clone(&open),
        };
        let d = Rc::clone(&done);
        let task = handle
            .spawn_ui(async move {
                gate.await;
                d.set(true);
            })
            .expect("runtime alive");
        handle.drain_ui();
        task.cancel();

        open.set(true);
        handle.drain_ui();
        assert!(!done.get());
    }

    #[test]
    fn post_ui_crosses_threads_and_schedules_frame() {
        let scheduler = Arc::new(CountingScheduler::default());
        let runtime = Runtime::new(scheduler.clone());
        let handle = runtime.handle();
        let flag = Arc::new(AtomicBool::new(false));

        let dispatcher = handle.dispatcher();
        let f = Arc::clone(&flag);
        std::thread::spawn(move || {
            dispatcher.post(move || f.store(true, Ordering::SeqCst));
        })
        .join()
        .expect("worker thread panicked");

        assert!(scheduler.frames.load(Ordering::SeqCst) >= 1);
        assert!(handle.has_pending_ui());
        handle.drain_ui();
        assert!(flag.load(Ordering::SeqCst));
        assert!(!handle.has_pending_ui());
    }

    #[test]
    fn handle_outlives_runtime() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let handle = runtime.handle();
        drop(runtime);

        assert!(!handle.is_alive());
        assert!(handle.spawn_ui(async {}).is_none());
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        handle.enqueue_ui_task(Box::new(move || r.set(true)));
        assert!(ran.get());
    }
}
