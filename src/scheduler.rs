use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use fxhash::FxHashMap;

use crate::config::config;
use crate::error::{call_with_error_handling, report, ErrorCode, ReactiveError};
use crate::host::{default_host, FlushHandle, Host};
use crate::Effect;

static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

struct JobInner {
	serial: u64,
	id: Option<u64>,
	active: Cell<bool>,
	allow_recurse: Cell<bool>,
	func: Box<dyn Fn()>,
}

/// A unit of deferred work. Jobs are compared by identity: queueing the
/// same job twice before it runs is a no-op.
#[derive(Clone)]
pub struct Job {
	inner: Rc<JobInner>,
}

impl Job {
	/// A job without an ordering id. It runs after every job that has one.
	pub fn new(func: impl Fn() + 'static) -> Self {
		Self::create(None, Box::new(func))
	}

	/// Jobs run in ascending `id` order within a cycle.
	pub fn with_id(id: u64, func: impl Fn() + 'static) -> Self {
		Self::create(Some(id), Box::new(func))
	}

	fn create(id: Option<u64>, func: Box<dyn Fn()>) -> Self {
		Job {
			inner: Rc::new(JobInner {
				serial: NEXT_JOB.fetch_add(1, Ordering::Relaxed),
				id,
				active: Cell::new(true),
				allow_recurse: Cell::new(false),
				func,
			}),
		}
	}

	#[inline]
	pub fn id(&self) -> Option<u64> {
		self.inner.id
	}

	fn sort_key(&self) -> u64 {
		self.inner.id.unwrap_or(u64::MAX)
	}

	pub fn is_active(&self) -> bool {
		self.inner.active.get()
	}

	/// An inactive job stays queued but is skipped when its turn comes.
	pub fn set_active(&self, active: bool) {
		self.inner.active.set(active);
	}

	pub fn allow_recurse(&self) -> bool {
		self.inner.allow_recurse.get()
	}

	/// Let the job re-queue itself while it is running.
	pub fn set_allow_recurse(&self, allow: bool) {
		self.inner.allow_recurse.set(allow);
	}

	pub fn run(&self) {
		(self.inner.func)()
	}

	pub fn ptr_eq(&self, other: &Job) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> WeakJob {
		WeakJob(Rc::downgrade(&self.inner))
	}
}

impl fmt::Debug for Job {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Job")
			.field("id", &self.inner.id)
			.field("active", &self.inner.active.get())
			.finish()
	}
}

#[derive(Clone, Default)]
pub(crate) struct WeakJob(Weak<JobInner>);

impl WeakJob {
	pub(crate) fn upgrade(&self) -> Option<Job> {
		self.0.upgrade().map(|inner| Job { inner })
	}
}

/// A callback bucket drained in one pass: new callbacks land in `pending`
/// while `active` is being run.
#[derive(Default)]
struct Bucket {
	pending: RefCell<Vec<Job>>,
	active: RefCell<Option<Vec<Job>>>,
	index: Cell<usize>,
}

impl Bucket {
	fn contains_from(&self, job: &Job) -> bool {
		match &*self.active.borrow() {
			Some(active) => {
				let from = self.index.get() + usize::from(job.allow_recurse());
				active.iter().skip(from).any(|j| j.ptr_eq(job))
			}
			None => false,
		}
	}

	fn take_pending(&self) -> Vec<Job> {
		let pending = std::mem::take(&mut *self.pending.borrow_mut());
		dedup(pending)
	}

	fn job_at(&self, index: usize) -> Option<Job> {
		self.active.borrow().as_ref().and_then(|a| a.get(index).cloned())
	}
}

fn dedup(jobs: Vec<Job>) -> Vec<Job> {
	let mut out: Vec<Job> = Vec::with_capacity(jobs.len());
	for job in jobs {
		if !out.iter().any(|j| j.ptr_eq(&job)) {
			out.push(job);
		}
	}
	out
}

struct Scheduler {
	is_flushing: Cell<bool>,
	is_flush_pending: Cell<bool>,
	queue: RefCell<Vec<Job>>,
	flush_index: Cell<usize>,
	pre: Bucket,
	post: Bucket,
	pre_flush_parent: RefCell<Option<Job>>,
	/// Runs per job serial within one top-level flush.
	seen: RefCell<FxHashMap<u64, u32>>,
	current_flush: RefCell<Option<FlushHandle>>,
	host: RefCell<Rc<dyn Host>>,
}

impl Scheduler {
	fn new() -> Self {
		Scheduler {
			is_flushing: Cell::new(false),
			is_flush_pending: Cell::new(false),
			queue: RefCell::new(Vec::new()),
			flush_index: Cell::new(0),
			pre: Bucket::default(),
			post: Bucket::default(),
			pre_flush_parent: RefCell::new(None),
			seen: RefCell::new(FxHashMap::default()),
			current_flush: RefCell::new(None),
			host: RefCell::new(default_host()),
		}
	}

	/// First index after `flush_index` whose job id is not below `id`.
	fn find_insertion_index(&self, id: u64) -> usize {
		let queue = self.queue.borrow();
		let mut start = (self.flush_index.get() + 1).min(queue.len());
		let mut end = queue.len();
		while start < end {
			let middle = (start + end) / 2;
			if queue[middle].sort_key() < id {
				start = middle + 1;
			} else {
				end = middle;
			}
		}
		start
	}

	fn is_queued(&self, job: &Job) -> bool {
		let from = if self.is_flushing.get() && job.allow_recurse() {
			self.flush_index.get() + 1
		} else {
			self.flush_index.get()
		};
		self.queue.borrow().iter().skip(from).any(|j| j.ptr_eq(job))
	}

	fn has_work(&self) -> bool {
		!self.queue.borrow().is_empty()
			|| !self.pre.pending.borrow().is_empty()
			|| !self.post.pending.borrow().is_empty()
	}

	/// Outside any flush or callback pass, counts from earlier passes no
	/// longer apply.
	fn reset_seen_if_idle(&self) {
		let idle = !self.is_flushing.get()
			&& self.pre.active.borrow().is_none()
			&& self.post.active.borrow().is_none();
		if idle {
			self.seen.borrow_mut().clear();
		}
	}

	/// Count a run of `job`. True once it has exceeded the limit, in which
	/// case it must be skipped.
	fn check_recursive_updates(&self, job: &Job) -> bool {
		let limit = config().recursion_limit;
		let exceeded = {
			let mut seen = self.seen.borrow_mut();
			let count = seen.entry(job.inner.serial).or_insert(0);
			if *count > limit {
				true
			} else {
				*count += 1;
				false
			}
		};
		if exceeded {
			tracing::warn!(job = ?job, limit, "job skipped: maximum recursive updates exceeded");
			report(ReactiveError::RecursionLimit { limit });
		}
		exceeded
	}
}

thread_local! {
	static SCHEDULER: Scheduler = Scheduler::new();
}

fn with_scheduler<R>(func: impl FnOnce(&Scheduler) -> R) -> R {
	SCHEDULER.with(func)
}

fn queue_flush() {
	let host = with_scheduler(|s| {
		if s.is_flushing.get() || s.is_flush_pending.get() {
			return None;
		}
		s.is_flush_pending.set(true);
		*s.current_flush.borrow_mut() = Some(FlushHandle::pending());
		Some(s.host.borrow().clone())
	});

	if let Some(host) = host {
		tracing::trace!("flush requested");
		host.request_flush(Box::new(|| {
			if with_scheduler(|s| s.is_flush_pending.get()) {
				flush_jobs();
			}
		}));
	}
}

/// Queue `job` for the next flush. Jobs with an id are kept sorted by id;
/// a job already waiting is not queued twice, nor is the job whose
/// pre-flush callbacks are currently being drained.
pub fn queue_job(job: &Job) {
	let queued = with_scheduler(|s| {
		if s.is_queued(job) {
			return false;
		}
		if matches!(&*s.pre_flush_parent.borrow(), Some(parent) if parent.ptr_eq(job)) {
			return false;
		}

		match job.id() {
			None => s.queue.borrow_mut().push(job.clone()),
			Some(id) => {
				let index = s.find_insertion_index(id);
				s.queue.borrow_mut().insert(index, job.clone());
			}
		}
		true
	});

	if queued {
		queue_flush();
	}
}

/// Remove a waiting job. Jobs at or before the flush cursor are left alone.
pub fn invalidate_job(job: &Job) {
	with_scheduler(|s| {
		let mut queue = s.queue.borrow_mut();
		if let Some(index) = queue.iter().position(|j| j.ptr_eq(job)) {
			if !s.is_flushing.get() || index > s.flush_index.get() {
				queue.remove(index);
			}
		}
	})
}

fn queue_cb(job: &Job, bucket: impl Fn(&Scheduler) -> &Bucket) {
	with_scheduler(|s| {
		let bucket = bucket(s);
		if !bucket.contains_from(job) {
			bucket.pending.borrow_mut().push(job.clone());
		}
	});
	queue_flush();
}

/// Run `job` before the main queue of the next flush.
pub fn queue_pre_flush_cb(job: &Job) {
	queue_cb(job, |s| &s.pre)
}

/// Run `job` after the main queue of the next flush.
pub fn queue_post_flush_cb(job: &Job) {
	queue_cb(job, |s| &s.post)
}

/// Drain the pre-flush bucket until it stays empty. While draining,
/// `parent` cannot be queued.
pub fn flush_pre_flush_cbs(parent: Option<&Job>) {
	with_scheduler(Scheduler::reset_seen_if_idle);
	loop {
		let active = with_scheduler(|s| s.pre.take_pending());
		if active.is_empty() {
			break;
		}

		with_scheduler(|s| {
			*s.pre_flush_parent.borrow_mut() = parent.cloned();
			*s.pre.active.borrow_mut() = Some(active);
			s.pre.index.set(0);
		});

		loop {
			let job = match with_scheduler(|s| s.pre.job_at(s.pre.index.get())) {
				Some(job) => job,
				None => break,
			};
			let skip = with_scheduler(|s| s.check_recursive_updates(&job));
			if !skip && job.is_active() {
				call_with_error_handling(ErrorCode::PreFlushCallback, || job.run());
			}
			with_scheduler(|s| s.pre.index.set(s.pre.index.get() + 1));
		}

		with_scheduler(|s| {
			*s.pre.active.borrow_mut() = None;
			s.pre.index.set(0);
			*s.pre_flush_parent.borrow_mut() = None;
		});
	}
}

/// Drain the post-flush bucket in id order. Called again while already
/// draining, it appends to the running pass instead.
pub fn flush_post_flush_cbs() {
	with_scheduler(Scheduler::reset_seen_if_idle);
	flush_pre_flush_cbs(None);

	let started = with_scheduler(|s| {
		let mut deduped = s.post.take_pending();
		if deduped.is_empty() {
			return false;
		}
		let mut active = s.post.active.borrow_mut();
		if let Some(active) = active.as_mut() {
			active.append(&mut deduped);
			return false;
		}
		deduped.sort_by_key(Job::sort_key);
		*active = Some(deduped);
		s.post.index.set(0);
		true
	});

	if !started {
		return;
	}

	loop {
		let job = match with_scheduler(|s| s.post.job_at(s.post.index.get())) {
			Some(job) => job,
			None => break,
		};
		let skip = with_scheduler(|s| s.check_recursive_updates(&job));
		if !skip && job.is_active() {
			call_with_error_handling(ErrorCode::PostFlushCallback, || job.run());
		}
		with_scheduler(|s| s.post.index.set(s.post.index.get() + 1));
	}

	with_scheduler(|s| {
		*s.post.active.borrow_mut() = None;
		s.post.index.set(0);
	});
}

/// Run every queued job and callback now, repeating until nothing new is
/// queued. Does nothing when called from inside a flush.
pub fn flush_jobs() {
	let entered = with_scheduler(|s| {
		if s.is_flushing.get() {
			return false;
		}
		s.seen.borrow_mut().clear();
		true
	});
	if !entered {
		return;
	}

	loop {
		with_scheduler(|s| {
			s.is_flush_pending.set(false);
			s.is_flushing.set(true);
		});

		flush_pre_flush_cbs(None);

		with_scheduler(|s| s.queue.borrow_mut().sort_by_key(Job::sort_key));
		tracing::trace!(jobs = with_scheduler(|s| s.queue.borrow().len()), "flush");

		with_scheduler(|s| s.flush_index.set(0));
		loop {
			let job = with_scheduler(|s| s.queue.borrow().get(s.flush_index.get()).cloned());
			let job = match job {
				Some(job) => job,
				None => break,
			};
			if job.is_active() && !with_scheduler(|s| s.check_recursive_updates(&job)) {
				call_with_error_handling(ErrorCode::Scheduler, || job.run());
			}
			with_scheduler(|s| s.flush_index.set(s.flush_index.get() + 1));
		}

		let finished = with_scheduler(|s| {
			s.flush_index.set(0);
			std::mem::take(&mut *s.queue.borrow_mut())
		});
		drop(finished);

		flush_post_flush_cbs();

		let done = with_scheduler(|s| {
			s.is_flushing.set(false);
			!s.has_work()
		});
		if done {
			break;
		}
	}

	let handle = with_scheduler(|s| s.current_flush.borrow_mut().take());
	if let Some(handle) = handle {
		handle.settle();
	}
}

/// Settles once the pending flush (if any) has run.
pub fn next_tick() -> FlushHandle {
	with_scheduler(|s| s.current_flush.borrow().clone()).unwrap_or_else(FlushHandle::settled)
}

/// Drive the installed host. Returns the number of tasks it ran.
pub fn run_pending_tasks() -> usize {
	let host = with_scheduler(|s| s.host.borrow().clone());
	host.run_pending()
}

/// Replace the host that deferred flushes are handed to.
pub fn set_host(host: impl Host + 'static) {
	with_scheduler(|s| *s.host.borrow_mut() = Rc::new(host));
}

/// Whether a flush is currently running.
pub fn is_flushing() -> bool {
	with_scheduler(|s| s.is_flushing.get())
}

/// An effect whose re-runs are deferred to the main queue, ordered and
/// coalesced by the returned job (whose id is the effect's id).
pub fn queued_effect(func: impl Fn() + 'static) -> (Effect, Job) {
	let slot: Rc<RefCell<WeakJob>> = Rc::default();
	let effect = Effect::new(func, {
		let slot = slot.clone();
		Some(Rc::new(move || {
			let job = slot.borrow().upgrade();
			if let Some(job) = job {
				queue_job(&job);
			}
		}))
	});

	let job = Job::with_id(effect.id(), {
		let effect = effect.clone();
		move || {
			if effect.is_active() {
				effect.run();
			}
		}
	});
	job.set_allow_recurse(true);
	effect.set_allow_recurse(true);
	*slot.borrow_mut() = job.downgrade();

	(effect, job)
}
