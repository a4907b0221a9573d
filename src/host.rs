use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

pub type Task = Box<dyn FnOnce()>;

/// Where the scheduler defers its flush to.
///
/// The scheduler requests at most one flush per cycle; the host decides
/// when it runs (a microtask, an event-loop turn, an explicit pump).
pub trait Host {
	fn request_flush(&self, task: Task);

	/// Run whatever is due. Returns the number of tasks run.
	fn run_pending(&self) -> usize {
		0
	}
}

/// In-process FIFO of deferred tasks, drained by `run_pending_tasks`.
#[derive(Default)]
pub struct TaskQueue {
	tasks: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.tasks.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.tasks.borrow().is_empty()
	}
}

impl Host for TaskQueue {
	fn request_flush(&self, task: Task) {
		self.tasks.borrow_mut().push_back(task);
	}

	fn run_pending(&self) -> usize {
		let mut count = 0;
		loop {
			let task = self.tasks.borrow_mut().pop_front();
			match task {
				Some(task) => {
					task();
					count += 1;
				}
				None => break count,
			}
		}
	}
}

/// Posts flushes to the browser microtask queue.
#[cfg(target_arch = "wasm32")]
pub struct Microtask;

#[cfg(target_arch = "wasm32")]
impl Host for Microtask {
	fn request_flush(&self, task: Task) {
		crate::microtask::queue_task(task);
	}
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn default_host() -> Rc<dyn Host> {
	Rc::new(Microtask)
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn default_host() -> Rc<dyn Host> {
	Rc::new(TaskQueue::new())
}

struct FlushState {
	settled: Cell<bool>,
	wakers: RefCell<Vec<Waker>>,
}

/// Completion of a flush cycle. Await it, poll `is_settled`, or `wait` to
/// drive the host until it settles.
#[derive(Clone)]
pub struct FlushHandle {
	state: Rc<FlushState>,
}

impl FlushHandle {
	pub(crate) fn pending() -> Self {
		FlushHandle {
			state: Rc::new(FlushState {
				settled: Cell::new(false),
				wakers: RefCell::new(Vec::new()),
			}),
		}
	}

	pub(crate) fn settled() -> Self {
		let handle = Self::pending();
		handle.state.settled.set(true);
		handle
	}

	pub(crate) fn settle(&self) {
		self.state.settled.set(true);
		let wakers = std::mem::take(&mut *self.state.wakers.borrow_mut());
		for waker in wakers {
			waker.wake();
		}
	}

	pub fn is_settled(&self) -> bool {
		self.state.settled.get()
	}

	/// Pump the host until this flush completes. Returns early if the host
	/// has nothing left to run.
	pub fn wait(&self) -> bool {
		while !self.is_settled() {
			if crate::scheduler::run_pending_tasks() == 0 {
				break;
			}
		}
		self.is_settled()
	}
}

impl Future for FlushHandle {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
		if self.is_settled() {
			Poll::Ready(())
		} else {
			self.state.wakers.borrow_mut().push(cx.waker().clone());
			Poll::Pending
		}
	}
}
