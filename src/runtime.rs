use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::effect::EffectInner;
use crate::graph::Graph;
use crate::scope::ScopeInner;

/// Per-thread execution context: everything a track or trigger call needs
/// to know about "who is running right now".
pub(crate) struct Runtime {
	pub(crate) active_effect: RefCell<Option<Rc<EffectInner>>>,
	pub(crate) active_scope: RefCell<Option<Rc<ScopeInner>>>,
	pub(crate) should_track: Cell<bool>,
	track_stack: RefCell<Vec<bool>>,
	/// Nesting depth of running effects.
	pub(crate) depth: Cell<u32>,
	/// `1 << depth`, the marker bit owned by the innermost running effect.
	pub(crate) track_op_bit: Cell<u32>,
	pub(crate) graph: Graph,
	next_effect: Cell<u64>,
}

impl Runtime {
	fn new() -> Self {
		Runtime {
			active_effect: RefCell::new(None),
			active_scope: RefCell::new(None),
			should_track: Cell::new(true),
			track_stack: RefCell::new(Vec::new()),
			depth: Cell::new(0),
			track_op_bit: Cell::new(1),
			graph: Graph::default(),
			next_effect: Cell::new(1),
		}
	}

	pub(crate) fn next_effect_id(&self) -> u64 {
		let id = self.next_effect.get();
		self.next_effect.set(id + 1);
		id
	}

	pub(crate) fn active_effect(&self) -> Option<Rc<EffectInner>> {
		self.active_effect.borrow().clone()
	}

	pub(crate) fn is_active(&self, effect: &Rc<EffectInner>) -> bool {
		matches!(&*self.active_effect.borrow(), Some(active) if Rc::ptr_eq(active, effect))
	}
}

thread_local! {
	static RUNTIME: Runtime = Runtime::new();
}

pub(crate) fn with_runtime<R>(func: impl FnOnce(&Runtime) -> R) -> R {
	RUNTIME.with(func)
}

/// Like `with_runtime`, but quietly does nothing once the thread-local
/// has been torn down. Used from `Drop` impls.
pub(crate) fn try_with_runtime(func: impl FnOnce(&Runtime)) {
	let _ = RUNTIME.try_with(func);
}

/// Suspend tracking until the matching `reset_tracking`.
pub fn pause_tracking() {
	with_runtime(|rt| {
		rt.track_stack.borrow_mut().push(rt.should_track.get());
		rt.should_track.set(false);
	})
}

/// Force tracking on until the matching `reset_tracking`.
pub fn enable_tracking() {
	with_runtime(|rt| {
		rt.track_stack.borrow_mut().push(rt.should_track.get());
		rt.should_track.set(true);
	})
}

/// Restore the tracking state saved by the last pause/enable.
pub fn reset_tracking() {
	with_runtime(|rt| {
		let last = rt.track_stack.borrow_mut().pop();
		rt.should_track.set(last.unwrap_or(true));
	})
}

/// Whether a read right now would record a dependency.
pub fn is_tracking() -> bool {
	with_runtime(|rt| rt.should_track.get() && rt.active_effect.borrow().is_some())
}

struct ResetTracking;

impl Drop for ResetTracking {
	fn drop(&mut self) {
		reset_tracking();
	}
}

/// Run `func` with tracking suspended. Nests, and restores on unwind.
pub fn untracked<R>(func: impl FnOnce() -> R) -> R {
	pause_tracking();
	let _reset = ResetTracking;
	func()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn should_track() -> bool {
		with_runtime(|rt| rt.should_track.get())
	}

	#[test]
	fn tracking_flag_nests() {
		assert!(should_track());
		pause_tracking();
		assert!(!should_track());
		enable_tracking();
		assert!(should_track());
		reset_tracking();
		assert!(!should_track());
		reset_tracking();
		assert!(should_track());
	}

	#[test]
	fn untracked_restores_previous_state() {
		pause_tracking();
		untracked(|| assert!(!should_track()));
		assert!(!should_track());
		reset_tracking();

		untracked(|| assert!(!should_track()));
		assert!(should_track());
	}
}
