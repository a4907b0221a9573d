use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::effect::{EffectDeps, EffectInner};
use crate::Effect;

/// The set of effects subscribed to one (object, key) pair.
///
/// Effects are held weakly: an effect owns its deps, never the other way
/// around. Two marker words let a running effect diff its old and new
/// dependencies in place, one bit per nesting depth.
#[derive(Clone, Default)]
pub struct Dep {
	inner: Rc<DepInner>,
}

#[derive(Default)]
struct DepInner {
	subscribers: RefCell<IndexMap<u64, Weak<EffectInner>, FxBuildHasher>>,
	/// Was tracked before the current run at this depth.
	w: Cell<u32>,
	/// Tracked again during the current run at this depth.
	n: Cell<u32>,
}

impl Dep {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline]
	pub(crate) fn was_tracked(&self, bit: u32) -> bool {
		self.inner.w.get() & bit != 0
	}

	#[inline]
	pub(crate) fn new_tracked(&self, bit: u32) -> bool {
		self.inner.n.get() & bit != 0
	}

	#[inline]
	pub(crate) fn mark_was_tracked(&self, bit: u32) {
		self.inner.w.set(self.inner.w.get() | bit);
	}

	#[inline]
	pub(crate) fn mark_new_tracked(&self, bit: u32) {
		self.inner.n.set(self.inner.n.get() | bit);
	}

	#[inline]
	fn clear_bits(&self, bit: u32) {
		self.inner.w.set(self.inner.w.get() & !bit);
		self.inner.n.set(self.inner.n.get() & !bit);
	}

	pub(crate) fn has(&self, effect_id: u64) -> bool {
		self.inner.subscribers.borrow().contains_key(&effect_id)
	}

	pub(crate) fn add(&self, effect: &Rc<EffectInner>) {
		self.inner
			.subscribers
			.borrow_mut()
			.insert(effect.id, Rc::downgrade(effect));
	}

	pub(crate) fn remove(&self, effect_id: u64) {
		self.inner.subscribers.borrow_mut().shift_remove(&effect_id);
	}

	/// Live subscribers in subscription order. The borrow is released
	/// before the caller gets to run anything.
	pub(crate) fn subscribers(&self) -> Vec<Rc<EffectInner>> {
		self.inner
			.subscribers
			.borrow()
			.values()
			.filter_map(Weak::upgrade)
			.collect()
	}

	pub fn len(&self) -> usize {
		self.inner
			.subscribers
			.borrow()
			.values()
			.filter(|e| e.strong_count() > 0)
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, effect: &Effect) -> bool {
		self.has(effect.id())
	}

	pub fn ptr_eq(&self, other: &Dep) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}

/// Flag every current dependency as "was tracked" at this depth.
pub(crate) fn init_markers(deps: &EffectDeps, bit: u32) {
	for dep in deps.iter() {
		dep.mark_was_tracked(bit);
	}
}

/// Drop deps that were tracked before the run but not during it, keep the
/// rest in order, and reset both markers for the next run at this depth.
pub(crate) fn finalize_markers(deps: &mut EffectDeps, effect_id: u64, bit: u32) {
	deps.retain(|dep| {
		let stale = dep.was_tracked(bit) && !dep.new_tracked(bit);
		if stale {
			dep.remove(effect_id);
		}
		dep.clear_bits(bit);
		!stale
	});
}
