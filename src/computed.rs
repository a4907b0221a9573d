use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::effect::Scheduler;
use crate::error::{report, ReactiveError};
use crate::reference::{track_ref_value, trigger_ref_value, Access};
use crate::{Dep, Effect, Ref, Value};

/// A lazily evaluated, cached derived value.
///
/// Invalidation is pushed: when a dependency changes, the value is only
/// marked dirty and its own readers are notified. Recomputation is pulled:
/// it happens on the next `get`.
pub struct Computed<T>
where
	T: Clone + 'static,
{
	body: Rc<ComputedBody<T>>,
}

impl<T> Clone for Computed<T>
where
	T: Clone + 'static,
{
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct ComputedBody<T>
where
	T: Clone + 'static,
{
	value: RefCell<Option<T>>,
	dirty: Cell<bool>,
	cacheable: bool,
	dep: Dep,
	effect: Effect,
	setter: Option<Box<dyn Fn(T)>>,
}

impl<T> Computed<T>
where
	T: Clone + 'static,
{
	pub fn new(getter: impl Fn() -> T + 'static) -> Self {
		Self::create(Box::new(getter), None, true)
	}

	/// A writable derived value: `set` forwards to `setter`.
	pub fn with_setter(getter: impl Fn() -> T + 'static, setter: impl Fn(T) + 'static) -> Self {
		Self::create(Box::new(getter), Some(Box::new(setter)), true)
	}

	/// Recomputes on every read, still tracking and notifying.
	pub fn uncached(getter: impl Fn() -> T + 'static) -> Self {
		Self::create(Box::new(getter), None, false)
	}

	fn create(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>, cacheable: bool) -> Self {
		Computed {
			body: Rc::new_cyclic(|this: &Weak<ComputedBody<T>>| {
				let func = {
					let this = this.clone();
					move || {
						if let Some(body) = this.upgrade() {
							let value = getter();
							*body.value.borrow_mut() = Some(value);
						}
					}
				};

				let scheduler: Scheduler = {
					let this = this.clone();
					Rc::new(move || {
						if let Some(body) = this.upgrade() {
							if !body.dirty.replace(true) {
								trigger_ref_value(&body.dep);
							}
						}
					})
				};

				let effect = Effect::new(func, Some(scheduler));
				effect.mark_computed();

				ComputedBody {
					value: RefCell::new(None),
					dirty: Cell::new(true),
					cacheable,
					dep: Dep::new(),
					effect,
					setter,
				}
			}),
		}
	}

	/// Current value, recomputed first if a dependency changed.
	///
	/// # Panics
	///
	/// Panics if the getter reads this same value while it is being
	/// computed for the first time. Use `try_get` where that can happen.
	#[inline]
	pub fn get(&self) -> T {
		self.body.get()
	}

	/// Like `get`, but `None` when no value has been computed yet, i.e.
	/// when read from inside its own first evaluation.
	pub fn try_get(&self) -> Option<T> {
		self.body.try_get()
	}

	/// Borrow the current value instead of cloning it.
	///
	/// # Panics
	///
	/// Same as `get`.
	pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		self.body.refresh();
		let value = self.body.value.borrow();
		func(value.as_ref().expect("computed value read during its own evaluation"))
	}

	pub fn set(&self, value: T) {
		self.body.set(value)
	}

	pub fn is_readonly(&self) -> bool {
		self.body.setter.is_none()
	}

	pub fn is_dirty(&self) -> bool {
		self.body.dirty.get()
	}

	/// The effect that evaluates the getter.
	pub fn effect(&self) -> &Effect {
		&self.body.effect
	}
}

impl<T> ComputedBody<T>
where
	T: Clone + 'static,
{
	fn refresh(&self) {
		track_ref_value(&self.dep);
		if self.dirty.get() || !self.cacheable {
			self.dirty.set(false);
			let evaluation = Evaluation::start(&self.dirty);
			self.effect.run();
			evaluation.finish();
		}
	}

	pub fn get(&self) -> T {
		self.try_get()
			.expect("computed value read during its own evaluation")
	}

	pub fn try_get(&self) -> Option<T> {
		self.refresh();
		self.value.borrow().clone()
	}

	pub fn set(&self, value: T) {
		match &self.setter {
			Some(setter) => setter(value),
			None => report(ReactiveError::ReadonlyComputed),
		}
	}
}

/// Puts the dirty flag back if the getter unwinds, so the next read
/// evaluates again.
struct Evaluation<'a> {
	dirty: &'a Cell<bool>,
	finished: bool,
}

impl<'a> Evaluation<'a> {
	fn start(dirty: &'a Cell<bool>) -> Self {
		Evaluation {
			dirty,
			finished: false,
		}
	}

	fn finish(mut self) {
		self.finished = true;
	}
}

impl<'a> Drop for Evaluation<'a> {
	fn drop(&mut self) {
		if !self.finished {
			self.dirty.set(true);
		}
	}
}

impl Access for ComputedBody<Value> {
	fn get(&self) -> Value {
		ComputedBody::get(self)
	}

	fn set(&self, value: Value) {
		ComputedBody::set(self, value)
	}

	fn is_readonly(&self) -> bool {
		self.setter.is_none()
	}

	fn trigger(&self) {
		trigger_ref_value(&self.dep);
	}
}

impl From<Computed<Value>> for Ref {
	fn from(computed: Computed<Value>) -> Self {
		Ref::from_access(computed.body)
	}
}

impl From<Computed<Value>> for Value {
	fn from(computed: Computed<Value>) -> Self {
		Value::Ref(computed.into())
	}
}

impl<T> fmt::Debug for Computed<T>
where
	T: Clone + fmt::Debug + 'static,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Computed")
			.field("value", &self.body.value.borrow())
			.field("dirty", &self.body.dirty.get())
			.finish()
	}
}
