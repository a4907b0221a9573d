use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::effect::{track_dep, trigger_effects};
use crate::key::{Key, TrackOp, TriggerOp};
use crate::proxy::{is_readonly, is_shallow, to_raw, to_reactive};
use crate::runtime::untracked;
use crate::{Dep, Value};

/// Anything that can sit behind a reference cell.
pub trait Access: 'static {
	fn get(&self) -> Value;
	fn set(&self, value: Value);

	fn is_readonly(&self) -> bool {
		false
	}

	fn is_shallow(&self) -> bool {
		false
	}

	/// Notify dependents without a write.
	fn trigger(&self) {}
}

/// A single-slot reactive container. Reading `get` inside an effect
/// subscribes the effect to the cell itself.
#[derive(Clone)]
pub struct Ref {
	body: Rc<dyn Access>,
}

impl Ref {
	/// A deep cell: aggregates stored in it are handed out reactive.
	pub fn new(value: impl Into<Value>) -> Self {
		Self::from_access(Rc::new(RefBody::new(value.into(), false)))
	}

	/// Stores and hands out values as given.
	pub fn shallow(value: impl Into<Value>) -> Self {
		Self::from_access(Rc::new(RefBody::new(value.into(), true)))
	}

	pub fn from_access(body: Rc<dyn Access>) -> Self {
		Ref { body }
	}

	#[inline]
	pub fn get(&self) -> Value {
		self.body.get()
	}

	#[inline]
	pub fn set(&self, value: impl Into<Value>) {
		self.body.set(value.into())
	}

	/// Force dependents to re-run, e.g. after mutating a shallow cell's
	/// contents in place.
	pub fn trigger(&self) {
		self.body.trigger()
	}

	pub fn is_readonly(&self) -> bool {
		self.body.is_readonly()
	}

	pub fn is_shallow(&self) -> bool {
		self.body.is_shallow()
	}

	pub fn ptr_eq(&self, other: &Ref) -> bool {
		self.addr() == other.addr()
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.body) as *const () as usize
	}
}

impl fmt::Debug for Ref {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let value = untracked(|| self.body.get());
		write!(f, "Ref({:?})", value)
	}
}

struct RefBody {
	raw: RefCell<Value>,
	value: RefCell<Value>,
	dep: Dep,
	shallow: bool,
}

impl RefBody {
	fn new(value: Value, shallow: bool) -> Self {
		let (raw, value) = if shallow {
			(value.clone(), value)
		} else {
			(to_raw(&value), to_reactive(&value))
		};
		RefBody {
			raw: RefCell::new(raw),
			value: RefCell::new(value),
			dep: Dep::new(),
			shallow,
		}
	}
}

impl Access for RefBody {
	fn get(&self) -> Value {
		track_ref_value(&self.dep);
		self.value.borrow().clone()
	}

	fn set(&self, value: Value) {
		let direct = self.shallow || is_shallow(&value) || is_readonly(&value);
		let value = if direct { value } else { to_raw(&value) };

		if !Value::has_changed(&value, &self.raw.borrow()) {
			return;
		}

		let stored = if direct { value.clone() } else { to_reactive(&value) };
		*self.raw.borrow_mut() = value;
		let previous = self.value.replace(stored);
		trigger_ref_value(&self.dep);
		drop(previous);
	}

	fn is_shallow(&self) -> bool {
		self.shallow
	}

	fn trigger(&self) {
		trigger_ref_value(&self.dep);
	}
}

/// A cell bound to one property of an object.
struct PropertyRef {
	object: Value,
	key: Key,
}

impl Access for PropertyRef {
	fn get(&self) -> Value {
		self.object.get(self.key.clone())
	}

	fn set(&self, value: Value) {
		self.object.set(self.key.clone(), value);
	}
}

pub(crate) fn track_ref_value(dep: &Dep) {
	track_dep(dep, || (None, TrackOp::Get, None));
}

pub(crate) fn trigger_ref_value(dep: &Dep) {
	trigger_effects(std::slice::from_ref(dep), None, TriggerOp::Set, None);
}

/// A cell reading and writing `object[key]`. If the property already holds
/// a cell, that cell is returned.
pub fn to_ref(object: &Value, key: impl Into<Key>) -> Ref {
	let key = key.into();
	if let Value::Ref(existing) = to_raw(object).get(key.clone()) {
		return existing;
	}
	Ref::from_access(Rc::new(PropertyRef {
		object: object.clone(),
		key,
	}))
}

pub fn is_ref(value: &Value) -> bool {
	value.is_ref()
}

/// The contents of a cell, or the value itself.
pub fn unref(value: &Value) -> Value {
	match value {
		Value::Ref(r) => r.get(),
		other => other.clone(),
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use super::*;
	use crate::effect::effect;
	use crate::proxy::{reactive, readonly};
	use crate::Target;

	#[test]
	fn cells_are_tracked() {
		let count = Ref::new(0);
		let runs = Rc::new(Cell::new(0));
		let _e = effect({
			let count = count.clone();
			let runs = runs.clone();
			move || {
				count.get();
				runs.set(runs.get() + 1);
			}
		});

		count.set(1);
		count.set(1);
		assert_eq!(runs.get(), 2);

		count.trigger();
		assert_eq!(runs.get(), 3);
	}

	#[test]
	fn deep_cells_wrap_aggregates() {
		let raw = Target::record();
		let cell = Ref::new(raw.clone());
		assert_eq!(cell.get(), reactive(raw.clone()));

		let shallow = Ref::shallow(raw.clone());
		assert_eq!(shallow.get(), Value::from(raw.clone()));

		let view = readonly(raw);
		cell.set(view.clone());
		assert_eq!(cell.get(), view);
	}

	#[test]
	fn property_cells_follow_the_object() {
		let state = reactive(Target::record_from([("a", 1)]));
		let a = to_ref(&state, "a");
		assert_eq!(a.get(), Value::from(1));
		a.set(2);
		assert_eq!(state.get("a"), Value::from(2));

		let existing = Ref::new(5);
		let holder = reactive(Target::record_from([("c", existing.clone())]));
		assert!(to_ref(&holder, "c").ptr_eq(&existing));
	}

	#[test]
	fn unref_passes_plain_values() {
		assert_eq!(unref(&Value::from(Ref::new(3))), Value::from(3));
		assert_eq!(unref(&Value::from(3)), Value::from(3));
		assert!(is_ref(&Value::from(Ref::new(3))));
	}
}
