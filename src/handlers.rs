use crate::collections::{
	MUTABLE_COLLECTION, READONLY_COLLECTION, SHALLOW_COLLECTION, SHALLOW_READONLY_COLLECTION,
};
use crate::effect::{track, trigger};
use crate::error::{report, ReactiveError};
use crate::key::{ContainerKind, Key, TrackOp, TriggerOp};
use crate::proxy::{is_readonly, is_shallow, to_raw, to_reactive, to_readonly, Flavor};
use crate::{Proxy, Value};

/// Interception rules for one wrapper flavor over one container kind.
///
/// Each method receives the wrapper; the raw object is `proxy.target()`.
pub(crate) trait ProxyHandler {
	fn get(&self, proxy: &Proxy, key: &Key) -> Value;
	fn set(&self, proxy: &Proxy, key: Key, value: Value) -> bool;
	fn delete(&self, proxy: &Proxy, key: &Key) -> bool;
	fn has(&self, proxy: &Proxy, key: &Key) -> bool;
	fn own_keys(&self, proxy: &Proxy) -> Vec<Key>;
}

pub(crate) struct MutableHandler {
	shallow: bool,
}

pub(crate) struct ReadonlyHandler {
	shallow: bool,
}

static MUTABLE: MutableHandler = MutableHandler { shallow: false };
static SHALLOW_MUTABLE: MutableHandler = MutableHandler { shallow: true };
static READONLY: ReadonlyHandler = ReadonlyHandler { shallow: false };
static SHALLOW_READONLY: ReadonlyHandler = ReadonlyHandler { shallow: true };

pub(crate) fn handler_for(kind: ContainerKind, flavor: Flavor) -> &'static dyn ProxyHandler {
	match (kind, flavor) {
		(ContainerKind::Map, Flavor::Reactive) => &MUTABLE_COLLECTION,
		(ContainerKind::Map, Flavor::ShallowReactive) => &SHALLOW_COLLECTION,
		(ContainerKind::Map, Flavor::Readonly) => &READONLY_COLLECTION,
		(ContainerKind::Map, Flavor::ShallowReadonly) => &SHALLOW_READONLY_COLLECTION,
		(_, Flavor::Reactive) => &MUTABLE,
		(_, Flavor::ShallowReactive) => &SHALLOW_MUTABLE,
		(_, Flavor::Readonly) => &READONLY,
		(_, Flavor::ShallowReadonly) => &SHALLOW_READONLY,
	}
}

/// Wrap a nested aggregate the way its parent is wrapped.
pub(crate) fn wrap_nested(value: Value, readonly: bool) -> Value {
	if readonly {
		to_readonly(&value)
	} else {
		to_reactive(&value)
	}
}

fn base_get(proxy: &Proxy, key: &Key, readonly: bool, shallow: bool) -> Value {
	let target = proxy.target();
	let value = target.get(key);

	if !key.is_trackable() {
		return value;
	}

	if !readonly {
		track(target.id(), TrackOp::Get, key.clone());
	}

	if shallow {
		return value;
	}

	match value {
		// Cells stored in a sequence slot are handed out as is.
		Value::Ref(r) if !(target.kind() == ContainerKind::Sequence && key.as_index().is_some()) => {
			r.get()
		}
		value if value.is_object() => wrap_nested(value, readonly),
		value => value,
	}
}

impl ProxyHandler for MutableHandler {
	fn get(&self, proxy: &Proxy, key: &Key) -> Value {
		base_get(proxy, key, false, self.shallow)
	}

	fn set(&self, proxy: &Proxy, key: Key, value: Value) -> bool {
		let target = proxy.target();
		let is_sequence = target.kind() == ContainerKind::Sequence;
		let mut old = target.get(&key);
		let mut value = value;

		if let Value::Ref(r) = &old {
			if r.is_readonly() && !value.is_ref() {
				return false;
			}
		}

		if !self.shallow {
			if !is_shallow(&value) && !is_readonly(&value) {
				value = to_raw(&value);
				old = to_raw(&old);
			}
			if !is_sequence {
				if let (Value::Ref(r), false) = (&old, value.is_ref()) {
					r.set(value);
					return true;
				}
			}
		}

		let had_key = match (is_sequence, key.as_index()) {
			(true, Some(index)) => index < target.len(),
			_ => target.has(&key),
		};

		if !target.set(key.clone(), value.clone()) {
			return false;
		}

		if !had_key {
			trigger(target.id(), TriggerOp::Add, Some(key), Some(&value), None);
		} else if Value::has_changed(&value, &old) {
			trigger(target.id(), TriggerOp::Set, Some(key), Some(&value), Some(&old));
		}
		true
	}

	fn delete(&self, proxy: &Proxy, key: &Key) -> bool {
		let target = proxy.target();
		let had_key = target.has(key);
		let old = target.get(key);
		let deleted = target.delete(key);
		if deleted && had_key {
			trigger(target.id(), TriggerOp::Delete, Some(key.clone()), None, Some(&old));
		}
		deleted
	}

	fn has(&self, proxy: &Proxy, key: &Key) -> bool {
		let target = proxy.target();
		let result = target.has(key);
		if key.is_trackable() {
			track(target.id(), TrackOp::Has, key.clone());
		}
		result
	}

	fn own_keys(&self, proxy: &Proxy) -> Vec<Key> {
		let target = proxy.target();
		let key = match target.kind() {
			ContainerKind::Sequence => Key::length(),
			_ => Key::Iterate,
		};
		track(target.id(), TrackOp::Iterate, key);
		target.keys()
	}
}

impl ProxyHandler for ReadonlyHandler {
	fn get(&self, proxy: &Proxy, key: &Key) -> Value {
		base_get(proxy, key, true, self.shallow)
	}

	fn set(&self, _proxy: &Proxy, key: Key, _value: Value) -> bool {
		report(ReactiveError::ReadonlyWrite { key });
		true
	}

	fn delete(&self, _proxy: &Proxy, key: &Key) -> bool {
		report(ReactiveError::ReadonlyDelete { key: key.clone() });
		true
	}

	fn has(&self, proxy: &Proxy, key: &Key) -> bool {
		proxy.target().has(key)
	}

	fn own_keys(&self, proxy: &Proxy) -> Vec<Key> {
		proxy.target().keys()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::{Cell, RefCell};
	use std::rc::Rc;

	use super::*;
	use crate::effect::effect;
	use crate::error::{reset_error_handler, set_error_handler};
	use crate::proxy::{reactive, readonly, shallow_reactive};
	use crate::reference::Ref;
	use crate::Target;

	fn counter() -> Rc<Cell<u32>> {
		Rc::new(Cell::new(0))
	}

	#[test]
	fn reads_are_tracked_per_key() {
		let state = reactive(Target::record_from([("a", 1), ("b", 2)]));
		let runs = counter();
		let _e = effect({
			let state = state.clone();
			let runs = runs.clone();
			move || {
				state.get("a");
				runs.set(runs.get() + 1);
			}
		});

		state.set("b", 3);
		assert_eq!(runs.get(), 1);
		state.set("a", 5);
		assert_eq!(runs.get(), 2);
		state.set("a", 5);
		assert_eq!(runs.get(), 2);
	}

	#[test]
	fn nan_writes_are_not_changes() {
		let state = reactive(Target::record_from([("n", f64::NAN)]));
		let runs = counter();
		let _e = effect({
			let state = state.clone();
			let runs = runs.clone();
			move || {
				state.get("n");
				runs.set(runs.get() + 1);
			}
		});
		state.set("n", f64::NAN);
		assert_eq!(runs.get(), 1);
	}

	#[test]
	fn nested_objects_are_wrapped_lazily() {
		let inner = Target::record_from([("x", 1)]);
		let state = reactive(Target::record_from([("inner", inner.clone())]));
		let nested = state.get("inner");
		assert_eq!(nested, reactive(inner.clone()));
		assert_eq!(readonly(state.clone()).get("inner"), readonly(inner));
	}

	#[test]
	fn stored_values_are_raw() {
		let inner = Target::record();
		let state = reactive(Target::record());
		state.set("inner", reactive(inner.clone()));
		let raw = to_raw(&state);
		assert_eq!(raw.get("inner"), Value::from(inner));
	}

	#[test]
	fn added_keys_notify_iteration() {
		let state = reactive(Target::record());
		let seen = Rc::new(RefCell::new(Vec::new()));
		let _e = effect({
			let state = state.clone();
			let seen = seen.clone();
			move || seen.borrow_mut().push(state.keys().len())
		});

		state.set("a", 1);
		state.set("a", 2);
		state.delete("a");
		assert_eq!(seen.borrow().as_slice(), [0, 1, 0]);
	}

	#[test]
	fn has_is_tracked() {
		let state = reactive(Target::record());
		let runs = counter();
		let _e = effect({
			let state = state.clone();
			let runs = runs.clone();
			move || {
				state.has("a");
				runs.set(runs.get() + 1);
			}
		});
		state.set("a", 1);
		assert_eq!(runs.get(), 2);
	}

	#[test]
	fn length_shrink_notifies_dropped_indices() {
		let list = reactive(Target::sequence([1, 2, 3, 4]));
		let runs = counter();
		let _e = effect({
			let list = list.clone();
			let runs = runs.clone();
			move || {
				list.get(3usize);
				runs.set(runs.get() + 1);
			}
		});
		list.set("length", 2);
		assert_eq!(runs.get(), 2);
		assert_eq!(list.get("length"), Value::from(2));
	}

	#[test]
	fn refs_are_unwrapped_except_in_sequences() {
		let count = Ref::new(1);
		let record = reactive(Target::record_from([("count", count.clone())]));
		assert_eq!(record.get("count"), Value::from(1));

		record.set("count", 2);
		assert_eq!(count.get(), Value::from(2));

		let list = reactive(Target::sequence([count.clone()]));
		assert!(list.get(0usize).is_ref());
	}

	#[test]
	fn readonly_and_shallow_values_write_through_cells() {
		let cell = Ref::new(1);
		let raw = Target::record_from([("c", cell.clone())]);
		let state = reactive(raw.clone());

		let view = readonly(Target::record());
		assert!(state.set("c", view.clone()));
		assert!(raw.get(&Key::from("c")).as_ref_cell().map_or(false, |r| r.ptr_eq(&cell)));
		assert_eq!(cell.get(), view);

		let shallow = shallow_reactive(Target::record());
		assert!(state.set("c", shallow.clone()));
		assert!(raw.get(&Key::from("c")).is_ref());
		assert_eq!(cell.get(), shallow);
	}

	#[test]
	fn shallow_skips_wrapping() {
		let inner = Target::record();
		let state = shallow_reactive(Target::record_from([("inner", inner.clone())]));
		assert_eq!(state.get("inner"), Value::from(inner));
	}

	#[test]
	fn readonly_rejects_writes() {
		let errors = Rc::new(RefCell::new(Vec::new()));
		set_error_handler({
			let errors = errors.clone();
			move |e| errors.borrow_mut().push(e.to_string())
		});

		let raw = Target::record_from([("a", 1)]);
		let view = readonly(raw.clone());
		assert!(view.set("a", 2));
		assert!(view.delete("a"));
		reset_error_handler();

		assert_eq!(raw.get(&Key::from("a")), Value::from(1));
		assert_eq!(errors.borrow().len(), 2);
	}
}
