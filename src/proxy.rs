use std::fmt;
use std::rc::Rc;

use crate::error::{report, ReactiveError};
use crate::handlers::{handler_for, ProxyHandler};
use crate::key::{ContainerKind, Key, TargetId};
use crate::{Target, Value};

/// Which interception rules a wrapper applies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Flavor {
	Reactive,
	ShallowReactive,
	Readonly,
	ShallowReadonly,
}

impl Flavor {
	pub(crate) const COUNT: usize = 4;

	#[inline]
	pub fn is_readonly(self) -> bool {
		matches!(self, Flavor::Readonly | Flavor::ShallowReadonly)
	}

	#[inline]
	pub fn is_shallow(self) -> bool {
		matches!(self, Flavor::ShallowReactive | Flavor::ShallowReadonly)
	}

	fn slot(self) -> usize {
		self as usize
	}
}

pub(crate) struct ProxyInner {
	target: Target,
	flavor: Flavor,
}

/// An intercepting wrapper around a raw `Target`.
#[derive(Clone)]
pub struct Proxy {
	inner: Rc<ProxyInner>,
}

impl Proxy {
	/// The cached wrapper of `flavor` for `target`, created on first use.
	fn of(target: &Target, flavor: Flavor) -> Proxy {
		if let Some(inner) = target.inner.proxies.borrow()[flavor.slot()].upgrade() {
			return Proxy { inner };
		}

		let inner = Rc::new(ProxyInner {
			target: target.clone(),
			flavor,
		});
		target.inner.proxies.borrow_mut()[flavor.slot()] = Rc::downgrade(&inner);
		Proxy { inner }
	}

	/// The raw object behind this wrapper.
	#[inline]
	pub fn target(&self) -> &Target {
		&self.inner.target
	}

	#[inline]
	pub fn id(&self) -> TargetId {
		self.inner.target.id()
	}

	#[inline]
	pub fn kind(&self) -> ContainerKind {
		self.inner.target.kind()
	}

	#[inline]
	pub fn flavor(&self) -> Flavor {
		self.inner.flavor
	}

	pub fn is_reactive(&self) -> bool {
		!self.inner.flavor.is_readonly()
	}

	pub fn is_readonly(&self) -> bool {
		self.inner.flavor.is_readonly()
	}

	pub fn is_shallow(&self) -> bool {
		self.inner.flavor.is_shallow()
	}

	pub fn ptr_eq(&self, other: &Proxy) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	#[inline]
	pub(crate) fn handler(&self) -> &'static dyn ProxyHandler {
		handler_for(self.kind(), self.inner.flavor)
	}

	pub fn get(&self, key: impl Into<Key>) -> Value {
		self.handler().get(self, &key.into())
	}

	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
		self.handler().set(self, key.into(), value.into())
	}

	pub fn delete(&self, key: impl Into<Key>) -> bool {
		self.handler().delete(self, &key.into())
	}

	pub fn has(&self, key: impl Into<Key>) -> bool {
		self.handler().has(self, &key.into())
	}

	pub fn keys(&self) -> Vec<Key> {
		self.handler().own_keys(self)
	}
}

impl fmt::Debug for Proxy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}({:?})", self.inner.flavor, self.inner.target)
	}
}

fn create(value: Value, flavor: Flavor) -> Value {
	match value {
		Value::Object(target) => {
			if target.is_marked_raw() {
				Value::Object(target)
			} else {
				Value::Proxy(Proxy::of(&target, flavor))
			}
		}
		// An existing wrapper is returned as is, except that a read-only
		// view can be taken of a mutable one.
		Value::Proxy(proxy) => {
			if flavor.is_readonly() && !proxy.is_readonly() {
				Value::Proxy(Proxy::of(proxy.target(), flavor))
			} else {
				Value::Proxy(proxy)
			}
		}
		Value::Ref(r) => Value::Ref(r),
		other => {
			report(ReactiveError::NotAnObject(format!("{:?}", other)));
			other
		}
	}
}

/// Deep mutable wrapper. Idempotent: the same raw target always yields the
/// same wrapper while it is alive.
pub fn reactive(value: impl Into<Value>) -> Value {
	create(value.into(), Flavor::Reactive)
}

/// Only top-level reads and writes are intercepted.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
	create(value.into(), Flavor::ShallowReactive)
}

/// Deep read-only wrapper: writes are reported and ignored, reads are not
/// tracked.
pub fn readonly(value: impl Into<Value>) -> Value {
	create(value.into(), Flavor::Readonly)
}

pub fn shallow_readonly(value: impl Into<Value>) -> Value {
	create(value.into(), Flavor::ShallowReadonly)
}

/// `reactive` for aggregates; everything else passes through silently.
pub fn to_reactive(value: &Value) -> Value {
	if value.is_object() {
		reactive(value.clone())
	} else {
		value.clone()
	}
}

/// `readonly` for aggregates; everything else passes through silently.
pub fn to_readonly(value: &Value) -> Value {
	if value.is_object() {
		readonly(value.clone())
	} else {
		value.clone()
	}
}

/// Strip a wrapper, if any.
pub fn to_raw(value: &Value) -> Value {
	match value {
		Value::Proxy(proxy) => Value::Object(proxy.target().clone()),
		other => other.clone(),
	}
}

pub fn is_reactive(value: &Value) -> bool {
	matches!(value, Value::Proxy(p) if p.is_reactive())
}

/// Read-only wrappers, and read-only reference cells.
pub fn is_readonly(value: &Value) -> bool {
	match value {
		Value::Proxy(p) => p.is_readonly(),
		Value::Ref(r) => r.is_readonly(),
		_ => false,
	}
}

pub fn is_shallow(value: &Value) -> bool {
	match value {
		Value::Proxy(p) => p.is_shallow(),
		Value::Ref(r) => r.is_shallow(),
		_ => false,
	}
}

pub fn is_proxy(value: &Value) -> bool {
	matches!(value, Value::Proxy(_))
}

/// Flag `target` so that it is never wrapped.
pub fn mark_raw(target: &Target) -> Value {
	target.mark_raw();
	Value::Object(target.clone())
}
