use std::cell::RefCell;

use fxhash::{FxBuildHasher, FxHashMap};
use indexmap::IndexMap;

use crate::key::{ContainerKind, Key, TargetId, TriggerOp};
use crate::runtime::with_runtime;
use crate::{Dep, Value};

type KeyDeps = IndexMap<Key, Dep, FxBuildHasher>;

/// object -> key -> subscribers.
///
/// Keys are `TargetId`s rather than the objects themselves, so the graph
/// never keeps an object alive. A target removes its own row when its last
/// handle is dropped (see `Target`), or explicitly via `detach`.
#[derive(Default)]
pub(crate) struct Graph {
	targets: RefCell<FxHashMap<TargetId, KeyDeps>>,
}

impl Graph {
	pub(crate) fn get_or_create_entry(&self, target: TargetId, key: Key) -> Dep {
		self.targets
			.borrow_mut()
			.entry(target)
			.or_default()
			.entry(key)
			.or_default()
			.clone()
	}

	pub(crate) fn entry(&self, target: TargetId, key: &Key) -> Option<Dep> {
		self.targets
			.borrow()
			.get(&target)
			.and_then(|deps| deps.get(key))
			.cloned()
	}

	pub(crate) fn entries(&self, target: TargetId) -> Vec<(Key, Dep)> {
		self.targets
			.borrow()
			.get(&target)
			.map(|deps| deps.iter().map(|(k, d)| (k.clone(), d.clone())).collect())
			.unwrap_or_default()
	}

	pub(crate) fn detach(&self, target: TargetId) -> bool {
		self.targets.borrow_mut().remove(&target).is_some()
	}

	/// `detach` for drop paths: skipped if the graph is mid-borrow.
	pub(crate) fn release(&self, target: TargetId) {
		let removed = match self.targets.try_borrow_mut() {
			Ok(mut targets) => targets.remove(&target),
			Err(_) => None,
		};
		drop(removed);
	}

	/// Which entries a write of kind `op` to `key` must notify.
	pub(crate) fn resolve(
		&self,
		target: TargetId,
		op: TriggerOp,
		key: Option<&Key>,
		new_value: Option<&Value>,
	) -> Vec<Dep> {
		let targets = self.targets.borrow();
		let deps = match targets.get(&target) {
			Some(deps) => deps,
			None => return Vec::new(),
		};

		let kind = target.kind();
		let mut out = Vec::new();

		if op == TriggerOp::Clear {
			out.extend(deps.values().cloned());
			return out;
		}

		if kind == ContainerKind::Sequence && key.map_or(false, Key::is_length) {
			let new_length = new_value.and_then(Value::as_length).unwrap_or(0);
			for (key, dep) in deps {
				let dropped = key.as_index().map_or(false, |i| i >= new_length);
				if dropped || key.is_length() {
					out.push(dep.clone());
				}
			}
			return out;
		}

		let mut push = |key: &Key| {
			if let Some(dep) = deps.get(key) {
				out.push(dep.clone());
			}
		};

		if let Some(key) = key {
			push(key);
		}

		match (op, kind) {
			(TriggerOp::Add, ContainerKind::Sequence) => {
				if key.and_then(Key::as_index).is_some() {
					push(&Key::length());
				}
			}
			(TriggerOp::Add | TriggerOp::Delete, ContainerKind::Record) => push(&Key::Iterate),
			(TriggerOp::Add | TriggerOp::Delete, ContainerKind::Map) => {
				push(&Key::Iterate);
				push(&Key::MapKeyIterate);
			}
			(TriggerOp::Set, ContainerKind::Map) => push(&Key::Iterate),
			_ => {}
		}

		out
	}
}

/// Entry for (target, key), created empty if missing.
pub fn get_or_create_entry(target: TargetId, key: Key) -> Dep {
	with_runtime(|rt| rt.graph.get_or_create_entry(target, key))
}

/// Every entry currently held for `target`, in creation order.
pub fn tracked_entries(target: TargetId) -> Vec<(Key, Dep)> {
	with_runtime(|rt| rt.graph.entries(target))
}

/// Entries a write would notify. Untracked targets resolve to nothing.
pub fn resolve_subscribers(
	target: TargetId,
	op: TriggerOp,
	key: Option<&Key>,
	new_value: Option<&Value>,
) -> Vec<Dep> {
	with_runtime(|rt| rt.graph.resolve(target, op, key, new_value))
}

/// Release every entry held for `target`. Returns whether it had any.
pub fn detach(target: TargetId) -> bool {
	with_runtime(|rt| rt.graph.detach(target))
}
