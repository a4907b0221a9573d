use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::effect::WeakEffect;
use crate::error::{call_with_error_handling, ErrorCode};
use crate::scheduler::{queue_post_flush_cb, queue_pre_flush_cb};
use crate::{Effect, Job, Value};

/// When a watcher re-runs relative to the flush cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Flush {
	/// Before the main queue.
	#[default]
	Pre,
	/// After the main queue.
	Post,
	/// Synchronously, inside the triggering write.
	Sync,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
	pub immediate: bool,
	pub deep: bool,
	pub flush: Flush,
}

impl WatchOptions {
	pub fn immediate(mut self) -> Self {
		self.immediate = true;
		self
	}

	pub fn deep(mut self) -> Self {
		self.deep = true;
		self
	}

	pub fn flush(mut self, flush: Flush) -> Self {
		self.flush = flush;
		self
	}
}

/// Keeps a watcher alive. Dropping it has the same effect as `stop`,
/// unless an effect scope still holds the watcher.
pub struct WatchHandle {
	effect: Effect,
}

impl WatchHandle {
	pub fn stop(&self) {
		self.effect.stop();
	}

	pub fn is_active(&self) -> bool {
		self.effect.is_active()
	}

	pub fn effect(&self) -> &Effect {
		&self.effect
	}
}

/// Wire `effect` to re-run through `job` according to `flush`.
fn schedule(flush: Flush, slot: Rc<RefCell<Option<Job>>>) -> crate::effect::Scheduler {
	Rc::new(move || {
		let job = slot.borrow().clone();
		if let Some(job) = job {
			match flush {
				Flush::Sync => job.run(),
				Flush::Pre => queue_pre_flush_cb(&job),
				Flush::Post => queue_post_flush_cb(&job),
			}
		}
	})
}

fn run_if_active(effect: &WeakEffect) -> bool {
	match effect.upgrade() {
		Some(effect) if effect.is_active() => {
			effect.run();
			true
		}
		_ => false,
	}
}

/// Run `func` now and again whenever what it read changes.
pub fn watch_effect(func: impl Fn() + 'static, flush: Flush) -> WatchHandle {
	let slot: Rc<RefCell<Option<Job>>> = Rc::default();
	let effect = Effect::new(
		move || {
			call_with_error_handling(ErrorCode::WatchCallback, &func);
		},
		Some(schedule(flush, slot.clone())),
	);

	let job = Job::new({
		let effect = effect.downgrade();
		move || {
			run_if_active(&effect);
		}
	});
	*slot.borrow_mut() = Some(job.clone());

	if flush == Flush::Post {
		queue_post_flush_cb(&job);
	} else {
		effect.run();
	}

	WatchHandle { effect }
}

/// Call `callback(new, old)` whenever `getter`'s result changes.
///
/// Changes are compared with same-value equality, except that a `deep`
/// watcher fires on every nested write. The first call after an
/// `immediate` start receives `Undefined` as the old value.
pub fn watch(
	getter: impl Fn() -> Value + 'static,
	callback: impl Fn(&Value, &Value) + 'static,
	options: WatchOptions,
) -> WatchHandle {
	let deep = options.deep;
	let latest: Rc<RefCell<Value>> = Rc::default();
	let old: Rc<RefCell<Option<Value>>> = Rc::default();
	let slot: Rc<RefCell<Option<Job>>> = Rc::default();

	let effect = Effect::new(
		{
			let latest = latest.clone();
			move || {
				let mut value = Value::Undefined;
				call_with_error_handling(ErrorCode::WatchGetter, || {
					value = getter();
					if deep {
						traverse(&value);
					}
				});
				*latest.borrow_mut() = value;
			}
		},
		Some(schedule(options.flush, slot.clone())),
	);

	let job = Job::new({
		let effect = effect.downgrade();
		let latest = latest.clone();
		let old = old.clone();
		move || {
			if !run_if_active(&effect) {
				return;
			}
			let new = latest.borrow().clone();
			let changed = deep || old.borrow().as_ref().map_or(true, |old| Value::has_changed(&new, old));
			if changed {
				let previous = old.borrow().clone().unwrap_or_default();
				call_with_error_handling(ErrorCode::WatchCallback, || callback(&new, &previous));
				*old.borrow_mut() = Some(new);
			}
		}
	});
	job.set_allow_recurse(true);
	*slot.borrow_mut() = Some(job.clone());

	if options.immediate {
		job.run();
	} else {
		effect.run();
		*old.borrow_mut() = Some(latest.borrow().clone());
	}

	WatchHandle { effect }
}

struct Seen {
	targets: FxHashSet<u64>,
	refs: FxHashSet<usize>,
}

/// Read everything reachable from `value`, so the running effect depends
/// on every nested property.
pub fn traverse(value: &Value) -> Value {
	let mut seen = Seen {
		targets: FxHashSet::default(),
		refs: FxHashSet::default(),
	};
	traverse_into(value, &mut seen);
	value.clone()
}

fn traverse_into(value: &Value, seen: &mut Seen) {
	match value {
		Value::Ref(r) => {
			if seen.refs.insert(r.addr()) {
				traverse_into(&r.get(), seen);
			}
		}
		Value::Proxy(proxy) => {
			if seen.targets.insert(proxy.id().serial()) {
				for (_, nested) in proxy.entries() {
					traverse_into(&nested, seen);
				}
			}
		}
		Value::Object(target) => {
			if !target.is_marked_raw() && seen.targets.insert(target.id().serial()) {
				for nested in target.values() {
					traverse_into(&nested, seen);
				}
			}
		}
		_ => {}
	}
}
