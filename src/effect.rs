use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use fxhash::FxHashSet;
use smallvec::SmallVec;

use crate::config::config;
use crate::dep::{finalize_markers, init_markers};
use crate::key::{Key, TargetId, TrackOp, TriggerOp};
use crate::runtime::{with_runtime, Runtime};
use crate::scope::record_effect_scope;
use crate::{Dep, EffectScope, Value};

pub(crate) type EffectDeps = SmallVec<[Dep; 4]>;

/// Custom re-run strategy. Called instead of `run` when a dependency
/// changes.
pub type Scheduler = Rc<dyn Fn()>;

type Hook = Box<dyn Fn(&DebuggerEvent)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
	Track(TrackOp),
	Trigger(TriggerOp),
}

/// Passed to `on_track` / `on_trigger` hooks.
#[derive(Clone, Debug)]
pub struct DebuggerEvent {
	pub effect: u64,
	/// `None` for reference cells and derived values, which are their own
	/// single-key targets.
	pub target: Option<TargetId>,
	pub op: Operation,
	pub key: Option<Key>,
}

#[derive(Default)]
pub struct EffectOptions {
	pub lazy: bool,
	pub scheduler: Option<Scheduler>,
	pub scope: Option<EffectScope>,
	pub allow_recurse: bool,
	pub on_stop: Option<Box<dyn Fn()>>,
	pub on_track: Option<Hook>,
	pub on_trigger: Option<Hook>,
}

impl EffectOptions {
	pub fn lazy(mut self) -> Self {
		self.lazy = true;
		self
	}

	pub fn scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
		self.scheduler = Some(Rc::new(scheduler));
		self
	}

	pub fn scope(mut self, scope: &EffectScope) -> Self {
		self.scope = Some(scope.clone());
		self
	}

	pub fn allow_recurse(mut self) -> Self {
		self.allow_recurse = true;
		self
	}

	pub fn on_stop(mut self, hook: impl Fn() + 'static) -> Self {
		self.on_stop = Some(Box::new(hook));
		self
	}

	pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
		self.on_track = Some(Box::new(hook));
		self
	}

	pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
		self.on_trigger = Some(Box::new(hook));
		self
	}
}

pub(crate) struct EffectInner {
	pub(crate) id: u64,
	func: Box<dyn Fn()>,
	scheduler: Option<Scheduler>,
	active: Cell<bool>,
	allow_recurse: Cell<bool>,
	defer_stop: Cell<bool>,
	computed: Cell<bool>,
	pub(crate) deps: RefCell<EffectDeps>,
	parent: RefCell<Option<Rc<EffectInner>>>,
	on_stop: Option<Box<dyn Fn()>>,
	on_track: Option<Hook>,
	on_trigger: Option<Hook>,
}

impl Drop for EffectInner {
	fn drop(&mut self) {
		for dep in self.deps.get_mut().iter() {
			dep.remove(self.id);
		}
	}
}

/// A re-runnable computation whose reads are tracked.
///
/// Dropping the last handle unsubscribes it, the same as `stop` minus the
/// `on_stop` hook.
#[derive(Clone)]
pub struct Effect {
	pub(crate) inner: Rc<EffectInner>,
}

impl Effect {
	/// A lazy effect: nothing runs until `run` is called.
	#[must_use]
	pub fn new(func: impl Fn() + 'static, scheduler: Option<Scheduler>) -> Self {
		Self::with_options(
			Box::new(func),
			EffectOptions {
				lazy: true,
				scheduler,
				..Default::default()
			},
		)
	}

	fn with_options(func: Box<dyn Fn()>, options: EffectOptions) -> Self {
		let EffectOptions {
			scheduler,
			scope,
			allow_recurse,
			on_stop,
			on_track,
			on_trigger,
			..
		} = options;

		let effect = Effect {
			inner: Rc::new(EffectInner {
				id: with_runtime(Runtime::next_effect_id),
				func,
				scheduler,
				active: Cell::new(true),
				allow_recurse: Cell::new(allow_recurse),
				defer_stop: Cell::new(false),
				computed: Cell::new(false),
				deps: RefCell::new(EffectDeps::new()),
				parent: RefCell::new(None),
				on_stop,
				on_track,
				on_trigger,
			}),
		};
		record_effect_scope(&effect, scope.as_ref());
		effect
	}

	#[inline]
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	pub fn is_active(&self) -> bool {
		self.inner.active.get()
	}

	pub fn allow_recurse(&self) -> bool {
		self.inner.allow_recurse.get()
	}

	pub fn set_allow_recurse(&self, allow: bool) {
		self.inner.allow_recurse.set(allow);
	}

	/// Number of entries this effect currently subscribes to.
	pub fn dep_count(&self) -> usize {
		self.inner.deps.borrow().len()
	}

	pub(crate) fn mark_computed(&self) {
		self.inner.computed.set(true);
	}

	pub fn run(&self) {
		self.inner.run()
	}

	pub fn stop(&self) {
		self.inner.stop()
	}

	pub fn ptr_eq(&self, other: &Effect) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> WeakEffect {
		WeakEffect(Rc::downgrade(&self.inner))
	}
}

#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
	pub(crate) fn upgrade(&self) -> Option<Effect> {
		self.0.upgrade().map(|inner| Effect { inner })
	}
}

impl EffectInner {
	fn run(self: &Rc<Self>) {
		if !self.active.get() {
			(self.func)();
			return;
		}

		let parent = with_runtime(Runtime::active_effect);
		let mut cursor = parent.clone();
		while let Some(ancestor) = cursor {
			if Rc::ptr_eq(&ancestor, self) {
				return;
			}
			cursor = ancestor.parent.borrow().clone();
		}

		let _guard = RunGuard::enter(self, parent);
		(self.func)();
	}

	fn stop(&self) {
		let running = with_runtime(|rt| {
			matches!(&*rt.active_effect.borrow(), Some(active) if active.id == self.id)
		});

		if running {
			self.defer_stop.set(true);
		} else if self.active.get() {
			self.cleanup();
			if let Some(on_stop) = &self.on_stop {
				on_stop();
			}
			self.active.set(false);
		}
	}

	fn cleanup(&self) {
		let deps = std::mem::take(&mut *self.deps.borrow_mut());
		for dep in deps.iter() {
			dep.remove(self.id);
		}
	}
}

/// Pushes an effect as the active one and undoes it on every exit path.
struct RunGuard<'a> {
	effect: &'a Rc<EffectInner>,
	last_should_track: bool,
	use_markers: bool,
}

impl<'a> RunGuard<'a> {
	fn enter(effect: &'a Rc<EffectInner>, parent: Option<Rc<EffectInner>>) -> Self {
		let max_bits = config().max_marker_bits;
		*effect.parent.borrow_mut() = parent;

		with_runtime(|rt| {
			*rt.active_effect.borrow_mut() = Some(effect.clone());
			let last_should_track = rt.should_track.replace(true);

			let depth = rt.depth.get() + 1;
			rt.depth.set(depth);
			let use_markers = depth <= max_bits;

			if use_markers {
				let bit = 1 << depth;
				rt.track_op_bit.set(bit);
				init_markers(&effect.deps.borrow(), bit);
			} else {
				effect.cleanup();
			}

			RunGuard {
				effect,
				last_should_track,
				use_markers,
			}
		})
	}
}

impl<'a> Drop for RunGuard<'a> {
	fn drop(&mut self) {
		let effect = self.effect;
		with_runtime(|rt| {
			let depth = rt.depth.get();
			if self.use_markers {
				finalize_markers(&mut effect.deps.borrow_mut(), effect.id, rt.track_op_bit.get());
			}

			let depth = depth.saturating_sub(1);
			rt.depth.set(depth);
			rt.track_op_bit.set(1u32.checked_shl(depth).unwrap_or(0));

			*rt.active_effect.borrow_mut() = effect.parent.borrow_mut().take();
			rt.should_track.set(self.last_should_track);
		});

		if effect.defer_stop.replace(false) {
			effect.stop();
		}
	}
}

/// Create an effect and run it once right away (unless `lazy`).
#[must_use]
pub fn effect(func: impl Fn() + 'static) -> Effect {
	effect_with(func, EffectOptions::default())
}

#[must_use]
pub fn effect_with(func: impl Fn() + 'static, options: EffectOptions) -> Effect {
	let lazy = options.lazy;
	let effect = Effect::with_options(Box::new(func), options);
	if !lazy {
		effect.run();
	}
	effect
}

pub fn stop(effect: &Effect) {
	effect.stop()
}

/// Record that the active effect reads `dep`.
pub(crate) fn track_dep(
	dep: &Dep,
	event: impl FnOnce() -> (Option<TargetId>, TrackOp, Option<Key>),
) {
	let added = with_runtime(|rt| {
		if !rt.should_track.get() {
			return None;
		}
		let effect = rt.active_effect()?;
		if !effect.active.get() {
			return None;
		}

		let should_track = if rt.depth.get() <= config().max_marker_bits {
			let bit = rt.track_op_bit.get();
			if dep.new_tracked(bit) {
				false
			} else {
				dep.mark_new_tracked(bit);
				!dep.was_tracked(bit)
			}
		} else {
			!dep.has(effect.id)
		};

		if should_track {
			dep.add(&effect);
			effect.deps.borrow_mut().push(dep.clone());
			Some(effect)
		} else {
			None
		}
	});

	if let Some(effect) = added {
		if let Some(on_track) = &effect.on_track {
			let (target, op, key) = event();
			on_track(&DebuggerEvent {
				effect: effect.id,
				target,
				op: Operation::Track(op),
				key,
			});
		}
	}
}

/// Track a read of `key` on `target` by the active effect, if any.
pub fn track(target: TargetId, op: TrackOp, key: Key) {
	let tracking = with_runtime(|rt| rt.should_track.get() && rt.active_effect.borrow().is_some());
	if !tracking {
		return;
	}

	let dep = with_runtime(|rt| rt.graph.get_or_create_entry(target, key.clone()));
	track_dep(&dep, || (Some(target), op, Some(key)));
}

/// Notify every effect depending on what a write of kind `op` changed.
pub fn trigger(
	target: TargetId,
	op: TriggerOp,
	key: Option<Key>,
	new_value: Option<&Value>,
	old_value: Option<&Value>,
) {
	let deps = with_runtime(|rt| rt.graph.resolve(target, op, key.as_ref(), new_value));
	if deps.is_empty() {
		return;
	}

	tracing::trace!(
		target = target.serial(),
		?op,
		?key,
		?new_value,
		?old_value,
		deps = deps.len(),
		"trigger"
	);

	trigger_effects(&deps, Some(target), op, key);
}

/// Notify the subscribers of `deps`, each effect at most once, derived
/// values first so their dependents observe them already dirty.
pub(crate) fn trigger_effects(deps: &[Dep], target: Option<TargetId>, op: TriggerOp, key: Option<Key>) {
	let mut seen = FxHashSet::default();
	let mut computed = Vec::new();
	let mut plain = Vec::new();

	for dep in deps {
		for effect in dep.subscribers() {
			if seen.insert(effect.id) {
				if effect.computed.get() {
					computed.push(effect);
				} else {
					plain.push(effect);
				}
			}
		}
	}

	for effect in computed.iter().chain(plain.iter()) {
		trigger_effect(effect, target, op, &key);
	}
}

fn trigger_effect(effect: &Rc<EffectInner>, target: Option<TargetId>, op: TriggerOp, key: &Option<Key>) {
	if !effect.active.get() {
		return;
	}

	let is_running = with_runtime(|rt| rt.is_active(effect));
	if is_running && !effect.allow_recurse.get() {
		return;
	}

	if let Some(on_trigger) = &effect.on_trigger {
		on_trigger(&DebuggerEvent {
			effect: effect.id,
			target,
			op: Operation::Trigger(op),
			key: key.clone(),
		});
	}

	match &effect.scheduler {
		Some(scheduler) => scheduler(),
		None => effect.run(),
	}
}

impl fmt::Debug for Effect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Effect")
			.field("id", &self.inner.id)
			.field("active", &self.inner.active.get())
			.field("deps", &self.inner.deps.borrow().len())
			.finish()
	}
}
