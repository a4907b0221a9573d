use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mockall::predicate::eq;
use reactivity::{
	effect, flush_jobs, next_tick, queue_job, queued_effect, reactive, readonly,
	reset_error_handler, set_error_handler, to_raw, tracked_entries, watch, Computed, Effect, Flush,
	Job, Key, ReactiveError, Ref, Target, Value, WatchOptions,
};


use mock::Spy;

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn number(value: &Value) -> f64 {
	value.as_number().unwrap_or(f64::NAN)
}

#[test]
fn computed_values_follow_their_sources() {
	let a = Ref::new(10);
	let b = Computed::new({
		let a = a.clone();
		move || number(&a.get()) + 10.0
	});
	assert_eq!(b.get(), 20.0);

	let mock = mock::SharedMock::new();
	mock.get().expect_trigger().with(eq(20.0)).times(1).return_const(());

	let _e = effect({
		let b = b.clone();
		let mock = mock.clone();
		move || {
			mock.get().trigger(b.get());
		}
	});

	mock.get().checkpoint();

	mock.get().expect_trigger().with(eq(30.0)).times(1).return_const(());
	a.set(20);
	a.set(20);
	mock.get().checkpoint();

	assert_eq!(b.get(), 30.0);
}

#[test]
fn writes_in_one_tick_coalesce() {
	let state = reactive(Target::record_from([("a", 1), ("b", 2)]));
	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().with(eq(3.0)).times(1).return_const(());
	let (_effect, job) = queued_effect({
		let state = state.clone();
		let mock = mock.clone();
		move || mock.get().trigger(number(&state.get("a")) + number(&state.get("b")))
	});
	job.run();
	mock.get().checkpoint();

	mock.get().expect_trigger().with(eq(30.0)).times(1).return_const(());
	state.set("a", 10);
	state.set("b", 20);
	state.set("a", 10);
	flush_jobs();
	mock.get().checkpoint();
}

#[test]
fn writing_the_same_value_is_a_no_op() {
	let state = reactive(Target::record_from([("x", f64::NAN), ("y", 1.0)]));
	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().times(1).return_const(());
	let _e = effect({
		let state = state.clone();
		let mock = mock.clone();
		move || {
			state.get("x");
			mock.get().trigger(number(&state.get("y")));
		}
	});

	state.set("x", f64::NAN);
	state.set("y", 1);
	mock.get().checkpoint();
}

#[test]
fn shrinking_a_sequence_invalidates_dropped_indices() {
	let list = reactive(Target::sequence([1, 2, 3, 4]));
	let tail = mock::SharedMock::new();
	let head = mock::SharedMock::new();

	tail.get().expect_trigger().times(1).return_const(());
	head.get().expect_trigger().times(1).return_const(());

	let _tail = effect(reactivity::macros::enclose!((list, tail) move || {
		tail.get().trigger(number(&list.get(3)));
	}));
	let _head = effect(reactivity::macros::enclose!((list, head) move || {
		head.get().trigger(number(&list.get(0)));
	}));

	tail.get().checkpoint();
	head.get().checkpoint();

	tail.get().expect_trigger().times(1).return_const(());
	head.get().expect_trigger().times(0);

	assert!(list.as_proxy().unwrap().set_len(2));
	assert_eq!(list.get(3), Value::Undefined);

	tail.get().checkpoint();
	head.get().checkpoint();
}

#[test]
fn derived_values_are_memoized() {
	let count = Ref::new(1);
	let evaluations = Rc::new(Cell::new(0));
	let doubled = Computed::new({
		let count = count.clone();
		let evaluations = evaluations.clone();
		move || {
			evaluations.set(evaluations.get() + 1);
			number(&count.get()) * 2.0
		}
	});

	assert_eq!(evaluations.get(), 0);
	assert_eq!(doubled.get(), 2.0);
	assert_eq!(doubled.get(), 2.0);
	assert_eq!(evaluations.get(), 1);

	count.set(5);
	assert_eq!(evaluations.get(), 1);
	assert_eq!(doubled.get(), 10.0);
	assert_eq!(evaluations.get(), 2);
}

#[test]
fn derived_values_recompute_once_for_many_readers() {
	let count = Ref::new(1);
	let evaluations = Rc::new(Cell::new(0));
	let doubled = Computed::new(reactivity::macros::enclose!((count, evaluations) move || {
		evaluations.set(evaluations.get() + 1);
		number(&count.get()) * 2.0
	}));

	let mock = mock::SharedMock::new();
	mock.get().expect_trigger().with(eq(2.0)).times(3).return_const(());
	let readers: Vec<Effect> = (0..3)
		.map(|_| effect(reactivity::macros::enclose!((doubled, mock) move || {
			mock.get().trigger(doubled.get());
		})))
		.collect();
	mock.get().checkpoint();
	assert_eq!(evaluations.get(), 1);

	mock.get().expect_trigger().with(eq(8.0)).times(3).return_const(());
	count.set(4);
	mock.get().checkpoint();
	assert_eq!(evaluations.get(), 2);
	assert_eq!(readers.len(), 3);
}

#[test]
fn failed_derivation_recovers_on_next_read() {
	let ready = Ref::new(false);
	let value = Computed::new(reactivity::macros::enclose!((ready) move || {
		if ready.get() != Value::from(true) {
			panic!("source not ready");
		}
		7
	}));

	let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| value.get()));
	assert!(first.is_err());
	assert!(value.is_dirty());

	ready.set(true);
	assert_eq!(value.get(), 7);
	assert_eq!(value.try_get(), Some(7));
}

#[test]
fn nested_effects_restore_the_outer_one() {
	let raw = Target::record_from([("a", 1), ("b", 1), ("c", 1)]);
	let state = reactive(raw.clone());
	let outer_spy = mock::SharedMock::new();
	let inner_spy = mock::SharedMock::new();
	let inner_slot: Rc<RefCell<Option<Effect>>> = Rc::default();

	outer_spy.get().expect_trigger().with(eq(1.0)).times(1).return_const(());
	inner_spy.get().expect_trigger().with(eq(1.0)).times(1).return_const(());
	let outer = effect(reactivity::macros::enclose!((state, outer_spy, inner_spy, inner_slot) move || {
		state.get("a");
		let inner = effect(reactivity::macros::enclose!((state, inner_spy) move || {
			inner_spy.get().trigger(number(&state.get("c")));
		}));
		*inner_slot.borrow_mut() = Some(inner);
		outer_spy.get().trigger(number(&state.get("b")));
	}));
	outer_spy.get().checkpoint();
	inner_spy.get().checkpoint();

	let deps_of = |key: &str| {
		tracked_entries(raw.id())
			.into_iter()
			.find(|(k, _)| *k == Key::from(key))
			.map(|(_, dep)| dep)
	};
	assert!(deps_of("b").map_or(false, |dep| dep.contains(&outer)));
	assert!(deps_of("c").map_or(false, |dep| !dep.contains(&outer)));
	assert_eq!(outer.dep_count(), 2);

	outer_spy.get().expect_trigger().with(eq(2.0)).times(1).return_const(());
	inner_spy.get().expect_trigger().with(eq(1.0)).times(1).return_const(());
	state.set("b", 2);
	outer_spy.get().checkpoint();
	inner_spy.get().checkpoint();

	outer_spy.get().expect_trigger().times(0);
	inner_spy.get().expect_trigger().with(eq(5.0)).times(1).return_const(());
	state.set("c", 5);
	outer_spy.get().checkpoint();
	inner_spy.get().checkpoint();

	inner_slot.borrow_mut().take();
}

#[test]
fn cells_in_records_take_readonly_values() {
	let cell = Ref::new(1);
	let raw = Target::record_from([("c", cell.clone())]);
	let state = reactive(raw.clone());
	let view = readonly(Target::record());

	assert!(state.set("c", view.clone()));
	assert!(raw.get(&Key::from("c")).as_ref_cell().map_or(false, |r| r.ptr_eq(&cell)));
	assert_eq!(cell.get(), view);
	assert_eq!(state.get("c"), view);
}

#[test]
fn out_of_range_sequence_writes_fail_quietly() {
	let list = reactive(Target::sequence([1, 2]));
	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().with(eq(2.0)).times(1).return_const(());
	let _e = effect(reactivity::macros::enclose!((list, mock) move || {
		mock.get().trigger(number(&list.get("length")));
	}));
	mock.get().checkpoint();

	mock.get().expect_trigger().times(0);
	assert!(!list.set(usize::MAX, 1));
	assert!(!list.set("18446744073709551615", 1));
	assert!(!list.set("length", 1e20));
	mock.get().checkpoint();

	assert_eq!(list.get("length"), Value::from(2));
}

#[test]
fn jobs_run_in_id_order() {
	let order = Rc::new(RefCell::new(Vec::new()));
	let jobs: Vec<Job> = [3, 1, 2]
		.into_iter()
		.map(|id| {
			let order = order.clone();
			Job::with_id(id, move || order.borrow_mut().push(id))
		})
		.collect();

	for job in &jobs {
		queue_job(job);
	}
	flush_jobs();

	assert_eq!(order.borrow().as_slice(), [1, 2, 3]);
}

#[test]
fn an_effect_does_not_retrigger_itself() {
	let count = Ref::new(0);
	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().times(1).return_const(());
	let _e = effect({
		let count = count.clone();
		let mock = mock.clone();
		move || {
			let next = number(&count.get()) + 1.0;
			count.set(next);
			mock.get().trigger(next);
		}
	});
	mock.get().checkpoint();

	assert_eq!(count.get(), Value::from(1));
}

#[test]
fn stopped_effects_leave_the_graph() {
	let raw = Target::record_from([("a", 1), ("b", 2)]);
	let state = reactive(raw.clone());
	let runner = effect({
		let state = state.clone();
		move || {
			state.get("a");
			state.get("b");
		}
	});

	let entries = tracked_entries(raw.id());
	assert_eq!(entries.len(), 2);
	assert!(entries.iter().all(|(_, dep)| dep.contains(&runner)));

	runner.stop();
	assert!(!runner.is_active());
	assert_eq!(runner.dep_count(), 0);
	assert!(tracked_entries(raw.id()).iter().all(|(_, dep)| !dep.contains(&runner)));
}

#[test]
fn readonly_views_reject_writes() {
	let raw = Target::record_from([("a", 1)]);
	let view = readonly(reactive(raw.clone()));
	let errors = Rc::new(RefCell::new(Vec::new()));
	set_error_handler({
		let errors = errors.clone();
		move |error: &ReactiveError| errors.borrow_mut().push(error.clone())
	});

	let mock = mock::SharedMock::new();
	mock.get().expect_trigger().times(1).return_const(());
	let _e = effect({
		let view = view.clone();
		let mock = mock.clone();
		move || mock.get().trigger(number(&view.get("a")))
	});

	assert!(view.set("a", 2));
	assert!(view.delete("a"));
	reset_error_handler();

	assert_eq!(raw.get(&"a".into()), Value::from(1));
	assert_eq!(errors.borrow().len(), 2);
	assert!(matches!(errors.borrow()[0], ReactiveError::ReadonlyWrite { .. }));
	mock.get().checkpoint();
}

#[test]
fn includes_finds_raw_and_wrapped_members() {
	let item = Target::record();
	let list = reactive(Target::sequence([Value::from(item.clone())]));
	let proxy = list.as_proxy().cloned().unwrap();

	assert!(proxy.includes(&Value::from(item.clone())));
	assert!(proxy.includes(&reactive(item.clone())));
	assert_eq!(proxy.index_of(&reactive(item.clone())), Some(0));
	assert_eq!(to_raw(&list.get(0)), Value::from(item));
}

#[test]
fn map_iteration_tracks_membership() {
	let map = reactive(Target::map_from([("a", 1)]));
	let proxy = map.as_proxy().cloned().unwrap();
	let mock = mock::SharedMock::new();

	mock.get().expect_trigger().with(eq(1.0)).times(1).return_const(());
	let _e = effect({
		let proxy = proxy.clone();
		let mock = mock.clone();
		move || mock.get().trigger(proxy.keys().len() as f64)
	});
	mock.get().checkpoint();

	mock.get().expect_trigger().with(eq(2.0)).times(1).return_const(());
	proxy.set("b", 2);
	mock.get().checkpoint();

	mock.get().expect_trigger().times(0);
	proxy.set("b", 3);
	mock.get().checkpoint();

	mock.get().expect_trigger().with(eq(0.0)).times(1).return_const(());
	proxy.clear();
	mock.get().checkpoint();
}

#[test]
fn runaway_jobs_are_cut_off() {
	let reports = Rc::new(Cell::new(0));
	set_error_handler({
		let reports = reports.clone();
		move |error: &ReactiveError| {
			if matches!(error, ReactiveError::RecursionLimit { .. }) {
				reports.set(reports.get() + 1);
			}
		}
	});

	let runs = Rc::new(Cell::new(0));
	let slot: Rc<RefCell<Option<Job>>> = Rc::default();
	let job = Job::with_id(1, {
		let runs = runs.clone();
		let slot = slot.clone();
		move || {
			runs.set(runs.get() + 1);
			if let Some(job) = slot.borrow().as_ref() {
				queue_job(job);
			}
		}
	});
	job.set_allow_recurse(true);
	*slot.borrow_mut() = Some(job.clone());

	queue_job(&job);
	flush_jobs();
	slot.borrow_mut().take();
	reset_error_handler();

	assert_eq!(runs.get(), 101);
	assert_eq!(reports.get(), 1);
}

#[test]
fn a_panicking_job_does_not_stop_the_flush() {
	init_tracing();
	let ran = Rc::new(Cell::new(false));
	queue_job(&Job::with_id(1, || panic!("job failed")));
	queue_job(&Job::with_id(2, {
		let ran = ran.clone();
		move || ran.set(true)
	}));
	flush_jobs();

	assert!(ran.get());
}

#[test]
fn next_tick_settles_after_the_flush() {
	let state = reactive(Target::record_from([("n", 0)]));
	let seen = Rc::new(RefCell::new(Vec::new()));
	let _watcher = watch(
		reactivity::macros::enclose!((state) move || state.get("n")),
		reactivity::macros::enclose!((seen) move |new: &Value, _: &Value| seen.borrow_mut().push(new.clone())),
		WatchOptions::default().flush(Flush::Pre),
	);

	state.set("n", 1);
	state.set("n", 2);
	assert!(seen.borrow().is_empty());

	let tick = next_tick();
	assert!(tick.wait());
	assert_eq!(seen.borrow().as_slice(), [Value::from(2)]);
}

#[test]
fn macros() {
	let a = Ref::new(1);
	let doubled = reactivity::computed!((a) => number(&a.get()) * 2.0);
	assert_eq!(doubled.get(), 2.0);

	let mock = mock::SharedMock::new();
	mock.get().expect_trigger().with(eq(2.0)).times(1).return_const(());
	let _e = reactivity::effect!((doubled, mock) => {
		mock.get().trigger(doubled.get());
	});
	mock.get().checkpoint();

	mock.get().expect_trigger().with(eq(6.0)).times(1).return_const(());
	a.set(3);
	mock.get().checkpoint();

	let runs = Rc::new(Cell::new(0));
	let _w = reactivity::watch_effect!((a, runs) => {
		a.get();
		runs.set(runs.get() + 1);
	});

	mock.get().expect_trigger().with(eq(8.0)).times(1).return_const(());
	a.set(4);
	assert_eq!(runs.get(), 1);
	flush_jobs();
	assert_eq!(runs.get(), 2);
	mock.get().checkpoint();
}
