#![cfg(target_arch = "wasm32")]

use wasm_bindgen::prelude::*;

use crate::host::Task;

#[wasm_bindgen]
extern "C" {
	#[wasm_bindgen(js_name = queueMicrotask)]
	fn queue_microtask(closure: &JsValue);
}

/// Hand a flush task to the browser's microtask queue. The closure frees
/// itself after its single call.
pub(crate) fn queue_task(task: Task) {
	queue_microtask(&Closure::once_into_js(move || task()));
}
