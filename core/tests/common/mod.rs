#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use artiflow_core::api::{
    FnTask, PipelineError, RenderEvent, RetryOptions, RunRenderer, StageOutputs, TaskError,
    TaskResult,
};
use serde_json::{json, Value};

/// Context threaded through the test pipelines: task name -> output.
pub type Ctx = BTreeMap<String, Value>;

pub fn merge(mut ctx: Ctx, outputs: StageOutputs<Value>) -> Result<Ctx, PipelineError> {
    for (name, value) in outputs {
        ctx.insert(name, value);
    }
    Ok(ctx)
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn succeeding(name: &'static str, counter: Counter) -> FnTask<Ctx, Value> {
    FnTask::required(name, move |_, _| {
        counter.hit();
        async move { Ok(TaskResult::ok(json!({ "by": name }))) }
    })
}

/// Throws a transient network error on the first `failures` calls.
pub fn flaky(
    name: &'static str,
    failures: u32,
    max_attempts: u32,
    counter: Counter,
) -> FnTask<Ctx, Value> {
    FnTask::required(name, move |_, _| {
        let n = counter.hit();
        async move {
            if n <= failures {
                Err(TaskError::transient("NetworkError: connection reset"))
            } else {
                Ok(TaskResult::ok(json!({ "by": name, "call": n })))
            }
        }
    })
    .with_retry(RetryOptions::new(max_attempts, 1).with_backoff(true))
}

pub fn always_failing_optional(
    name: &'static str,
    default: Value,
    counter: Counter,
) -> FnTask<Ctx, Value> {
    FnTask::optional(name, Some(default), move |_, _| {
        counter.hit();
        async { Ok(TaskResult::failure("thumbnail service unavailable")) }
    })
}

/// Collects render events for assertions.
#[derive(Default)]
pub struct RecordingRenderer {
    pub events: Mutex<Vec<RenderEvent>>,
}

impl RunRenderer for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    fn format(&self) -> &str {
        "memory"
    }

    fn render(&self, event: &RenderEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
