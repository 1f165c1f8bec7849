//! The four-stage activation pipeline.
//!
//! `NodeWillRun -> NodeIsRunning -> NodeDidRun -> NodeStopped`. Each stage
//! runs at most once and `NodeStopped` is always reached. Only a
//! `prevent_running()` call during `NodeWillRun` skips the middle two.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::continuation::{Chain, Delivery, Flow, StageStep, Step};
use super::control::ControlInfo;
use super::propagation::throw_error;
use crate::core::{ActivationId, LogLevel, LogRecord};
use crate::error::{NodeError, WorkingStage};
use crate::event::{DidRunArgs, WillRunArgs};
use crate::nodes::{Entry, Node, RunConsole};

/// What happened during one activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationSummary {
    pub id: ActivationId,
    /// Stages entered, in order.
    pub stages: Vec<WorkingStage>,
    pub prevented: bool,
    /// Number of errors routed to error propagation.
    pub failures: usize,
}

impl ActivationSummary {
    pub fn entered(&self, stage: WorkingStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn stopped(&self) -> bool {
        self.stages.last() == Some(&WorkingStage::NodeStopped)
    }
}

/// Result of [`Node::activate`].
///
/// `Completed` when every hook and the body finished synchronously; no future
/// was allocated. `Pending` otherwise; the rest of the pipeline runs when it
/// is awaited.
#[must_use = "a pending activation does nothing unless awaited"]
pub enum Activation {
    Completed(ActivationSummary),
    Pending(BoxFuture<'static, ActivationSummary>),
}

impl Activation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Activation::Pending(_))
    }

    pub fn summary(&self) -> Option<&ActivationSummary> {
        match self {
            Activation::Completed(summary) => Some(summary),
            Activation::Pending(_) => None,
        }
    }

    pub fn into_delivery(self) -> Delivery {
        match self {
            Activation::Completed(_) => Delivery::Done,
            Activation::Pending(fut) => Delivery::Pending(fut.map(|_| ()).boxed()),
        }
    }
}

impl IntoFuture for Activation {
    type Output = ActivationSummary;
    type IntoFuture = BoxFuture<'static, ActivationSummary>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Activation::Completed(summary) => futures::future::ready(summary).boxed(),
            Activation::Pending(fut) => fut,
        }
    }
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Completed(summary) => f.debug_tuple("Completed").field(summary).finish(),
            Activation::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

struct Frame {
    node: Node,
    id: ActivationId,
    data: Value,
    control_info: ControlInfo,
    prevented: Arc<AtomicBool>,
    stages: Mutex<Vec<WorkingStage>>,
    failures: AtomicUsize,
}

impl Frame {
    fn enter(&self, stage: WorkingStage) {
        self.stages.lock().push(stage);
    }

    fn is_prevented(&self) -> bool {
        self.prevented.load(Ordering::SeqCst)
    }

    /// Turn a stage failure into a [`NodeError`] and route it. Whatever the
    /// `$E` record starts downstream runs detached.
    fn fail(&self, stage: WorkingStage, error: anyhow::Error) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let err = NodeError::new(
            self.node.clone(),
            error,
            stage,
            self.data.clone(),
            self.control_info.clone(),
        );
        let routed = throw_error(&self.node, err, false);
        self.node.runtime().detach(routed);
    }

    fn summary(&self) -> ActivationSummary {
        ActivationSummary {
            id: self.id.clone(),
            stages: self.stages.lock().clone(),
            prevented: self.is_prevented(),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }
}

pub(crate) fn activate(node: &Node, data: Value, control_info: ControlInfo) -> Activation {
    let runtime = node.runtime();
    let id = runtime.domain().allocate_activation_id();
    if runtime.logger().enabled(LogLevel::Debug) {
        runtime.logger().debug(LogRecord::with_node(
            format!(
                "activation {} via {}",
                id,
                control_info.port_name().unwrap_or("<direct>")
            ),
            Some(node),
            Some("activate"),
        ));
    }

    let frame = Arc::new(Frame {
        node: node.clone(),
        id,
        data,
        control_info,
        prevented: Arc::new(AtomicBool::new(false)),
        stages: Mutex::new(Vec::with_capacity(4)),
        failures: AtomicUsize::new(0),
    });

    let chain = Chain::start()
        .then({
            let frame = frame.clone();
            move || will_run(frame)
        })
        .then({
            let frame = frame.clone();
            move || is_running(frame)
        })
        .then({
            let frame = frame.clone();
            move || did_run(frame)
        })
        .finally({
            let frame = frame.clone();
            move || frame.enter(WorkingStage::NodeStopped)
        });

    match chain {
        Chain::Ready(_) => Activation::Completed(frame.summary()),
        Chain::Pending(fut) => Activation::Pending(
            async move {
                fut.await;
                frame.summary()
            }
            .boxed(),
        ),
    }
}

fn will_run_flow(frame: &Frame) -> Flow {
    if frame.is_prevented() {
        Flow::Cancel
    } else {
        Flow::Continue
    }
}

fn did_run_flow(_: &Frame) -> Flow {
    Flow::Continue
}

fn will_run(frame: Arc<Frame>) -> StageStep {
    frame.enter(WorkingStage::NodeWillRun);
    let hooks = frame.node.core().will_run_hooks();
    if hooks.is_empty() {
        return StageStep::Ready(Flow::Continue);
    }
    run_hooks(
        frame,
        WorkingStage::NodeWillRun,
        hooks,
        |frame, hook| {
            let args = WillRunArgs::new(&frame.data, &frame.control_info, &frame.prevented);
            hook(&frame.node, &args)
        },
        will_run_flow,
    )
}

fn did_run(frame: Arc<Frame>) -> StageStep {
    frame.enter(WorkingStage::NodeDidRun);
    let hooks = frame.node.core().did_run_hooks();
    if hooks.is_empty() {
        return StageStep::Ready(Flow::Continue);
    }
    run_hooks(
        frame,
        WorkingStage::NodeDidRun,
        hooks,
        |frame, hook| {
            let args = DidRunArgs {
                data: &frame.data,
                control_info: &frame.control_info,
            };
            hook(&frame.node, &args)
        },
        did_run_flow,
    )
}

/// Run `hooks` in order, synchronously for as long as they stay synchronous.
///
/// `flow` is re-evaluated after every hook; `Cancel` skips the rest. A hook
/// error is routed and ends the remaining hooks of the stage.
fn run_hooks<H, C>(
    frame: Arc<Frame>,
    stage: WorkingStage,
    hooks: Vec<H>,
    call: C,
    flow: fn(&Frame) -> Flow,
) -> StageStep
where
    H: Send + 'static,
    C: Fn(&Frame, &H) -> anyhow::Result<Step> + Send + 'static,
{
    let mut hooks = hooks.into_iter();
    while let Some(hook) = hooks.next() {
        match call(&frame, &hook) {
            Ok(Step::Done) => {}
            Ok(Step::Pending(first)) => {
                return StageStep::Pending(
                    async move {
                        if let Err(e) = first.await {
                            frame.fail(stage, e);
                            return flow(&frame);
                        }
                        for hook in hooks {
                            if flow(&frame) == Flow::Cancel {
                                return Flow::Cancel;
                            }
                            let result = match call(&frame, &hook) {
                                Ok(Step::Done) => Ok(()),
                                Ok(Step::Pending(fut)) => fut.await,
                                Err(e) => Err(e),
                            };
                            if let Err(e) = result {
                                frame.fail(stage, e);
                                return flow(&frame);
                            }
                        }
                        flow(&frame)
                    }
                    .boxed(),
                );
            }
            Err(e) => {
                frame.fail(stage, e);
                return StageStep::Ready(flow(&frame));
            }
        }
        if flow(&frame) == Flow::Cancel {
            return StageStep::Ready(Flow::Cancel);
        }
    }
    StageStep::Ready(flow(&frame))
}

fn is_running(frame: Arc<Frame>) -> StageStep {
    if frame.is_prevented() {
        return StageStep::Ready(Flow::Cancel);
    }
    frame.enter(WorkingStage::NodeIsRunning);

    let emitted = ControlInfo {
        port: None,
        run_stack: frame
            .control_info
            .run_stack
            .push(frame.node.nid(), frame.id.clone()),
    };
    let console = RunConsole::new(
        frame.node.clone(),
        Entry::new(frame.control_info.port_name()),
        emitted,
        frame.id.clone(),
    );
    let body = frame.node.core().body();

    match body(&console, &frame.data) {
        Ok(Step::Done) => StageStep::Ready(Flow::Continue),
        Ok(Step::Pending(fut)) => StageStep::Pending(
            async move {
                if let Err(e) = fut.await {
                    frame.fail(WorkingStage::NodeIsRunning, e);
                }
                Flow::Continue
            }
            .boxed(),
        ),
        Err(e) => {
            frame.fail(WorkingStage::NodeIsRunning, e);
            StageStep::Ready(Flow::Continue)
        }
    }
}
