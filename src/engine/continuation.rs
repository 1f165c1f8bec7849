//! Sync/async-unifying continuation chain.
//!
//! Every step either completes in place or hands back a future. A chain stays
//! synchronous, and allocates nothing, until the first step actually returns
//! a future; from then on the remaining steps are chained onto it.

use std::future::{Future, IntoFuture};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

/// What a node body or hook returns.
pub enum Step {
    /// Finished synchronously.
    Done,
    /// Finishes when the future resolves; an `Err` is routed like a sync error.
    Pending(BoxFuture<'static, anyhow::Result<()>>),
}

impl Step {
    pub fn pending<F>(fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Step::Pending(fut.boxed())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Step::Pending(_))
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Done => f.write_str("Step::Done"),
            Step::Pending(_) => f.write_str("Step::Pending(..)"),
        }
    }
}

/// Whether later stages should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Cancel,
}

/// Outcome of one stage executor. Errors are already routed by the time a
/// stage yields this.
pub(crate) enum StageStep {
    Ready(Flow),
    Pending(BoxFuture<'static, Flow>),
}

pub(crate) enum Chain {
    Ready(Flow),
    Pending(BoxFuture<'static, Flow>),
}

impl Chain {
    pub(crate) fn start() -> Self {
        Chain::Ready(Flow::Continue)
    }

    /// Run `stage` unless an earlier link cancelled.
    pub(crate) fn then<S>(self, stage: S) -> Self
    where
        S: FnOnce() -> StageStep + Send + 'static,
    {
        match self {
            Chain::Ready(Flow::Cancel) => self,
            Chain::Ready(Flow::Continue) => match stage() {
                StageStep::Ready(flow) => Chain::Ready(flow),
                StageStep::Pending(fut) => Chain::Pending(fut),
            },
            Chain::Pending(prev) => Chain::Pending(
                async move {
                    if prev.await == Flow::Cancel {
                        return Flow::Cancel;
                    }
                    match stage() {
                        StageStep::Ready(flow) => flow,
                        StageStep::Pending(fut) => fut.await,
                    }
                }
                .boxed(),
            ),
        }
    }

    /// Run `last` regardless of cancellation.
    pub(crate) fn finally<F>(self, last: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Chain::Ready(flow) => {
                last();
                Chain::Ready(flow)
            }
            Chain::Pending(prev) => Chain::Pending(
                async move {
                    let flow = prev.await;
                    last();
                    flow
                }
                .boxed(),
            ),
        }
    }
}

/// Outcome of pushing data into ports: either everything it triggered has
/// already finished, or a future that drives the remaining work.
#[must_use = "a pending delivery does nothing unless awaited"]
pub enum Delivery {
    Done,
    Pending(BoxFuture<'static, ()>),
}

impl Delivery {
    /// Combine deliveries; stays `Done` when none of them is pending.
    pub fn join<I>(items: I) -> Delivery
    where
        I: IntoIterator<Item = Delivery>,
    {
        let pending: Vec<BoxFuture<'static, ()>> = items
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Done => None,
                Delivery::Pending(fut) => Some(fut),
            })
            .collect();
        match pending.len() {
            0 => Delivery::Done,
            1 => pending.into_iter().next().map_or(Delivery::Done, Delivery::Pending),
            _ => Delivery::Pending(
                async move {
                    join_all(pending).await;
                }
                .boxed(),
            ),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Delivery::Pending(_))
    }
}

impl IntoFuture for Delivery {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Delivery::Done => futures::future::ready(()).boxed(),
            Delivery::Pending(fut) => fut,
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Done => f.write_str("Delivery::Done"),
            Delivery::Pending(_) => f.write_str("Delivery::Pending(..)"),
        }
    }
}
