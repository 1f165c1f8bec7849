use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use xnet::core::{MemorySink, RemoteDomain, RemoteNode};
use xnet::{
    connect, ControlInfo, DomainEvent, DomainHandler, LogLevel, Node, NodeEvent, NodeHandler,
    Runtime, Step, WorkingStage,
};

fn failing(runtime: &Runtime, message: &'static str) -> Node {
    Node::new(runtime, json!(null), move |_, _| Err(anyhow::anyhow!(message))).unwrap()
}

fn collector(runtime: &Runtime) -> Node {
    Node::new(runtime, json!([]), |console, data| {
        console.update_state(|state| {
            if let Some(items) = state.as_array_mut() {
                items.push(data.clone());
            }
        });
        Ok(Step::Done)
    }).unwrap()
}

fn catch_uncaught(runtime: &Runtime) -> Arc<Mutex<Vec<u32>>> {
    let caught = Arc::new(Mutex::new(Vec::new()));
    let sink = caught.clone();
    runtime.on(
        DomainEvent::UncaughtNodeError,
        DomainHandler::uncaught_node_error(move |err| {
            sink.lock().push(err.node.nid());
            true
        }),
    );
    caught
}

#[test]
fn test_node_handler_marks_error_handled() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let node = failing(&runtime, "bad input");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let first = calls.clone();
    node.on(
        NodeEvent::NodeThrowError,
        NodeHandler::throw_error(move |_, from_child, _| {
            first.lock().push(("declines", from_child));
            false
        })
        .with_priority(20),
    )
    .unwrap();
    let second = calls.clone();
    node.on(
        NodeEvent::NodeThrowError,
        NodeHandler::throw_error(move |_, from_child, _| {
            second.lock().push(("handles", from_child));
            true
        }),
    )
    .unwrap();

    let _ = node.activate(json!(null), ControlInfo::default());
    assert_eq!(*calls.lock(), vec![("declines", false), ("handles", false)]);
    assert!(uncaught.lock().is_empty());
}

#[test]
fn test_linked_error_port_receives_record() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let source = Node::new(&runtime, json!(null), |console, _| {
        console.emit("$O", json!("not a number"))?;
        Ok(Step::Done)
    }).unwrap();
    let parser = Node::new(&runtime, json!(null), |_, data| {
        data.as_i64()
            .map(|_| Step::Done)
            .ok_or_else(|| anyhow::anyhow!("cannot parse {}", data))
    }).unwrap();
    parser.set_brand("Parser");
    let errors = collector(&runtime);
    connect(&source.port("$O").unwrap(), &parser.port("$I").unwrap()).unwrap();
    connect(&parser.port("$E").unwrap(), &errors.port("$I").unwrap()).unwrap();

    let _ = source.invoke(json!(null)).unwrap();

    let records = errors.state();
    let record = &records[0];
    assert_eq!(record["nid"], json!(parser.nid()));
    assert_eq!(record["brand"], json!("Parser"));
    assert_eq!(record["stage"], json!("NodeIsRunning"));
    assert_eq!(record["error"], json!("cannot parse \"not a number\""));
    assert_eq!(record["data"], json!("not a number"));
    assert_eq!(record["port"], json!("$I"));
    let stack: Vec<Value> = record["runStack"].as_array().cloned().unwrap();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack[0]["nid"], json!(source.nid()));
    assert!(uncaught.lock().is_empty());
}

#[test]
fn test_unlinked_error_port_is_skipped() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let node = failing(&runtime, "boom");
    // Created but never linked.
    node.port("$E").unwrap();

    let _ = node.activate(json!(null), ControlInfo::default());
    assert_eq!(*uncaught.lock(), vec![node.nid()]);
}

#[test]
fn test_child_error_reaches_parent_handler() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let child = failing(&runtime, "child failed");
    let child_nid = child.nid();

    let subnet = Node::subnet(&runtime, json!(null), |scope| {
        scope.add_child(&child);
        connect(&scope.inner_port("$I", None)?, &child.port("$I")?)?;
        Ok(())
    })
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    subnet
        .on(
            NodeEvent::NodeThrowError,
            NodeHandler::throw_error(move |node, from_child, err| {
                log.lock().push((node.nid(), from_child, err.node.nid(), err.stage));
                true
            }),
        )
        .unwrap();

    let summary = subnet.invoke(json!(1)).unwrap().summary().cloned().unwrap();
    assert_eq!(summary.failures, 0);
    assert_eq!(
        *seen.lock(),
        vec![(subnet.nid(), true, child_nid, WorkingStage::NodeIsRunning)]
    );
    assert!(uncaught.lock().is_empty());
}

#[test]
fn test_child_error_leaves_through_parent_error_port() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let child = failing(&runtime, "child failed");
    let child_nid = child.nid();
    let subnet = Node::subnet(&runtime, json!(null), |scope| {
        scope.add_child(&child);
        connect(&scope.inner_port("$I", None)?, &child.port("$I")?)?;
        Ok(())
    })
    .unwrap();
    let errors = collector(&runtime);
    connect(&subnet.port("$E").unwrap(), &errors.port("$I").unwrap()).unwrap();

    let _ = subnet.invoke(json!(1)).unwrap();
    assert_eq!(errors.state()[0]["nid"], json!(child_nid));
    assert!(uncaught.lock().is_empty());
}

#[test]
fn test_nested_subnets_escalate_to_domain() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let leaf = failing(&runtime, "deep");
    let leaf_nid = leaf.nid();
    let hops = Arc::new(AtomicUsize::new(0));

    let inner = Node::subnet(&runtime, json!(null), |scope| {
        scope.add_child(&leaf);
        connect(&scope.inner_port("$I", None)?, &leaf.port("$I")?)?;
        Ok(())
    })
    .unwrap();
    let counted = hops.clone();
    inner
        .on(
            NodeEvent::NodeThrowError,
            NodeHandler::throw_error(move |_, from_child, _| {
                assert!(from_child);
                counted.fetch_add(1, Ordering::SeqCst);
                false
            }),
        )
        .unwrap();

    let outer = Node::subnet(&runtime, json!(null), |scope| {
        scope.add_child(&inner);
        connect(&scope.inner_port("$I", None)?, &inner.port("$I")?)?;
        Ok(())
    })
    .unwrap();

    let _ = outer.invoke(json!(1)).unwrap();
    assert_eq!(hops.load(Ordering::SeqCst), 1);
    assert_eq!(*uncaught.lock(), vec![leaf_nid]);
}

#[test]
#[should_panic(expected = "uncaught node error")]
fn test_unhandled_root_error_is_fatal() {
    let runtime = Runtime::new();
    let node = failing(&runtime, "nobody listens");
    let _ = node.activate(json!(null), ControlInfo::default());
}

#[test]
fn test_fatal_error_is_logged_first() {
    let sink = MemorySink::new();
    let runtime = Runtime::builder().log_sink(sink.clone()).build().unwrap();
    let node = failing(&runtime, "logged before panic");

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = node.activate(json!(null), ControlInfo::default());
    }));
    assert!(outcome.is_err());
    assert!(sink.contains(LogLevel::Error, "logged before panic"));
}

#[tokio::test]
async fn test_rejected_pending_body_is_routed() {
    let runtime = Runtime::new();
    let node = Node::new(&runtime, json!(null), |_, _| {
        Ok(Step::pending(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            anyhow::bail!("timed out")
        }))
    }).unwrap();
    let caught = Arc::new(Mutex::new(Vec::new()));
    let log = caught.clone();
    node.on(
        NodeEvent::NodeThrowError,
        NodeHandler::throw_error(move |_, _, err| {
            log.lock().push((err.stage, err.error.to_string()));
            true
        }),
    )
    .unwrap();

    let activation = node.activate(json!(null), ControlInfo::default());
    assert!(activation.is_pending());
    let summary = activation.await;
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.stages, WorkingStage::ALL.to_vec());
    assert_eq!(
        *caught.lock(),
        vec![(WorkingStage::NodeIsRunning, "timed out".to_string())]
    );
}

#[tokio::test]
async fn test_rejected_did_run_hook_is_routed() {
    let runtime = Runtime::new();
    let uncaught = catch_uncaught(&runtime);
    let node = Node::new(&runtime, json!(null), |_, _| Ok(Step::Done)).unwrap();
    node.on(
        NodeEvent::NodeDidRun,
        NodeHandler::did_run(|_, _| {
            Ok(Step::pending(async {
                tokio::task::yield_now().await;
                Err(anyhow::anyhow!("late failure"))
            }))
        }),
    )
    .unwrap();

    let summary = node.activate(json!(null), ControlInfo::default()).await;
    assert_eq!(summary.failures, 1);
    assert!(summary.stopped());
    assert_eq!(*uncaught.lock(), vec![node.nid()]);
}

#[test]
fn test_remote_parent_escalates_locally() {
    let sink = MemorySink::new();
    let runtime = Runtime::builder().log_sink(sink.clone()).build().unwrap();
    let uncaught = catch_uncaught(&runtime);
    let node = failing(&runtime, "far away");
    node.net().set_remote_parent(RemoteNode {
        domain: RemoteDomain::new("peer", "run-1"),
        nid: 9,
    });

    let _ = node.activate(json!(null), ControlInfo::default());
    assert_eq!(*uncaught.lock(), vec![node.nid()]);
    assert!(sink.contains(LogLevel::Warn, "remote node #9"));
}
