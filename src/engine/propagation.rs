//! Error escalation: node handlers, then `$E`, then the parent subnet, then
//! the domain.

use super::continuation::Delivery;
use super::control::ControlInfo;
use crate::core::{LogLevel, LogRecord};
use crate::error::NodeError;
use crate::graph::ParentRef;
use crate::nodes::Node;

/// Route `err` as seen from `node`.
///
/// `from_child` is true when `err` was raised inside `node`'s nested net and
/// bubbled up to it.
pub(crate) fn throw_error(node: &Node, err: NodeError, from_child: bool) -> Delivery {
    for handler in node.core().throw_error_handlers() {
        if handler(node, from_child, &err) {
            return Delivery::Done;
        }
    }

    let linked = node
        .port_state("$E")
        .is_some_and(|state| state.outer_link_num > 0);
    if linked {
        match node.ports().get("$E", None) {
            Ok(port) => {
                let control_info = ControlInfo {
                    port: None,
                    run_stack: err.control_info.run_stack.clone(),
                };
                return port.output(err.to_value(), control_info);
            }
            Err(e) => node.runtime().logger().warn(LogRecord::with_node(
                format!("cannot emit on $E: {}", e),
                Some(node),
                Some("propagation"),
            )),
        }
    }

    match node.parent() {
        Some(ParentRef::Subnet(parent)) => return throw_error(&parent, err, true),
        Some(ParentRef::Remote(remote)) => node.runtime().logger().warn(LogRecord::with_node(
            format!(
                "parent is remote node #{} in domain {}; escalating locally",
                remote.nid,
                remote.domain.domain().id
            ),
            Some(node),
            Some("propagation"),
        )),
        None => {}
    }

    if node.runtime().logger().enabled(LogLevel::Debug) {
        node.runtime().logger().debug(LogRecord::with_node(
            "escalating to domain",
            Some(node),
            Some("propagation"),
        ));
    }
    node.runtime().throw_uncaught_node_error(err);
    Delivery::Done
}
