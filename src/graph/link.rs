//! Wiring ports together.

use super::port::{direction_for_transfer, Direction, Port, Side};
use crate::core::LogRecord;
use crate::error::{EngineError, EngineResult};

/// Link `from` (which must send) to `to` (which must receive).
///
/// A port whose direction is still `Unknown` is given the direction that
/// makes the link valid. Link counts are updated on the owning shell for
/// outer ports and on the core for inner ports.
pub fn connect(from: &Port, to: &Port) -> EngineResult<()> {
    check_pair(from, to)?;
    if from.is_linked_to(to) {
        return Err(EngineError::InvalidLink(format!(
            "{} is already linked to {}",
            from.name(),
            to.name()
        )));
    }
    let from_dir = resolve_for(from, Direction::Out)?;
    let to_dir = resolve_for(to, Direction::In)?;
    from.set_direction(from_dir)?;
    to.set_direction(to_dir)?;

    from.add_link(to);
    to.add_link(from);
    change_link_count(from, 1)?;
    change_link_count(to, 1)?;

    from.runtime().logger().debug(LogRecord::with_node(
        format!("linked {} -> {}", from.name(), to.name()),
        from.node().as_ref(),
        Some("connect"),
    ));
    Ok(())
}

/// Remove the link between `from` and `to`.
pub fn disconnect(from: &Port, to: &Port) -> EngineResult<()> {
    check_pair(from, to)?;
    if !from.remove_link(to) {
        return Err(EngineError::InvalidLink(format!(
            "{} is not linked to {}",
            from.name(),
            to.name()
        )));
    }
    to.remove_link(from);
    change_link_count(from, -1)?;
    change_link_count(to, -1)?;
    Ok(())
}

fn check_pair(from: &Port, to: &Port) -> EngineResult<()> {
    if from.ptr_eq(to) {
        return Err(EngineError::InvalidLink(format!(
            "cannot link {} to itself",
            from.name()
        )));
    }
    if !from.runtime().ptr_eq(to.runtime()) {
        return Err(EngineError::InvalidLink(
            "ports belong to different runtimes".into(),
        ));
    }
    Ok(())
}

/// Direction `port` needs so that data travels along `transfer`.
fn resolve_for(port: &Port, transfer: Direction) -> EngineResult<Direction> {
    let wanted = direction_for_transfer(transfer, port.side());
    match port.direction() {
        Direction::Unknown => Ok(wanted),
        current if current == wanted => Ok(current),
        current => Err(EngineError::InvalidLink(format!(
            "port {} ({:?}, {:?} side) cannot {}",
            port.name(),
            current,
            port.side(),
            if transfer == Direction::Out { "send" } else { "receive" }
        ))),
    }
}

fn change_link_count(port: &Port, delta: i64) -> EngineResult<()> {
    match port.side() {
        Side::Outer => {
            if let Some(node) = port.node() {
                node.change_outer_link_num(port.name(), delta);
            }
            Ok(())
        }
        Side::Inner => {
            let core = port.core()?;
            let current = core
                .port_entry(port.name())
                .map_or(0, |entry| entry.inner_link_num);
            let next = (current as i64 + delta).max(0) as u32;
            core.set_core_ports_state(port.runtime(), port.name(), None, Some(next))
        }
    }
}
