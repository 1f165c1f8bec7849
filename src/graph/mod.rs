//! Graph model: nets, ports and the links between them.
//!
//! Ports are created lazily through a [`PortSet`]. Their direction starts out
//! `Unknown` unless requested or already recorded on the core, and is fixed
//! for good once decided. [`connect`] links a sending port to a receiving
//! one; [`Port::output`] pushes data along those links.

pub mod link;
pub mod net;
pub mod port;
pub mod port_set;

pub use link::{connect, disconnect};
pub(crate) use net::{NetData, NetParent};
pub use net::{LinkOwnership, Net, ParentRef};
pub(crate) use port::PortInner;
pub use port::{is_port_name, transfer_direction, Direction, Port, Side};
pub(crate) use port_set::PortCache;
pub use port_set::PortSet;
