//! Frame model: the per-run [`Context`](context::Context) and the per-frame
//! [`Packet`](packet::Packet).

pub mod context;
pub mod packet;
