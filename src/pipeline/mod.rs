//! Single-threaded driver moving one packet at a time through decode, process and encode nodes.

mod nodes;

pub use nodes::{ProcessorNode, SinkNode, SourceNode};

use crate::{
    foundation::{
        error::{FrameError, FrameResult},
        timing::Stopwatch,
    },
    frame::packet::Packet,
};

/// Where a node sits in the chain; used for run statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    Source,
    Transform,
    Sink,
}

/// Lazy-initialization state shared by the node adapters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    #[default]
    Uninitialized,
    Ready,
}

/// One stage of a [`Pipeline`].
///
/// The head node is driven with `None` until it reports completion; every other node receives
/// the packets produced by its predecessor.
pub trait PipelineNode: Send {
    fn name(&self) -> &'static str;

    fn role(&self) -> NodeRole {
        NodeRole::Transform
    }

    fn on_packet(&mut self, packet: Option<Packet>) -> FrameResult<Option<Packet>>;

    fn is_complete(&self) -> bool;

    /// Flush and close. Called once after the last packet, head first.
    fn finish(&mut self) -> FrameResult<()> {
        Ok(())
    }
}

/// Per-run counters returned by [`Pipeline::execute`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    pub frames_decoded: u64,
    pub frames_processed: u64,
    pub frames_encoded: u64,
}

impl RunStats {
    fn record(&mut self, role: NodeRole) {
        match role {
            NodeRole::Source => self.frames_decoded += 1,
            NodeRole::Transform => self.frames_processed += 1,
            NodeRole::Sink => self.frames_encoded += 1,
        }
    }
}

struct Link {
    node: Box<dyn PipelineNode>,
    next: Option<Box<Link>>,
}

impl Link {
    fn append(&mut self, link: Box<Link>) {
        match self.next {
            Some(ref mut next) => next.append(link),
            None => self.next = Some(link),
        }
    }

    fn push(&mut self, packet: Packet, stats: &mut RunStats) -> FrameResult<()> {
        let role = self.node.role();
        let out = self.node.on_packet(Some(packet))?;
        // Sinks consume the packet; everything else counts only what it passes on.
        if role == NodeRole::Sink || out.is_some() {
            stats.record(role);
        }
        match (out, self.next.as_deref_mut()) {
            (Some(packet), Some(next)) => next.push(packet, stats),
            _ => Ok(()),
        }
    }
}

/// An exclusively owned, singly linked chain of nodes.
pub struct Pipeline {
    head: Box<Link>,
    len: usize,
}

impl Pipeline {
    pub fn new(head: impl PipelineNode + 'static) -> Self {
        Self {
            head: Box::new(Link {
                node: Box::new(head),
                next: None,
            }),
            len: 1,
        }
    }

    /// Append `node` at the tail.
    pub fn then(mut self, node: impl PipelineNode + 'static) -> Self {
        self.head.append(Box::new(Link {
            node: Box::new(node),
            next: None,
        }));
        self.len += 1;
        self
    }

    /// Number of nodes, head included.
    pub fn node_count(&self) -> usize {
        self.len
    }

    /// Node names from head to tail.
    pub fn node_names(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(self.len);
        let mut link = Some(&*self.head);
        while let Some(l) = link {
            out.push(l.node.name());
            link = l.next.as_deref();
        }
        out
    }

    /// Drive the head until it completes, forwarding every packet down the chain, then finish
    /// every node.
    ///
    /// The first error aborts the run; `finish` is not called in that case.
    #[tracing::instrument(level = "debug", skip_all, fields(nodes = self.len))]
    pub fn execute(&mut self) -> FrameResult<RunStats> {
        let _sw = Stopwatch::start("pipeline");
        if self.head.node.role() != NodeRole::Source {
            return Err(FrameError::validation(format!(
                "pipeline head '{}' is not a source",
                self.head.node.name()
            )));
        }

        let mut stats = RunStats::default();
        while !self.head.node.is_complete() {
            let Some(packet) = self.head.node.on_packet(None)? else {
                continue;
            };
            stats.record(NodeRole::Source);
            if let Some(next) = self.head.next.as_deref_mut() {
                next.push(packet, &mut stats)?;
            }
        }

        let mut link = Some(&mut *self.head);
        while let Some(l) = link {
            l.node.finish()?;
            link = l.next.as_deref_mut();
        }

        tracing::info!(
            decoded = stats.frames_decoded,
            processed = stats.frames_processed,
            encoded = stats.frames_encoded,
            "pipeline finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        left: u32,
    }

    impl PipelineNode for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn role(&self) -> NodeRole {
            NodeRole::Source
        }

        fn on_packet(&mut self, _packet: Option<Packet>) -> FrameResult<Option<Packet>> {
            self.left = self.left.saturating_sub(1);
            Ok(None)
        }

        fn is_complete(&self) -> bool {
            self.left == 0
        }
    }

    struct Passthrough;

    impl PipelineNode for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn on_packet(&mut self, packet: Option<Packet>) -> FrameResult<Option<Packet>> {
            Ok(packet)
        }

        fn is_complete(&self) -> bool {
            false
        }
    }

    #[test]
    fn then_appends_at_tail() {
        let p = Pipeline::new(Counter { left: 1 })
            .then(Passthrough)
            .then(Passthrough);
        assert_eq!(p.node_count(), 3);
        assert_eq!(p.node_names(), vec!["counter", "passthrough", "passthrough"]);
    }

    #[test]
    fn head_must_be_a_source() {
        let mut p = Pipeline::new(Passthrough);
        assert!(matches!(p.execute(), Err(FrameError::Validation(_))));
    }

    #[test]
    fn loop_stops_when_head_completes() {
        let mut p = Pipeline::new(Counter { left: 3 }).then(Passthrough);
        let stats = p.execute().unwrap();
        assert_eq!(stats, RunStats::default());
    }
}
