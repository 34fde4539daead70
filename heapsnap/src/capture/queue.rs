//! Per-channel block queues
//!
//! Bulk blocks carry a per-channel sequence number. Consumers pop them in
//! arrival order and every pop checks the number is exactly one more than the
//! previous, so a dropped block fails the capture instead of silently losing
//! nodes or shifting edges onto the wrong parent.

use std::collections::VecDeque;

use crate::domain::CaptureError;
use crate::events::{BulkCcwBlock, BulkEdgeBlock, BulkEdgeValue, BulkNodeBlock, BulkStaticVarBlock};

/// A block with a per-channel sequence number
pub trait Sequenced {
    fn sequence(&self) -> u32;
}

macro_rules! impl_sequenced {
    ($($block:ty),* $(,)?) => {
        $(impl Sequenced for $block {
            fn sequence(&self) -> u32 {
                self.index
            }
        })*
    };
}

impl_sequenced!(BulkNodeBlock, BulkEdgeBlock, BulkCcwBlock, BulkStaticVarBlock);

#[derive(Debug)]
pub struct BlockQueue<T> {
    channel: &'static str,
    blocks: VecDeque<T>,
    next_sequence: u32,
}

impl<T: Sequenced> BlockQueue<T> {
    #[must_use]
    pub fn new(channel: &'static str) -> Self {
        Self { channel, blocks: VecDeque::new(), next_sequence: 0 }
    }

    pub fn push(&mut self, block: T) {
        self.blocks.push_back(block);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Next block in sequence
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::SequenceGap`] if the block at the head of the
    /// queue is not the successor of the last one popped.
    pub fn pop(&mut self) -> Result<Option<T>, CaptureError> {
        let Some(block) = self.blocks.pop_front() else {
            return Ok(None);
        };
        let actual = block.sequence();
        if actual != self.next_sequence {
            return Err(CaptureError::SequenceGap {
                channel: self.channel,
                expected: self.next_sequence,
                actual,
            });
        }
        self.next_sequence = actual.wrapping_add(1);
        Ok(Some(block))
    }

    /// Pop every remaining block
    ///
    /// # Errors
    ///
    /// Fails on the first sequence gap.
    pub fn drain(&mut self) -> Result<Vec<T>, CaptureError> {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        while let Some(block) = self.pop()? {
            blocks.push(block);
        }
        Ok(blocks)
    }
}

/// Cursor over the edge channel, crossing block boundaries
#[derive(Debug)]
pub struct EdgeReader {
    queue: BlockQueue<BulkEdgeBlock>,
    current: Option<BulkEdgeBlock>,
    position: usize,
}

impl EdgeReader {
    #[must_use]
    pub fn new(queue: BlockQueue<BulkEdgeBlock>) -> Self {
        Self { queue, current: None, position: 0 }
    }

    /// Next edge, or `None` once the channel is exhausted
    ///
    /// # Errors
    ///
    /// Fails on an edge block sequence gap.
    pub fn next_edge(&mut self) -> Result<Option<BulkEdgeValue>, CaptureError> {
        loop {
            if let Some(block) = &self.current {
                if let Some(edge) = block.edges.get(self.position) {
                    self.position += 1;
                    return Ok(Some(edge.clone()));
                }
            }
            match self.queue.pop()? {
                Some(block) => {
                    self.current = Some(block);
                    self.position = 0;
                }
                None => return Ok(None),
            }
        }
    }

    /// Edges not yet consumed, in the current block and in queued blocks
    #[must_use]
    pub fn remaining(&self) -> usize {
        let in_block =
            self.current.as_ref().map_or(0, |b| b.edges.len().saturating_sub(self.position));
        in_block + self.queue.blocks.iter().map(|b| b.edges.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Pid, Timestamp};
    use crate::events::{BulkNodeBlock, Provider};

    fn node_block(index: u32) -> BulkNodeBlock {
        BulkNodeBlock {
            pid: Pid(1),
            timestamp: Timestamp(0),
            provider: Provider::Runtime,
            index,
            nodes: vec![],
        }
    }

    fn edge_block(index: u32, targets: &[u64]) -> BulkEdgeBlock {
        BulkEdgeBlock {
            pid: Pid(1),
            timestamp: Timestamp(0),
            provider: Provider::Runtime,
            index,
            edges: targets
                .iter()
                .map(|&t| BulkEdgeValue { target: Address(t), field_id: 0 })
                .collect(),
        }
    }

    #[test]
    fn test_consecutive_blocks_pass() {
        let mut queue = BlockQueue::new("node");
        for i in [0, 1, 2] {
            queue.push(node_block(i));
        }
        assert_eq!(queue.drain().unwrap().len(), 3);
    }

    #[test]
    fn test_gap_is_fatal() {
        let mut queue = BlockQueue::new("node");
        for i in [0, 1, 3] {
            queue.push(node_block(i));
        }
        let err = queue.drain().unwrap_err();
        assert!(matches!(
            err,
            CaptureError::SequenceGap { channel: "node", expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn test_edge_reader_crosses_blocks() {
        let mut queue = BlockQueue::new("edge");
        queue.push(edge_block(0, &[1, 2]));
        queue.push(edge_block(1, &[]));
        queue.push(edge_block(2, &[3]));
        let mut reader = EdgeReader::new(queue);

        let targets: Vec<u64> =
            std::iter::from_fn(|| reader.next_edge().unwrap()).map(|e| e.target.0).collect();
        assert_eq!(targets, vec![1, 2, 3]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_edge_reader_reports_leftovers() {
        let mut queue = BlockQueue::new("edge");
        queue.push(edge_block(0, &[1, 2, 3]));
        queue.push(edge_block(1, &[4]));
        let mut reader = EdgeReader::new(queue);
        reader.next_edge().unwrap();
        assert_eq!(reader.remaining(), 3);
    }
}
