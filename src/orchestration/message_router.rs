//! # Message Router
//!
//! Splits one delivered batch into per-job groups so each job costs a single
//! lock/read/write cycle no matter how many of its messages arrived together.
//!
//! Grouping only ever looks inside one batch. Two batches, or two service instances, can still
//! carry messages for the same job at the same time; serializing those is the job lock's work.

use std::collections::HashMap;
use uuid::Uuid;

use crate::messaging::{QueuedResult, ResultMessage};

/// All messages of one batch that target the same job, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGroup {
    pub job_id: Uuid,
    pub messages: Vec<QueuedResult>,
}

impl MessageGroup {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            messages: Vec::new(),
        }
    }

    /// The decoded worker reports, in arrival order
    pub fn results(&self) -> impl Iterator<Item = &ResultMessage> {
        self.messages.iter().map(|queued| &queued.message)
    }

    /// Highest queue read count in the group; above 1 means a redelivery
    pub fn max_read_count(&self) -> i32 {
        self.messages
            .iter()
            .map(|queued| queued.read_count)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Groups a batch by job id
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    /// Partition `batch` into groups ordered by the first appearance of each job id.
    /// Message order inside a group is the batch order.
    pub fn group(&self, batch: Vec<QueuedResult>) -> Vec<MessageGroup> {
        let mut positions: HashMap<Uuid, usize> = HashMap::new();
        let mut groups: Vec<MessageGroup> = Vec::new();

        for queued in batch {
            let job_id = queued.job_id();
            let index = *positions.entry(job_id).or_insert_with(|| {
                groups.push(MessageGroup::new(job_id));
                groups.len() - 1
            });
            groups[index].messages.push(queued);
        }

        groups
    }
}
