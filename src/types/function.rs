//! The `Function` entity (spec §3): a named handler identity with three
//! priority FIFOs and the set of worker connections that claim to handle it.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;

use super::connection::ConnId;
use super::job::JobHandle;
use crate::wire::protocol::Priority;

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Bytes,
    pub max_queue_size: Option<u32>,
    pub high: VecDeque<JobHandle>,
    pub normal: VecDeque<JobHandle>,
    pub low: VecDeque<JobHandle>,
    pub running: u32,
    pub workers: HashSet<ConnId>,
}

impl Function {
    pub fn new(name: Bytes) -> Self {
        Self {
            name,
            max_queue_size: None,
            high: VecDeque::new(),
            normal: VecDeque::new(),
            low: VecDeque::new(),
            running: 0,
            workers: HashSet::new(),
        }
    }

    pub fn queue_mut(&mut self, priority: Priority) -> &mut VecDeque<JobHandle> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    pub fn queue(&self, priority: Priority) -> &VecDeque<JobHandle> {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        }
    }

    /// Total queued (not-yet-assigned) jobs across all three priorities.
    pub fn queued_count(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    pub fn is_full(&self) -> bool {
        match self.max_queue_size {
            Some(0) | None => false,
            Some(max) => self.queued_count() >= max as usize,
        }
    }
}
