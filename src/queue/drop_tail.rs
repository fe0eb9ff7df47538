//! DropTail（尾丢弃）队列
//!
//! 当加入新 packet 会超过容量（包数或字节数）时，直接丢弃新到达的 packet。

use std::collections::VecDeque;

use crate::net::{DropReason, Packet};
use crate::sim::SimTime;

use super::{PacketQueue, QueueMode, Rejected};

#[derive(Debug)]
pub struct DropTailQueue {
    mode: QueueMode,
    limit: u64,
    cur_bytes: u64,
    peak: u64,
    q: VecDeque<Packet>,
}

impl DropTailQueue {
    pub fn new(mode: QueueMode, limit: u64) -> Self {
        Self {
            mode,
            limit,
            cur_bytes: 0,
            peak: 0,
            q: VecDeque::new(),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl PacketQueue for DropTailQueue {
    fn enqueue(&mut self, pkt: Packet, _now: SimTime) -> Result<(), Rejected> {
        let units = self.mode.units_of(&pkt);
        if self.occupancy().saturating_add(units) > self.limit {
            return Err(Rejected {
                pkt,
                reason: DropReason::QueueLimit,
            });
        }
        self.cur_bytes = self.cur_bytes.saturating_add(pkt.size_bytes as u64);
        self.q.push_back(pkt);
        self.peak = self.peak.max(self.occupancy());
        Ok(())
    }

    fn dequeue(&mut self, _now: SimTime) -> Option<Packet> {
        let pkt = self.q.pop_front()?;
        self.cur_bytes = self.cur_bytes.saturating_sub(pkt.size_bytes as u64);
        Some(pkt)
    }

    fn len(&self) -> usize {
        self.q.len()
    }

    fn bytes(&self) -> u64 {
        self.cur_bytes
    }

    fn occupancy(&self) -> u64 {
        match self.mode {
            QueueMode::Packets => self.q.len() as u64,
            QueueMode::Bytes => self.cur_bytes,
        }
    }

    fn peak_occupancy(&self) -> u64 {
        self.peak
    }

    fn mode(&self) -> QueueMode {
        self.mode
    }
}
