//! Per-channel read position over the side-channel logs.
//!
//! Each poll first asks for the cheap [`LogInfo`] summary and only performs
//! a full read when the channel has moved past the consumed position.
//! Delivery is at-least-once; consumers must tolerate redelivered entries.

use crate::bridge::{LogError, LogSource};
use rfqbot_sdk::objects::{LogEntry, LogInfo, LogRead};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What to do with a channel given its latest summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    /// Nothing new since the consumed position.
    UpToDate,
    /// Read entries with `seq > after_seq`.
    Read { after_seq: u64 },
}

#[derive(Debug, Default)]
pub struct LogCursor {
    consumed: HashMap<String, u64>,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number consumed on `channel`, 0 before the first read.
    pub fn position(&self, channel: &str) -> u64 {
        self.consumed.get(channel).copied().unwrap_or(0)
    }

    /// Decide whether `channel` needs a full read.
    ///
    /// A summary below the consumed position means the log was reset; the
    /// position drops back to zero and the channel is read from the start.
    pub fn plan(&mut self, channel: &str, info: LogInfo) -> ReadPlan {
        let consumed = self.position(channel);
        if info.latest_seq == consumed {
            return ReadPlan::UpToDate;
        }
        if info.latest_seq < consumed {
            warn!(
                channel = %channel,
                latest_seq = info.latest_seq,
                consumed,
                "Channel log went backwards, rereading from the start"
            );
            self.consumed.insert(channel.to_string(), 0);
            if info.latest_seq == 0 {
                return ReadPlan::UpToDate;
            }
            return ReadPlan::Read { after_seq: 0 };
        }
        ReadPlan::Read {
            after_seq: consumed,
        }
    }

    /// Accept a read result and advance the position.
    ///
    /// Returns the entries newer than the consumed position in ascending
    /// `seq` order, without duplicates. The position moves to the highest
    /// returned `seq`. An empty read leaves it where it was, so entries a
    /// lagging source has announced but not yet served are read later.
    pub fn advance(&mut self, channel: &str, read: LogRead) -> Vec<LogEntry> {
        let consumed = self.position(channel);
        let mut entries: Vec<LogEntry> = read
            .events
            .into_iter()
            .filter(|entry| entry.seq > consumed)
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.dedup_by_key(|entry| entry.seq);

        match entries.last() {
            Some(last) => {
                self.consumed.insert(channel.to_string(), last.seq);
            }
            None if read.latest_seq > consumed => {
                debug!(
                    channel = %channel,
                    latest_seq = read.latest_seq,
                    consumed,
                    "Read returned nothing past the consumed position"
                );
            }
            None => {}
        }
        entries
    }

    /// Poll one channel: summary, then a full read if needed.
    ///
    /// On error the position is left unchanged so that the next poll retries
    /// from the same place.
    pub async fn poll(
        &mut self,
        source: &dyn LogSource,
        channel: &str,
    ) -> Result<Vec<LogEntry>, LogError> {
        let info = source.log_info(channel).await?;
        let after_seq = match self.plan(channel, info) {
            ReadPlan::UpToDate => return Ok(Vec::new()),
            ReadPlan::Read { after_seq } => after_seq,
        };

        let read = source.log_read(channel, after_seq).await?;
        let entries = self.advance(channel, read);
        debug!(
            channel = %channel,
            after_seq,
            count = entries.len(),
            position = self.position(channel),
            "Read channel log"
        );
        Ok(entries)
    }
}
