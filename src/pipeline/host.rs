//! Deterministic single-threaded driver for a pipeline on a [`SimulatedLink`].
//!
//! The harness plays both the hardware and the board's interrupt glue. Each call
//! completes at most the operations it names, so tests control exactly where a
//! completion lands relative to the consumer.

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::pipeline::{
    Pipeline, PipelineCounters, PipelineMetrics, SampleReceiver, SendCompletion, StatsConsumer,
};
use crate::protocol::Sample;
use crate::transport::{ReadOutcome, SimulatedLink};
use std::sync::Arc;

/// A pipeline wired to a [`SimulatedLink`], with the link's completions under test control.
pub struct HostHarness {
    link: Arc<SimulatedLink>,
    receiver: SampleReceiver<SimulatedLink>,
    completion: SendCompletion<SimulatedLink>,
    consumer: StatsConsumer<SimulatedLink>,
    counters: Arc<PipelineCounters>,
}

impl HostHarness {
    /// Build a pipeline on a fresh link and arm the first read.
    pub fn new(config: &StreamConfig) -> StreamResult<Self> {
        let link = Arc::new(SimulatedLink::new());
        let Pipeline {
            receiver,
            completion,
            consumer,
            counters,
            ..
        } = Pipeline::new(config, Arc::clone(&link))?;
        receiver.arm();

        Ok(Self {
            link,
            receiver,
            completion,
            consumer,
            counters,
        })
    }

    /// Complete the armed read with `frame`.
    ///
    /// The frame is passed through as-is, so a wrong length exercises the receiver's
    /// short-read path.
    pub fn deliver(&mut self, frame: &[u8]) -> StreamResult<()> {
        self.link
            .take_read()
            .ok_or(StreamError::ReadNotArmed(frame.len()))?;
        self.receiver.on_read_complete(ReadOutcome::Complete(frame));
        Ok(())
    }

    /// Complete the armed read with an encoded sample.
    pub fn deliver_sample(&mut self, sample: Sample) -> StreamResult<()> {
        self.deliver(&sample.to_le_bytes())
    }

    /// Fail the armed read.
    pub fn fail_read(&mut self) -> StreamResult<()> {
        self.link.take_read().ok_or(StreamError::ReadNotArmed(0))?;
        self.receiver.on_read_complete(ReadOutcome::Failed);
        Ok(())
    }

    /// Run one consumer pass. Returns the samples processed.
    pub fn poll(&mut self) -> usize {
        self.consumer.poll()
    }

    /// Complete the in-flight write, if any. Returns the bytes it carried.
    pub fn complete_write(&mut self) -> Option<usize> {
        let sent = self.link.complete_write()?;
        self.completion.on_write_complete();
        Some(sent)
    }

    /// Complete writes until the link is idle. Returns the number of writes completed.
    pub fn flush_writes(&mut self) -> usize {
        let mut writes = 0;
        while self.complete_write().is_some() {
            writes += 1;
        }
        writes
    }

    /// Alternate consumer passes and write completions until neither makes progress.
    /// Returns the samples processed.
    pub fn service(&mut self) -> usize {
        let mut processed = 0;
        loop {
            let polled = self.poll();
            let written = self.flush_writes();
            processed += polled;
            if polled == 0 && written == 0 {
                return processed;
            }
        }
    }

    /// Deliver each sample and service the pipeline after every one.
    pub fn feed<I>(&mut self, samples: I) -> StreamResult<()>
    where
        I: IntoIterator<Item = Sample>,
    {
        for sample in samples {
            self.deliver_sample(sample)?;
            self.service();
        }
        Ok(())
    }

    /// Cancel outstanding operations and discard queued output, as an external reset
    /// would. The receive side is re-armed afterwards.
    pub fn abort(&mut self) {
        self.receiver.abort();
        self.completion.abort();
        self.receiver.arm();
    }

    /// Bytes transmitted since the last call.
    pub fn take_output(&self) -> Vec<u8> {
        self.link.take_transmitted()
    }

    /// The simulated link, for inspecting its state.
    pub fn link(&self) -> &SimulatedLink {
        &self.link
    }

    /// The main-context consumer.
    pub fn consumer(&self) -> &StatsConsumer<SimulatedLink> {
        &self.consumer
    }

    /// Snapshot of the pipeline counters.
    pub fn metrics(&self) -> PipelineMetrics {
        self.counters.snapshot()
    }
}
