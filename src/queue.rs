// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pending capture queue.
//!
//! Buffers submitted by the control plane wait here, in submission order,
//! until the issue worker programs them into hardware. The queue is a
//! bounded kanal channel; a stop request is a flag plus a wake token pushed
//! through the same channel so a worker blocked on an empty queue returns.

use crate::{buffer::CaptureBuffer, error::Error};
use std::sync::atomic::{AtomicBool, Ordering};

enum Slot {
    Buffer(CaptureBuffer),
    Wake,
}

/// Cooperative stop request shared by the control plane and the workers.
#[derive(Debug, Default)]
pub struct StopSignal {
    flag: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

pub struct PendingQueue {
    tx: kanal::Sender<Slot>,
    rx: kanal::Receiver<Slot>,
    depth: usize,
}

impl PendingQueue {
    /// Queue holding up to `depth` buffers.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        // One extra slot so a wake token always fits next to a full queue.
        let (tx, rx) = kanal::bounded(depth + 1);
        Self { tx, rx, depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of slots in use, wake tokens included.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Appends a buffer without blocking. A full queue returns the buffer
    /// together with [`Error::QueueFull`].
    pub fn enqueue(&self, buffer: CaptureBuffer) -> Result<(), (CaptureBuffer, Error)> {
        if self.rx.len() >= self.depth {
            return Err((buffer, Error::QueueFull(self.depth)));
        }
        let mut slot = Some(Slot::Buffer(buffer));
        match self.tx.try_send_option(&mut slot) {
            Ok(true) => Ok(()),
            // Full (the last slot went to a wake token) or closed.
            _ => match slot {
                Some(Slot::Buffer(buffer)) => Err((buffer, Error::QueueFull(self.depth))),
                _ => Ok(()),
            },
        }
    }

    /// Blocks until a buffer is available or `stop` is observed.
    ///
    /// Returns `None` once stop is requested; buffers still queued at that
    /// point are left for [`PendingQueue::drain`].
    pub fn dequeue(&self, stop: &StopSignal) -> Option<CaptureBuffer> {
        loop {
            if stop.is_set() {
                return None;
            }
            match self.rx.recv() {
                Ok(Slot::Buffer(buffer)) => return Some(buffer),
                // Stale or early wake, re-check the flag.
                Ok(Slot::Wake) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Unblocks a worker waiting in [`PendingQueue::dequeue`].
    pub fn wake(&self) {
        // A full queue cannot have a blocked receiver, dropping the token
        // is fine then.
        let _ = self.tx.try_send(Slot::Wake);
    }

    /// Removes every queued buffer, oldest first.
    pub fn drain(&self) -> Vec<CaptureBuffer> {
        let mut drained = Vec::new();
        while let Ok(Some(slot)) = self.rx.try_recv() {
            if let Slot::Buffer(buffer) = slot {
                drained.push(buffer);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn fifo_order_and_drain() {
        let queue = PendingQueue::new(4);
        for i in 0..3 {
            queue.enqueue(CaptureBuffer::new(i, 0x1000 * i as u64, 64)).unwrap();
        }
        let stop = StopSignal::new();
        assert_eq!(queue.dequeue(&stop).unwrap().index(), 0);
        let rest: Vec<u32> = queue.drain().iter().map(|b| b.index()).collect();
        assert_eq!(rest, vec![1, 2]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn full_queue_returns_buffer() {
        let queue = PendingQueue::new(1);
        queue.enqueue(CaptureBuffer::new(0, 0, 64)).unwrap();
        let (buffer, err) = queue.enqueue(CaptureBuffer::new(1, 0, 64)).unwrap_err();
        assert_eq!(buffer.index(), 1);
        assert!(matches!(err, Error::QueueFull(1)));
    }

    #[test]
    fn wake_token_does_not_take_buffer_slot() {
        let queue = PendingQueue::new(1);
        queue.wake();
        let (buffer, err) = queue.enqueue(CaptureBuffer::new(5, 0, 64)).unwrap_err();
        assert_eq!(buffer.index(), 5);
        assert!(matches!(err, Error::QueueFull(1)));

        assert!(queue.drain().is_empty());
        queue.enqueue(buffer).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn stop_wakes_blocked_dequeue() {
        let queue = Arc::new(PendingQueue::new(2));
        let stop = Arc::new(StopSignal::new());

        let worker = {
            let queue = queue.clone();
            let stop = stop.clone();
            thread::spawn(move || queue.dequeue(&stop))
        };
        thread::sleep(Duration::from_millis(20));
        stop.request();
        queue.wake();
        assert!(worker.join().unwrap().is_none());
    }
}
