use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Lock-free single-producer/single-consumer queue of f32 samples.
///
/// The engine thread writes, the device callback reads. Samples are stored as
/// their bit patterns so the storage can be shared without locking.
#[derive(Debug)]
pub struct RingBuffer {
    slots: Box<[AtomicU32]>,
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

impl RingBuffer {
    /// Create a ring holding up to `capacity - 1` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples waiting to be read
    pub fn available_read(&self) -> usize {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        if write_pos >= read_pos {
            write_pos - read_pos
        } else {
            self.capacity - read_pos + write_pos
        }
    }

    /// Samples that can be written; one slot stays empty to tell full from empty
    pub fn available_write(&self) -> usize {
        self.capacity - 1 - self.available_read()
    }

    /// Queue as many samples as fit; returns the number written
    pub fn write(&self, data: &[f32]) -> usize {
        let count = data.len().min(self.available_write());
        let mut pos = self.write_pos.load(Ordering::Acquire);
        for sample in &data[..count] {
            self.slots[pos].store(sample.to_bits(), Ordering::Relaxed);
            pos = (pos + 1) % self.capacity;
        }
        self.write_pos.store(pos, Ordering::Release);
        count
    }

    /// Dequeue into `data`; returns the number of samples read
    pub fn read(&self, data: &mut [f32]) -> usize {
        let count = data.len().min(self.available_read());
        let mut pos = self.read_pos.load(Ordering::Acquire);
        for slot in &mut data[..count] {
            *slot = f32::from_bits(self.slots[pos].load(Ordering::Relaxed));
            pos = (pos + 1) % self.capacity;
        }
        self.read_pos.store(pos, Ordering::Release);
        count
    }

    /// Drop everything queued
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }
}
