//! Durable FIFO queue of serialized payloads.
//!
//! One JSON object per line, appended to a journal file so buffered events survive process
//! restarts. The in-memory index mirrors the file; items are removed only after the batch
//! containing them is acknowledged by the network layer (two-phase: [`PayloadQueue::batch`] then
//! [`PayloadQueue::remove`]). Callers serialize access with a single writer lock; this type does
//! no locking of its own.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Maximum number of buffered payloads before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 1000;

pub struct PayloadQueue {
    path: PathBuf,
    file: File,
    items: VecDeque<String>,
    capacity: usize,
}

impl PayloadQueue {
    /// Open (or create) the journal at `path`. Corrupt lines are skipped with a warning; if the
    /// journal holds more than `capacity` items, the oldest are dropped.
    pub fn open(path: PathBuf, capacity: usize) -> std::io::Result<PayloadQueue> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut items = VecDeque::new();
        match File::open(&path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<serde::de::IgnoredAny>(&line) {
                        Ok(_) => items.push_back(line),
                        Err(err) => {
                            log::warn!(target: "beacon", "skipping corrupt journal line: {}", err);
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        let dropped = items.len().saturating_sub(capacity);
        if dropped > 0 {
            log::warn!(target: "beacon", "journal over capacity, dropping {dropped} oldest payloads");
            items.drain(..dropped);
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut queue = PayloadQueue {
            path,
            file,
            items,
            capacity,
        };
        if dropped > 0 {
            queue.rewrite()?;
        }
        Ok(queue)
    }

    /// Append one serialized payload. Returns the dropped oldest item when the queue was at
    /// capacity. The in-memory queue is updated even if persisting fails.
    pub fn append(&mut self, line: String) -> std::io::Result<Option<String>> {
        self.items.push_back(line);

        if self.items.len() > self.capacity {
            let dropped = self.items.pop_front();
            self.rewrite()?;
            return Ok(dropped);
        }

        let line = self.items.back().expect("just pushed");
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        Ok(None)
    }

    /// The up-to-`n` oldest items, left in place until [`PayloadQueue::remove`] acknowledges
    /// them.
    pub fn batch(&self, n: usize) -> Vec<String> {
        self.items.iter().take(n).cloned().collect()
    }

    /// Drop the `n` oldest items after their batch was acknowledged.
    pub fn remove(&mut self, n: usize) -> std::io::Result<()> {
        let n = n.min(self.items.len());
        self.items.drain(..n);
        self.rewrite()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // Rewrites the whole journal. Done through a temporary file + rename so a crash mid-rewrite
    // leaves either the old or the new journal, never a torn one.
    fn rewrite(&mut self) -> std::io::Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        let mut tmp = File::create(&tmp_path)?;
        for line in &self.items {
            tmp.write_all(line.as_bytes())?;
            tmp.write_all(b"\n")?;
        }
        tmp.flush()?;
        std::fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PayloadQueue;

    fn item(n: usize) -> String {
        format!("{{\"messageId\":\"{n}\"}}")
    }

    #[test]
    fn fifo_batch_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = PayloadQueue::open(dir.path().join("queue.jsonl"), 10).unwrap();

        for n in 0..5 {
            assert_eq!(queue.append(item(n)).unwrap(), None);
        }

        assert_eq!(queue.batch(3), vec![item(0), item(1), item(2)]);
        // Peeking removes nothing.
        assert_eq!(queue.len(), 5);

        queue.remove(3).unwrap();
        assert_eq!(queue.batch(10), vec![item(3), item(4)]);
    }

    #[test]
    fn capacity_overflow_drops_the_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = PayloadQueue::open(dir.path().join("queue.jsonl"), 3).unwrap();

        for n in 0..3 {
            assert_eq!(queue.append(item(n)).unwrap(), None);
        }
        let dropped = queue.append(item(3)).unwrap();

        assert_eq!(dropped, Some(item(0)));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.batch(10), vec![item(1), item(2), item(3)]);
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");

        {
            let mut queue = PayloadQueue::open(path.clone(), 10).unwrap();
            queue.append(item(1)).unwrap();
            queue.append(item(2)).unwrap();
            queue.remove(1).unwrap();
        }

        let queue = PayloadQueue::open(path, 10).unwrap();
        assert_eq!(queue.batch(10), vec![item(2)]);
    }

    #[test]
    fn corrupt_lines_are_skipped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        std::fs::write(&path, format!("{}\nnot json at all\n{}\n", item(1), item(2))).unwrap();

        let queue = PayloadQueue::open(path, 10).unwrap();

        assert_eq!(queue.batch(10), vec![item(1), item(2)]);
    }

    #[test]
    fn reopening_over_capacity_keeps_the_newest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        std::fs::write(&path, format!("{}\n{}\n{}\n", item(1), item(2), item(3))).unwrap();

        let queue = PayloadQueue::open(path, 2).unwrap();

        assert_eq!(queue.batch(10), vec![item(2), item(3)]);
    }
}
