//! Sample-position to file-position table over an MP3 stream.

/// One indexed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekIndexEntry {
    /// Where reading must start to reach this frame. Includes any junk that
    /// was skipped while resynchronising in front of it.
    pub file_position: u64,
    /// First decoded sample (per channel) of this frame.
    pub sample_position: u64,
    pub sample_count: u32,
    /// Bytes consumed from `file_position` through the end of the frame.
    pub byte_count: u32,
}

impl SeekIndexEntry {
    pub fn end_sample(&self) -> u64 {
        self.sample_position + self.sample_count as u64
    }

    pub fn end_position(&self) -> u64 {
        self.file_position + self.byte_count as u64
    }
}

/// Ordered, contiguous frame table. Entries are appended in file order and
/// each one starts at the sample where the previous one ended.
#[derive(Debug, Clone, Default)]
pub struct SeekIndex {
    entries: Vec<SeekIndexEntry>,
    total_samples: u64,
    total_bytes: u64,
}

impl SeekIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next frame in file order.
    pub fn push(&mut self, file_position: u64, sample_count: u32, byte_count: u32) -> SeekIndexEntry {
        let entry = SeekIndexEntry {
            file_position,
            sample_position: self.total_samples,
            sample_count,
            byte_count,
        };
        self.entries.push(entry);
        self.total_samples += sample_count as u64;
        self.total_bytes += byte_count as u64;
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SeekIndexEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[SeekIndexEntry] {
        &self.entries
    }

    /// Sum of every entry's `sample_count`.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// File position just past the last indexed frame.
    pub fn end_position(&self) -> Option<u64> {
        self.entries.last().map(SeekIndexEntry::end_position)
    }

    /// Index of the frame whose sample range contains `sample`.
    pub fn find_frame(&self, sample: u64) -> Option<usize> {
        let index = self
            .entries
            .partition_point(|entry| entry.end_sample() <= sample);
        (index < self.entries.len()).then_some(index)
    }

    /// Average bytes per indexed frame.
    pub fn mean_frame_bytes(&self) -> Option<f64> {
        (!self.entries.is_empty()).then(|| self.total_bytes as f64 / self.entries.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(frames: &[(u64, u32, u32)]) -> SeekIndex {
        let mut index = SeekIndex::new();
        for &(pos, samples, bytes) in frames {
            index.push(pos, samples, bytes);
        }
        index
    }

    #[test]
    fn sample_ranges_are_contiguous() {
        let index = index_of(&[(0, 1152, 417), (417, 1152, 418), (835, 576, 200)]);

        for pair in index.entries().windows(2) {
            assert_eq!(pair[0].end_sample(), pair[1].sample_position);
        }
        let summed: u64 = index.entries().iter().map(|e| e.sample_count as u64).sum();
        assert_eq!(index.total_samples(), summed);
        assert_eq!(index.end_position(), Some(1035));
    }

    #[test]
    fn find_frame_boundaries() {
        let index = index_of(&[(0, 1152, 417), (417, 1152, 417), (834, 1152, 417)]);

        assert_eq!(index.find_frame(0), Some(0));
        assert_eq!(index.find_frame(1151), Some(0));
        assert_eq!(index.find_frame(1152), Some(1));
        assert_eq!(index.find_frame(3455), Some(2));
        assert_eq!(index.find_frame(3456), None);
    }

    #[test]
    fn empty_index() {
        let index = SeekIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.find_frame(0), None);
        assert_eq!(index.mean_frame_bytes(), None);
        assert_eq!(index.end_position(), None);
    }
}
