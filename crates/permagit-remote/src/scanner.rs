//! Streaming substring detection.

/// Output line `git-receive-pack` prints after unpacking pushed objects.
pub const UNPACK_OK: &[u8] = b"unpack ok";

/// Detects a byte marker in a stream delivered in arbitrary chunks.
///
/// Only the last `marker.len() - 1` bytes of the previous chunk are retained,
/// so a marker split across chunk boundaries is still found.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    marker: Vec<u8>,
    tail: Vec<u8>,
    found: bool,
}

impl MarkerScanner {
    /// Create a scanner for `marker`.
    pub fn new(marker: &[u8]) -> Self {
        Self {
            marker: marker.to_vec(),
            tail: Vec::with_capacity(marker.len()),
            found: marker.is_empty(),
        }
    }

    /// Feeds the next chunk. Returns true once the marker has been seen.
    pub fn observe(&mut self, chunk: &[u8]) -> bool {
        if self.found {
            return true;
        }

        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);
        if window
            .windows(self.marker.len())
            .any(|candidate| candidate == self.marker.as_slice())
        {
            self.found = true;
            return true;
        }

        let keep = self.marker.len() - 1;
        let start = window.len().saturating_sub(keep);
        window.drain(..start);
        self.tail = window;
        false
    }

    /// Returns true if the marker has been seen.
    pub fn found(&self) -> bool {
        self.found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scan_chunks(data: &[u8], sizes: &[usize]) -> bool {
        let mut scanner = MarkerScanner::new(UNPACK_OK);
        let mut rest = data;
        let mut sizes = sizes.iter().cycle();
        while !rest.is_empty() {
            let size = (*sizes.next().unwrap()).min(rest.len());
            let (chunk, tail) = rest.split_at(size);
            scanner.observe(chunk);
            rest = tail;
        }
        scanner.found()
    }

    #[test]
    fn test_marker_in_one_chunk() {
        let mut scanner = MarkerScanner::new(UNPACK_OK);
        assert!(!scanner.observe(b"0030\x01000eunpack "));
        assert!(scanner.observe(b"ok\n0019ok refs/heads/main\n"));
        assert!(scanner.found());
    }

    #[test]
    fn test_partial_marker_is_not_a_match() {
        let mut scanner = MarkerScanner::new(UNPACK_OK);
        assert!(!scanner.observe(b"unpack o"));
        assert!(!scanner.observe(b"k? no: unpack error\n"));
    }

    proptest! {
        #[test]
        fn marker_found_across_any_chunking(
            prefix in proptest::collection::vec(any::<u8>(), 0..64),
            suffix in proptest::collection::vec(any::<u8>(), 0..64),
            sizes in proptest::collection::vec(1usize..12, 1..8),
        ) {
            let mut data = prefix;
            data.extend_from_slice(UNPACK_OK);
            data.extend_from_slice(&suffix);
            prop_assert!(scan_chunks(&data, &sizes));
        }

        #[test]
        fn no_false_positive_without_marker(
            data in proptest::collection::vec(any::<u8>().prop_filter("no 'u'", |b| *b != b'u'), 0..256),
            sizes in proptest::collection::vec(1usize..12, 1..8),
        ) {
            prop_assert!(!scan_chunks(&data, &sizes));
        }
    }
}
