//! Capture buffer
//!
//! Holds the audio chunks of one capture in arrival order.

use tokio::time::Instant;

/// One chunk of captured audio
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Raw PCM bytes (16-bit little-endian, mono)
    pub bytes: Vec<u8>,
    /// Position in the capture, strictly increasing
    pub sequence_index: u64,
    /// When the chunk was appended
    pub captured_at: Instant,
}

/// Ordered, append-only collection of audio segments
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    segments: Vec<AudioSegment>,
    next_index: u64,
    byte_len: usize,
}

impl CaptureBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
            next_index: 0,
            byte_len: 0,
        }
    }

    /// Append a chunk and return its sequence index
    ///
    /// Empty chunks are kept so indices stay contiguous with reads.
    pub fn push(&mut self, bytes: Vec<u8>) -> u64 {
        let sequence_index = self.next_index;
        self.next_index += 1;
        self.byte_len += bytes.len();
        self.segments.push(AudioSegment {
            bytes,
            sequence_index,
            captured_at: Instant::now(),
        });
        sequence_index
    }

    /// Segments in arrival order
    #[must_use]
    pub fn segments(&self) -> &[AudioSegment] {
        &self.segments
    }

    /// Number of segments
    #[must_use]
    pub const fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total bytes across all segments
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Concatenate all segments in sequence order
    #[must_use]
    pub fn flatten(self) -> Vec<u8> {
        debug_assert!(
            self.segments
                .windows(2)
                .all(|pair| pair[0].sequence_index < pair[1].sequence_index),
            "capture segments out of order"
        );

        let mut audio = Vec::with_capacity(self.byte_len);
        for segment in self.segments {
            audio.extend_from_slice(&segment.bytes);
        }
        audio
    }
}
