/// Size unit of the progressive phase.
pub const CHUNK_STEP: u64 = 128 * 1024;

/// Number of progressively growing chunks before the fixed phase.
pub const PROGRESSIVE_CHUNKS: u64 = 8;

/// Size of every chunk after the progressive phase.
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

/// Start offsets of the chunks of a stream of `length` bytes.
///
/// Chunks grow by 128 KiB up to 1 MiB, then stay at 1 MiB. The last chunk
/// spans from the last boundary to `length`. The result always starts with 0.
#[must_use]
#[inline]
pub fn chunk_boundaries(length: u64) -> Vec<u64> {
    let mut boundaries = vec![0];
    let mut offset = 0u64;
    for index in 1..=PROGRESSIVE_CHUNKS {
        let next = offset.saturating_add(index.saturating_mul(CHUNK_STEP));
        if next >= length {
            break;
        }
        offset = next;
        boundaries.push(offset);
    }
    loop {
        let next = offset.saturating_add(MAX_CHUNK_SIZE);
        if next >= length {
            break;
        }
        offset = next;
        boundaries.push(offset);
    }
    boundaries
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, clippy::arithmetic_side_effects, reason = "test")]
mod tests {
    use super::*;

    const PROGRESSIVE_END: u64 = CHUNK_STEP * (1 + 2 + 3 + 4 + 5 + 6 + 7 + 8);

    #[test]
    fn small_streams_have_one_chunk() {
        assert_eq!(chunk_boundaries(0), vec![0]);
        assert_eq!(chunk_boundaries(1), vec![0]);
        assert_eq!(chunk_boundaries(CHUNK_STEP - 1), vec![0]);
        assert_eq!(chunk_boundaries(CHUNK_STEP), vec![0]);
        assert_eq!(chunk_boundaries(CHUNK_STEP + 1), vec![0, CHUNK_STEP]);
    }

    #[test]
    fn progressive_then_fixed() {
        let boundaries = chunk_boundaries(PROGRESSIVE_END + 1);
        let expected: Vec<u64> = [0, 1, 3, 6, 10, 15, 21, 28, 36]
            .into_iter()
            .map(|units| units * CHUNK_STEP)
            .collect();
        assert_eq!(boundaries, expected);

        let boundaries = chunk_boundaries(PROGRESSIVE_END + 2 * MAX_CHUNK_SIZE + 1);
        assert_eq!(boundaries.len(), 11);
        assert_eq!(
            boundaries[9..],
            [
                PROGRESSIVE_END + MAX_CHUNK_SIZE,
                PROGRESSIVE_END + 2 * MAX_CHUNK_SIZE
            ]
        );
    }

    #[test]
    fn exact_multiple_does_not_add_empty_chunk() {
        assert_eq!(chunk_boundaries(PROGRESSIVE_END).len(), 8);
        assert_eq!(
            chunk_boundaries(PROGRESSIVE_END + MAX_CHUNK_SIZE).last(),
            Some(&PROGRESSIVE_END)
        );
    }

    #[test]
    fn chunks_cover_stream() {
        let length = 3 * MAX_CHUNK_SIZE + 17;
        let boundaries = chunk_boundaries(length);
        for pair in boundaries.windows(2) {
            assert!(pair[1] - pair[0] <= MAX_CHUNK_SIZE);
        }
        assert!(length - boundaries.last().unwrap() <= MAX_CHUNK_SIZE);
    }
}
