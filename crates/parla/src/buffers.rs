//! Fixed-capacity history containers feeding the pitch and spectral stages.
//!
//! All three buffers are zero-initialized at construction and never expose a
//! partially filled state; entries that predate the first pushes simply read
//! as zeros until the warm-up period has elapsed.

/// Linear buffer of the `S` most recent samples, pushed in chunks of `N`.
///
/// A push shifts the retained tail left by `N` positions and appends the new
/// chunk at the end, so index `S - 1` is always the most recent sample.
#[derive(Debug)]
pub(crate) struct SequenceBuffer<const S: usize, const N: usize> {
    buffer: Vec<f32>,
}

impl<const S: usize, const N: usize> Default for SequenceBuffer<S, N> {
    fn default() -> Self {
        const { assert!(N <= S, "chunk size cannot exceed the buffer size") };
        Self {
            buffer: vec![0.0; S],
        }
    }
}

impl<const S: usize, const N: usize> SequenceBuffer<S, N> {
    /// Sets all buffer values to zero.
    pub(crate) fn reset(&mut self) {
        self.buffer.fill(0.0);
    }

    /// View on the whole buffer, oldest sample first.
    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.buffer
    }

    /// View on the `M` most recent samples.
    pub(crate) fn most_recent<const M: usize>(&self) -> &[f32; M] {
        const { assert!(M <= S, "view cannot exceed the buffer size") };
        self.buffer[S - M..].try_into().expect("length checked")
    }

    /// Shifts the buffer left by `N` samples and appends `chunk`.
    pub(crate) fn push(&mut self, chunk: &[f32; N]) {
        if S > N {
            self.buffer.copy_within(N.., 0);
        }
        self.buffer[S - N..].copy_from_slice(chunk);
    }
}

/// Ring buffer holding the `N` most recent arrays of `S` values, indexed by
/// delay (0 = most recent).
#[derive(Debug)]
pub(crate) struct RingBuffer<const S: usize, const N: usize> {
    tail: usize,
    buffer: Vec<f32>,
}

impl<const S: usize, const N: usize> Default for RingBuffer<S, N> {
    fn default() -> Self {
        Self {
            tail: 0,
            buffer: vec![0.0; S * N],
        }
    }
}

impl<const S: usize, const N: usize> RingBuffer<S, N> {
    /// Sets all buffer values to zero.
    pub(crate) fn reset(&mut self) {
        self.buffer.fill(0.0);
    }

    /// Replaces the least recently pushed array with `values`.
    pub(crate) fn push(&mut self, values: &[f32; S]) {
        let start = S * self.tail;
        self.buffer[start..start + S].copy_from_slice(values);
        self.tail += 1;
        if self.tail == N {
            self.tail = 0;
        }
    }

    /// Returns the array pushed `delay` pushes ago.
    pub(crate) fn get(&self, delay: usize) -> &[f32; S] {
        debug_assert!(delay < N);
        let offset = (self.tail + N - 1 - delay) % N;
        let start = S * offset;
        self.buffer[start..start + S]
            .try_into()
            .expect("length checked")
    }
}

/// Cache of pairwise comparison scores between the `S` entries of a ring
/// buffer.
///
/// Each push provides the `S - 1` comparisons between the newest entry and
/// the older ones; scores whose entries have left the ring buffer are
/// evicted automatically. The comparison is assumed symmetric and the
/// diagonal is never stored.
///
/// Internally the upper triangle is kept in an `(S-1) x (S-1)` square so a
/// push shifts the surviving scores with a single `copy_within`.
#[derive(Debug)]
pub(crate) struct SymmetricMatrixBuffer<const S: usize> {
    buffer: Vec<f32>,
}

impl<const S: usize> Default for SymmetricMatrixBuffer<S> {
    fn default() -> Self {
        const { assert!(S > 2) };
        Self {
            buffer: vec![0.0; (S - 1) * (S - 1)],
        }
    }
}

impl<const S: usize> SymmetricMatrixBuffer<S> {
    /// Sets all scores to zero.
    pub(crate) fn reset(&mut self) {
        self.buffer.fill(0.0);
    }

    /// Pushes the comparisons between the newest ring buffer entry and the
    /// `S - 1` older ones; `scores[0]` compares against the second most
    /// recent entry.
    pub(crate) fn push(&mut self, scores: &[f32]) {
        debug_assert_eq!(scores.len(), S - 1);
        // Move the lower-right (S-2)x(S-2) sub-matrix one row up and one
        // column left.
        self.buffer.copy_within(S.., 0);
        // Write the new scores into the last column, newest delay last.
        for (i, &score) in scores.iter().enumerate() {
            let index = (S - 1 - i) * (S - 1) - 1;
            self.buffer[index] = score;
        }
    }

    /// Reads the score for the pair of entries with delays `delay1` and
    /// `delay2` (which must differ).
    pub(crate) fn get(&self, delay1: usize, delay2: usize) -> f32 {
        debug_assert_ne!(delay1, delay2, "the diagonal is not stored");
        let row = (S - 1 - delay1).min(S - 1 - delay2);
        let col = (S - 1 - delay1).max(S - 1 - delay2);
        debug_assert!(row < S - 1);
        debug_assert!(col >= 1 && col < S);
        self.buffer[row * (S - 1) + (col - 1)]
    }
}
