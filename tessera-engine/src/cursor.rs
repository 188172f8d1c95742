use tessera_program::MAX_DEPTH;

/// Position of one traversal level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Frame {
    /// Start of the current repetition, relative to the buffer origin. For a `ContigFinal`
    /// this is the next byte to move.
    pub(crate) base: i64,
    /// Repetitions not yet finished, the current one included. For a `ContigFinal` these
    /// are whole elements not yet started.
    pub(crate) count_left: usize,
}

/// The resumable position of one traversal.
///
/// A cursor is self-contained: the frames alone determine which struct child was active at
/// suspension, so a parked cursor can be resumed against the same program at any time.
#[derive(Debug, Clone)]
pub struct Cursor {
    /// Index of the suspended `ContigFinal`, or 0 when not resumed.
    pub(crate) sp: usize,
    /// Bytes still owed of an element that was split across calls.
    pub(crate) partial: usize,
    pub(crate) frames: [Frame; MAX_DEPTH],
}

impl Cursor {
    /// A cursor at the start of a traversal.
    pub fn new() -> Self {
        Self {
            sp: 0,
            partial: 0,
            frames: [Frame::default(); MAX_DEPTH],
        }
    }

    /// Whether a traversal was suspended mid-way.
    pub fn is_resumed(&self) -> bool {
        self.sp != 0
    }

    /// Program index of the leaf the traversal stopped in, if suspended.
    pub fn stack_pointer(&self) -> Option<usize> {
        self.is_resumed().then_some(self.sp)
    }

    /// Bytes of a split element still owed.
    pub fn partial(&self) -> usize {
        self.partial
    }

    /// Forget any suspended traversal.
    pub fn reset(&mut self) {
        self.sp = 0;
        self.partial = 0;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}
