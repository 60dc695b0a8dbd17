// Delta instruction model.
//
// A `Window` describes how to build one chunk of target data from a view
// of the source stream, the target bytes already produced in the window,
// and a private buffer of literal bytes.  Windows are assembled with a
// `WindowBuilder` and are immutable afterwards.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// The three instruction kinds, with their svndiff action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// Copy from the window's source view.
    Source = 0,
    /// Copy from target data already produced in this window.
    Target = 1,
    /// Copy from the window's new-data buffer.
    New = 2,
}

impl Action {
    /// Parse a 2-bit action code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Source),
            1 => Some(Self::Target),
            2 => Some(Self::New),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A single delta instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `length` bytes starting at `offset` in the source view.
    CopyFromSource { offset: usize, length: usize },
    /// Copy `length` bytes starting at `offset` in the target produced so
    /// far.  The ranges may overlap; the copy then proceeds byte by byte.
    CopyFromTarget { offset: usize, length: usize },
    /// Copy `length` bytes starting at `offset` in the new-data buffer.
    Insert { offset: usize, length: usize },
}

impl Instruction {
    pub fn new(action: Action, offset: usize, length: usize) -> Self {
        match action {
            Action::Source => Self::CopyFromSource { offset, length },
            Action::Target => Self::CopyFromTarget { offset, length },
            Action::New => Self::Insert { offset, length },
        }
    }

    #[inline]
    pub fn action(&self) -> Action {
        match self {
            Self::CopyFromSource { .. } => Action::Source,
            Self::CopyFromTarget { .. } => Action::Target,
            Self::Insert { .. } => Action::New,
        }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        match *self {
            Self::CopyFromSource { offset, .. }
            | Self::CopyFromTarget { offset, .. }
            | Self::Insert { offset, .. } => offset,
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        match *self {
            Self::CopyFromSource { length, .. }
            | Self::CopyFromTarget { length, .. }
            | Self::Insert { length, .. } => length,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural problems in an instruction sequence.
///
/// `index` is the position of the offending instruction in its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidOps {
    #[error("instruction {index} cannot be decoded")]
    Undecodable { index: usize },
    #[error("instruction {index} has length zero")]
    ZeroLength { index: usize },
    #[error("instruction {index} has an offset past the addressable range")]
    OffsetOverflow { index: usize },
    #[error("instruction {index} overflows the target view")]
    TargetOverflow { index: usize },
    #[error("instruction {index} overflows the source view")]
    SourceOverflow { index: usize },
    #[error("instruction {index} starts beyond the target view position")]
    TargetStartsBeyond { index: usize },
    #[error("instruction {index} overflows the new data section")]
    NewDataOverflow { index: usize },
    #[error("delta does not fill the target window")]
    TargetUnderfilled,
    #[error("delta does not contain enough new data")]
    NewDataUnused,
}

/// Incremental checker for the window invariants.
///
/// Feed instructions in order with [`OpsValidator::check`], then call
/// [`OpsValidator::finish`].
#[derive(Debug, Clone)]
pub struct OpsValidator {
    sview_len: usize,
    tview_len: usize,
    new_len: usize,
    tpos: usize,
    npos: usize,
}

impl OpsValidator {
    pub fn new(sview_len: usize, tview_len: usize, new_len: usize) -> Self {
        Self {
            sview_len,
            tview_len,
            new_len,
            tpos: 0,
            npos: 0,
        }
    }

    /// Current position in the target view.
    pub fn target_pos(&self) -> usize {
        self.tpos
    }

    pub fn check(&mut self, index: usize, op: &Instruction) -> Result<(), InvalidOps> {
        let length = op.length();
        let offset = op.offset();
        if length == 0 {
            return Err(InvalidOps::ZeroLength { index });
        }
        let end = offset
            .checked_add(length)
            .ok_or(InvalidOps::OffsetOverflow { index })?;
        let new_tpos = self
            .tpos
            .checked_add(length)
            .filter(|&t| t <= self.tview_len)
            .ok_or(InvalidOps::TargetOverflow { index })?;

        match op.action() {
            Action::Source => {
                if end > self.sview_len {
                    return Err(InvalidOps::SourceOverflow { index });
                }
            }
            Action::Target => {
                if offset >= self.tpos {
                    return Err(InvalidOps::TargetStartsBeyond { index });
                }
            }
            Action::New => {
                if end > self.new_len {
                    return Err(InvalidOps::NewDataOverflow { index });
                }
                self.npos += length;
            }
        }

        self.tpos = new_tpos;
        Ok(())
    }

    /// Verify the window was exactly filled.  With `exact_new_data`, every
    /// new-data byte must also have been consumed.
    pub fn finish(&self, exact_new_data: bool) -> Result<(), InvalidOps> {
        if self.tpos != self.tview_len {
            return Err(InvalidOps::TargetUnderfilled);
        }
        if exact_new_data && self.npos != self.new_len {
            return Err(InvalidOps::NewDataUnused);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// An immutable delta window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    sview_offset: u64,
    sview_len: usize,
    tview_len: usize,
    ops: Vec<Instruction>,
    new_data: Vec<u8>,
    src_ops: usize,
}

impl Window {
    /// Build a window from raw parts, checking every invariant.
    pub fn from_parts(
        sview_offset: u64,
        sview_len: usize,
        tview_len: usize,
        ops: Vec<Instruction>,
        new_data: Vec<u8>,
    ) -> Result<Self, InvalidOps> {
        let mut validator = OpsValidator::new(sview_len, tview_len, new_data.len());
        for (index, op) in ops.iter().enumerate() {
            validator.check(index, op)?;
        }
        validator.finish(false)?;
        Ok(Self::from_trusted_parts(
            sview_offset,
            sview_len,
            tview_len,
            ops,
            new_data,
        ))
    }

    /// Build a window whose instructions were already validated.
    pub(crate) fn from_trusted_parts(
        sview_offset: u64,
        sview_len: usize,
        tview_len: usize,
        ops: Vec<Instruction>,
        new_data: Vec<u8>,
    ) -> Self {
        let src_ops = ops
            .iter()
            .filter(|op| op.action() == Action::Source)
            .count();
        Self {
            sview_offset,
            sview_len,
            tview_len,
            ops,
            new_data,
            src_ops,
        }
    }

    /// A self-contained window that inserts `data` verbatim.
    pub fn insert_only(data: &[u8]) -> Self {
        let mut builder = WindowBuilder::new();
        if !data.is_empty() {
            builder.insert(data);
        }
        builder.finish(0, 0)
    }

    pub fn source_view_offset(&self) -> u64 {
        self.sview_offset
    }

    pub fn source_view_len(&self) -> usize {
        self.sview_len
    }

    pub fn target_view_len(&self) -> usize {
        self.tview_len
    }

    pub fn ops(&self) -> &[Instruction] {
        &self.ops
    }

    pub fn new_data(&self) -> &[u8] {
        &self.new_data
    }

    /// Number of `CopyFromSource` instructions.
    pub fn source_ops(&self) -> usize {
        self.src_ops
    }

    /// True if the window produces no target bytes.
    pub fn is_empty(&self) -> bool {
        self.tview_len == 0
    }

    /// Re-check all invariants.
    pub fn validate(&self) -> Result<(), InvalidOps> {
        let mut validator = OpsValidator::new(self.sview_len, self.tview_len, self.new_data.len());
        for (index, op) in self.ops.iter().enumerate() {
            validator.check(index, op)?;
        }
        validator.finish(false)
    }

    /// True if the `Insert` instructions consume `new_data` front to back
    /// with no gaps, which is the only layout the wire format can express.
    pub fn has_sequential_new_data(&self) -> bool {
        let mut npos = 0usize;
        for op in &self.ops {
            if let Instruction::Insert { offset, length } = *op {
                if offset != npos {
                    return false;
                }
                npos += length;
            }
        }
        npos == self.new_data.len()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates instructions for one window.
///
/// Adjacent instructions of the same kind that continue each other are
/// merged.  Zero-length instructions and forward target references are
/// programming errors and panic.
#[derive(Debug, Default)]
pub struct WindowBuilder {
    ops: Vec<Instruction>,
    new_data: Vec<u8>,
    tview_len: usize,
}

impl WindowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(ops: usize, new_data: usize) -> Self {
        Self {
            ops: Vec::with_capacity(ops),
            new_data: Vec::with_capacity(new_data),
            tview_len: 0,
        }
    }

    /// Target bytes described so far.
    pub fn target_len(&self) -> usize {
        self.tview_len
    }

    pub fn ops(&self) -> &[Instruction] {
        &self.ops
    }

    /// Append an instruction.
    ///
    /// For [`Action::New`], `new_data` must hold exactly `length` bytes and
    /// `offset` is ignored: the bytes are appended to the window's buffer.
    pub fn insert_op(
        &mut self,
        action: Action,
        offset: usize,
        length: usize,
        new_data: Option<&[u8]>,
    ) {
        assert!(length > 0, "zero-length {action:?} instruction");

        let offset = match action {
            Action::New => {
                let data = new_data.expect("insert instruction without data");
                assert_eq!(data.len(), length, "insert data length mismatch");
                let at = self.new_data.len();
                self.new_data.extend_from_slice(data);
                at
            }
            Action::Target => {
                assert!(
                    offset < self.tview_len,
                    "target copy at {offset} starts beyond position {}",
                    self.tview_len
                );
                offset
            }
            Action::Source => offset,
        };

        self.tview_len += length;

        if let Some(last) = self.ops.last_mut()
            && last.action() == action
            && last.offset() + last.length() == offset
        {
            *last = Instruction::new(action, last.offset(), last.length() + length);
            return;
        }
        self.ops.push(Instruction::new(action, offset, length));
    }

    pub fn copy_source(&mut self, offset: usize, length: usize) {
        self.insert_op(Action::Source, offset, length, None);
    }

    pub fn copy_target(&mut self, offset: usize, length: usize) {
        self.insert_op(Action::Target, offset, length, None);
    }

    pub fn insert(&mut self, data: &[u8]) {
        self.insert_op(Action::New, 0, data.len(), Some(data));
    }

    /// Freeze the accumulated instructions into a window over the given
    /// source view.
    pub fn finish(self, sview_offset: u64, sview_len: usize) -> Window {
        debug_assert!(
            self.ops
                .iter()
                .filter(|op| op.action() == Action::Source)
                .all(|op| op.offset() + op.length() <= sview_len),
            "source copy outside the source view"
        );
        Window::from_trusted_parts(
            sview_offset,
            sview_len,
            self.tview_len,
            self.ops,
            self.new_data,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
