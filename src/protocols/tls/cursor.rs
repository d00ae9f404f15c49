//! # Resumable Header Fields
//!
//! Record and handshake headers can be cut at any byte by the stream
//! reassembly layer. Each header is described as a fixed layout of
//! big-endian fields and parsed through a [`HeaderCursor`], which keeps the
//! partially accumulated field between calls.
//!
//! ```text
//! SSLv3/TLS record:    [content_type:1][version:2][length:2]
//! SSLv2, 2-byte form:  [length:2][msg_type:1]
//! SSLv2, 3-byte form:  [length:2][padding:1][msg_type:1]
//! Handshake:           [msg_type:1][length:3]
//! ```

// ---------------------------------------------------------------------------
// Partial field
// ---------------------------------------------------------------------------

/// Result of feeding one byte into a [`PartialField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// The field still needs more bytes.
    NeedMore,
    /// The field is complete and holds this value.
    Complete(u32),
}

/// A big-endian unsigned field of 1 to 4 bytes, filled one byte at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialField {
    width: u8,
    filled: u8,
    value: u32,
}

impl PartialField {
    /// Create an empty field of `width` bytes.
    pub const fn new(width: u8) -> Self {
        Self {
            width,
            filled: 0,
            value: 0,
        }
    }

    /// Number of bytes accumulated so far.
    pub fn filled(&self) -> u8 {
        self.filled
    }

    /// Accumulate one byte.
    pub fn resume(&mut self, byte: u8) -> Resume {
        self.value = (self.value << 8) | u32::from(byte);
        self.filled += 1;

        if self.filled < self.width {
            Resume::NeedMore
        } else {
            let value = self.value;
            *self = Self::new(self.width);
            Resume::Complete(value)
        }
    }
}

// ---------------------------------------------------------------------------
// Header layouts
// ---------------------------------------------------------------------------

/// Identifies a field within a header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    /// Record content type (SSLv3/TLS) or message type (SSLv2).
    ContentType,
    /// Record protocol version.
    Version,
    /// Record payload length.
    RecordLength,
    /// SSLv2 padding length byte.
    Padding,
    /// Handshake message type.
    MessageType,
    /// Handshake message length.
    MessageLength,
    /// Bytes that are stepped over without being interpreted.
    Skip,
    /// SSLv2 ClientHello session-id length.
    SessionIdLength,
}

/// One field of a header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: HeaderField,
    pub width: u8,
}

/// Shorthand for building layout tables.
pub const fn field(field: HeaderField, width: u8) -> FieldSpec {
    FieldSpec { field, width }
}

/// Total wire size of a layout.
pub fn layout_len(layout: &[FieldSpec]) -> usize {
    layout.iter().map(|spec| usize::from(spec.width)).sum()
}

// ---------------------------------------------------------------------------
// Header cursor
// ---------------------------------------------------------------------------

/// Position within a header layout.
///
/// Holds the index of the field being read, the number of header bytes
/// consumed so far, and the partial value of the current field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderCursor {
    index: u8,
    consumed: u8,
    partial: PartialField,
}

impl HeaderCursor {
    /// True if no byte of the header has been read yet.
    pub fn is_fresh(&self) -> bool {
        self.consumed == 0
    }

    /// Number of header bytes read so far.
    pub fn consumed(&self) -> u8 {
        self.consumed
    }

    /// True once every field of `layout` has been read.
    pub fn is_complete(&self, layout: &[FieldSpec]) -> bool {
        usize::from(self.index) >= layout.len()
    }

    /// Return to the start of the layout.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed bytes until the layout is complete or `input` runs out.
    ///
    /// `on_field` is invoked once for every field that completes during
    /// this call. Returns the number of bytes consumed from `input`.
    pub fn feed(
        &mut self,
        layout: &[FieldSpec],
        input: &[u8],
        mut on_field: impl FnMut(HeaderField, u32),
    ) -> usize {
        let mut consumed = 0;

        for &byte in input {
            let Some(spec) = layout.get(usize::from(self.index)) else {
                break;
            };

            if self.partial.filled() == 0 {
                self.partial = PartialField::new(spec.width);
            }

            consumed += 1;
            self.consumed += 1;

            if let Resume::Complete(value) = self.partial.resume(byte) {
                on_field(spec.field, value);
                self.index += 1;
                self.partial = PartialField::default();
            }
        }

        consumed
    }

    /// Decode a whole layout from a fresh cursor in one step.
    ///
    /// Returns `None` (and leaves the cursor untouched) unless the cursor is
    /// fresh and `input` holds the complete header.
    pub fn decode_whole(
        &mut self,
        layout: &[FieldSpec],
        input: &[u8],
        mut on_field: impl FnMut(HeaderField, u32),
    ) -> Option<usize> {
        let total = layout_len(layout);
        if !self.is_fresh() || input.len() < total {
            return None;
        }

        let mut offset = 0;
        for spec in layout {
            let width = usize::from(spec.width);
            let value = input[offset..offset + width]
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
            on_field(spec.field, value);
            offset += width;
        }

        // Layouts are at most a handful of bytes.
        self.index = layout.len() as u8;
        self.consumed = total as u8;
        self.partial = PartialField::default();
        Some(total)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
