//! Explicit traversal stack for walking the part tree.
//!
//! Rendering pauses mid-tree whenever a leaf's content has to be awaited
//! from a byte source, so the walk cannot live on the call stack. Each open
//! multipart gets a [`Frame`] holding a borrow of the container and a cursor
//! to the next child to render.

use bytes::{BufMut, Bytes, BytesMut};
use mailwire_mime::{Multipart, Part};

/// One open multipart container.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    multipart: &'a Multipart,
    cursor: usize,
}

impl<'a> Frame<'a> {
    /// Creates a frame positioned at the first child.
    #[must_use]
    pub const fn new(multipart: &'a Multipart) -> Self {
        Self {
            multipart,
            cursor: 0,
        }
    }

    /// The delimiter line for the current cursor position.
    ///
    /// - `--boundary\r\n` before the first child or after a nested multipart
    ///   (whose close delimiter already ends the line)
    /// - `\r\n--boundary\r\n` after a leaf, whose content carries no line
    ///   terminator of its own
    /// - `--boundary--\r\n` once the children are exhausted, with the same
    ///   leading `\r\n` rule
    #[must_use]
    pub fn boundary_line(&self) -> Bytes {
        let boundary = &self.multipart.boundary;
        let mut line = BytesMut::with_capacity(boundary.len() + 8);

        if self.previous().is_some_and(Part::is_leaf) {
            line.put_slice(b"\r\n");
        }
        line.put_slice(b"--");
        line.put_slice(boundary);
        if self.is_exhausted() {
            line.put_slice(b"--");
        }
        line.put_slice(b"\r\n");
        line.freeze()
    }

    /// The child at the cursor, if any.
    #[must_use]
    pub fn current(&self) -> Option<&'a Part> {
        self.multipart.children.get(self.cursor)
    }

    /// Moves the cursor to the next child.
    pub fn advance(&mut self) {
        if !self.is_exhausted() {
            self.cursor += 1;
        }
    }

    /// Returns true once the cursor has passed the last child.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.multipart.children.len()
    }

    /// Index of the next child to render.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// The container this frame walks.
    #[must_use]
    pub const fn multipart(&self) -> &'a Multipart {
        self.multipart
    }

    fn previous(&self) -> Option<&'a Part> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.multipart.children.get(i))
    }
}

/// Stack of open multipart frames, innermost last.
#[derive(Debug, Default)]
pub struct TraversalStack<'a> {
    frames: Vec<Frame<'a>>,
}

impl<'a> TraversalStack<'a> {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Opens a multipart.
    pub fn push(&mut self, multipart: &'a Multipart) {
        self.frames.push(Frame::new(multipart));
    }

    /// Closes the innermost multipart.
    pub fn pop(&mut self) -> Option<Frame<'a>> {
        self.frames.pop()
    }

    /// The innermost open multipart.
    pub fn top_mut(&mut self) -> Option<&mut Frame<'a>> {
        self.frames.last_mut()
    }

    /// Number of open multiparts.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns true once every multipart has been closed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
