use std::fmt;

const WORD: usize = std::mem::size_of::<u64>();

/// Zero-initialised storage for the control section of a socket message.
///
/// Backed by `u64` words so the first record header is always suitably
/// aligned for `cmsghdr`, whatever the requested byte length.
#[derive(Clone, Default)]
pub struct ControlBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    /// Allocate a zeroed buffer of exactly `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD)],
            len,
        }
    }

    /// A buffer with no control section.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the buffer as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` owns at least `len` initialised bytes and u8 has no
        // alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    /// Mutable byte view, used by the kernel-facing receive path.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_bytes`; the exclusive borrow of `self` prevents aliasing.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }

    /// Shrink the logical length, e.g. to the `msg_controllen` the kernel reported.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }
}

impl fmt::Debug for ControlBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBuffer").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_buffer_is_aligned_and_clear() {
        let buf = ControlBuffer::zeroed(20);
        assert_eq!(buf.len(), 20);
        assert!(buf.as_bytes().iter().all(|b| *b == 0));
        assert_eq!(buf.as_bytes().as_ptr() as usize % WORD, 0);
    }

    #[test]
    fn truncate_never_grows() {
        let mut buf = ControlBuffer::zeroed(24);
        buf.truncate(16);
        assert_eq!(buf.len(), 16);
        buf.truncate(64);
        assert_eq!(buf.len(), 16);
        buf.truncate(0);
        assert!(buf.is_empty());
        assert!(buf.as_bytes().is_empty());
    }
}
