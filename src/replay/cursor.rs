/// Position of one replay session in the ordered file list.
///
/// `byte_position` is always the start of a line in `files[file_index]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCursor {
    file_index: usize,
    byte_position: u64,
}

impl ReplayCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn byte_position(&self) -> u64 {
        self.byte_position
    }

    /// Move past a line of `consumed` bytes, terminator included
    pub fn advance(&mut self, consumed: u64) {
        self.byte_position += consumed;
    }

    /// Current file is exhausted; continue at the start of the next one
    pub fn roll_over(&mut self) {
        self.file_index += 1;
        self.byte_position = 0;
    }

    pub fn is_exhausted(&self, num_files: usize) -> bool {
        self.file_index >= num_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_and_roll_over() {
        let mut cursor = ReplayCursor::new();
        cursor.advance(10);
        cursor.advance(4);
        assert_eq!(cursor.byte_position(), 14);
        assert_eq!(cursor.file_index(), 0);

        cursor.roll_over();
        assert_eq!(cursor.file_index(), 1);
        assert_eq!(cursor.byte_position(), 0);
        assert!(!cursor.is_exhausted(2));

        cursor.roll_over();
        assert!(cursor.is_exhausted(2));
    }
}
