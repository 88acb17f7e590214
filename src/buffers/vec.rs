use super::writer::Writer;

// Unbounded: every write succeeds in full
impl Writer for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> usize {
        self.extend_from_slice(bytes);
        bytes.len()
    }

    fn remaining(&self) -> usize {
        usize::MAX - self.len()
    }
}
