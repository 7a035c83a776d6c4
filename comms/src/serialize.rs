/// Types that can be written into a frame.
pub trait Serialize<'a> {
    /// Writes the fixed part of `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, already holding the length prefix.
    ///
    /// # Returns
    /// An optional borrowed tail that is written right after `buf` without being copied.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
