use std::io;

/// Types that can be read back from a frame, borrowing from it.
pub trait Deserialize<'a>: Sized {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
