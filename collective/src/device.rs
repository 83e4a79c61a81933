use std::fmt;

/// One accelerator slot, owned by exactly one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    index: usize,
}

impl Device {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device:{}", self.index)
    }
}
