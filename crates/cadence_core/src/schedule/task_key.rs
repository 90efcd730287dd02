use std::fmt;

/// Identity of a scheduled callback: the function it runs plus the instance it runs on.
///
/// Both halves are opaque to the schedulers. Owners usually derive them from
/// a function pointer and an `Arc` address, or from stable ids of their own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    function: usize,
    instance: usize,
}

impl TaskKey {
    pub const fn new(function: usize, instance: usize) -> Self {
        Self { function, instance }
    }

    #[inline]
    pub fn function(self) -> usize {
        self.function
    }

    #[inline]
    pub fn instance(self) -> usize {
        self.instance
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}@{:#x}", self.function, self.instance)
    }
}
