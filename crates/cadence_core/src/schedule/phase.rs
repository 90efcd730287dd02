use std::fmt;

/// Ordered stages of one world update.
///
/// Every tick runs all four phases in declaration order. Only `Parallel` fans
/// work out to worker threads; its completion is a barrier before `PostSync`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdatePhase {
    #[default]
    PreSync,
    Parallel,
    PostSync,
    PostTransform,
}

impl UpdatePhase {
    pub const COUNT: usize = 4;

    /// All phases in execution order.
    pub const ALL: [UpdatePhase; Self::COUNT] = [
        UpdatePhase::PreSync,
        UpdatePhase::Parallel,
        UpdatePhase::PostSync,
        UpdatePhase::PostTransform,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            UpdatePhase::PreSync => "PreSync",
            UpdatePhase::Parallel => "Parallel",
            UpdatePhase::PostSync => "PostSync",
            UpdatePhase::PostTransform => "PostTransform",
        }
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
