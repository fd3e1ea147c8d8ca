//! Validated size types for I/O units
//!
//! Both types reject invalid values at construction and, with the `serde`
//! feature, at deserialization.

/// Chunk size for buffered (STAGED) I/O
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "usize", into = "usize"))]
pub struct BufferSize(usize);

impl BufferSize {
    /// Minimum buffer size (4KB)
    pub const MIN: usize = 4 * 1024;
    /// Maximum buffer size (64MB)
    pub const MAX: usize = 64 * 1024 * 1024;
    /// Default buffer size (4MB)
    pub const DEFAULT: usize = 4 * 1024 * 1024;

    /// Create a new buffer size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Buffer size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Buffer size {} exceeds maximum {}", size, Self::MAX))
        } else if !size.is_power_of_two() {
            Err(format!("Buffer size {} must be a power of two", size))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the buffer size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<usize> for BufferSize {
    type Error = String;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<BufferSize> for usize {
    fn from(size: BufferSize) -> Self {
        size.0
    }
}

/// Window size for memory-mapped (DIRECT) copy and compare.
///
/// Always a non-zero multiple of [`WindowSize::GRANULARITY`], so every window
/// offset satisfies the mapping alignment rules on all supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct WindowSize(u64);

impl WindowSize {
    /// Alignment unit (64KB, the Windows allocation granularity)
    pub const GRANULARITY: u64 = 64 * 1024;
    /// Maximum window size (1GB)
    pub const MAX: u64 = 1024 * 1024 * 1024;
    /// Default window size (64MB)
    pub const DEFAULT: u64 = 64 * 1024 * 1024;

    /// Create a new window size with validation
    pub fn new(size: u64) -> Result<Self, String> {
        if size == 0 || size % Self::GRANULARITY != 0 {
            Err(format!(
                "Window size {} must be a non-zero multiple of {}",
                size,
                Self::GRANULARITY
            ))
        } else if size > Self::MAX {
            Err(format!("Window size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the window size value
    pub fn get(self) -> u64 {
        self.0
    }

    /// Number of windows needed to cover `length` bytes
    pub fn window_count(self, length: u64) -> u64 {
        length.div_ceil(self.0)
    }

    /// Offset and length of window `index` within a file of `length` bytes
    pub fn window_bounds(self, index: u64, length: u64) -> (u64, usize) {
        let offset = index * self.0;
        let len = self.0.min(length.saturating_sub(offset));
        (offset, len as usize)
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u64> for WindowSize {
    type Error = String;

    fn try_from(size: u64) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<WindowSize> for u64 {
    fn from(size: WindowSize) -> Self {
        size.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(4096, true)]
    #[case(8192, true)]
    #[case(1024, false)]
    #[case(5000, false)]
    #[case(128 * 1024 * 1024, false)]
    fn test_buffer_size_validation(#[case] size: usize, #[case] ok: bool) {
        assert_eq!(BufferSize::new(size).is_ok(), ok);
    }

    #[rstest]
    #[case(64 * 1024, true)]
    #[case(3 * 64 * 1024, true)]
    #[case(64 * 1024 * 1024, true)]
    #[case(0, false)]
    #[case(4096, false)]
    #[case(64 * 1024 + 1, false)]
    #[case(2 * 1024 * 1024 * 1024, false)]
    fn test_window_size_validation(#[case] size: u64, #[case] ok: bool) {
        assert_eq!(WindowSize::new(size).is_ok(), ok);
    }

    #[test]
    fn test_window_bounds_tail() {
        let window = WindowSize::new(64 * 1024).unwrap();
        let length = 64 * 1024 * 2 + 10;
        assert_eq!(window.window_count(length), 3);
        assert_eq!(window.window_bounds(0, length), (0, 64 * 1024));
        assert_eq!(window.window_bounds(2, length), (128 * 1024, 10));
        assert_eq!(window.window_count(0), 0);
    }

    proptest! {
        #[test]
        fn test_windows_cover_file_exactly(length in 0u64..10_000_000, multiple in 1u64..8) {
            let window = WindowSize::new(multiple * WindowSize::GRANULARITY).unwrap();
            let count = window.window_count(length);
            let mut covered = 0u64;
            for index in 0..count {
                let (offset, len) = window.window_bounds(index, length);
                prop_assert_eq!(offset, covered);
                prop_assert!(len > 0);
                prop_assert_eq!(offset % WindowSize::GRANULARITY, 0);
                covered += len as u64;
            }
            prop_assert_eq!(covered, length);
        }
    }
}
