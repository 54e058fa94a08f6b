//! 블록 분할
//!
//! 파일을 고정 크기 블록으로 나눈다. 마지막 블록만 짧을 수 있다.
//! 블록은 0부터 빈틈없이, 겹치지 않게, 오름차순으로 요청된다.

/// 파일의 연속 바이트 범위 `[start, end]` (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// 범위 길이 (바이트)
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// 커서 위치에서 시작하는 다음 블록
    ///
    /// `downloaded == size`면 더 받을 블록이 없다
    pub fn next_after(downloaded: u64, size: u64, block_size: usize) -> Option<Self> {
        if downloaded >= size || block_size == 0 {
            return None;
        }
        let end = downloaded
            .saturating_add(block_size as u64 - 1)
            .min(size - 1);
        Some(Self::new(downloaded, end))
    }

    /// 길이 `file_len`인 파일 안에 들어가는 유효한 범위인지
    pub fn fits_within(&self, file_len: u64) -> bool {
        self.start <= self.end && self.end < file_len
    }
}

/// 파일 하나의 블록 계획
///
/// 이터레이터로 순서대로 블록 범위를 내어준다
#[derive(Debug, Clone)]
pub struct BlockPlan {
    size: u64,
    block_size: usize,
    cursor: u64,
}

impl BlockPlan {
    pub fn new(size: u64, block_size: usize) -> Self {
        Self {
            size,
            block_size,
            cursor: 0,
        }
    }

    /// 총 블록 수 (`ceil(size / block_size)`)
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            return 0;
        }
        let block = self.block_size as u64;
        self.size / block + u64::from(self.size % block != 0)
    }
}

impl Iterator for BlockPlan {
    type Item = BlockRange;

    fn next(&mut self) -> Option<Self::Item> {
        let range = BlockRange::next_after(self.cursor, self.size, self.block_size)?;
        self.cursor = range.end + 1;
        Some(range)
    }
}
