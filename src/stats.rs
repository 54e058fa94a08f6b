//! 전송 통계

use std::time::{Duration, Instant};

/// 클라이언트측 파일 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 완료된 교환 수 (DOWNLOAD, GET, CLOSE 포함)
    pub exchanges: u64,

    /// 총 전송 횟수 (재전송 포함)
    pub requests_sent: u64,

    /// 재전송 횟수
    pub retransmissions: u64,

    /// 버려진 응답 수 (늦게 도착한 중복, 다른 주소)
    pub discarded_replies: u64,

    /// 받은 블록 수
    pub blocks: u64,

    /// 받은 바이트
    pub total_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            exchanges: 0,
            requests_sent: 0,
            retransmissions: 0,
            discarded_replies: 0,
            blocks: 0,
            total_bytes: 0,
        }
    }

    /// 교환 하나 기록
    pub fn record_exchange(&mut self, attempts: u32, discarded: u32) {
        self.exchanges += 1;
        self.requests_sent += u64::from(attempts);
        self.retransmissions += u64::from(attempts.saturating_sub(1));
        self.discarded_replies += u64::from(discarded);
    }

    /// 블록 수신 기록
    pub fn record_block(&mut self, size: usize) {
        self.blocks += 1;
        self.total_bytes += size as u64;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Blocks: {} | Bytes: {} | Throughput: {:.2} MB/s | Retransmits: {} | Discarded: {}",
            self.elapsed().as_secs_f64(),
            self.blocks,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.retransmissions,
            self.discarded_replies,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 서버측 세션 하나의 통계
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// 세션 시작 시간
    pub start_time: Instant,

    /// 응답한 블록 수
    pub blocks_served: u64,

    /// 보낸 바이트 (디코딩 기준)
    pub bytes_served: u64,

    /// 응답 없이 버린 요청 수 (범위 오류, 짧은 읽기, 잘못된 메시지)
    pub dropped_requests: u64,

    /// 마지막 요청 시간
    pub last_activity: Instant,
}

impl SessionStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            blocks_served: 0,
            bytes_served: 0,
            dropped_requests: 0,
            last_activity: now,
        }
    }

    /// 요청 도착 기록
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// 블록 응답 기록
    pub fn record_served(&mut self, size: usize) {
        self.blocks_served += 1;
        self.bytes_served += size as u64;
    }

    /// 버린 요청 기록
    pub fn record_dropped(&mut self) {
        self.dropped_requests += 1;
    }

    /// 세션 수명
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 마지막 요청 이후 경과 시간
    pub fn idle(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Blocks: {} | Bytes: {} | Dropped: {} | Idle: {:.2}s",
            self.elapsed().as_secs_f64(),
            self.blocks_served,
            self.bytes_served,
            self.dropped_requests,
            self.idle().as_secs_f64(),
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
