//! 프로토콜 설정

use std::time::Duration;

use crate::{Error, Result, DATA_PORT_MAX, DATA_PORT_MIN, DEFAULT_BLOCK_SIZE, INITIAL_TIMEOUT_MS, MAX_ATTEMPTS};

/// 한 데이터그램에 실을 수 있는 최대 페이로드 (IPv4 UDP)
const MAX_DATAGRAM: usize = 65507;

/// UFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 클라이언트가 요청하는 블록 크기 (바이트)
    pub block_size: usize,

    /// 첫 시도의 응답 대기 시간 (밀리초)
    /// 재시도마다 2배
    pub initial_timeout_ms: u64,

    /// 교환당 최대 전송 횟수
    pub max_attempts: u32,

    /// 데이터 포트 범위 하한
    pub data_port_min: u16,

    /// 데이터 포트 범위 상한 (포함)
    pub data_port_max: u16,

    /// 세션 유휴 타임아웃 (밀리초)
    /// 이 시간 동안 요청이 없으면 세션의 포트와 파일 핸들을 회수
    pub session_idle_timeout_ms: u64,

    /// 세션이 한 번에 내어주는 최대 범위 (바이트)
    pub max_block_size: usize,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            initial_timeout_ms: INITIAL_TIMEOUT_MS,
            max_attempts: MAX_ATTEMPTS,
            data_port_min: DATA_PORT_MIN,
            data_port_max: DATA_PORT_MAX,
            session_idle_timeout_ms: 60_000, // 1분
            max_block_size: 32 * 1024,
            recv_buffer_size: 65535,
        }
    }
}

impl Config {
    /// 첫 시도 대기 시간
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    /// 세션 유휴 타임아웃
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.session_idle_timeout_ms)
    }

    /// n번째 시도(1부터)의 대기 시간
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_timeout() * (1u32 << shift)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size는 0보다 커야 함".into()));
        }
        if self.max_block_size == 0 || encoded_len(self.max_block_size) > MAX_DATAGRAM {
            return Err(Error::Config(format!(
                "max_block_size {}는 데이터그램 하나에 들어가지 않음",
                self.max_block_size
            )));
        }
        if self.block_size > self.max_block_size {
            return Err(Error::Config(format!(
                "block_size {}가 max_block_size {}보다 큼",
                self.block_size, self.max_block_size
            )));
        }
        if self.data_port_min == 0 || self.data_port_min > self.data_port_max {
            return Err(Error::Config(format!(
                "잘못된 데이터 포트 범위: {}-{}",
                self.data_port_min, self.data_port_max
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts는 1 이상이어야 함".into()));
        }
        if self.initial_timeout_ms == 0 || self.session_idle_timeout_ms == 0 {
            return Err(Error::Config("타임아웃은 0보다 커야 함".into()));
        }
        if self.recv_buffer_size < encoded_len(self.max_block_size) {
            return Err(Error::Config(format!(
                "recv_buffer_size {}가 최대 블록 응답보다 작음",
                self.recv_buffer_size
            )));
        }
        Ok(())
    }

    /// 손실이 많은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            block_size: 512,
            initial_timeout_ms: 2000,
            max_attempts: 7,
            session_idle_timeout_ms: 300_000, // 5분
            ..Self::default()
        }
    }

    /// 루프백/테스트용 설정 (짧은 타임아웃)
    pub fn local_fast() -> Self {
        Self {
            initial_timeout_ms: 50,
            session_idle_timeout_ms: 2000,
            ..Self::default()
        }
    }
}

/// 블록 응답 데이터그램의 대략적인 상한 (base64 + 헤더 여유분)
fn encoded_len(block: usize) -> usize {
    (block + 2) / 3 * 4 + 512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_timeouts_double() {
        let config = Config::default();
        let waits: Vec<u128> = (1..=config.max_attempts)
            .map(|n| config.attempt_timeout(n).as_millis())
            .collect();

        assert_eq!(waits, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::lossy_network().validate().is_ok());
        assert!(Config::local_fast().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            block_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config {
            data_port_min: 51000,
            data_port_max: 50000,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        // 데이터그램 하나에 들어가지 않는 블록
        let config = Config {
            block_size: 60_000,
            max_block_size: 60_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
