//! 에러 타입 정의

use thiserror::Error;

/// UFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("응답 없음: {attempts}회 시도 후 타임아웃")]
    Timeout { attempts: u32 },

    #[error("프로토콜 에러: {reason}")]
    Protocol { reason: String },

    #[error("파일 없음: {filename}")]
    NotFound { filename: String },

    #[error("서버가 요청을 거부함 (INVALID_REQUEST)")]
    Rejected,

    #[error("루트 밖의 경로 요청: {filename}")]
    OutsideRoot { filename: String },

    #[error("프로토콜 토큰으로 쓸 수 없는 파일 이름: {filename:?}")]
    InvalidFilename { filename: String },

    #[error("사용 가능한 데이터 포트 없음: {min}-{max}")]
    PortsExhausted { min: u16, max: u16 },

    #[error("다운로드 중단: {filename} ({downloaded}/{size} bytes): {source}")]
    Aborted {
        filename: String,
        downloaded: u64,
        size: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("설정 에러: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Error::Protocol {
            reason: reason.into(),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
