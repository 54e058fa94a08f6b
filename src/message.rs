//! 프로토콜 메시지 정의
//!
//! 공백으로 구분된 ASCII 텍스트, 데이터그램 하나가 메시지 하나.
//! 길이 접두사나 종료 문자는 없고 데이터그램 경계가 곧 메시지 경계다.
//!
//! ```text
//! DOWNLOAD <filename>
//! OK <filename> SIZE <u64> PORT <u16>
//! ERR <filename> NOT_FOUND | ERR INVALID_REQUEST
//! FILE <filename> GET START <u64> END <u64>
//! FILE <filename> OK START <u64> END <u64> DATA <base64>
//! FILE <filename> CLOSE
//! FILE <filename> CLOSE_OK
//! ```

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

/// 닫기 확인 토큰
pub const CLOSE_OK_TOKEN: &str = "CLOSE_OK";

/// 요청 메시지 (클라이언트 → 서버)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// 제어 채널: 다운로드 시작
    Download { filename: String },

    /// 데이터 채널: `[start, end]` 범위 요청 (양 끝 포함)
    Get { filename: String, start: u64, end: u64 },

    /// 데이터 채널: 전송 종료
    Close { filename: String },
}

impl Request {
    /// 요청 대상 파일 이름
    pub fn filename(&self) -> &str {
        match self {
            Request::Download { filename }
            | Request::Get { filename, .. }
            | Request::Close { filename } => filename,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// 바이트에서 역직렬화
    ///
    /// 토큰이 빠졌거나 숫자가 아니면 `None` (malformed)
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let tokens: Vec<&str> = text.split_whitespace().collect();

        match tokens.as_slice() {
            ["DOWNLOAD", filename] => Some(Request::Download {
                filename: filename.to_string(),
            }),
            ["FILE", filename, "GET", "START", start, "END", end] => Some(Request::Get {
                filename: filename.to_string(),
                start: start.parse().ok()?,
                end: end.parse().ok()?,
            }),
            ["FILE", filename, "CLOSE"] => Some(Request::Close {
                filename: filename.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Download { filename } => write!(f, "DOWNLOAD {filename}"),
            Request::Get {
                filename,
                start,
                end,
            } => write!(f, "FILE {filename} GET START {start} END {end}"),
            Request::Close { filename } => write!(f, "FILE {filename} CLOSE"),
        }
    }
}

/// 응답 메시지 (서버 → 클라이언트)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// 다운로드 허가: 파일 크기와 데이터 포트
    Ok {
        filename: String,
        size: u64,
        port: u16,
    },

    /// 파일 없음
    NotFound { filename: String },

    /// 해석할 수 없는 제어 요청
    InvalidRequest,

    /// 블록 데이터
    Block {
        filename: String,
        start: u64,
        end: u64,
        data: Bytes,
    },

    /// 종료 확인
    CloseOk { filename: String },
}

impl Response {
    /// 바이트로 직렬화
    ///
    /// base64는 공백 없이 한 토큰으로 쓴다
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::Ok {
                filename,
                size,
                port,
            } => format!("OK {filename} SIZE {size} PORT {port}").into_bytes(),
            Response::NotFound { filename } => format!("ERR {filename} NOT_FOUND").into_bytes(),
            Response::InvalidRequest => b"ERR INVALID_REQUEST".to_vec(),
            Response::Block {
                filename,
                start,
                end,
                data,
            } => format!(
                "FILE {filename} OK START {start} END {end} DATA {}",
                STANDARD.encode(data)
            )
            .into_bytes(),
            Response::CloseOk { filename } => {
                format!("FILE {filename} {CLOSE_OK_TOKEN}").into_bytes()
            }
        }
    }

    /// 바이트에서 역직렬화
    ///
    /// `DATA` 뒤의 토큰은 전부 하나의 base64 필드로 본다.
    /// 줄바꿈 등으로 끼어든 공백은 무시한다.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let tokens: Vec<&str> = text.split_whitespace().collect();

        match tokens.as_slice() {
            ["OK", filename, "SIZE", size, "PORT", port] => Some(Response::Ok {
                filename: filename.to_string(),
                size: size.parse().ok()?,
                port: port.parse().ok()?,
            }),
            ["ERR", "INVALID_REQUEST"] => Some(Response::InvalidRequest),
            ["ERR", filename, "NOT_FOUND"] => Some(Response::NotFound {
                filename: filename.to_string(),
            }),
            ["FILE", filename, "OK", "START", start, "END", end, "DATA", data @ ..] => {
                let encoded = data.concat();
                let decoded = STANDARD.decode(encoded.as_bytes()).ok()?;
                Some(Response::Block {
                    filename: filename.to_string(),
                    start: start.parse().ok()?,
                    end: end.parse().ok()?,
                    data: Bytes::from(decoded),
                })
            }
            ["FILE", filename, CLOSE_OK_TOKEN] => Some(Response::CloseOk {
                filename: filename.to_string(),
            }),
            _ => None,
        }
    }

    /// 느슨한 종료 확인 검사
    ///
    /// 문법 전체가 아니라 `CLOSE_OK` 토큰과 파일 이름 토큰이 들어있는지만 본다
    pub fn is_close_ok_for(bytes: &[u8], filename: &str) -> bool {
        let text = String::from_utf8_lossy(bytes);
        let mut has_token = false;
        let mut has_name = false;
        for token in text.split_whitespace() {
            has_token |= token == CLOSE_OK_TOKEN;
            has_name |= token == filename;
        }
        has_token && has_name
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok {
                filename,
                size,
                port,
            } => write!(f, "OK {filename} SIZE {size} PORT {port}"),
            Response::NotFound { filename } => write!(f, "ERR {filename} NOT_FOUND"),
            Response::InvalidRequest => write!(f, "ERR INVALID_REQUEST"),
            Response::Block {
                filename,
                start,
                end,
                data,
            } => write!(
                f,
                "FILE {filename} OK START {start} END {end} DATA <{} bytes>",
                data.len()
            ),
            Response::CloseOk { filename } => write!(f, "FILE {filename} {CLOSE_OK_TOKEN}"),
        }
    }
}

/// 파일 이름이 프로토콜 토큰 하나로 표현 가능한지
pub fn is_valid_filename(filename: &str) -> bool {
    !filename.is_empty() && !filename.chars().any(|c| c.is_whitespace() || c.is_control())
}
