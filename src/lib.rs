//! # UFT (UDP File Transfer)
//!
//! UDP 위에서 동작하는 stop-and-wait 블록 다운로드 프로토콜
//!
//! ## 핵심 특징
//! - **텍스트 프로토콜**: 공백 구분 ASCII 메시지, 데이터그램 하나에 메시지 하나
//! - **제어/데이터 채널 분리**: 고정 제어 포트에서 협상, 전송마다 임시 데이터 포트 할당
//! - **재전송**: 타임아웃 2배 증가 + 제한된 재시도
//! - **세션 격리**: 세션마다 소켓과 파일 핸들을 독점, 공유 가변 상태 없음
//! - **자원 회수**: 유휴 세션 타임아웃, 포트 레지스트리

pub mod block;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod message;
pub mod ports;
pub mod server;
pub mod session;
pub mod stats;
pub mod storage;

pub use block::{BlockPlan, BlockRange};
pub use client::{read_file_list, Client, TransferReport};
pub use config::Config;
pub use error::{Error, Result};
pub use exchange::{Exchanged, Exchanger, Reply};
pub use message::{Request, Response};
pub use ports::{PortAllocator, PortLease};
pub use server::Server;
pub use session::{SessionEnd, TransferSession};
pub use stats::{SessionStats, TransferStats};
pub use storage::FileRoot;

/// 기본 블록 크기 (바이트)
pub const DEFAULT_BLOCK_SIZE: usize = 1000;

/// 첫 시도 대기 시간 (밀리초)
pub const INITIAL_TIMEOUT_MS: u64 = 1000;

/// 교환당 최대 전송 횟수
pub const MAX_ATTEMPTS: u32 = 5;

/// 데이터 포트 범위 (양 끝 포함)
pub const DATA_PORT_MIN: u16 = 50000;
pub const DATA_PORT_MAX: u16 = 51000;
