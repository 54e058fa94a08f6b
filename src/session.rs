//! 서버측 전송 세션
//!
//! 임시 데이터 포트 하나를 파일 하나의 전송 동안 독점한다.
//! - `GET`: 범위를 읽어 블록으로 응답, 잘못된 범위는 응답 없이 버림 (클라이언트 재시도에 맡김)
//! - `CLOSE`: `CLOSE_OK` 응답 후 종료
//! - 유휴 타임아웃: 클라이언트 요청이 끊기면 포트와 파일 핸들 회수

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::block::BlockRange;
use crate::message::{Request, Response};
use crate::ports::PortLease;
use crate::stats::SessionStats;
use crate::storage::read_range;
use crate::{Config, Result};

/// 세션 종료 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// CLOSE 수신
    Closed,

    /// 유휴 타임아웃
    IdleTimeout,
}

/// 파일 하나, 클라이언트 하나에 대한 전송 세션
pub struct TransferSession {
    filename: String,
    file: File,
    size: u64,
    client: SocketAddr,
    socket: UdpSocket,
    lease: PortLease,
    idle_timeout: Duration,
    max_block_size: u64,
    recv_buffer_size: usize,
    stats: SessionStats,
}

impl TransferSession {
    pub fn new(
        filename: String,
        file: File,
        size: u64,
        client: SocketAddr,
        socket: UdpSocket,
        lease: PortLease,
        config: &Config,
    ) -> Self {
        Self {
            filename,
            file,
            size,
            client,
            socket,
            lease,
            idle_timeout: config.session_idle_timeout(),
            max_block_size: config.max_block_size as u64,
            recv_buffer_size: config.recv_buffer_size,
            stats: SessionStats::new(),
        }
    }

    /// 세션 데이터 포트
    pub fn port(&self) -> u16 {
        self.lease.port()
    }

    /// 세션 루프 실행
    ///
    /// CLOSE나 유휴 타임아웃으로 끝나면 소켓, 파일, 포트를 모두 반환한다.
    /// IO 에러는 세션을 끝내는 치명적 에러로 전파된다.
    pub async fn run(mut self) -> Result<SessionEnd> {
        let mut buf = vec![0u8; self.recv_buffer_size];
        let mut deadline = Instant::now() + self.idle_timeout;

        debug!(
            "세션 시작: {} ({} bytes) -> {}, port {}",
            self.filename,
            self.size,
            self.client,
            self.port()
        );

        loop {
            let (len, from) = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "세션 유휴 타임아웃: {} -> {} (마지막 요청 {:.1}s 전), port {} 회수",
                        self.filename,
                        self.client,
                        self.stats.idle().as_secs_f64(),
                        self.port()
                    );
                    return Ok(SessionEnd::IdleTimeout);
                }
            };

            if from != self.client {
                debug!("세션 클라이언트가 아닌 주소 무시: {}", from);
                continue;
            }

            deadline = Instant::now() + self.idle_timeout;
            self.stats.touch();

            match Request::from_bytes(&buf[..len]) {
                Some(Request::Get {
                    filename,
                    start,
                    end,
                }) if filename == self.filename => {
                    self.serve_block(BlockRange::new(start, end)).await?;
                }
                Some(Request::Close { filename }) if filename == self.filename => {
                    let reply = Response::CloseOk { filename };
                    self.socket.send_to(&reply.to_bytes(), self.client).await?;
                    info!(
                        "Session closed: {} -> {} | {}",
                        self.filename,
                        self.client,
                        self.stats.summary()
                    );
                    return Ok(SessionEnd::Closed);
                }
                other => {
                    debug!("세션에서 처리할 수 없는 요청 무시: {:?}", other);
                    self.stats.record_dropped();
                }
            }
        }
    }

    /// 블록 하나 응답
    ///
    /// 범위가 파일 밖이거나 너무 크면, 혹은 짧게 읽히면 응답하지 않는다
    async fn serve_block(&mut self, range: BlockRange) -> Result<()> {
        if !range.fits_within(self.size) || range.len() > self.max_block_size {
            debug!(
                "잘못된 범위 무시: {} [{}, {}] (파일 {} bytes)",
                self.filename, range.start, range.end, self.size
            );
            self.stats.record_dropped();
            return Ok(());
        }

        let data = match read_range(&mut self.file, range).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                warn!(
                    "짧은 읽기, 응답 생략: {} [{}, {}]",
                    self.filename, range.start, range.end
                );
                self.stats.record_dropped();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let size = data.len();
        let reply = Response::Block {
            filename: self.filename.clone(),
            start: range.start,
            end: range.end,
            data: Bytes::from(data),
        };
        self.socket.send_to(&reply.to_bytes(), self.client).await?;
        self.stats.record_served(size);
        Ok(())
    }
}
