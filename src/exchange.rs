//! 신뢰성 있는 요청/응답 교환
//!
//! 요청 하나를 보내고 응답 하나를 기다린다.
//! - 타임아웃마다 같은 요청을 재전송, 대기 시간은 2배씩 증가
//! - `max_attempts`회 모두 응답이 없으면 `Error::Timeout`
//! - 전송 계층 IO 에러는 재시도 없이 즉시 실패
//!
//! 요청 ID가 없으므로 소켓당 동시에 하나의 교환만 진행해야 한다 (stop-and-wait).
//! 늦게 도착한 중복 응답은 호출자의 분류기가 `Reply::Stale`로 걸러낸다.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::message::Request;
use crate::{Config, Error, Result};

/// 응답 분류 결과
#[derive(Debug)]
pub enum Reply<T> {
    /// 기다리던 응답
    Accept(T),

    /// 다른 요청에 대한 늦은 응답, 버리고 계속 대기
    Stale,

    /// 잘못된 응답, 교환 실패
    Invalid(String),
}

/// 교환 결과
#[derive(Debug)]
pub struct Exchanged<T> {
    /// 받아들인 응답
    pub value: T,

    /// 전송 횟수 (1 = 재전송 없음)
    pub attempts: u32,

    /// 버려진 데이터그램 수
    pub discarded: u32,
}

/// 교환기
///
/// 소켓 하나를 감싸며 한 번에 하나의 교환만 수행한다
pub struct Exchanger {
    socket: Arc<UdpSocket>,
    config: Config,
    max_attempts: u32,
}

impl Exchanger {
    /// 로컬 주소에 바인드하여 생성
    pub async fn bind(bind_addr: SocketAddr, config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self::new(Arc::new(socket), config))
    }

    pub fn new(socket: Arc<UdpSocket>, config: &Config) -> Self {
        Self {
            socket,
            config: config.clone(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// 바인드된 로컬 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 요청을 보내고 분류기가 받아들이는 응답 하나를 기다린다
    ///
    /// `dest` 이외의 주소에서 온 데이터그램과 `Reply::Stale`은 버려지며
    /// 시도 횟수를 소모하지 않는다 (남은 대기 시간 안에서 계속 수신).
    pub async fn exchange<T, F>(
        &self,
        dest: SocketAddr,
        request: &Request,
        mut classify: F,
    ) -> Result<Exchanged<T>>
    where
        F: FnMut(&[u8]) -> Reply<T>,
    {
        let payload = request.to_bytes();
        let mut buf = vec![0u8; self.config.recv_buffer_size];
        let mut discarded = self.drain_stale(&mut buf);

        for attempt in 1..=self.max_attempts {
            let wait = self.config.attempt_timeout(attempt);
            self.socket.send_to(&payload, dest).await?;
            let deadline = Instant::now() + wait;

            loop {
                let (len, from) = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                    Ok(result) => result?,
                    Err(_) => break,
                };

                if from != dest {
                    debug!("다른 주소의 데이터그램 무시: {} (기대: {})", from, dest);
                    discarded += 1;
                    continue;
                }

                match classify(&buf[..len]) {
                    Reply::Accept(value) => {
                        return Ok(Exchanged {
                            value,
                            attempts: attempt,
                            discarded,
                        });
                    }
                    Reply::Stale => {
                        debug!("늦은 응답 무시: {}", String::from_utf8_lossy(&buf[..len.min(64)]));
                        discarded += 1;
                    }
                    Reply::Invalid(reason) => {
                        return Err(Error::protocol(reason));
                    }
                }
            }

            if attempt < self.max_attempts {
                debug!(
                    "타임아웃 ({}ms), 재전송 {}/{}: {}",
                    wait.as_millis(),
                    attempt + 1,
                    self.max_attempts,
                    request
                );
            }
        }

        warn!("{}회 시도 후 응답 없음: {} -> {}", self.max_attempts, request, dest);
        Err(Error::Timeout {
            attempts: self.max_attempts,
        })
    }

    /// 이전 교환에서 남은 데이터그램 비우기
    fn drain_stale(&self, buf: &mut [u8]) -> u32 {
        let mut drained = 0;
        while let Ok((_, from)) = self.socket.try_recv_from(buf) {
            debug!("대기 중이던 데이터그램 제거: {}", from);
            drained += 1;
        }
        drained
    }
}
