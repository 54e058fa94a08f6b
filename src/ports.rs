//! 데이터 포트 할당
//!
//! 범위 안에서 임의의 포트를 고르되, 살아 있는 세션이 쓰는 포트는 건너뛴다.
//! 할당은 `PortLease`로 표현되며 drop 시 레지스트리에서 해제된다.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::{Config, Error, Result};

/// 무작위 선택 시도 횟수 (이후 순차 탐색)
const RANDOM_PICKS: usize = 16;

/// OS 레벨 바인드 실패 시 다른 포트로 재시도하는 횟수
const BIND_RETRIES: usize = 8;

/// 포트 할당기
#[derive(Debug)]
pub struct PortAllocator {
    min: u16,
    max: u16,
    in_use: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    /// `[min, max]` 범위의 할당기 생성
    pub fn new(min: u16, max: u16) -> Arc<Self> {
        Arc::new(Self {
            min,
            max,
            in_use: Mutex::new(HashSet::new()),
        })
    }

    pub fn from_config(config: &Config) -> Arc<Self> {
        Self::new(config.data_port_min, config.data_port_max)
    }

    /// 사용 중인 포트 수
    pub fn in_use(&self) -> usize {
        self.in_use.lock().len()
    }

    /// 범위 안의 전체 포트 수
    pub fn capacity(&self) -> usize {
        usize::from(self.max - self.min) + 1
    }

    /// 빈 포트 하나 할당
    pub fn acquire(self: &Arc<Self>) -> Result<PortLease> {
        let mut in_use = self.in_use.lock();

        if in_use.len() >= self.capacity() {
            return Err(Error::PortsExhausted {
                min: self.min,
                max: self.max,
            });
        }

        let mut rng = rand::thread_rng();
        let mut port = None;

        for _ in 0..RANDOM_PICKS {
            let candidate = rng.gen_range(self.min..=self.max);
            if !in_use.contains(&candidate) {
                port = Some(candidate);
                break;
            }
        }

        // 범위가 거의 찼으면 임의 위치에서 순차 탐색
        let port = match port {
            Some(port) => port,
            None => {
                let offset = rng.gen_range(0..self.capacity());
                (0..self.capacity())
                    .map(|i| self.min + ((offset + i) % self.capacity()) as u16)
                    .find(|candidate| !in_use.contains(candidate))
                    .ok_or(Error::PortsExhausted {
                        min: self.min,
                        max: self.max,
                    })?
            }
        };

        in_use.insert(port);
        Ok(PortLease {
            port,
            allocator: self.clone(),
        })
    }

    /// 포트를 할당받아 UDP 소켓까지 바인드
    ///
    /// 다른 프로세스가 이미 쓰고 있는 포트는 건너뛴다.
    /// 실패한 포트는 이번 할당이 끝날 때까지 잡아두어 다시 뽑히지 않게 한다.
    pub async fn bind(self: &Arc<Self>, ip: IpAddr) -> Result<(UdpSocket, PortLease)> {
        let mut rejected = Vec::new();

        for _ in 0..BIND_RETRIES {
            let lease = self.acquire()?;
            match UdpSocket::bind(SocketAddr::new(ip, lease.port())).await {
                Ok(socket) => return Ok((socket, lease)),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    debug!("포트 {} 사용 중, 다른 포트 시도", lease.port());
                    rejected.push(lease);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::PortsExhausted {
            min: self.min,
            max: self.max,
        })
    }

    fn release(&self, port: u16) {
        self.in_use.lock().remove(&port);
    }
}

/// 할당된 포트
///
/// drop 시 자동 해제
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    allocator: Arc<PortAllocator>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.allocator.release(self.port);
    }
}
