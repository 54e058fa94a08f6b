//! 제어 채널 서버
//!
//! 고정 포트에서 DOWNLOAD 요청을 받아
//! - 파일 확인 후 데이터 포트 할당
//! - `OK <filename> SIZE <n> PORT <p>` 응답
//! - 전송 세션을 별도 태스크로 시작
//!
//! 요청마다 태스크를 띄우므로 수신 루프는 세션 작업에 막히지 않는다.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::message::{Request, Response};
use crate::ports::PortAllocator;
use crate::session::{SessionEnd, TransferSession};
use crate::storage::FileRoot;
use crate::{Config, Error, Result};

/// 세션 키: (클라이언트 주소, 파일 이름)
type SessionKey = (SocketAddr, String);

/// 살아 있는 세션 정보 (중복 DOWNLOAD 응답용)
#[derive(Debug, Clone, Copy)]
struct ActiveSession {
    port: u16,
    size: u64,
}

/// 요청 처리 태스크가 공유하는 상태
#[derive(Clone)]
struct Control {
    config: Arc<Config>,
    socket: Arc<UdpSocket>,
    root: Arc<FileRoot>,
    ports: Arc<PortAllocator>,
    sessions: Arc<DashMap<SessionKey, ActiveSession>>,
}

/// UFT 서버
pub struct Server {
    control: Control,
}

impl Server {
    /// 제어 포트 바인드
    pub async fn bind(config: Config, bind_addr: SocketAddr, root: FileRoot) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(bind_addr).await?;
        let ports = PortAllocator::from_config(&config);

        Ok(Self {
            control: Control {
                config: Arc::new(config),
                socket: Arc::new(socket),
                root: Arc::new(root),
                ports,
                sessions: Arc::new(DashMap::new()),
            },
        })
    }

    /// 제어 채널 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.control.socket.local_addr()?)
    }

    /// 진행 중인 세션 수
    pub fn active_sessions(&self) -> usize {
        self.control.sessions.len()
    }

    /// 사용 중인 데이터 포트 수
    pub fn ports_in_use(&self) -> usize {
        self.control.ports.in_use()
    }

    /// 수신 루프 (종료하지 않음)
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; self.control.config.recv_buffer_size];

        info!(
            "UFT Server listening on {}, root: {}",
            self.local_addr()?,
            self.control.root.path().display()
        );

        loop {
            let (len, addr) = match self.control.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("수신 에러: {}", e);
                    continue;
                }
            };

            let datagram = buf[..len].to_vec();
            let control = self.control.clone();

            tokio::spawn(async move {
                if let Err(e) = control.handle(&datagram, addr).await {
                    warn!("제어 요청 처리 에러 ({}): {}", addr, e);
                }
            });
        }
    }
}

impl Control {
    async fn handle(&self, datagram: &[u8], client: SocketAddr) -> Result<()> {
        let filename = match Request::from_bytes(datagram) {
            Some(Request::Download { filename }) => filename,
            other => {
                debug!("잘못된 제어 요청 ({}): {:?}", client, other);
                return self.reply(&Response::InvalidRequest, client).await;
            }
        };

        info!("DOWNLOAD {} from {}", filename, client);
        let key = (client, filename.clone());

        // 재전송된 DOWNLOAD: 같은 세션을 다시 알려줌
        if let Some(existing) = self.sessions.get(&key).map(|entry| *entry) {
            debug!("중복 DOWNLOAD, 기존 세션 port {} 재사용", existing.port);
            return self.reply_ok(filename, existing, client).await;
        }

        let (file, size) = match self.root.open(&filename).await {
            Ok(opened) => opened,
            Err(e) => {
                self.reply(&Response::NotFound { filename }, client).await?;
                return match e {
                    Error::NotFound { .. } | Error::OutsideRoot { .. } => Ok(()),
                    other => Err(other),
                };
            }
        };

        // 데이터 포트는 OK 응답 전에 바인드되어 있어야 함
        let ip = self.socket.local_addr()?.ip();
        let (socket, lease) = self.ports.bind(ip).await?;
        let active = ActiveSession {
            port: lease.port(),
            size,
        };

        let existing = match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(active);
                None
            }
        };
        if let Some(existing) = existing {
            // 동시에 도착한 중복 요청이 먼저 세션을 만들었음
            return self.reply_ok(filename, existing, client).await;
        }

        let session = TransferSession::new(
            filename.clone(),
            file,
            size,
            client,
            socket,
            lease,
            &self.config,
        );
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            match session.run().await {
                Ok(SessionEnd::Closed) => {}
                Ok(SessionEnd::IdleTimeout) => debug!("세션 회수: {} -> {}", key.1, key.0),
                Err(e) => warn!("세션 에러 ({} -> {}): {}", key.1, key.0, e),
            }
            sessions.remove(&key);
        });

        self.reply_ok(filename, active, client).await
    }

    async fn reply_ok(
        &self,
        filename: String,
        session: ActiveSession,
        client: SocketAddr,
    ) -> Result<()> {
        let reply = Response::Ok {
            filename,
            size: session.size,
            port: session.port,
        };
        self.reply(&reply, client).await
    }

    async fn reply(&self, response: &Response, client: SocketAddr) -> Result<()> {
        self.socket.send_to(&response.to_bytes(), client).await?;
        Ok(())
    }
}
