//! 클라이언트 (다운로드 드라이버)
//!
//! 파일마다 순서대로:
//! 1. 제어 포트로 `DOWNLOAD` → 크기와 데이터 포트
//! 2. 데이터 포트로 블록을 오름차순 `GET` (stop-and-wait), 받은 순서대로 파일에 추가
//! 3. `CLOSE` → `CLOSE_OK` (느슨한 검사)
//!
//! 중간 실패 시 받은 부분까지는 디스크에 남는다 (롤백 없음).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::block::{BlockPlan, BlockRange};
use crate::exchange::{Exchanger, Reply};
use crate::message::{is_valid_filename, Request, Response};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// DOWNLOAD 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Granted { size: u64, port: u16 },
    Missing,
    Rejected,
}

/// 파일 하나의 전송 상태
///
/// `0 <= downloaded <= size`, `downloaded == size`이면 완료
struct TransferState {
    filename: String,
    size: u64,
    data_port: u16,
    downloaded: u64,
    sink: BufWriter<File>,
}

impl TransferState {
    fn new(filename: &str, size: u64, data_port: u16, sink: File) -> Self {
        Self {
            filename: filename.to_string(),
            size,
            data_port,
            downloaded: 0,
            sink: BufWriter::new(sink),
        }
    }

    fn next_range(&self, block_size: usize) -> Option<BlockRange> {
        BlockRange::next_after(self.downloaded, self.size, block_size)
    }

    async fn append(&mut self, data: &[u8]) -> Result<()> {
        self.sink.write_all(data).await?;
        self.downloaded += data.len() as u64;
        debug_assert!(self.downloaded <= self.size);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.downloaded == self.size
    }
}

/// 완료된 다운로드 보고
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// 요청한 파일 이름
    pub filename: String,

    /// 저장된 경로
    pub path: PathBuf,

    /// 파일 크기
    pub size: u64,

    /// CLOSE_OK 수신 여부
    /// false여도 파일 자체는 완전히 받은 상태
    pub close_confirmed: bool,

    /// 전송 통계
    pub stats: TransferStats,
}

/// UFT 클라이언트
pub struct Client {
    config: Config,
    server: SocketAddr,
    exchanger: Exchanger,
    output_dir: PathBuf,
}

impl Client {
    /// 서버 제어 주소로 클라이언트 생성
    ///
    /// 로컬 소켓은 임시 포트에 바인드된다
    pub async fn connect(config: Config, server: SocketAddr) -> Result<Self> {
        config.validate()?;

        let bind_ip = match server.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let exchanger = Exchanger::bind(SocketAddr::new(bind_ip, 0), &config).await?;
        debug!("클라이언트 소켓: {}", exchanger.local_addr()?);

        Ok(Self {
            config,
            server,
            exchanger,
            output_dir: PathBuf::from("."),
        })
    }

    /// 받은 파일을 저장할 디렉터리 지정
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// 파일 하나 다운로드
    pub async fn download(&self, filename: &str) -> Result<TransferReport> {
        if !is_valid_filename(filename) {
            return Err(Error::InvalidFilename {
                filename: filename.to_string(),
            });
        }

        let mut stats = TransferStats::new();

        let request = Request::Download {
            filename: filename.to_string(),
        };
        let offer = self
            .exchanger
            .exchange(self.server, &request, |bytes| classify_offer(bytes, filename))
            .await?;
        stats.record_exchange(offer.attempts, offer.discarded);

        let (size, port) = match offer.value {
            Offer::Granted { size, port } => (size, port),
            Offer::Missing => {
                return Err(Error::NotFound {
                    filename: filename.to_string(),
                })
            }
            Offer::Rejected => return Err(Error::Rejected),
        };
        debug!(
            "{}: {} bytes ({} blocks), data port {}",
            filename,
            size,
            BlockPlan::new(size, self.config.block_size).block_count(),
            port
        );

        let path = self.output_dir.join(filename);
        let sink = File::create(&path).await?;
        let mut state = TransferState::new(filename, size, port, sink);
        let data_addr = SocketAddr::new(self.server.ip(), state.data_port);

        if let Err(e) = self.fetch_blocks(&mut state, data_addr, &mut stats).await {
            // 받은 부분은 남겨둠
            if let Err(flush_err) = state.sink.flush().await {
                warn!(
                    "{}: 부분 파일 기록 실패 ({} bytes 받음): {}",
                    state.filename, state.downloaded, flush_err
                );
            }
            return Err(Error::Aborted {
                filename: state.filename,
                downloaded: state.downloaded,
                size: state.size,
                source: Box::new(e),
            });
        }

        let close_confirmed = self.close(&state.filename, data_addr, &mut stats).await;

        Ok(TransferReport {
            filename: state.filename,
            path,
            size,
            close_confirmed,
            stats,
        })
    }

    /// 목록의 파일을 순서대로 다운로드
    ///
    /// 한 파일의 실패는 다음 파일에 영향을 주지 않는다
    pub async fn download_all<I>(&self, filenames: I) -> Vec<(String, Result<TransferReport>)>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut results = Vec::new();
        for filename in filenames {
            let filename = filename.into();
            let result = self.download(&filename).await;
            results.push((filename, result));
        }
        results
    }

    async fn fetch_blocks(
        &self,
        state: &mut TransferState,
        data_addr: SocketAddr,
        stats: &mut TransferStats,
    ) -> Result<()> {
        while let Some(range) = state.next_range(self.config.block_size) {
            let request = Request::Get {
                filename: state.filename.clone(),
                start: range.start,
                end: range.end,
            };
            let filename = state.filename.as_str();
            let block = self
                .exchanger
                .exchange(data_addr, &request, |bytes| {
                    classify_block(bytes, filename, range)
                })
                .await?;
            stats.record_exchange(block.attempts, block.discarded);

            state.append(&block.value).await?;
            stats.record_block(block.value.len());
        }

        state.sink.flush().await?;
        debug_assert!(state.is_complete());
        Ok(())
    }

    /// 종료 핸드쉐이크
    async fn close(&self, filename: &str, data_addr: SocketAddr, stats: &mut TransferStats) -> bool {
        let request = Request::Close {
            filename: filename.to_string(),
        };
        match self
            .exchanger
            .exchange(data_addr, &request, |bytes| classify_close(bytes, filename))
            .await
        {
            Ok(reply) => {
                stats.record_exchange(reply.attempts, reply.discarded);
                true
            }
            Err(e) => {
                warn!("{}: CLOSE 확인 실패: {}", filename, e);
                false
            }
        }
    }
}

/// 파일 목록 읽기 (한 줄에 파일 하나, 빈 줄 무시)
pub async fn read_file_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    let filenames: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    info!("File list: {} entries", filenames.len());
    Ok(filenames)
}

fn classify_offer(bytes: &[u8], filename: &str) -> Reply<Offer> {
    match Response::from_bytes(bytes) {
        Some(Response::Ok {
            filename: name,
            size,
            port,
        }) => {
            if name != filename {
                // 이전 파일의 재전송된 DOWNLOAD에 대한 늦은 응답
                Reply::Stale
            } else if port == 0 {
                Reply::Invalid(format!("{filename}: 데이터 포트 0"))
            } else {
                Reply::Accept(Offer::Granted { size, port })
            }
        }
        Some(Response::NotFound { filename: name }) if name == filename => {
            Reply::Accept(Offer::Missing)
        }
        Some(Response::NotFound { .. }) => Reply::Stale,
        Some(Response::InvalidRequest) => Reply::Accept(Offer::Rejected),
        Some(other) => Reply::Invalid(format!("DOWNLOAD에 대한 예상치 못한 응답: {other}")),
        None => Reply::Invalid("DOWNLOAD 응답 해석 실패".into()),
    }
}

fn classify_block(bytes: &[u8], filename: &str, range: BlockRange) -> Reply<Bytes> {
    match Response::from_bytes(bytes) {
        Some(Response::Block {
            filename: name,
            start,
            end,
            data,
        }) => {
            if name != filename {
                Reply::Invalid(format!("다른 파일의 블록: {name}"))
            } else if start == range.start && end == range.end {
                if data.len() as u64 == range.len() {
                    Reply::Accept(data)
                } else {
                    Reply::Invalid(format!(
                        "블록 길이 불일치: [{start}, {end}] 기대 {} bytes, 수신 {} bytes",
                        range.len(),
                        data.len()
                    ))
                }
            } else if end < range.start {
                // 이미 받은 블록의 중복 응답
                Reply::Stale
            } else {
                Reply::Invalid(format!(
                    "요청하지 않은 범위: [{start}, {end}] (요청 [{}, {}])",
                    range.start, range.end
                ))
            }
        }
        Some(other) => Reply::Invalid(format!("GET에 대한 예상치 못한 응답: {other}")),
        None => Reply::Invalid("블록 응답 해석 실패".into()),
    }
}

fn classify_close(bytes: &[u8], filename: &str) -> Reply<()> {
    if Response::is_close_ok_for(bytes, filename) {
        return Reply::Accept(());
    }
    match Response::from_bytes(bytes) {
        // 마지막 블록의 중복 응답
        Some(Response::Block { .. }) => Reply::Stale,
        _ => Reply::Invalid(format!(
            "CLOSE_OK가 아닌 응답: {}",
            String::from_utf8_lossy(&bytes[..bytes.len().min(64)])
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(filename: &str, start: u64, end: u64, len: usize) -> Vec<u8> {
        Response::Block {
            filename: filename.into(),
            start,
            end,
            data: Bytes::from(vec![b'x'; len]),
        }
        .to_bytes()
    }

    #[test]
    fn test_classify_offer() {
        assert!(matches!(
            classify_offer(b"OK a.txt SIZE 3 PORT 50001", "a.txt"),
            Reply::Accept(Offer::Granted { size: 3, port: 50001 })
        ));
        assert!(matches!(
            classify_offer(b"ERR a.txt NOT_FOUND", "a.txt"),
            Reply::Accept(Offer::Missing)
        ));
        assert!(matches!(
            classify_offer(b"ERR INVALID_REQUEST", "a.txt"),
            Reply::Accept(Offer::Rejected)
        ));
        // 이전 파일에 대한 늦은 응답
        assert!(matches!(
            classify_offer(b"OK previous.txt SIZE 3 PORT 50001", "a.txt"),
            Reply::Stale
        ));
        assert!(matches!(
            classify_offer(b"OK a.txt SIZE x PORT 50001", "a.txt"),
            Reply::Invalid(_)
        ));
    }

    #[test]
    fn test_classify_block() {
        let range = BlockRange::new(1000, 1999);

        assert!(matches!(
            classify_block(&block("f", 1000, 1999, 1000), "f", range),
            Reply::Accept(data) if data.len() == 1000
        ));
        // 늦게 도착한 이전 블록
        assert!(matches!(
            classify_block(&block("f", 0, 999, 1000), "f", range),
            Reply::Stale
        ));
        // 짧은 페이로드
        assert!(matches!(
            classify_block(&block("f", 1000, 1999, 999), "f", range),
            Reply::Invalid(_)
        ));
        // 다른 파일 이름
        assert!(matches!(
            classify_block(&block("g", 1000, 1999, 1000), "f", range),
            Reply::Invalid(_)
        ));
        assert!(matches!(
            classify_block(b"FILE f OK START 1000", "f", range),
            Reply::Invalid(_)
        ));
    }

    #[test]
    fn test_classify_close() {
        assert!(matches!(
            classify_close(b"FILE f CLOSE_OK", "f"),
            Reply::Accept(())
        ));
        assert!(matches!(
            classify_close(&block("f", 0, 2, 3), "f"),
            Reply::Stale
        ));
        assert!(matches!(
            classify_close(b"FILE f CLOSE", "f"),
            Reply::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn test_read_file_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.txt");
        std::fs::write(&path, "notes.txt\n\n  big.bin  \r\nmissing.bin\n").unwrap();

        let list = read_file_list(&path).await.unwrap();
        assert_eq!(list, vec!["notes.txt", "big.bin", "missing.bin"]);

        assert!(read_file_list(dir.path().join("nope.txt")).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_filename_is_refused_locally() {
        let client = Client::connect(Config::local_fast(), "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();
        assert!(matches!(
            client.download("two words.txt").await,
            Err(Error::InvalidFilename { .. })
        ));
    }
}
