//! UFT 서버 - UDP File Transfer
//!
//! 제어 포트에서 DOWNLOAD 요청을 받아 파일마다 임시 데이터 포트로 블록을 제공
//!
//! 사용법:
//!   cargo run --release --bin uft-server -- <CONTROL_PORT> [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리 제공
//!   cargo run --release --bin uft-server -- 9000
//!
//!   # 루트 지정
//!   cargo run --release --bin uft-server -- 9000 --root /srv/files

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use uft::{Config, FileRoot, Server};

const USAGE: &str = r#"UFT Server - UDP File Transfer 서버

사용법:
  uft-server <CONTROL_PORT> [OPTIONS]

옵션:
  -r, --root <DIR>           제공할 디렉터리 (기본: .)
  -b, --bind <IP>            바인드 IP (기본: 0.0.0.0)
  --idle-timeout <SECS>      세션 유휴 타임아웃 (기본: 60)
  --port-range <MIN-MAX>     데이터 포트 범위 (기본: 50000-51000)
  -v, --verbose              디버그 로그 출력
  -h, --help                 이 도움말 출력
"#;

/// 서버 설정
struct ServerArgs {
    bind_ip: IpAddr,
    port: u16,
    root: PathBuf,
    verbose: bool,
    config: Config,
}

fn parse_args(args: &[String]) -> Result<ServerArgs, String> {
    let mut port = None;
    let mut parsed = ServerArgs {
        bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        port: 0,
        root: PathBuf::from("."),
        verbose: false,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--root" | "-r" => {
                parsed.root = PathBuf::from(value(args, i)?);
                i += 1;
            }
            "--bind" | "-b" => {
                parsed.bind_ip = value(args, i)?
                    .parse()
                    .map_err(|_| format!("유효한 IP 필요: {}", args[i + 1]))?;
                i += 1;
            }
            "--idle-timeout" => {
                let secs: u64 = value(args, i)?
                    .parse()
                    .map_err(|_| format!("유효한 숫자 필요: {}", args[i + 1]))?;
                parsed.config.session_idle_timeout_ms = secs
                    .checked_mul(1000)
                    .ok_or_else(|| format!("유휴 타임아웃이 너무 큼: {secs}"))?;
                i += 1;
            }
            "--port-range" => {
                let range = value(args, i)?;
                let (min, max) = range
                    .split_once('-')
                    .and_then(|(min, max)| Some((min.parse::<u16>().ok()?, max.parse::<u16>().ok()?)))
                    .ok_or_else(|| format!("유효한 포트 범위 필요: {range}"))?;
                parsed.config.data_port_min = min;
                parsed.config.data_port_max = max;
                i += 1;
            }
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => return Err(format!("알 수 없는 옵션: {other}")),
            other => {
                if port.is_some() {
                    return Err(format!("인자가 너무 많음: {other}"));
                }
                port = Some(
                    other
                        .parse::<u16>()
                        .map_err(|_| format!("유효한 포트 필요: {other}"))?,
                );
            }
        }
        i += 1;
    }

    parsed.port = port.ok_or("제어 포트가 필요함")?;
    parsed.config.validate().map_err(|e| e.to_string())?;
    Ok(parsed)
}

fn value(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 옵션에 값이 필요함", args[i]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let server_args = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(1);
        }
    };

    // 로깅 설정
    let level = if server_args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = server_args.config;
    info!("UFT Server starting...");
    info!(
        "Data ports: {}-{}",
        config.data_port_min, config.data_port_max
    );
    info!("Session idle timeout: {}s", config.session_idle_timeout_ms / 1000);

    let root = FileRoot::new(&server_args.root)?;
    let bind_addr = SocketAddr::new(server_args.bind_ip, server_args.port);
    let server = Server::bind(config, bind_addr, root).await?;

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("uft-server")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_port_and_options() {
        let parsed = parse_args(&args(&["9000", "--root", "/srv", "--idle-timeout", "5"])).unwrap();
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.root, PathBuf::from("/srv"));
        assert_eq!(parsed.config.session_idle_timeout_ms, 5000);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["notaport"])).is_err());
        assert!(parse_args(&args(&["9000", "9001"])).is_err());
        assert!(parse_args(&args(&["9000", "--root"])).is_err());
        assert!(parse_args(&args(&["9000", "--port-range", "51000-50000"])).is_err());

        // 밀리초 변환에서 넘침
        let huge = u64::MAX.to_string();
        assert!(parse_args(&args(&["9000", "--idle-timeout", &huge])).is_err());
    }
}
