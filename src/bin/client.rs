//! UFT 클라이언트 - UDP File Transfer
//!
//! 파일 목록의 파일을 하나씩 순서대로 다운로드
//! 파일별 실패(없음, 중단, CLOSE 실패)는 보고만 하고 다음 파일로 진행
//!
//! 사용법:
//!   cargo run --release --bin uft-client -- <SERVER_HOST> <CONTROL_PORT> <FILE_LIST> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin uft-client -- 127.0.0.1 9000 files.txt
//!
//!   # 저장 위치와 타임아웃 지정
//!   cargo run --release --bin uft-client -- server.local 9000 files.txt -o downloads --timeout 2000

use std::path::PathBuf;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use uft::{read_file_list, Client, Config, Error};

const USAGE: &str = r#"UFT Client - UDP File Transfer 클라이언트

사용법:
  uft-client <SERVER_HOST> <CONTROL_PORT> <FILE_LIST> [OPTIONS]

옵션:
  -o, --output <DIR>       저장 디렉터리 (기본: .)
  -t, --timeout <MS>       첫 시도 타임아웃, 재시도마다 2배 (기본: 1000)
  -a, --attempts <N>       교환당 최대 전송 횟수 (기본: 5)
  --block-size <BYTES>     블록 크기 (기본: 1000)
  -v, --verbose            디버그 로그 출력
  -h, --help               이 도움말 출력
"#;

/// 클라이언트 설정
struct ClientArgs {
    host: String,
    port: u16,
    file_list: PathBuf,
    output_dir: PathBuf,
    verbose: bool,
    config: Config,
}

fn parse_args(args: &[String]) -> Result<ClientArgs, String> {
    let mut positional = Vec::new();
    let mut output_dir = PathBuf::from(".");
    let mut verbose = false;
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--output" | "-o" => {
                output_dir = PathBuf::from(value(args, i)?);
                i += 1;
            }
            "--timeout" | "-t" => {
                config.initial_timeout_ms = number(args, i)?;
                i += 1;
            }
            "--attempts" | "-a" => {
                config.max_attempts = number(args, i)?;
                i += 1;
            }
            "--block-size" => {
                config.block_size = number(args, i)?;
                i += 1;
            }
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => return Err(format!("알 수 없는 옵션: {other}")),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let [host, port, file_list]: [String; 3] = positional
        .try_into()
        .map_err(|_| "SERVER_HOST, CONTROL_PORT, FILE_LIST 세 인자가 필요함".to_string())?;
    let port = port
        .parse()
        .map_err(|_| format!("유효한 포트 필요: {port}"))?;
    config.validate().map_err(|e| e.to_string())?;

    Ok(ClientArgs {
        host,
        port,
        file_list: PathBuf::from(file_list),
        output_dir,
        verbose,
        config,
    })
}

fn value(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} 옵션에 값이 필요함", args[i]))
}

fn number<T: std::str::FromStr>(args: &[String], i: usize) -> Result<T, String> {
    let raw = value(args, i)?;
    raw.parse().map_err(|_| format!("유효한 숫자 필요: {raw}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let client_args = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(1);
        }
    };

    // 로깅 설정
    let level = if client_args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let server_addr = match tokio::net::lookup_host((client_args.host.as_str(), client_args.port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
    {
        Some(addr) => addr,
        None => {
            eprintln!("서버 주소를 찾을 수 없음: {}", client_args.host);
            std::process::exit(1);
        }
    };

    let filenames = match read_file_list(&client_args.file_list).await {
        Ok(filenames) => filenames,
        Err(e) => {
            eprintln!(
                "파일 목록을 읽을 수 없음: {} ({e})",
                client_args.file_list.display()
            );
            std::process::exit(1);
        }
    };

    info!("UFT Client starting...");
    info!("Server address: {}", server_addr);
    info!("Output directory: {}", client_args.output_dir.display());

    let client = Client::connect(client_args.config, server_addr)
        .await?
        .with_output_dir(client_args.output_dir);

    let results = client.download_all(filenames).await;

    let mut completed = 0;
    for (filename, result) in &results {
        match result {
            Ok(report) => {
                completed += 1;
                info!(
                    "{} downloaded ({} bytes) | {}",
                    filename,
                    report.size,
                    report.stats.summary()
                );
                if !report.close_confirmed {
                    warn!("{}: close failed (file is complete)", filename);
                }
            }
            Err(Error::NotFound { .. }) => warn!("{}: not found on server", filename),
            Err(Error::Aborted {
                downloaded,
                size,
                source,
                ..
            }) => warn!(
                "{}: incomplete download ({}/{} bytes): {}",
                filename, downloaded, size, source
            ),
            Err(e) => warn!("{}: download failed: {}", filename, e),
        }
    }

    info!("Done: {}/{} files downloaded", completed, results.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("uft-client")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_positional_and_options() {
        let parsed = parse_args(&args(&[
            "127.0.0.1",
            "9000",
            "files.txt",
            "--timeout",
            "250",
            "-o",
            "out",
        ]))
        .unwrap();
        assert_eq!(parsed.host, "127.0.0.1");
        assert_eq!(parsed.port, 9000);
        assert_eq!(parsed.file_list, PathBuf::from("files.txt"));
        assert_eq!(parsed.output_dir, PathBuf::from("out"));
        assert_eq!(parsed.config.initial_timeout_ms, 250);
        assert_eq!(parsed.config.max_attempts, 5);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["127.0.0.1", "9000"])).is_err());
        assert!(parse_args(&args(&["127.0.0.1", "port", "files.txt"])).is_err());
        assert!(parse_args(&args(&["127.0.0.1", "9000", "files.txt", "extra"])).is_err());
        assert!(parse_args(&args(&["127.0.0.1", "9000", "files.txt", "--attempts", "0"])).is_err());
    }
}
