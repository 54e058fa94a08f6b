//! 서버측 파일 저장소
//!
//! 요청된 파일 이름을 고정 루트 디렉터리 아래에서 찾는다.
//! 정규화한 경로가 루트 밖으로 나가면 거부한다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::block::BlockRange;
use crate::{Error, Result};

/// 루트 디렉터리에 묶인 저장소
#[derive(Debug, Clone)]
pub struct FileRoot {
    root: PathBuf,
}

impl FileRoot {
    /// 루트 생성 (존재하는 디렉터리여야 함)
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "루트가 디렉터리가 아님: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// 정규화된 루트 경로
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// 파일 이름을 루트 아래 실제 경로로 변환
    ///
    /// 없는 파일, 일반 파일이 아닌 경로는 `NotFound`,
    /// 루트 밖으로 빠져나가는 경로는 `OutsideRoot`
    pub async fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let not_found = || Error::NotFound {
            filename: filename.to_string(),
        };

        let requested = Path::new(filename);
        if requested.is_absolute() {
            warn!("절대 경로 요청 거부: {}", filename);
            return Err(Error::OutsideRoot {
                filename: filename.to_string(),
            });
        }

        let resolved = match tokio::fs::canonicalize(self.root.join(requested)).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        if !resolved.starts_with(&self.root) {
            warn!("루트 밖 경로 요청 거부: {} -> {}", filename, resolved.display());
            return Err(Error::OutsideRoot {
                filename: filename.to_string(),
            });
        }

        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        Ok(resolved)
    }

    /// 파일을 읽기 전용으로 열고 길이와 함께 반환
    pub async fn open(&self, filename: &str) -> Result<(File, u64)> {
        let path = self.resolve(filename).await?;
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }
}

/// 범위 `[start, end]`를 정확히 읽는다
///
/// 파일이 도중에 짧아졌으면 `UnexpectedEof`
pub async fn read_range(file: &mut File, range: BlockRange) -> std::io::Result<Vec<u8>> {
    let len = usize::try_from(range.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "범위가 너무 큼"))?;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(range.start)).await?;
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FileRoot) {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }
        let root = FileRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    #[tokio::test]
    async fn test_open_existing_file() {
        let (_dir, root) = root_with(&[("notes.txt", "abc")]);
        let (mut file, len) = root.open("notes.txt").await.unwrap();
        assert_eq!(len, 3);

        let bytes = read_range(&mut file, BlockRange::new(1, 2)).await.unwrap();
        assert_eq!(bytes, b"bc");
    }

    #[tokio::test]
    async fn test_missing_file_and_directory() {
        let (dir, root) = root_with(&[]);
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(matches!(
            root.open("missing.bin").await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(root.open("sub").await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let outer = tempfile::tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), b"top secret").unwrap();
        let inner = outer.path().join("public");
        std::fs::create_dir(&inner).unwrap();
        let root = FileRoot::new(&inner).unwrap();

        assert!(matches!(
            root.resolve("../secret.txt").await,
            Err(Error::OutsideRoot { .. })
        ));

        let absolute = outer.path().join("secret.txt");
        assert!(matches!(
            root.resolve(absolute.to_str().unwrap()).await,
            Err(Error::OutsideRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_short_read_is_eof() {
        let (_dir, root) = root_with(&[("short.bin", "12345")]);
        let (mut file, _) = root.open("short.bin").await.unwrap();

        let err = read_range(&mut file, BlockRange::new(3, 9)).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
