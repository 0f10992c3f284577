use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use super::{CaptchaSolver, SolverError, non_empty};

/// Caller-provided answer source, e.g. a GUI prompt.
pub type SolveCallback = Arc<dyn Fn(&[u8]) -> Result<String, SolverError> + Send + Sync>;

/// Process-wide stdin reader. Lines buffered past the current answer stay
/// here for the next prompt instead of being dropped with a local reader.
static STDIN_LINES: Lazy<Mutex<Lines<BufReader<Stdin>>>> =
    Lazy::new(|| Mutex::new(BufReader::new(tokio::io::stdin()).lines()));

/// Interactive solver.
///
/// Without a callback the image is written to a temporary file, its path is
/// printed to stderr and one line is read from stdin. Dropping the future
/// abandons the wait and removes the image.
#[derive(Clone, Default)]
pub struct ManualSolver {
    callback: Option<SolveCallback>,
    image_dir: Option<PathBuf>,
}

impl ManualSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: SolveCallback) -> Self {
        Self {
            callback: Some(callback),
            image_dir: None,
        }
    }

    /// Directory for prompt images; defaults to the system temp dir.
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    async fn prompt(&self, image: &[u8]) -> Result<String, SolverError> {
        let dir = self.image_dir.clone().unwrap_or_else(std::env::temp_dir);
        let image = PromptImage::write(&dir, image).await?;

        eprintln!("Captcha image saved to {}", image.path().display());
        eprint!("Enter captcha: ");

        // `next_line` is cancel safe; a partial line stays in the shared buffer.
        let line = STDIN_LINES.lock().await.next_line().await?;
        drop(image);

        match line {
            Some(line) => non_empty(&line),
            None => Err(SolverError::Unavailable("stdin closed".into())),
        }
    }
}

/// Temporary captcha image, removed when dropped.
struct PromptImage {
    path: PathBuf,
}

impl PromptImage {
    async fn write(dir: &Path, image: &[u8]) -> Result<Self, SolverError> {
        let path = dir.join(format!("courtscraper-captcha-{:08x}.png", rand::random::<u32>()));
        tokio::fs::write(&path, image).await?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PromptImage {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::debug!("could not remove {}: {err}", self.path.display());
        }
    }
}

impl std::fmt::Debug for ManualSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualSolver")
            .field("callback", &self.callback.is_some())
            .field("image_dir", &self.image_dir)
            .finish()
    }
}

#[async_trait]
impl CaptchaSolver for ManualSolver {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn solve(&self, image: &[u8]) -> Result<String, SolverError> {
        match &self.callback {
            Some(callback) => non_empty(&callback(image)?),
            None => self.prompt(image).await,
        }
    }
}
