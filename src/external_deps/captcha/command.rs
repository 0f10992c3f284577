use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CaptchaSolver, SolverError};

const DEFAULT_PROGRAM: &str = "tesseract";
const DEFAULT_ARGS: [&str; 4] = ["stdin", "stdout", "--psm", "7"];

/// Automated solver backed by an external OCR program.
///
/// The image goes to the child's stdin and the answer is read from its
/// stdout, keeping ASCII alphanumerics only. The child is killed when the
/// future is dropped.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
}

impl CommandSolver {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `tesseract stdin stdout --psm 7` (single text line).
    pub fn tesseract() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_ARGS)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandSolver {
    fn default() -> Self {
        Self::tesseract()
    }
}

#[async_trait]
impl CaptchaSolver for CommandSolver {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn solve(&self, image: &[u8]) -> Result<String, SolverError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => {
                    SolverError::Unavailable(format!("{} not found", self.program))
                }
                _ => SolverError::Io(err),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SolverError::Process(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let answer: String = String::from_utf8_lossy(&output.stdout)
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        if answer.is_empty() {
            return Err(SolverError::EmptyAnswer);
        }
        log::debug!("{} recognised {} characters", self.program, answer.len());
        Ok(answer)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_alphanumerics_from_stdout() {
        let solver = CommandSolver::new("cat", Vec::<String>::new());
        assert_eq!(solver.solve(b" x7-k2 p\n").await.unwrap(), "x7k2p");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let solver = CommandSolver::new("courtscraper-no-such-ocr", ["stdin"]);
        assert!(matches!(
            solver.solve(b"img").await,
            Err(SolverError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_process_failure() {
        let solver = CommandSolver::new("sh", ["-c", "cat >/dev/null; exit 3"]);
        assert!(matches!(
            solver.solve(b"img").await,
            Err(SolverError::Process(_))
        ));
    }

    #[tokio::test]
    async fn symbol_only_output_is_empty() {
        let solver = CommandSolver::new("sh", ["-c", "cat >/dev/null; echo '--'"]);
        assert!(matches!(
            solver.solve(b"img").await,
            Err(SolverError::EmptyAnswer)
        ));
    }
}
