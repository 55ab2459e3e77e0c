//! Loading a submission from disk or stdin.

use crate::models::Submission;
use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Language assumed when none is given and the extension is unknown.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Map a file extension to the language name used in prompts.
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let language = match ext.as_str() {
        "py" | "pyw" => "python",
        "rs" => "rust",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sql" => "sql",
        "sh" | "bash" => "bash",
        _ => return None,
    };
    Some(language)
}

/// Read a source file (or stdin for `-`) into a submission.
///
/// An explicit `language` wins over the extension.
pub fn load_submission(path: &Path, language: Option<&str>) -> Result<Submission> {
    let from_stdin = path.as_os_str() == "-";

    let code = if from_stdin {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read source from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    if code.trim().is_empty() {
        bail!("Source is empty: {}", path.display());
    }

    let language = match language {
        Some(lang) => lang.to_lowercase(),
        None => language_for_path(path)
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string(),
    };
    debug!("Loaded {} bytes of {} from {}", code.len(), language, path.display());

    let submission = Submission::new(code, language);
    Ok(if from_stdin {
        submission
    } else {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        submission.with_filename(filename)
    })
}
