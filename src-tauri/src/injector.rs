//! User script injection from command-line arguments.

use crate::constants::RUNTIME_TOKEN;
use crate::error::AppError;
use crate::page::Page;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns the arguments that name script files.
///
/// When the first argument is the bare runtime name (or a path ending in it)
/// the second argument is the app entry point and is skipped as well.
pub fn script_args(args: &[String]) -> &[String] {
    let skip = match args.first() {
        Some(first) if first == RUNTIME_TOKEN || first.ends_with(RUNTIME_TOKEN) => 2,
        _ => 1,
    };
    args.get(skip..).unwrap_or(&[])
}

/// Script paths for this process.
pub fn script_paths_from_env() -> Vec<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    script_args(&args).iter().map(PathBuf::from).collect()
}

fn read_script(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|source| AppError::ReadScript {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs each file in `paths` inside the page, one after another, as classic
/// scripts sharing the page's global scope.
///
/// Each script is awaited before the next file is read. The first failure
/// aborts the remaining injections. Returns how many scripts ran.
pub async fn inject_scripts<P: Page>(page: &P, paths: &[PathBuf]) -> Result<usize, AppError> {
    let mut injected = 0;
    for path in paths {
        let code = read_script(path)?;
        info!("[Injector] Executing {}", path.display());
        page.run_script(&code).await?;
        injected += 1;
    }
    Ok(injected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Records evaluation start/end so overlap would be visible.
    #[derive(Default)]
    struct RecordingPage {
        events: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl Page for RecordingPage {
        async fn eval(&self, code: &str) -> Result<Value, AppError> {
            // Files must run as page scripts, never through eval
            self.events.lock().unwrap().push(format!("eval {}", code));
            Err(AppError::PageScript("eval used for a script file".to_string()))
        }

        async fn run_script(&self, code: &str) -> Result<(), AppError> {
            self.events.lock().unwrap().push(format!("start {}", code));
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.events.lock().unwrap().push(format!("end {}", code));
            match &self.fail_on {
                Some(bad) if bad == code => Err(AppError::PageScript("boom".to_string())),
                _ => Ok(()),
            }
        }
    }

    fn write_scripts(names: &[(&str, &str)]) -> (TempDir, Vec<PathBuf>) {
        let dir = tempdir().unwrap();
        let paths = names
            .iter()
            .map(|(name, code)| {
                let path = dir.path().join(name);
                fs::write(&path, code).unwrap();
                path
            })
            .collect();
        (dir, paths)
    }

    #[test]
    fn test_runtime_invocation_skips_entry_point() {
        let argv = args(&["electron", ".", "a.js", "b.js"]);
        assert_eq!(script_args(&argv), &args(&["a.js", "b.js"])[..]);

        let argv = args(&["/usr/lib/node_modules/electron", "main.js", "a.js"]);
        assert_eq!(script_args(&argv), &args(&["a.js"])[..]);
    }

    #[test]
    fn test_packaged_invocation_skips_executable_only() {
        let argv = args(&["/opt/mk48desktop/mk48desktop", "a.js", "b.js"]);
        assert_eq!(script_args(&argv), &args(&["a.js", "b.js"])[..]);

        let argv = args(&["node", "main.js", "a.js"]);
        assert_eq!(script_args(&argv), &args(&["main.js", "a.js"])[..]);
    }

    #[test]
    fn test_short_argument_lists() {
        assert!(script_args(&[]).is_empty());
        assert!(script_args(&args(&["mk48desktop"])).is_empty());
        assert!(script_args(&args(&["electron"])).is_empty());
        assert!(script_args(&args(&["electron", "."])).is_empty());
    }

    #[tokio::test]
    async fn test_scripts_run_in_order_without_overlap() {
        let (_dir, paths) = write_scripts(&[("a.js", "A"), ("b.js", "B"), ("c.js", "C")]);
        let page = RecordingPage::default();

        let count = inject_scripts(&page, &paths).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            *page.events.lock().unwrap(),
            vec!["start A", "end A", "start B", "end B", "start C", "end C"]
        );
    }

    #[tokio::test]
    async fn test_missing_file_aborts_remaining() {
        let (dir, mut paths) = write_scripts(&[("a.js", "A"), ("c.js", "C")]);
        paths.insert(1, dir.path().join("missing.js"));
        let page = RecordingPage::default();

        let err = inject_scripts(&page, &paths).await.unwrap_err();

        assert!(matches!(err, AppError::ReadScript { ref path, .. } if path.ends_with("missing.js")));
        assert_eq!(*page.events.lock().unwrap(), vec!["start A", "end A"]);
    }

    #[tokio::test]
    async fn test_page_failure_aborts_remaining() {
        let (_dir, paths) = write_scripts(&[("a.js", "A"), ("b.js", "B"), ("c.js", "C")]);
        let page = RecordingPage {
            fail_on: Some("B".to_string()),
            ..Default::default()
        };

        let err = inject_scripts(&page, &paths).await.unwrap_err();

        assert!(matches!(err, AppError::PageScript(_)));
        assert_eq!(
            *page.events.lock().unwrap(),
            vec!["start A", "end A", "start B", "end B"]
        );
    }
}
