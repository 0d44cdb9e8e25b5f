use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Common paths where chromedriver might be installed
const CHROMEDRIVER_PATHS: &[&str] = &[
    "/usr/bin/chromedriver",
    "/usr/local/bin/chromedriver",
    "/usr/lib/chromium/chromedriver",
    "/usr/lib/chromium-browser/chromedriver",
    "/snap/bin/chromium.chromedriver",
    "/opt/homebrew/bin/chromedriver",
];

/// Find chromedriver on the system
pub fn find_chromedriver_binary() -> Option<String> {
    // First check PATH
    if let Ok(output) = Command::new("which").arg("chromedriver").output()
        && output.status.success()
        && let Ok(path) = String::from_utf8(output.stdout)
    {
        let path = path.trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }

    for path in CHROMEDRIVER_PATHS {
        if Path::new(path).exists() {
            return Some(path.to_string());
        }
    }

    None
}

/// Handle to a running chromedriver. The process is killed on drop.
pub struct ChromedriverProcess {
    child: Child,
    port: u16,
}

impl ChromedriverProcess {
    pub fn webdriver_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for ChromedriverProcess {
    fn drop(&mut self) {
        info!("Shutting down chromedriver (pid {})...", self.pid());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Start chromedriver on `port` and wait until its status endpoint answers.
///
/// `binary` overrides the lookup on PATH and the usual install locations.
pub async fn launch_chromedriver(
    port: u16,
    binary: Option<&Path>,
) -> Result<ChromedriverProcess, String> {
    let path: PathBuf = match binary {
        Some(path) => path.to_path_buf(),
        None => find_chromedriver_binary()
            .map(PathBuf::from)
            .ok_or_else(|| {
                "chromedriver not found. Install it or set browser.chromedriver_path".to_string()
            })?,
    };

    info!("Launching chromedriver from: {}", path.display());

    let child = Command::new(&path)
        .arg(format!("--port={}", port))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to launch chromedriver: {}", e))?;

    info!("chromedriver launched with PID: {}", child.id());
    // Owned from here on so every early return kills it.
    let process = ChromedriverProcess { child, port };

    let url = format!("http://localhost:{}/status", port);
    let client = reqwest::Client::new();

    for attempt in 1..=30 {
        sleep(Duration::from_millis(200)).await;

        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(
                    "chromedriver ready after {} attempts (pid {})",
                    attempt,
                    process.pid()
                );
                return Ok(process);
            }
            Ok(_) => {
                warn!(
                    "chromedriver responded but not ready yet (attempt {})",
                    attempt
                );
            }
            Err(_) => {
                if attempt % 5 == 0 {
                    info!("Waiting for chromedriver... (attempt {})", attempt);
                }
            }
        }
    }

    Err("chromedriver did not become ready within timeout".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_binary() {
        // Availability depends on the host; only checks the lookup is total.
        let _ = find_chromedriver_binary();
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let err = launch_chromedriver(9599, Some(Path::new("/nonexistent/chromedriver")))
            .await
            .err()
            .unwrap();
        assert!(err.starts_with("Failed to launch chromedriver"));
    }
}
