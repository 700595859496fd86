use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

const DEBUG_PORT_START: u16 = 9300;
const DEBUG_PORT_END: u16 = 9800;

#[derive(Debug, Clone, Deserialize)]
pub struct CdpTarget {
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Attached,
    Launched,
}

/// A debuggable Chrome bound to one platform profile.
#[derive(Debug, Clone)]
pub struct ChromeSession {
    pub port: u16,
    pub mode: SessionMode,
    pub profile_dir: PathBuf,
}

/// Allocate an available debugging port by probing localhost listeners.
pub fn allocate_port() -> Result<u16> {
    for port in DEBUG_PORT_START..=DEBUG_PORT_END {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }

    bail!(
        "No available Chrome debugging port in range {}-{}",
        DEBUG_PORT_START,
        DEBUG_PORT_END
    )
}

/// Detect Chrome installation path on the current OS
pub fn detect_chrome() -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        let paths = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for p in &paths {
            let path = PathBuf::from(p);
            if path.exists() {
                return Ok(path);
            }
        }
        if let Ok(path) = which::which("google-chrome") {
            return Ok(path);
        }
    }

    #[cfg(target_os = "windows")]
    {
        let paths = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for p in &paths {
            let path = PathBuf::from(p);
            if path.exists() {
                return Ok(path);
            }
        }
        if let Ok(path) = which::which("chrome") {
            return Ok(path);
        }
    }

    #[cfg(target_os = "linux")]
    {
        let names = [
            "google-chrome",
            "google-chrome-stable",
            "chromium-browser",
            "chromium",
        ];
        for name in &names {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }
    }

    bail!("Could not find Chrome browser. Please install Google Chrome.")
}

/// Profile directory for one platform, created on demand. Logins persist
/// between runs because every platform keeps its own profile.
pub fn profile_dir(platform: &str) -> Result<PathBuf> {
    let base = dirs::data_dir().context("Cannot find data directory")?;
    let dir = base
        .join("multi-platform-filler")
        .join("profiles")
        .join(platform);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

/// Launch Chrome with a debugging port and return (Child, port)
pub fn launch_chrome_with_debug(
    chrome_path: &Path,
    profile_dir: &Path,
    url: &str,
) -> Result<(Child, u16)> {
    let port = allocate_port()?;
    info!(
        "[Chrome] launching profile={} port={} url={}",
        profile_dir.display(),
        port,
        url
    );

    let child = Command::new(chrome_path)
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg(format!("--remote-debugging-port={}", port))
        .arg("--new-window")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-default-apps")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-renderer-backgrounding")
        .arg(format!("--window-size={},{}", 1280, 900))
        .arg(url)
        .spawn()
        .context("Failed to launch Chrome")?;

    info!("[Chrome] launched pid={} port={}", child.id(), port);
    Ok((child, port))
}

/// Attaches to the profile's running debuggable Chrome, or launches one on
/// `url`. A profile locked by a Chrome without a debugging port cannot be
/// used and is reported as busy.
pub async fn prepare_chrome_session(
    chrome_path: &Path,
    profile_dir: &Path,
    url: &str,
) -> Result<ChromeSession> {
    if let Some(port) = discover_profile_debug_port(profile_dir).await {
        info!(
            "[Chrome] attaching to running session profile={} port={}",
            profile_dir.display(),
            port
        );
        return Ok(ChromeSession {
            port,
            mode: SessionMode::Attached,
            profile_dir: profile_dir.to_path_buf(),
        });
    }

    if is_profile_busy(profile_dir) {
        bail!(
            "PROFILE_BUSY: 该平台的 Chrome 已在运行且未开启调试端口，请关闭对应窗口后重试"
        );
    }

    let (_child, port) = launch_chrome_with_debug(chrome_path, profile_dir, url)?;
    Ok(ChromeSession {
        port,
        mode: SessionMode::Launched,
        profile_dir: profile_dir.to_path_buf(),
    })
}

/// Polls `/json/version` and `/json/list` until a page target exists.
/// Re-reads `DevToolsActivePort` once in case Chrome picked another port.
pub async fn wait_for_chrome_ready(session: &mut ChromeSession, timeout: Duration) -> Result<u16> {
    let start = tokio::time::Instant::now();
    let mut saw_version = false;
    let mut rediscovered = false;

    loop {
        if start.elapsed() > timeout {
            if saw_version {
                bail!(
                    "CHROME_NOT_READY: 调试端口 {} 可访问，但 {} 秒内没有可操作的页面",
                    session.port,
                    timeout.as_secs()
                );
            }
            bail!(
                "CHROME_NOT_READY: Chrome 在 {} 秒内未就绪（端口 {}）",
                timeout.as_secs(),
                session.port
            );
        }

        if is_port_version_ready(session.port).await {
            saw_version = true;
            match list_targets(session.port).await {
                Ok(targets) if targets.iter().any(|t| t.target_type == "page") => {
                    info!("[Chrome] ready on port {}", session.port);
                    return Ok(session.port);
                }
                Ok(_) => debug!("[Chrome] port {} up, waiting for a page", session.port),
                Err(e) => debug!("[Chrome] target list on {} failed: {}", session.port, e),
            }
        }

        if !rediscovered {
            if let Some(port) = read_devtools_active_port(&session.profile_dir) {
                if port != session.port {
                    info!("[Chrome] active port moved {} -> {}", session.port, port);
                    session.port = port;
                }
            }
            rediscovered = true;
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Discover an existing debuggable Chrome session port for a profile.
pub async fn discover_profile_debug_port(profile_dir: &Path) -> Option<u16> {
    let mut candidates: BTreeSet<u16> = BTreeSet::new();
    candidates.extend(read_devtools_active_port(profile_dir));
    candidates.extend(running_profile_debug_ports(profile_dir));

    for port in candidates {
        if is_port_version_ready(port).await {
            return Some(port);
        }
    }
    None
}

fn read_devtools_active_port(profile_dir: &Path) -> Option<u16> {
    let body = std::fs::read_to_string(profile_dir.join("DevToolsActivePort")).ok()?;
    body.lines().next()?.trim().parse::<u16>().ok()
}

#[cfg(unix)]
fn running_profile_debug_ports(profile_dir: &Path) -> Vec<u16> {
    let output = match Command::new("ps").args(["-ax", "-o", "command="]).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| matches_profile_user_data_dir(line, profile_dir))
        .filter_map(|line| extract_flag_u16(line, "--remote-debugging-port="))
        .collect()
}

#[cfg(not(unix))]
fn running_profile_debug_ports(_profile_dir: &Path) -> Vec<u16> {
    Vec::new()
}

fn matches_profile_user_data_dir(cmdline: &str, profile_dir: &Path) -> bool {
    let profile = profile_dir.to_string_lossy();
    [
        format!("--user-data-dir={}", profile),
        format!("--user-data-dir=\"{}\"", profile),
        format!("--user-data-dir='{}'", profile),
    ]
    .iter()
    .any(|flag| cmdline.contains(flag.as_str()))
}

fn extract_flag_u16(cmdline: &str, prefix: &str) -> Option<u16> {
    cmdline
        .split_whitespace()
        .filter_map(|token| token.strip_prefix(prefix))
        .find_map(|raw| raw.trim_matches('"').trim_matches('\'').parse::<u16>().ok())
}

async fn is_port_version_ready(port: u16) -> bool {
    let version_url = format!("http://127.0.0.1:{}/json/version", port);
    matches!(reqwest::get(&version_url).await, Ok(resp) if resp.status().is_success())
}

/// Targets listed by the DevTools HTTP endpoint.
pub async fn list_targets(port: u16) -> Result<Vec<CdpTarget>> {
    let list_url = format!("http://127.0.0.1:{}/json/list", port);
    let resp = reqwest::get(&list_url)
        .await
        .context("请求 Chrome json/list 失败")?;
    if !resp.status().is_success() {
        return Ok(Vec::new());
    }
    Ok(resp.json().await.unwrap_or_default())
}

fn singleton_lock_pid(profile_dir: &Path) -> Option<u32> {
    let target = std::fs::read_link(profile_dir.join("SingletonLock")).ok()?;
    let name = target.file_name()?.to_string_lossy().to_string();
    name.rsplit('-').next()?.parse::<u32>().ok()
}

#[cfg(unix)]
fn is_pid_running(pid: u32) -> bool {
    match Command::new("ps").args(["-p", &pid.to_string(), "-o", "pid="]).output() {
        Ok(output) => {
            output.status.success() && !String::from_utf8_lossy(&output.stdout).trim().is_empty()
        }
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_pid_running(_pid: u32) -> bool {
    false
}

pub fn is_profile_busy(profile_dir: &Path) -> bool {
    let locked = ["SingletonLock", "SingletonCookie", "SingletonSocket"]
        .iter()
        .any(|name| profile_dir.join(name).exists());
    if !locked {
        return false;
    }
    singleton_lock_pid(profile_dir).map_or(true, is_pid_running)
}
