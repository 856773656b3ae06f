use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use super::Host;

const PLIST_BUDDY: &str = "/usr/libexec/PlistBuddy";
const CONSOLE_DEVICE: &str = "/dev/console";

/// [`Host`] backed by the stock macOS command-line utilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

fn run(program: &str, args: &[&str]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute {}", program))
}

fn check(program: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!(
        "{} exited with {}: {}",
        program,
        output.status,
        stderr.trim()
    ))
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {:?}", path))
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// Pull `HIDIdleTime` (nanoseconds) out of `ioreg -c IOHIDSystem` output and
/// floor it to whole seconds.
pub fn parse_hid_idle_seconds(ioreg_output: &str) -> Option<u64> {
    ioreg_output
        .lines()
        .find(|line| line.contains("\"HIDIdleTime\""))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|nanos| nanos / 1_000_000_000)
}

impl Host for SystemHost {
    fn expand_package(&self, package: &Path, dest: &Path) -> Result<()> {
        let output = run("pkgutil", &["--expand", path_arg(package)?, path_arg(dest)?])?;
        check("pkgutil", output)?;
        Ok(())
    }

    fn read_bundle_value(&self, bundle: &Path, key: &str) -> Result<Option<String>> {
        let plist = bundle.join("Contents").join("Info.plist");
        if !plist.exists() {
            return Ok(None);
        }

        let command = format!("Print :{}", key);
        let output = run(PLIST_BUDDY, &["-c", &command, path_arg(&plist)?])?;
        if !output.status.success() {
            return Ok(None);
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    fn idle_seconds(&self) -> Result<u64> {
        let output = check("ioreg", run("ioreg", &["-c", "IOHIDSystem"])?)?;
        let text = String::from_utf8_lossy(&output.stdout);
        parse_hid_idle_seconds(&text).ok_or_else(|| anyhow!("HIDIdleTime not found in ioreg output"))
    }

    fn is_running(&self, app_name: &str) -> bool {
        Command::new("pgrep")
            .args(["-x", app_name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn quit(&self, app_name: &str) -> Result<()> {
        let script = format!("tell application \"{}\" to quit", app_name);
        check("osascript", run("osascript", &["-e", &script])?)?;
        Ok(())
    }

    fn install_package(&self, package: &Path, target: &Path) -> Result<()> {
        let mut args = vec![
            "installer",
            "-pkg",
            path_arg(package)?,
            "-target",
            path_arg(target)?,
        ];

        // -n keeps sudo from prompting in an unattended run
        let program = if is_root() {
            args.remove(0)
        } else {
            args.insert(0, "-n");
            "sudo"
        };

        check(program, run(program, &args)?)?;
        Ok(())
    }

    #[cfg(unix)]
    fn console_uid(&self) -> Result<u32> {
        use std::os::unix::fs::MetadataExt;

        let metadata = std::fs::metadata(CONSOLE_DEVICE)
            .with_context(|| format!("Failed to stat {}", CONSOLE_DEVICE))?;
        Ok(metadata.uid())
    }

    #[cfg(not(unix))]
    fn console_uid(&self) -> Result<u32> {
        Err(anyhow!("{} is only available on unix hosts", CONSOLE_DEVICE))
    }

    fn launch_as(&self, uid: u32, app: &Path) -> Result<()> {
        let uid = uid.to_string();
        let output = run("launchctl", &["asuser", &uid, "open", "-a", path_arg(app)?])?;
        check("launchctl", output)?;
        Ok(())
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOREG_SAMPLE: &str = r#"
+-o IOHIDSystem  <class IOHIDSystem, id 0x100000483, registered, matched, active, busy 0 (0 ms), retain 26>
    {
      "HIDParameters" = {"HIDKeyboardModifierMappingPairs"=()}
      "HIDIdleTime" = 1234567890123
      "IOClass" = "IOHIDSystem"
    }
"#;

    #[test]
    fn test_parse_hid_idle_floors_to_seconds() {
        assert_eq!(parse_hid_idle_seconds(IOREG_SAMPLE), Some(1234));
    }

    #[test]
    fn test_parse_hid_idle_missing() {
        assert_eq!(parse_hid_idle_seconds("\"IOClass\" = \"IOHIDSystem\""), None);
        assert_eq!(parse_hid_idle_seconds("\"HIDIdleTime\" = garbage"), None);
    }

    #[test]
    fn test_parse_hid_idle_sub_second_is_zero() {
        assert_eq!(parse_hid_idle_seconds("\"HIDIdleTime\" = 999999999"), Some(0));
    }
}
