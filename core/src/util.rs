// kubeforge/src/util.rs

//! Small helpers shared by the task engine and the connection layer.

use std::borrow::Cow;
use std::time::Duration;

/// Formats a duration the short way (`2s`, `5m`, `2h`, `1h30m`, `1m5s`).
/// Zero-valued trailing units are dropped; sub-second durations print as milliseconds.
pub fn short_dur(d: Duration) -> String {
  let total = d.as_secs();
  if total == 0 {
    return format!("{}ms", d.as_millis());
  }
  let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
  let mut out = String::new();
  if h > 0 {
    out.push_str(&format!("{}h", h));
  }
  if m > 0 || (h > 0 && s > 0) {
    out.push_str(&format!("{}m", m));
  }
  if s > 0 {
    out.push_str(&format!("{}s", s));
  }
  out
}

/// Number of workers a task may run at once for `hosts` targets.
///
/// `round(fraction * hosts)` clamped into `1..=hosts` (at least 1 even for zero hosts).
/// Fractions outside `(0, 1]` are treated as `1`.
pub fn concurrency_limit(fraction: f64, hosts: usize) -> usize {
  let fraction = if fraction.is_nan() || fraction <= 0.0 || fraction > 1.0 {
    1.0
  } else {
    fraction
  };
  let limit = (fraction * hosts as f64).round() as usize;
  limit.clamp(1, hosts.max(1))
}

/// Quotes `s` for a POSIX shell, falling back to single quotes when `shlex` refuses (NUL bytes).
pub fn shell_quote(s: &str) -> Cow<'_, str> {
  match shlex::try_quote(s) {
    Ok(quoted) => quoted,
    Err(_) => Cow::Owned(format!("'{}'", s.replace('\0', "").replace('\'', r"'\''"))),
  }
}

/// Wraps a command so that it runs through bash with privilege escalation.
pub fn sudo_prefix(cmd: &str) -> String {
  format!("sudo -E /bin/bash -c {}", shell_quote(cmd))
}

/// Parent directory of a remote (always `/`-separated) path.
pub(crate) fn remote_parent(path: &str) -> &str {
  match path.trim_end_matches('/').rfind('/') {
    Some(0) => "/",
    Some(idx) => &path[..idx],
    None => ".",
  }
}

/// Joins two remote path fragments with a single `/`.
pub(crate) fn remote_join(base: &str, name: &str) -> String {
  if base.ends_with('/') {
    format!("{}{}", base, name.trim_start_matches('/'))
  } else {
    format!("{}/{}", base, name.trim_start_matches('/'))
  }
}
