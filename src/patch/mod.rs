//! Proxy configuration patching
//!
//! Inserts an `X-Upstream-Target` header directive after every
//! `proxy_pass` directive in nginx-style configuration files, so the proxy
//! labels its responses with the upstream each location forwards to. The
//! transformation is idempotent: directives that are already in place are
//! left alone, and running the patcher twice changes nothing.

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header inserted after each forwarding directive.
const HEADER_NAME: &str = "X-Upstream-Target";
/// How many lines after a `proxy_pass` are scanned for an existing directive.
const LOOKAHEAD_LINES: usize = 4;

/// Extracts the upstream target from a `proxy_pass` directive line.
///
/// The scheme prefix and any trailing slash are stripped, so
/// `proxy_pass http://backend:5001/;` yields `backend:5001`. Commented lines
/// and directives without an inline `http(s)://` URL yield `None`.
fn extract_proxy_target(line: &str) -> Option<String> {
    if line.trim_start().starts_with('#') {
        return None;
    }
    let after = &line[line.find("proxy_pass")? + "proxy_pass".len()..];
    let url = after.trim_start();
    let bare = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let end = bare.find(';')?;
    let target = bare[..end].trim().trim_end_matches('/');
    if target.is_empty() {
        return None;
    }
    Some(target.to_string())
}

/// Whether an equivalent directive already exists in the lines right after
/// the `proxy_pass` at `index`. The scan stops early at a closing brace or
/// the next `proxy_` directive.
fn has_existing_directive(lines: &[&str], index: usize) -> bool {
    for line in lines.iter().skip(index + 1).take(LOOKAHEAD_LINES) {
        if line.contains(HEADER_NAME) {
            return true;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with('}') || trimmed.starts_with("proxy_") {
            break;
        }
    }
    false
}

/// Pure transformation: returns the patched text and the number of
/// directives inserted.
pub fn patch_content(content: &str) -> (String, usize) {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut patched = String::with_capacity(content.len());
    let mut changes = 0;

    for (index, line) in lines.iter().enumerate() {
        patched.push_str(line);
        let Some(target) = extract_proxy_target(line) else {
            continue;
        };
        if has_existing_directive(&lines, index) {
            debug!(line = index + 1, target, "Directive already present, skipping");
            continue;
        }
        if !line.ends_with('\n') {
            patched.push('\n');
        }
        let indent: String = line
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        patched.push_str(&format!(
            "{indent}proxy_set_header {HEADER_NAME} \"{target}\";\n"
        ));
        changes += 1;
    }

    (patched, changes)
}

/// Rewrites one configuration file in place, returning the number of
/// directives inserted. With `dry_run` the file is left untouched.
pub fn patch_file(path: &Path, dry_run: bool) -> Result<usize> {
    let content = fs::read_to_string(path)?;
    let (patched, changes) = patch_content(&content);
    if changes == 0 {
        debug!(path = %path.display(), "No changes needed");
        return Ok(0);
    }
    if !dry_run {
        fs::write(path, patched)?;
    }
    info!(path = %path.display(), changes, dry_run, "Inserted upstream target directives");
    Ok(changes)
}

/// Recursively patches every `*.conf` file under `dir`, returning the total
/// number of directives inserted.
pub fn patch_tree(dir: &Path, dry_run: bool) -> Result<usize> {
    let mut files = Vec::new();
    collect_conf_files(dir, &mut files)?;
    debug!(dir = %dir.display(), files = files.len(), "Scanning configuration files");
    let mut total = 0;
    for file in files {
        total += patch_file(&file, dry_run)?;
    }
    Ok(total)
}

fn collect_conf_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|entry| entry.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_conf_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "conf") {
            files.push(path);
        }
    }
    Ok(())
}
