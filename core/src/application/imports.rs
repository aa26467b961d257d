// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lexical import extraction and relative path resolution.
//
// No syntax trees: a line-oriented scan picks up the module strings of
// `import ... from "M"`, `export ... from "M"`, `require("M")`,
// `import("M")` and the Python `import M` / `from M import ...` forms.
// Dynamic module expressions yield nothing. Non-relative specifiers are
// external libraries and never become edges.

use crate::domain::graph::Language;
use std::collections::{HashMap, HashSet};

/// Candidate suffixes probed, in order, when resolving a specifier that
/// names no file directly.
const FILE_SUFFIXES: [&str; 5] = [".ts", ".tsx", ".js", ".jsx", ".py"];
const INDEX_SUFFIXES: [&str; 4] = ["/index.ts", "/index.tsx", "/index.js", "/index.jsx"];

/// Module specifiers imported by `source`, in source order, duplicates
/// included. Python relative imports are rewritten to path form
/// (`.mod` -> `./mod`, `..pkg.mod` -> `../pkg/mod`) so resolution is
/// uniform across languages.
pub fn extract_imports(language: Language, source: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        match language {
            Language::Ts | Language::Js => {
                if trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
                {
                    continue;
                }
                scan_js_line(trimmed, &mut out);
            }
            Language::Py => {
                if trimmed.starts_with('#') {
                    continue;
                }
                scan_py_line(trimmed, &mut out);
            }
        }
    }
    out
}

fn scan_js_line(line: &str, out: &mut Vec<String>) {
    // `}` catches the closing line of a multi-line import block
    if line.starts_with("import") || line.starts_with("export") || line.starts_with('}') {
        if let Some(idx) = line.find(" from ") {
            if let Some(module) = quoted_at(&line[idx + " from ".len()..]) {
                out.push(module);
            }
        }
    }
    for needle in ["require(", "import("] {
        let mut rest = line;
        while let Some(idx) = rest.find(needle) {
            let after = &rest[idx + needle.len()..];
            // only a literal first argument yields an edge
            if let Some(module) = quoted_at(after) {
                out.push(module);
            }
            rest = after;
        }
    }
}

fn scan_py_line(line: &str, out: &mut Vec<String>) {
    if let Some(rest) = line.strip_prefix("from ") {
        if let Some(module) = rest.split_whitespace().next() {
            if !module.is_empty() {
                out.push(pythonic_to_path(module));
            }
        }
    } else if let Some(rest) = line.strip_prefix("import ") {
        let rest = rest.split('#').next().unwrap_or(rest);
        for part in rest.split(',') {
            if let Some(module) = part.split_whitespace().next() {
                if !module.is_empty() {
                    out.push(pythonic_to_path(module));
                }
            }
        }
    }
}

/// `"M"` or `'M'` at the start of `s` (leading whitespace allowed).
fn quoted_at(s: &str) -> Option<String> {
    let s = s.trim_start();
    let quote = s.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &s[1..];
    let end = rest.find(quote)?;
    let module = &rest[..end];
    if module.is_empty() {
        None
    } else {
        Some(module.to_string())
    }
}

/// `.foo.bar` -> `./foo/bar`, `..foo` -> `../foo`, `...x` -> `../../x`.
/// Absolute (non-dotted) Python modules pass through and stay unresolvable.
fn pythonic_to_path(module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return module.to_string();
    }
    let rest = module[dots..].replace('.', "/");
    let mut prefix = if dots == 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    prefix.push_str(&rest);
    // `from . import x` resolves against the package directory itself
    if rest.is_empty() {
        prefix.pop();
    }
    prefix
}

/// Per-build resolution cache keyed by `(importing file, specifier)`.
/// Bounded; cleared wholesale if it ever outgrows its cap.
pub struct ResolutionCache {
    entries: HashMap<(String, String), Option<String>>,
    cap: usize,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            cap: 16_384,
        }
    }

    pub fn resolve(
        &mut self,
        from_file: &str,
        module: &str,
        files: &HashSet<String>,
    ) -> Option<String> {
        let key = (from_file.to_string(), module.to_string());
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }
        let resolved = resolve_relative(from_file, module, files);
        if self.entries.len() >= self.cap {
            self.entries.clear();
        }
        self.entries.insert(key, resolved.clone());
        resolved
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a relative specifier against the tree file set.
///
/// Specifiers not starting with `.` or `/` are external. The normalized
/// target is probed as `X.ts, X.tsx, X.js, X.jsx, X.py`, then
/// `X/index.{ts,tsx,js,jsx}`; first hit wins.
pub fn resolve_relative(
    from_file: &str,
    module: &str,
    files: &HashSet<String>,
) -> Option<String> {
    if !module.starts_with('.') && !module.starts_with('/') {
        return None;
    }
    let base = if module.starts_with('/') {
        // rooted at the repository, not the importing file
        String::new()
    } else {
        match from_file.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        }
    };

    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in module.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    let target = segments.join("/");
    if target.is_empty() {
        return None;
    }

    for suffix in FILE_SUFFIXES.iter().chain(INDEX_SUFFIXES.iter()) {
        let candidate = format!("{target}{suffix}");
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}
