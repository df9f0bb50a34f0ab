//! Repository context and the one-shot prompt for guardrailed builds.

use std::path::Path;

use walkdir::WalkDir;

use super::BoilerplatePolicy;

/// Maximum characters of repository tree included in the prompt.
pub const TREE_LIMIT: usize = 3000;
/// Maximum characters of README included in the prompt.
pub const README_LIMIT: usize = 2000;

const TREE_DEPTH: usize = 4;
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", ".next", "__pycache__", ".venv"];

/// What the model is told about the project it is extending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    pub tree: String,
    pub readme: Option<String>,
}

impl RepoContext {
    /// Read the tree and README of `target_dir`. A missing directory yields the
    /// policy's allowed directories as the tree.
    pub fn read(target_dir: Option<&Path>, policy: &BoilerplatePolicy) -> Self {
        match target_dir {
            Some(dir) if dir.is_dir() => Self {
                tree: truncate(&list_tree(dir), TREE_LIMIT),
                readme: read_readme(dir),
            },
            _ => {
                tracing::debug!("Target directory missing, scaffolding from boilerplate layout");
                Self::scaffold(policy)
            }
        }
    }

    pub fn scaffold(policy: &BoilerplatePolicy) -> Self {
        Self {
            tree: policy.allowed_dirs.join("\n"),
            readme: None,
        }
    }
}

fn list_tree(root: &Path) -> String {
    let walker = WalkDir::new(root)
        .max_depth(TREE_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !SKIPPED_DIRS.iter().any(|skipped| name == *skipped)
        });

    let mut entries = Vec::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.depth() == 0 {
            continue;
        }
        let prefix = "  ".repeat(entry.depth() - 1);
        let suffix = if entry.file_type().is_dir() { "/" } else { "" };
        entries.push(format!("{}{}{}", prefix, entry.file_name().to_string_lossy(), suffix));
    }

    if entries.is_empty() {
        "(empty)".to_string()
    } else {
        entries.join("\n")
    }
}

fn read_readme(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join("README.md")).ok()?;
    Some(truncate(&content, README_LIMIT))
}

/// Cut `text` to at most `limit` characters, marking the cut.
fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}\n... (truncated)", &text[..byte_idx]),
        None => text.to_string(),
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("   - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt that asks for one feature inside `policy`'s boilerplate.
pub fn mega_prompt(policy: &BoilerplatePolicy, feature: &str, ctx: &RepoContext) -> String {
    let readme = ctx
        .readme
        .as_deref()
        .unwrap_or("Not provided. Infer conventions from the repo structure.");

    format!(
        r#"# ROLE
You are a senior full-stack engineer working INSIDE an existing boilerplate.
You do NOT generate new projects. You EXTEND an existing one.

# TECH STACK
{stack}

# REPO STRUCTURE
```
{tree}
```

# BOILERPLATE README (Key Conventions)
{readme}

# YOUR TASK
Implement the following new feature WITHOUT changing core framework/auth/config files:

{feature}

# STRICT RULES
1. REUSE existing patterns for routing, components, and DB access.
2. DO NOT modify these protected files:
{protected}
3. ONLY touch files in these directories:
{allowed}
4. Include ALL new/changed files with FULL code blocks.
5. Use the SAME coding style as the existing codebase.
6. Handle errors gracefully. Never silently fail.

# OUTPUT FORMAT
Respond with EXACTLY this structure:

## Files Created
- [list of new file paths]

## Files Modified
- [list of modified file paths]

## Code

### [path/to/file]
```[language]:[path/to/file]
[full file contents]
```

(Repeat for each file. Every file MUST be a `### path` heading followed by its code block.)

## Migration / Setup Checklist
- [ ] [Any DB migrations needed]
- [ ] [Any env vars to add]
- [ ] [How to test the new feature]
"#,
        stack = policy.stack.join(", "),
        tree = ctx.tree,
        readme = readme,
        feature = feature.trim(),
        protected = bullet_list(&policy.protected_files),
        allowed = bullet_list(&policy.allowed_dirs),
    )
}
