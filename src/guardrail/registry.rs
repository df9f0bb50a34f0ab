//! Pre-approved boilerplates.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::{BoilerplatePolicy, GuardrailError};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_policies() -> Vec<BoilerplatePolicy> {
    vec![
        BoilerplatePolicy {
            key: "next_saas".into(),
            name: "Next.js SaaS Starter".into(),
            repo: "https://github.com/kleneway/next-ai-starter".into(),
            description: "Full-stack SaaS boilerplate with auth, DB, and API layer pre-configured.".into(),
            stack: strings(&["Next.js 15", "TypeScript", "tRPC", "Prisma", "NextAuth", "Supabase", "Tailwind CSS"]),
            allowed_dirs: strings(&[
                "src/app/",
                "src/components/",
                "src/lib/",
                "src/hooks/",
                "src/utils/",
                "prisma/migrations/",
                "public/",
            ]),
            protected_files: strings(&[
                "next.config.js",
                "tsconfig.json",
                ".eslintrc.js",
                ".env",
                ".env.local",
                "src/lib/auth.ts",
                "src/lib/prisma.ts",
                "src/middleware.ts",
                "package.json",
                "tailwind.config.ts",
                "postcss.config.js",
            ]),
            protected_patterns: strings(&["*.config.*", ".env*", "LICENSE*", "docker-compose*"]),
        },
        BoilerplatePolicy {
            key: "fastapi_api".into(),
            name: "FastAPI REST API".into(),
            repo: "https://github.com/kodu-ai/starters".into(),
            description: "Production-ready REST API boilerplate with migrations and validation.".into(),
            stack: strings(&["Python 3.12", "FastAPI", "SQLAlchemy", "Alembic", "Pydantic"]),
            allowed_dirs: strings(&[
                "app/api/routes/",
                "app/models/",
                "app/schemas/",
                "app/services/",
                "app/utils/",
                "alembic/versions/",
                "tests/",
            ]),
            protected_files: strings(&[
                "app/core/config.py",
                "app/core/security.py",
                "app/db/session.py",
                "alembic.ini",
                "pyproject.toml",
                ".env",
            ]),
            protected_patterns: strings(&["*.ini", ".env*", "LICENSE*", "Dockerfile*"]),
        },
        BoilerplatePolicy {
            key: "vite_react".into(),
            name: "Vite React Starter".into(),
            repo: "https://github.com/kodu-ai/starters".into(),
            description: "Lightweight React SPA with modern tooling.".into(),
            stack: strings(&["React 19", "TypeScript", "Vite", "Tailwind CSS", "React Router"]),
            allowed_dirs: strings(&[
                "src/components/",
                "src/pages/",
                "src/hooks/",
                "src/utils/",
                "src/styles/",
                "src/assets/",
                "public/",
            ]),
            protected_files: strings(&[
                "vite.config.ts",
                "tsconfig.json",
                "index.html",
                "package.json",
                "tailwind.config.js",
                ".eslintrc.cjs",
            ]),
            protected_patterns: strings(&["*.config.*", ".env*", "LICENSE*"]),
        },
        BoilerplatePolicy {
            key: "node_api".into(),
            name: "Node.js REST API".into(),
            repo: "https://opensourceboilerplates.com".into(),
            description: "Secure Node.js API with validation, auth, and ORM.".into(),
            stack: strings(&["Node.js", "Express", "Prisma", "JWT Auth", "Zod"]),
            allowed_dirs: strings(&[
                "src/routes/",
                "src/controllers/",
                "src/services/",
                "src/models/",
                "src/middleware/",
                "src/utils/",
                "prisma/migrations/",
                "tests/",
            ]),
            protected_files: strings(&[
                "src/config/index.js",
                "src/middleware/auth.js",
                "src/lib/db.js",
                "package.json",
                ".env",
                "tsconfig.json",
            ]),
            protected_patterns: strings(&["*.config.*", ".env*", "LICENSE*"]),
        },
    ]
}

/// Keyword fallbacks, checked in order after an exact key miss.
const KEYWORDS: &[(&[&str], &str)] = &[
    (&["saas", "next"], "next_saas"),
    (&["fastapi", "python"], "fastapi_api"),
    (&["vite", "react", "spa"], "vite_react"),
    (&["node", "express", "api"], "node_api"),
];

/// Extra policies file: either a `{ "key": policy }` map or a list of policies with `key` set.
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyFile {
    Map(BTreeMap<String, BoilerplatePolicy>),
    List(Vec<BoilerplatePolicy>),
}

#[derive(Debug, Clone)]
pub struct BoilerplateRegistry {
    policies: Vec<BoilerplatePolicy>,
}

impl Default for BoilerplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BoilerplateRegistry {
    pub fn builtin() -> Self {
        Self {
            policies: builtin_policies(),
        }
    }

    /// Add or replace a policy by key.
    pub fn insert(&mut self, policy: BoilerplatePolicy) {
        match self.policies.iter_mut().find(|p| p.key == policy.key) {
            Some(existing) => *existing = policy,
            None => self.policies.push(policy),
        }
    }

    /// Built-ins plus the policies in a JSON file. File entries win on key clashes.
    pub fn with_file(path: &Path) -> Result<Self, GuardrailError> {
        let content = std::fs::read_to_string(path).map_err(|source| GuardrailError::PolicyFile {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: PolicyFile = serde_json::from_str(&content).map_err(|source| GuardrailError::PolicyParse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut registry = Self::builtin();
        let loaded = match parsed {
            PolicyFile::Map(map) => map
                .into_iter()
                .map(|(key, mut policy)| {
                    policy.key = key;
                    policy
                })
                .collect::<Vec<_>>(),
            PolicyFile::List(list) => list,
        };
        let count = loaded.len();
        for policy in loaded.into_iter().filter(|p| !p.key.trim().is_empty()) {
            registry.insert(policy);
        }
        tracing::info!("Loaded {} boilerplate(s) from {}", count, path.display());
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<&BoilerplatePolicy> {
        self.policies.iter().find(|p| p.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.policies.iter().map(|p| p.key.as_str())
    }

    /// Look up by exact key (case-insensitive), then by keyword.
    pub fn find(&self, query: &str) -> Option<&BoilerplatePolicy> {
        let lower = query.trim().to_lowercase();
        if let Some(policy) = self.policies.iter().find(|p| p.key.to_lowercase() == lower) {
            return Some(policy);
        }
        KEYWORDS
            .iter()
            .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
            .and_then(|(_, key)| self.get(key))
    }

    pub fn resolve(&self, query: &str) -> Result<&BoilerplatePolicy, GuardrailError> {
        self.find(query)
            .ok_or_else(|| GuardrailError::UnknownTemplate(query.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_keys() {
        let registry = BoilerplateRegistry::builtin();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, vec!["next_saas", "fastapi_api", "vite_react", "node_api"]);
    }

    #[test]
    fn test_find_by_key_and_keyword() {
        let registry = BoilerplateRegistry::builtin();
        assert_eq!(registry.find("vite_react").unwrap().name, "Vite React Starter");
        assert_eq!(registry.find("My SaaS dashboard").unwrap().key, "next_saas");
        assert_eq!(registry.find("python service").unwrap().key, "fastapi_api");
        assert_eq!(registry.find("react spa").unwrap().key, "vite_react");
        assert_eq!(registry.find("express").unwrap().key, "node_api");
        // "rapid" contains "api"
        assert_eq!(registry.find("rapid prototype").unwrap().key, "node_api");
        assert!(registry.find("rails").is_none());
        assert!(matches!(
            registry.resolve("rails"),
            Err(GuardrailError::UnknownTemplate(q)) if q == "rails"
        ));
    }

    #[test]
    fn test_file_map_overrides_and_extends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("boilerplates.json");
        std::fs::write(
            &path,
            r#"{
                "node_api": {"name": "Internal Node API", "allowedDirs": ["lib/"]},
                "go_api": {"name": "Go API", "stack": ["Go"], "protectedFiles": ["go.mod"]}
            }"#,
        )
        .unwrap();

        let registry = BoilerplateRegistry::with_file(&path).unwrap();
        assert_eq!(registry.get("node_api").unwrap().name, "Internal Node API");
        assert_eq!(registry.get("node_api").unwrap().allowed_dirs, vec!["lib/"]);
        assert!(registry.get("go_api").unwrap().is_protected("go.mod"));
        assert_eq!(registry.keys().count(), 5);
    }

    #[test]
    fn test_file_list_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("boilerplates.json");
        std::fs::write(&path, r#"[{"key": "astro", "name": "Astro Site"}]"#).unwrap();

        let registry = BoilerplateRegistry::with_file(&path).unwrap();
        assert_eq!(registry.find("astro").unwrap().name, "Astro Site");
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            BoilerplateRegistry::with_file(&missing),
            Err(GuardrailError::PolicyFile { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            BoilerplateRegistry::with_file(&broken),
            Err(GuardrailError::PolicyParse { .. })
        ));
    }
}
