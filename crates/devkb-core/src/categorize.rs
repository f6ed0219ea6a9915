//! Rule-based categorization and parsing of LLM categorization replies.
//!
//! The application asks an LLM for a JSON object built from
//! [`categorize_prompt`]; the reply goes through [`parse_llm_categorization`].
//! When no LLM is configured or its reply is unusable, callers fall back to
//! [`categorize_fallback`].

use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The fixed category vocabulary.
pub const CATEGORIES: &[&str] = &[
    "documentation",
    "configuration",
    "api",
    "database",
    "testing",
    "deployment",
    "authentication",
    "utilities",
    "models",
    "views",
    "controllers",
    "services",
    "middleware",
    "other",
];

/// Content characters sent to the LLM.
pub const PROMPT_CONTENT_CHARS: usize = 2000;

/// System prompt for categorization requests.
pub const CATEGORIZE_SYSTEM_PROMPT: &str =
    "You are a code documentation analyzer. Return only valid JSON.";

/// Result of categorizing a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub language: Option<String>,
}

pub fn is_known_category(category: &str) -> bool {
    CATEGORIES.contains(&category)
}

/// Build the user prompt for an LLM categorization request.
pub fn categorize_prompt(content: &str) -> String {
    let truncated: String = content.chars().take(PROMPT_CONTENT_CHARS).collect();
    format!(
        "Analyze the following code or documentation content and provide:\n\
         1. A category (one of: {})\n\
         2. Relevant tags (array of strings)\n\
         3. A brief summary (1-2 sentences)\n\
         \n\
         Content:\n```\n{}\n```\n\
         \n\
         Provide your response in JSON format:\n\
         {{\n    \"category\": \"category_name\",\n    \"tags\": [\"tag1\", \"tag2\", \"tag3\"],\n    \
         \"summary\": \"Brief summary of the content\",\n    \"language\": \"programming_language_if_code\"\n}}",
        CATEGORIES.join(", "),
        truncated
    )
}

#[derive(Deserialize)]
struct LlmReply {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    language: Option<String>,
}

/// Parse the first `{ ... }` span of an LLM reply.
///
/// Categories outside [`CATEGORIES`] become `other`; blank tags are dropped.
pub fn parse_llm_categorization(reply: &str) -> Result<Categorization> {
    let start = reply.find('{').context("no JSON object in LLM reply")?;
    let end = reply.rfind('}').context("no JSON object in LLM reply")?;
    if end < start {
        anyhow::bail!("no JSON object in LLM reply");
    }
    let parsed: LlmReply =
        serde_json::from_str(&reply[start..=end]).context("invalid JSON in LLM reply")?;

    let category = parsed
        .category
        .map(|c| c.trim().to_lowercase())
        .filter(|c| is_known_category(c))
        .unwrap_or_else(|| "other".to_string());
    let tags = parsed
        .tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let language = parsed
        .language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty() && l != "none" && l != "null");

    Ok(Categorization {
        category,
        tags,
        summary: parsed.summary.trim().to_string(),
        language,
    })
}

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("testing", &["test", "pytest", "unittest", "spec"]),
    ("configuration", &["config", "settings", ".env", "yaml", "toml"]),
    ("utilities", &["def ", "class ", "function", "async"]),
    ("api", &["api", "endpoint", "route", "request", "response"]),
    ("database", &["database", "sql", "query", "model", "schema"]),
    ("deployment", &["deploy", "docker", "kubernetes", "ci/cd"]),
    ("authentication", &["auth", "login", "token", "jwt", "oauth"]),
    ("documentation", &["readme", "doc", "guide", "documentation"]),
];

/// Keyword-driven categorization used when no LLM answer is available.
pub fn categorize_fallback(content: &str) -> Categorization {
    let lower = content.to_lowercase();
    let language = detect_language(content);

    let category = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, kws)| kws.iter().any(|kw| lower.contains(kw)))
        .map(|(cat, _)| *cat)
        .unwrap_or("other");

    let mut tags = Vec::new();
    if let Some(lang) = &language {
        tags.push(lang.clone());
    }
    if category != "other" {
        tags.push(category.to_string());
    }

    let summary = content
        .lines()
        .map(str::trim)
        .find(|l| {
            !l.is_empty() && !l.starts_with('#') && !l.starts_with("//") && !l.starts_with("<!--")
        })
        .map(|l| l.chars().take(100).collect())
        .unwrap_or_default();

    Categorization {
        category: category.to_string(),
        tags,
        summary,
        language,
    }
}

fn language_patterns() -> &'static [(&'static str, Vec<Regex>)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: &[(&str, &[&str])] = &[
            ("python", &[r"def ", r"import ", r"from .* import", r"class .*:", r"if __name__"]),
            ("javascript", &[r"const ", r"let ", r"function ", r"=>", r"require\("]),
            ("typescript", &[r": string", r": number", r"interface ", r"type .*=", r"<T>"]),
            ("java", &[r"public class", r"private ", r"void ", r"import java"]),
            ("go", &[r"func ", r"package ", r"import ", r":="]),
            ("rust", &[r"fn ", r"let mut", r"impl ", r"use "]),
            ("sql", &[r"SELECT ", r"FROM ", r"WHERE ", r"INSERT INTO", r"CREATE TABLE"]),
            ("yaml", &[r"^---", r"^\w+:\s*$", r"^\s+-\s+\w"]),
            ("json", &[r"^\s*\{", r"^\s*\[", r#""[^"]+"\s*:"#]),
            ("shell", &[r"#!/bin/bash", r"#!/bin/sh", r"echo ", r"\$\("]),
            ("html", &[r"<html", r"<div", r"<span", r"<!DOCTYPE"]),
            ("css", &[r"\{[^}]*:[^}]*;", r"@media", r"\.[a-z-]+\s*\{"]),
        ];
        table
            .iter()
            .map(|(lang, pats)| {
                let compiled = pats
                    .iter()
                    .map(|p| Regex::new(&format!("(?i){}", p)).expect("static language pattern"))
                    .collect();
                (*lang, compiled)
            })
            .collect()
    })
}

/// First language with at least two pattern hits, checked in a fixed order.
pub fn detect_language(content: &str) -> Option<String> {
    language_patterns()
        .iter()
        .find(|(_, pats)| pats.iter().filter(|re| re.is_match(content)).count() >= 2)
        .map(|(lang, _)| lang.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        let py = "import os\n\ndef main():\n    pass\n";
        assert_eq!(detect_language(py).as_deref(), Some("python"));
        let rs = "use std::io;\nfn main() { let mut x = 1; }";
        assert_eq!(detect_language(rs).as_deref(), Some("rust"));
        let sql = "select id from users where id = 1";
        assert_eq!(detect_language(sql).as_deref(), Some("sql"));
        assert_eq!(detect_language("just some prose"), None);
    }

    #[test]
    fn test_fallback_categories() {
        let c = categorize_fallback("def test_login():\n    assert True");
        assert_eq!(c.category, "testing");
        let c = categorize_fallback("Deploy with docker compose up");
        assert_eq!(c.category, "deployment");
        let c = categorize_fallback("zzz");
        assert_eq!(c.category, "other");
        assert!(c.tags.is_empty());
    }

    #[test]
    fn test_fallback_tags_and_summary() {
        let c = categorize_fallback("# comment\n// another\n\nimport os\ndef run():\n    pass\n");
        assert_eq!(c.language.as_deref(), Some("python"));
        assert_eq!(c.tags, vec!["python".to_string(), "utilities".to_string()]);
        assert_eq!(c.summary, "import os");
    }

    #[test]
    fn test_summary_truncated() {
        let c = categorize_fallback(&"a".repeat(300));
        assert_eq!(c.summary.len(), 100);
    }

    #[test]
    fn test_parse_llm_reply_with_prose() {
        let reply = "Sure! Here it is:\n{\"category\": \"API\", \"tags\": [\"rest\", \" \"], \"summary\": \" Routes. \", \"language\": \"Python\"}\nThanks";
        let c = parse_llm_categorization(reply).unwrap();
        assert_eq!(c.category, "api");
        assert_eq!(c.tags, vec!["rest".to_string()]);
        assert_eq!(c.summary, "Routes.");
        assert_eq!(c.language.as_deref(), Some("python"));
    }

    #[test]
    fn test_parse_llm_unknown_category_is_other() {
        let c = parse_llm_categorization("{\"category\": \"frobnication\"}").unwrap();
        assert_eq!(c.category, "other");
        assert!(c.tags.is_empty());
        assert_eq!(c.language, None);
    }

    #[test]
    fn test_parse_llm_rejects_garbage() {
        assert!(parse_llm_categorization("no json here").is_err());
        assert!(parse_llm_categorization("} {").is_err());
        assert!(parse_llm_categorization("{not json}").is_err());
    }

    #[test]
    fn test_prompt_truncates_content() {
        let prompt = categorize_prompt(&"x".repeat(5000));
        assert!(prompt.contains(&"x".repeat(PROMPT_CONTENT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(PROMPT_CONTENT_CHARS + 1)));
        assert!(prompt.contains("middleware"));
    }
}
