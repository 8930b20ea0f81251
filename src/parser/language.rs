//! Programming language detection from file paths

use std::path::Path;

/// Detect a parseable programming language from a path's extension
pub fn detect_language(path: &str) -> Option<&'static str> {
    let extension = Path::new(path).extension()?.to_str()?;
    let lang = match extension.to_lowercase().as_str() {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "swift" => "Swift",
        "c" | "h" => "C",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        _ => return None,
    };
    Some(lang)
}
