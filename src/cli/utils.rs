// Start of file: /src/cli/utils.rs

// * Name conversions and project lookups shared by the CLI commands.

use std::path::Path;

use tracing::debug;

/// `MyProject`, `my-project` and `my project` all become `my_project`.
pub fn to_snake(name: &str) -> String {
    let mut out: String = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit: bool = false;

    for ch in name.trim().chars() {
        if ch == '-' || ch == ' ' || ch == '_' || ch == '.' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower_or_digit = false;
        } else if ch.is_uppercase() {
            if prev_lower_or_digit && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }

    out.trim_end_matches('_').to_string()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `user_profile` -> `UserProfile`
pub fn snake_to_pascal(snake: &str) -> String {
    snake.split('_').map(capitalize).collect()
}

/// `user_profile` -> `userProfile`
pub fn snake_to_camel(snake: &str) -> String {
    let mut parts = snake.split('_');
    let head: String = parts.next().unwrap_or_default().to_lowercase();
    head + &parts.map(capitalize).collect::<String>()
}

/// Valid Rust identifier made of lowercase letters, digits and underscores.
pub fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    name != "_" && chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

/// Crate name from `<dir>/Cargo.toml`, as a module-safe identifier.
pub fn get_project_name(dir: &Path) -> Option<String> {
    let manifest: String = std::fs::read_to_string(dir.join("Cargo.toml")).ok()?;
    let value: toml::Value = match manifest.parse::<toml::Value>() {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "Cargo.toml is not valid TOML");
            return None;
        }
    };

    let name: &str = value.get("package")?.get("name")?.as_str()?;
    Some(name.to_lowercase().replace('-', "_"))
}


// End of file: /src/cli/utils.rs
