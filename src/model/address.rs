//! Email address parsing (RFC 5322 §3.4), tolerant of real-world variants.

/// A parsed email address.
///
/// # Examples
/// - `"Jane Doe <jane@example.com>"` → `display_name = "Jane Doe"`, `email = "jane@example.com"`
/// - `"jane@example.com (Jane Doe)"` → same as above
/// - `"user@example.com"` → `display_name = ""`, `email = "user@example.com"`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
pub struct Address {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub email: String,
}

impl Address {
    /// Build an address from its parts, cleaning up the display name.
    pub fn new(display_name: &str, email: &str) -> Self {
        let email = email.trim().to_string();
        let mut display_name = clean_name(display_name);
        // "jane@example.com <jane@example.com>" carries no extra information
        if display_name.eq_ignore_ascii_case(&email) {
            display_name.clear();
        }
        Self {
            display_name,
            email,
        }
    }

    /// Parse a single address from a header value.
    ///
    /// Supported formats:
    /// - `"user@domain.com"`
    /// - `"<user@domain.com>"`
    /// - `"Display Name <user@domain.com>"`
    /// - `"\"Display, Name\" <user@domain.com>"`
    /// - `"user@domain.com (Display Name)"`
    ///
    /// Anything else is kept as-is in `email`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::new("", "");
        }

        if let Some(angle_start) = trimmed.rfind('<') {
            if let Some(angle_end) = trimmed.rfind('>') {
                if angle_end > angle_start {
                    return Self::new(
                        &trimmed[..angle_start],
                        &trimmed[angle_start + 1..angle_end],
                    );
                }
            }
        }

        // Old-style "user@domain (Name)"
        if let (Some(open), true) = (trimmed.find('('), trimmed.ends_with(')')) {
            let email = trimmed[..open].trim();
            if email.contains('@') && !email.contains(char::is_whitespace) {
                return Self::new(&trimmed[open + 1..trimmed.len() - 1], email);
            }
        }

        Self::new("", trimmed)
    }

    /// Parse a comma-separated list of addresses.
    ///
    /// Handles quoted commas: `"Last, First" <a@b.com>, other@c.com`
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;
        let mut escaped = false;

        for ch in raw.chars() {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' if in_quotes => {
                    escaped = true;
                    current.push(ch);
                }
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                ',' | ';' if !in_quotes && !in_angle => {
                    push_parsed(&mut results, &current);
                    current.clear();
                }
                _ => current.push(ch),
            }
        }
        push_parsed(&mut results, &current);

        results
    }

    /// RFC-compatible rendering: `Name <email>`, quoting the name when it
    /// contains `"`, `,` or `@`; just `email` when there is no name.
    pub fn full_address(&self) -> String {
        if self.display_name.is_empty() {
            return self.email.clone();
        }
        if self.display_name.contains(['"', ',', '@']) {
            let escaped = self.display_name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\" <{}>", self.email)
        } else {
            format!("{} <{}>", self.display_name, self.email)
        }
    }

    /// First name for compact listings.
    ///
    /// `"Doe, Jane"` → `"Jane"`, `"Jane Doe"` → `"Jane"`, no name → the email.
    pub fn short_name(&self) -> &str {
        if self.display_name.is_empty() {
            return &self.email;
        }
        if let Some((_, first)) = self.display_name.split_once(", ") {
            if let Some(word) = first.split_whitespace().next() {
                return word;
            }
        }
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }

    /// The display name, or the email when there is none.
    pub fn medium_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }

    /// `Name <email>` without any quoting, for display only.
    pub fn long_name(&self) -> String {
        if self.display_name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.display_name, self.email)
        }
    }
}

fn push_parsed(results: &mut Vec<Address>, segment: &str) {
    let addr = Address::parse(segment);
    if !addr.email.is_empty() {
        results.push(addr);
    }
}

/// Strip surrounding double-quotes, unescape `\"`, collapse whitespace.
fn clean_name(s: &str) -> String {
    let trimmed = s.trim();
    let inner = if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    inner
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_address())
    }
}
