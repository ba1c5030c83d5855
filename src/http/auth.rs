// src/http/auth.rs
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const REALM: &str = "camwatch";

pub fn challenge() -> String {
    format!("Basic realm=\"{}\"", REALM)
}

/// Checks an `Authorization` header value against the configured pair.
pub fn basic_auth_ok(header: Option<&str>, user: &str, password: &str) -> bool {
    let Some(encoded) = header.and_then(|h| h.trim().strip_prefix("Basic ")) else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    match pair.split_once(':') {
        Some((u, p)) => u == user && p == password,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(pair: &str) -> String {
        format!("Basic {}", STANDARD.encode(pair))
    }

    #[test]
    fn accepts_matching_credentials() {
        assert!(basic_auth_ok(Some(&header("admin:s3cret")), "admin", "s3cret"));
        // Passwort darf Doppelpunkte enthalten
        assert!(basic_auth_ok(Some(&header("admin:a:b")), "admin", "a:b"));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(!basic_auth_ok(None, "admin", "x"));
        assert!(!basic_auth_ok(Some(&header("admin:wrong")), "admin", "x"));
        assert!(!basic_auth_ok(Some("Bearer abc"), "admin", "x"));
        assert!(!basic_auth_ok(Some("Basic %%%"), "admin", "x"));
        assert!(!basic_auth_ok(Some(&header("nocolon")), "admin", "x"));
    }

    #[test]
    fn challenge_names_realm() {
        assert_eq!(challenge(), "Basic realm=\"camwatch\"");
    }
}
