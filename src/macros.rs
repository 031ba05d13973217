//! Shared macros.

/// Generate a `fmt::Debug` implementation that redacts sensitive fields.
///
/// Field kinds, specified as a keyword before the field name:
///
/// - `show field_name` - prints the field value normally
/// - `redact field_name` - prints `"[REDACTED]"` instead of the value
/// - `redact_option field_name` - prints `Some("[REDACTED]")` or `None`
///
/// Used for everything that carries password hashes, salts, or opaque
/// token material, so secrets never end up in log output.
macro_rules! redacted_debug {
    ($name:ident { $( $kind:ident $field:ident ),* $(,)? }) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut s = f.debug_struct(stringify!($name));
                $( redacted_debug!(@add_field s, self, $kind, $field); )*
                s.finish_non_exhaustive()
            }
        }
    };
    (@add_field $s:ident, $self:ident, show, $field:ident) => {
        $s.field(stringify!($field), &$self.$field);
    };
    (@add_field $s:ident, $self:ident, redact, $field:ident) => {
        $s.field(stringify!($field), &"[REDACTED]");
    };
    (@add_field $s:ident, $self:ident, redact_option, $field:ident) => {
        $s.field(stringify!($field), &$self.$field.as_ref().map(|_| "[REDACTED]"));
    };
}

#[cfg(test)]
mod tests {
    #[allow(dead_code)]
    struct Credential {
        pub email: String,
        pub salt: String,
        pub password_hash: Option<String>,
    }

    redacted_debug!(Credential {
        show email,
        redact salt,
        redact_option password_hash,
    });

    #[test]
    fn test_redacted_debug_hides_secrets() {
        let c = Credential {
            email: "user@example.com".to_string(),
            salt: "3f9a2c".to_string(),
            password_hash: Some("$2b$12$hash".to_string()),
        };
        let output = format!("{:?}", c);
        assert!(output.contains("user@example.com"));
        assert!(!output.contains("3f9a2c"), "salt must not leak");
        assert!(!output.contains("$2b$12$hash"), "hash must not leak");
        assert!(output.contains("[REDACTED]"));
    }

    #[test]
    fn test_redacted_debug_option_none() {
        let c = Credential {
            email: "sso@example.com".to_string(),
            salt: "abc".to_string(),
            password_hash: None,
        };
        let output = format!("{:?}", c);
        assert!(output.contains("None"));
        assert!(!output.contains("abc"));
    }
}
