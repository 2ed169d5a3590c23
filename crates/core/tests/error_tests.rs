// ═══════════════════════════════════════════════════════════════════
// Error Tests: CoreError variants, Display formatting, helpers
// ═══════════════════════════════════════════════════════════════════

use pocket_ledger_core::errors::{redact_query, CoreError};

// ── Display formatting ──────────────────────────────────────────────

mod display {
    use super::*;

    #[test]
    fn missing_fields_lists_every_field() {
        let err = CoreError::missing_fields(&["amount", "memo"]);
        assert_eq!(
            err.to_string(),
            "Validation failed: missing required field(s): amount, memo"
        );
    }

    #[test]
    fn invalid_field() {
        let err = CoreError::invalid_field("amount", "amount 'abc' is not a number");
        assert_eq!(
            err.to_string(),
            "Validation failed: amount 'abc' is not a number"
        );
    }

    #[test]
    fn not_found() {
        let err = CoreError::NotFound("bob".into());
        assert_eq!(err.to_string(), "No account registered under the name 'bob'");
    }

    #[test]
    fn duplicate_display_name() {
        let err = CoreError::DuplicateDisplayName("alice".into());
        assert_eq!(err.to_string(), "The name 'alice' is already taken");
    }

    #[test]
    fn identity_errors() {
        assert_eq!(
            CoreError::InvalidCredential.to_string(),
            "Invalid email or password"
        );
        assert_eq!(
            CoreError::DuplicateEmail.to_string(),
            "An account with this email already exists"
        );
        assert_eq!(
            CoreError::WeakCredential("too short".into()).to_string(),
            "Password is too weak: too short"
        );
    }

    #[test]
    fn store_unavailable() {
        let err = CoreError::StoreUnavailable("connection refused".into());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }

    #[test]
    fn unauthorized() {
        assert_eq!(
            CoreError::Unauthorized.to_string(),
            "Session missing or expired"
        );
    }

    #[test]
    fn transaction_not_found() {
        let err = CoreError::TransactionNotFound("abc123".into());
        assert_eq!(err.to_string(), "Transaction not found: abc123");
    }

    #[test]
    fn invalid_config() {
        let err = CoreError::InvalidConfig("api_key is required".into());
        assert_eq!(err.to_string(), "Invalid configuration: api_key is required");
    }

    #[test]
    fn balance_overflow() {
        let err = CoreError::BalanceOverflow;
        assert_eq!(err.to_string(), "Ledger totals exceed the supported range");
        assert!(!err.requires_login());
        assert!(err.user_message().contains("Delete the oversized entry"));
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

mod helpers {
    use super::*;

    #[test]
    fn missing_fields_keeps_field_names() {
        match CoreError::missing_fields(&["amount", "occurred_on", "memo"]) {
            CoreError::ValidationError { fields, .. } => {
                assert_eq!(fields, vec!["amount", "occurred_on", "memo"]);
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn only_unauthorized_requires_login() {
        assert!(CoreError::Unauthorized.requires_login());
        assert!(!CoreError::InvalidCredential.requires_login());
        assert!(!CoreError::StoreUnavailable("x".into()).requires_login());
        assert!(!CoreError::NotFound("x".into()).requires_login());
    }

    #[test]
    fn user_messages() {
        assert_eq!(CoreError::NotFound("x".into()).user_message(), "User not found.");
        assert_eq!(
            CoreError::WeakCredential("needs 6 characters".into()).user_message(),
            "Password is too weak: needs 6 characters"
        );
        assert_eq!(
            CoreError::Unauthorized.user_message(),
            "Your session has expired. Please log in again."
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let msg = CoreError::Deserialization("Malformed document 'abc'".into()).user_message();
        assert!(!msg.contains("abc"));
    }
}

// ── Redaction ───────────────────────────────────────────────────────

mod redaction {
    use super::*;

    #[test]
    fn strips_query_string() {
        let msg = "error sending request for url (https://example.test/v1/accounts:signUp?key=SECRET)";
        let redacted = redact_query(msg);
        assert!(!redacted.contains("SECRET"));
        assert!(redacted.starts_with("error sending request for url (https://example.test/v1/accounts:signUp"));
        assert!(redacted.ends_with("?<query redacted>"));
    }

    #[test]
    fn leaves_plain_messages_alone() {
        assert_eq!(redact_query("connection reset"), "connection reset");
    }
}

// ── From impls ──────────────────────────────────────────────────────

mod conversions {
    use super::*;

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }
}
