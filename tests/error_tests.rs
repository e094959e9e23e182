//! Tests for the error system.

use helm::error::*;

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: HelmError,
        expected_category: ErrorCategory,
        expected_fatal: bool,
        expected_retryable: bool,
    }

    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();
    let toml_error = toml::from_str::<toml::Table>("= nope").unwrap_err();

    let cases = vec![
        Case {
            error: HelmError::Stream("reset".to_string()),
            expected_category: ErrorCategory::Generation,
            expected_fatal: true,
            expected_retryable: false,
        },
        Case {
            error: HelmError::RateLimited {
                retry_after_ms: Some(1000),
            },
            expected_category: ErrorCategory::Generation,
            expected_fatal: true,
            expected_retryable: true,
        },
        Case {
            error: HelmError::Aborted,
            expected_category: ErrorCategory::Cancellation,
            expected_fatal: true,
            expected_retryable: false,
        },
        Case {
            error: HelmError::InvalidArgument("bad".to_string()),
            expected_category: ErrorCategory::Tool,
            expected_fatal: false,
            expected_retryable: false,
        },
        Case {
            error: HelmError::InvalidState("no messages".to_string()),
            expected_category: ErrorCategory::Misuse,
            expected_fatal: false,
            expected_retryable: false,
        },
        Case {
            error: HelmError::Configuration("bad model".to_string()),
            expected_category: ErrorCategory::Configuration,
            expected_fatal: false,
            expected_retryable: false,
        },
        Case {
            error: HelmError::Io(io_error),
            expected_category: ErrorCategory::Configuration,
            expected_fatal: false,
            expected_retryable: false,
        },
        Case {
            error: HelmError::TomlParse(toml_error),
            expected_category: ErrorCategory::Configuration,
            expected_fatal: false,
            expected_retryable: false,
        },
        Case {
            error: HelmError::Serialization(serde_error),
            expected_category: ErrorCategory::Serialization,
            expected_fatal: false,
            expected_retryable: false,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.expected_category, "{}", case.error);
        assert_eq!(case.error.is_fatal(), case.expected_fatal, "{}", case.error);
        assert_eq!(
            case.error.is_retryable(),
            case.expected_retryable,
            "{}",
            case.error
        );
    }
}

#[test]
fn display_strings_are_stable() {
    assert_eq!(HelmError::Aborted.to_string(), "Request was aborted");
    assert_eq!(
        HelmError::ToolNotFound("grep".to_string()).to_string(),
        "Tool not found: grep"
    );
    assert!(HelmError::Busy.to_string().contains("steer()"));
    assert_eq!(
        HelmError::tool("bash", "exit 1").to_string(),
        "Tool execution error: bash: exit 1"
    );
}

#[test]
fn question_mark_converts_foreign_errors() {
    fn parse(raw: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }
    assert!(matches!(parse("{"), Err(HelmError::Serialization(_))));
    assert!(parse("{}").is_ok());
}
