// src/report.rs

//! Module result documents
//!
//! Every check ends by printing one JSON object: `{"changed": false}` when
//! it passed, or `{"changed": false, "failed": true, "msg": "..."}` when it
//! did not.

use crate::error::Error;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleResult {
    pub changed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ModuleResult {
    /// A passing check; nothing on the host was changed
    pub fn ok() -> Self {
        Self {
            changed: false,
            failed: None,
            msg: None,
        }
    }

    /// A passing operation that did change something (`makecache`)
    pub fn changed(changed: bool) -> Self {
        Self {
            changed,
            ..Self::ok()
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            changed: false,
            failed: Some(true),
            msg: Some(msg.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failed == Some(true)
    }

    /// Process exit status mirroring `failed`
    pub fn exit_code(&self) -> u8 {
        if self.is_failure() { 1 } else { 0 }
    }
}

impl From<&Error> for ModuleResult {
    fn from(err: &Error) -> Self {
        Self::fail(err.to_string())
    }
}

impl<T> From<crate::Result<T>> for ModuleResult {
    fn from(result: crate::Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::from(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_document() {
        let json = serde_json::to_string(&ModuleResult::ok()).unwrap();
        assert_eq!(json, r#"{"changed":false}"#);
        assert_eq!(ModuleResult::ok().exit_code(), 0);
    }

    #[test]
    fn test_failure_document() {
        let result = ModuleResult::from(&Error::PackagesUnavailable(vec!["foo".to_string()]));
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["changed"], serde_json::json!(false));
        assert_eq!(value["failed"], serde_json::json!(true));
        assert!(value["msg"].as_str().unwrap().contains("\n  foo\n"));
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_from_result() {
        let passed: crate::Result<()> = Ok(());
        assert_eq!(ModuleResult::from(passed), ModuleResult::ok());

        let failed: crate::Result<()> = Err(Error::ResolutionCrashed("boom".to_string()));
        let result = ModuleResult::from(failed);
        assert_eq!(result.msg.as_deref(), Some("Unexpected error during dependency resolution: boom"));
    }
}
