// src/checks/image.rs

//! Container image existence check
//!
//! The component name is turned into `<namespace>/<component>` and handed to
//! an [`ImageInspector`]. Whatever JSON document the inspector produces is
//! the check's result.

use crate::error::{Error, Result};
use serde_json::{Value, json};
use std::process::Command;
use tracing::debug;

/// Fully-qualified image reference for a component
pub fn image_reference(namespace: &str, component: &str) -> String {
    format!("{}/{}", namespace.trim_end_matches('/'), component)
}

/// Something that can tell whether an image exists
pub trait ImageInspector {
    /// Inspect `reference` and return the result document
    fn inspect(&self, reference: &str) -> Result<Value>;
}

/// Inspects images with the `docker` command line client
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ImageInspector for DockerCli {
    fn inspect(&self, reference: &str) -> Result<Value> {
        debug!("Running {} image inspect {}", self.program, reference);

        let output = Command::new(&self.program)
            .args(["image", "inspect", reference])
            .output()
            .map_err(|e| Error::ImageInspection(format!("Failed to run {}: {}", self.program, e)))?;

        // The client's own exit status and output, untouched
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(json!({
                "changed": false,
                "failed": true,
                "rc": output.status.code(),
                "stdout": String::from_utf8_lossy(&output.stdout),
                "stderr": stderr,
                "msg": stderr.trim(),
            }));
        }

        let inspected: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::ImageInspection(format!("Unreadable output from {}: {}", self.program, e))
        })?;
        let image = match inspected {
            Value::Array(mut images) if !images.is_empty() => images.swap_remove(0),
            other => other,
        };

        Ok(json!({
            "changed": false,
            "image": image,
        }))
    }
}

/// Check that the image for `component` exists
///
/// A missing or blank component fails without consulting the inspector.
pub fn verify_image(
    inspector: &dyn ImageInspector,
    namespace: &str,
    component: Option<&str>,
) -> Result<Value> {
    let Some(component) = component.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(json!({
            "failed": true,
            "msg": "component is required",
        }));
    };

    inspector.inspect(&image_reference(namespace, component))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingInspector {
        seen: RefCell<Vec<String>>,
    }

    impl ImageInspector for RecordingInspector {
        fn inspect(&self, reference: &str) -> Result<Value> {
            self.seen.borrow_mut().push(reference.to_string());
            Ok(json!({"changed": false, "image": {"Id": "sha256:1234"}}))
        }
    }

    #[test]
    fn test_image_reference() {
        assert_eq!(image_reference("openshift3", "ose-pod"), "openshift3/ose-pod");
        assert_eq!(image_reference("registry.example.com/openshift3/", "node"), "registry.example.com/openshift3/node");
    }

    #[test]
    fn test_result_is_surfaced_unchanged() {
        let inspector = RecordingInspector::default();
        let result = verify_image(&inspector, "openshift3", Some("ose-haproxy-router")).unwrap();

        assert_eq!(result, json!({"changed": false, "image": {"Id": "sha256:1234"}}));
        assert_eq!(*inspector.seen.borrow(), vec!["openshift3/ose-haproxy-router".to_string()]);
    }

    #[test]
    fn test_component_is_required() {
        let inspector = RecordingInspector::default();
        for component in [None, Some(""), Some("  ")] {
            let result = verify_image(&inspector, "openshift3", component).unwrap();
            assert_eq!(result["failed"], json!(true));
            assert_eq!(result["msg"], json!("component is required"));
        }
        assert!(inspector.seen.borrow().is_empty());
    }

    /// Write an executable stand-in for the docker client
    #[cfg(unix)]
    fn fake_docker(dir: &tempfile::TempDir, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{}", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_inspect_keeps_client_output() {
        let dir = tempfile::tempdir().unwrap();
        let docker = DockerCli::new(fake_docker(
            &dir,
            "echo '[]'\necho 'Error: No such image: openshift3/ose-pod' >&2\nexit 1\n",
        ));

        let result = docker.inspect("openshift3/ose-pod").unwrap();
        assert_eq!(result["failed"], json!(true));
        assert_eq!(result["rc"], json!(1));
        assert_eq!(result["stdout"], json!("[]\n"));
        assert_eq!(result["stderr"], json!("Error: No such image: openshift3/ose-pod\n"));
        assert_eq!(result["msg"], json!("Error: No such image: openshift3/ose-pod"));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let docker = DockerCli::new(fake_docker(&dir, "echo '[{\"Id\": \"sha256:1234\"}]'\n"));

        let result = docker.inspect("openshift3/ose-pod").unwrap();
        assert_eq!(result, json!({"changed": false, "image": {"Id": "sha256:1234"}}));
    }

    #[test]
    fn test_missing_docker_binary() {
        let docker = DockerCli::new("/nonexistent/docker");
        let err = docker.inspect("openshift3/ose-pod").unwrap_err();
        assert!(matches!(err, Error::ImageInspection(_)));
    }
}
