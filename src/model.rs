//! Core data model.
//!
//! A `Student` is the watched custom resource. It has identity (namespace +
//! name), a spec written by users, and a status reserved for the controller.
//! The external store owns these objects; the controller only ever holds
//! cached, read-only copies.

pub mod key;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use key::ResourceKey;

/// API group/version of the Student resource.
pub const API_VERSION: &str = "pefish.k8s.io/v1alpha1";
/// Kind of the Student resource.
pub const KIND: &str = "Student";

// ---------------------------------------------------------------------------
// Object metadata
// ---------------------------------------------------------------------------

/// Identity and bookkeeping fields shared by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    /// Empty for cluster-scoped objects.
    #[serde(default)]
    pub namespace: String,

    /// Assigned by the store on create.
    #[serde(default)]
    pub uid: Option<Uuid>,

    /// Opaque version string, changes on every write.
    #[serde(default)]
    pub resource_version: String,

    /// Bumped on every spec change.
    #[serde(default)]
    pub generation: i64,

    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Student
// ---------------------------------------------------------------------------

/// The watched resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    pub spec: StudentSpec,

    #[serde(default)]
    pub status: StudentStatus,
}

/// User-declared intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub school: String,

    /// Dependent deployment this student would drive. Passed through, not acted on.
    #[serde(default)]
    pub deployment_name: String,

    #[serde(default)]
    pub replicas: Option<i32>,
}

/// Controller-written state. Empty for now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentStatus {}

/// A listing of students plus the version it was taken at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentList {
    #[serde(default)]
    pub resource_version: String,
    pub items: Vec<Student>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl Student {
    /// Build a student with the given identity and an empty spec.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..ObjectMeta::default()
            },
            spec: StudentSpec::default(),
            status: StudentStatus::default(),
        }
    }

    pub fn with_spec(mut self, name: impl Into<String>, school: impl Into<String>) -> Self {
        self.spec.name = name.into();
        self.spec.school = school.into();
        self
    }

    pub fn with_deployment(mut self, deployment_name: impl Into<String>, replicas: i32) -> Self {
        self.spec.deployment_name = deployment_name.into();
        self.spec.replicas = Some(replicas);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
