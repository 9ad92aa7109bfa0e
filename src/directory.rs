//! Project directory: maps an opaque project id to the tenant's URLs.
//!
//! Lookups are exact-match reads. An unknown project id is `Ok(None)`, never an
//! error; errors are reserved for the backing store itself failing.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::{collections::HashMap, fs, path::Path};
use tracing::Instrument;
use url::Url;

/// Tenant reference data. Created out-of-band, read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub client_url: String,
    pub api_url: String,
}

#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Resolve a project id to its tenant record.
    ///
    /// # Errors
    /// Returns an error only when the backing store cannot be read.
    async fn resolve(&self, project_id: &str) -> Result<Option<Project>>;
}

/// Directory loaded once from a JSON array of projects.
#[derive(Clone, Debug, Default)]
pub struct StaticProjectDirectory {
    projects: HashMap<String, Project>,
}

impl StaticProjectDirectory {
    /// Build a directory from already validated projects.
    ///
    /// # Errors
    /// Returns an error on empty or duplicate ids, or on non-http(s) URLs.
    pub fn new(projects: Vec<Project>) -> Result<Self> {
        let mut map = HashMap::with_capacity(projects.len());
        for project in projects {
            validate_project(&project)?;
            let id = project.project_id.clone();
            if map.insert(id.clone(), project).is_some() {
                return Err(anyhow!("duplicate project id: {id}"));
            }
        }
        Ok(Self { projects: map })
    }

    /// Parse the JSON document used by `--projects-file`.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or a project is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let projects: Vec<Project> =
            serde_json::from_str(json).context("invalid projects JSON")?;
        Self::new(projects)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read projects file: {}", path.display()))?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[async_trait]
impl ProjectDirectory for StaticProjectDirectory {
    async fn resolve(&self, project_id: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(project_id).cloned())
    }
}

/// Directory backed by the `projects` table.
#[derive(Clone, Debug)]
pub struct PgProjectDirectory {
    pool: PgPool,
}

impl PgProjectDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectDirectory for PgProjectDirectory {
    async fn resolve(&self, project_id: &str) -> Result<Option<Project>> {
        let query = "SELECT project_id, client_url, api_url FROM projects WHERE project_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to resolve project")?;

        Ok(row.map(|row| Project {
            project_id: row.get("project_id"),
            client_url: row.get("client_url"),
            api_url: row.get("api_url"),
        }))
    }
}

fn validate_project(project: &Project) -> Result<()> {
    if project.project_id.trim().is_empty() {
        return Err(anyhow!("project id must not be empty"));
    }
    for (field, value) in [
        ("client_url", &project.client_url),
        ("api_url", &project.api_url),
    ] {
        let parsed = Url::parse(value).with_context(|| {
            format!("project {}: invalid {field}: {value}", project.project_id)
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "project {}: {field} must use http or https",
                project.project_id
            ));
        }
    }
    Ok(())
}
