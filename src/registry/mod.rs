//! Typed registry of model sources and per-(model, element) extraction specs.

mod builtin;
pub mod spec;

pub use spec::{ExtractionSpec, FieldMatchRule, ModelSource, VariableSpec};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ArchiverError, Result};
use crate::models::{Element, Model};

/// On-disk layout of a registry file (TOML, YAML or JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    models: Vec<ModelSource>,
    #[serde(default)]
    specs: Vec<ExtractionSpec>,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    sources: HashMap<Model, ModelSource>,
    specs: HashMap<(Model, Element), Arc<ExtractionSpec>>,
}

impl ModelRegistry {
    /// Build and validate a registry. Duplicate entries and specs without a
    /// matching model source are rejected here rather than at lookup time.
    pub fn from_parts(sources: Vec<ModelSource>, specs: Vec<ExtractionSpec>) -> Result<Self> {
        let mut source_map = HashMap::new();
        for source in sources {
            source.validate_source()?;
            let model = source.model;
            if source_map.insert(model, source).is_some() {
                return Err(ArchiverError::Config(format!(
                    "Model '{}' is defined more than once",
                    model
                )));
            }
        }

        let mut spec_map = HashMap::new();
        for spec in specs {
            spec.validate_spec()?;
            if !source_map.contains_key(&spec.model) {
                return Err(ArchiverError::Config(format!(
                    "Spec {}/{} references a model with no source",
                    spec.model, spec.element
                )));
            }
            let key = (spec.model, spec.element);
            if spec_map.insert(key, Arc::new(spec)).is_some() {
                return Err(ArchiverError::Config(format!(
                    "Spec {}/{} is defined more than once",
                    key.0, key.1
                )));
            }
        }

        debug!(
            "Registry holds {} model sources and {} extraction specs",
            source_map.len(),
            spec_map.len()
        );

        Ok(Self {
            sources: source_map,
            specs: spec_map,
        })
    }

    /// The Alaska model set the archive has always been built from.
    pub fn builtin() -> Result<Self> {
        Self::from_parts(builtin::sources(), builtin::specs())
    }

    /// Load a registry file; the format is inferred from the extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading model registry from {}", path.display());

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        let file: RegistryFile = settings.try_deserialize()?;

        Self::from_parts(file.models, file.specs)
    }

    pub fn spec(&self, model: Model, element: Element) -> Result<Arc<ExtractionSpec>> {
        self.specs
            .get(&(model, element))
            .cloned()
            .ok_or_else(|| ArchiverError::MissingSpec {
                model: model.to_string(),
                element: element.to_string(),
            })
    }

    pub fn source(&self, model: Model) -> Result<&ModelSource> {
        self.sources
            .get(&model)
            .ok_or_else(|| ArchiverError::Config(format!("No source registered for model '{}'", model)))
    }

    /// Registered (model, element) pairs in a stable order.
    pub fn pairs(&self) -> Vec<(Model, Element)> {
        let mut pairs: Vec<_> = self.specs.keys().copied().collect();
        pairs.sort();
        pairs
    }
}
