use std::path::PathBuf;

/// The files a net is built from: a definition and, optionally, trained weights.
#[derive(Clone, Debug)]
pub struct NetArtifact {
    pub definition: PathBuf,
    pub weights: Option<PathBuf>,
}

impl NetArtifact {
    pub fn new(definition: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
        Self {
            definition: definition.into(),
            weights: Some(weights.into()),
        }
    }

    pub fn definition_only(definition: impl Into<PathBuf>) -> Self {
        Self {
            definition: definition.into(),
            weights: None,
        }
    }
}
