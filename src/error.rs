use crate::model::CoercionError;

pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("cannot open the {store} store: {message}")]
    Connect { store: &'static str, message: String },

    #[error("clearing {table} failed: {message}")]
    ClearTable { table: &'static str, message: String },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<EtlError>,
    },

    #[error("cannot read column {column}: {source}")]
    Coercion {
        column: &'static str,
        #[source]
        source: CoercionError,
    },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl EtlError {
    /// Attach the name of the pipeline stage that raised this error.
    ///
    /// Errors that already name their origin are passed through untouched.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            err @ (EtlError::Stage { .. } | EtlError::ClearTable { .. } | EtlError::Connect { .. }) => {
                err
            }
            other => EtlError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn connect(store: &'static str, err: impl std::fmt::Display) -> Self {
        EtlError::Connect {
            store,
            message: err.to_string(),
        }
    }

    /// The stage name carried by a [`EtlError::Stage`], if any.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            EtlError::Stage { stage, .. } => Some(stage),
            EtlError::ClearTable { .. } => Some("clear"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_stage_wraps_plain_errors_once() {
        let err = EtlError::Integrity("duplicate key".to_string())
            .in_stage("DimTerm")
            .in_stage("DimStudent");

        assert_eq!(err.stage(), Some("DimTerm"));
        assert_eq!(
            err.to_string(),
            "DimTerm failed: integrity violation: duplicate key"
        );
    }

    #[test]
    fn clear_failures_keep_their_table() {
        let err = EtlError::ClearTable {
            table: "FACTCLASS",
            message: "locked".to_string(),
        }
        .in_stage("clear");

        assert!(matches!(err, EtlError::ClearTable { table: "FACTCLASS", .. }));
        assert_eq!(err.stage(), Some("clear"));
    }
}
