//! Errors raised by the light accumulation stage.

use std::borrow::Cow;
use thiserror::Error;

/// Failures that can occur while building or running the lighting pipeline.
///
/// Fallible functions in this crate return [`anyhow::Result`] with one of
/// these variants as the root cause, so callers can use
/// [`anyhow::Error::downcast_ref`] to decide whether a feature can be disabled
/// instead of aborting.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LightingError {
    /// A texture, buffer or other GPU resource could not be allocated.
    #[error("could not create {resource}: {reason}")]
    ResourceCreation {
        resource: Cow<'static, str>,
        reason: String,
    },
    /// Shader source could not be generated, parsed, validated or turned into
    /// a pipeline.
    #[error("could not build shader `{label}`: {reason}")]
    ShaderBuild {
        label: Cow<'static, str>,
        reason: String,
    },
    /// Inputs did not honor the contract of the pipeline, for example a
    /// G-buffer with a different resolution than the pipeline.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    /// The underlying graphics device was lost and resources must be
    /// re-acquired.
    #[error("graphics device lost: {0}")]
    DeviceLost(String),
}

impl LightingError {
    pub fn resource_creation(
        resource: impl Into<Cow<'static, str>>,
        reason: impl ToString,
    ) -> Self {
        Self::ResourceCreation {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn shader_build(label: impl Into<Cow<'static, str>>, reason: impl ToString) -> Self {
        Self::ShaderBuild {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn contract_violation(message: impl ToString) -> Self {
        Self::ContractViolation(message.to_string())
    }

    /// Whether the error only affects an optional feature, which may then be
    /// disabled rather than failing the whole pipeline.
    pub fn is_recoverable_by_disabling_feature(&self) -> bool {
        matches!(
            self,
            Self::ResourceCreation { .. } | Self::ShaderBuild { .. } | Self::ContractViolation(_)
        )
    }
}

/// Returns the [`LightingError`] at the root of the given error, if any.
pub fn lighting_error(error: &anyhow::Error) -> Option<&LightingError> {
    error.chain().find_map(|cause| cause.downcast_ref::<LightingError>())
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Context;

    #[test]
    fn should_find_lighting_error_beneath_context() {
        let result: anyhow::Result<()> = Err(anyhow::Error::new(
            LightingError::contract_violation("mismatched resolution"),
        ))
        .context("Rendering frame");

        let error = result.unwrap_err();
        assert_eq!(
            lighting_error(&error),
            Some(&LightingError::ContractViolation(
                "mismatched resolution".to_string()
            ))
        );
    }

    #[test]
    fn should_not_consider_device_loss_recoverable_by_disabling_feature() {
        assert!(!LightingError::DeviceLost("reset".to_string()).is_recoverable_by_disabling_feature());
        assert!(LightingError::shader_build("ssao", "parse error").is_recoverable_by_disabling_feature());
    }

    #[test]
    fn should_format_resource_creation_error() {
        let error = LightingError::resource_creation("accumulation buffer", "out of memory");
        assert_eq!(
            error.to_string(),
            "could not create accumulation buffer: out of memory"
        );
    }
}
