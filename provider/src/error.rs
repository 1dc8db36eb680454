use eksup_model::{Error, Result};

/// Converts AWS SDK results and missing response fields into the model's [`Error`].
pub(crate) trait AwsContext<T> {
    /// Attaches `action`, e.g. "describe subnets", to the failure.
    fn aws_context<S>(self, action: S) -> Result<T>
    where
        S: Into<String>;
}

// Implemented for all standard `Error + Send + Sync + 'static` types, which includes `SdkError`.
impl<T, E> AwsContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn aws_context<S>(self, action: S) -> Result<T>
    where
        S: Into<String>,
    {
        self.map_err(|e| Error::AwsSdk {
            action: action.into(),
            source: Box::new(e),
        })
    }
}

/// A `None` in an AWS response where a value is required.
pub(crate) trait Required<T> {
    fn required<S1, S2>(self, action: S1, field: S2) -> Result<T>
    where
        S1: Into<String>,
        S2: Into<String>;
}

impl<T> Required<T> for Option<T> {
    fn required<S1, S2>(self, action: S1, field: S2) -> Result<T>
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.ok_or_else(|| Error::AwsMissingField {
            action: action.into(),
            field: field.into(),
        })
    }
}

#[test]
fn missing_field_names_the_action() {
    let err = None::<String>
        .required("describe cluster", "endpoint")
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "AWS response for 'describe cluster' is missing 'endpoint'"
    );
}
