#[cfg(feature = "aws")]
pub mod codebuild;

#[cfg(feature = "aws")]
pub mod credentials;

#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "aws")]
pub mod s3;
