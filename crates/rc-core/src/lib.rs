pub mod job;
pub mod locator;
pub mod reconcile;

pub use job::{BatchSubmission, JobSpec, JobState, JobStatus, TemplateRead};
pub use locator::{LocatorCodec, LocatorError, ObjectLocator, extension_of};
pub use reconcile::{Verdict, reconcile};
