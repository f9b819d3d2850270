// Status enums for jobs and the hints they are made of.
//
// Transitions live in `orchestration::job_synchronizer`; this module only
// defines the states and their string forms.

pub mod states;

pub use states::{HintStatus, JobStatus};
