//! Test suites for confined content access.

mod content;
mod support;
