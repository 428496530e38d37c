//! Test suites for the scripting core.

mod support;
